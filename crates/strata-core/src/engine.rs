//! Settings engine
//!
//! Keeps three kinds of per-instance stores:
//!
//! - `live`: the merged live view of the temporary layer. Built from the
//!   active named layers with the persisted temporary values on top, and the
//!   only store change notification is driven from.
//! - `overrides`: the values persisted in the temporary layer.
//! - `named`: the stores of every active named layer.
//!
//! Reads of the temporary layer see `live`, then the declared default.

use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use strata_types::config_adapter::ConfigAdapter;
use strata_types::types::validate_layer_name;

use crate::bulk::WriteBuffer;
use crate::cache::{DEFAULT_CACHE_SIZE, UnitCache};
use crate::codec::{self, Section};
use crate::declaration::{ComponentDecl, ComponentDeclBuilder, ON_SETTING};
use crate::deferred::{DeferredQueue, DeferredSender};
use crate::notifier::{Lifecycle, ListenerId, ListenerRegistry, SettingChange};
use crate::prelude::*;
use crate::registry::{ComponentRegistry, InstanceEntry, name_key};
use crate::validator::Validator;

/// Stores keyed by instance key
pub(crate) type Stores = HashMap<Box<str>, SettingStore>;

/// Result of reading a node, which may be a branch
#[derive(Debug, Clone, PartialEq)]
pub enum SettingRead {
	Value(SettingValue),
	/// Children of a branch that hold at least one value
	Children(Vec<Box<str>>),
}

#[derive(Debug)]
pub struct SettingsEngineBuilder {
	adapter: Option<Arc<dyn ConfigAdapter>>,
	validator: Option<Validator>,
	cache_size: usize,
	active_layers: Vec<String>,
}

impl Default for SettingsEngineBuilder {
	fn default() -> Self {
		Self::new()
	}
}

impl SettingsEngineBuilder {
	pub fn new() -> Self {
		Self { adapter: None, validator: None, cache_size: DEFAULT_CACHE_SIZE, active_layers: Vec::new() }
	}

	/// Persistence backend (required)
	pub fn adapter(mut self, adapter: Arc<dyn ConfigAdapter>) -> Self {
		self.adapter = Some(adapter);
		self
	}

	/// Validator with custom limiter tags
	pub fn validator(mut self, validator: Validator) -> Self {
		self.validator = Some(validator);
		self
	}

	/// Capacity of the raw unit cache
	pub fn cache_size(mut self, cache_size: usize) -> Self {
		self.cache_size = cache_size;
		self
	}

	/// Initially active named layers, highest precedence first
	pub fn active_layers<I, S>(mut self, layers: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.active_layers = layers.into_iter().map(Into::into).collect();
		self
	}

	pub fn build(self) -> StResult<SettingsEngine> {
		let adapter = self
			.adapter
			.ok_or_else(|| Error::Internal("settings engine needs a config adapter".into()))?;
		let mut engine = SettingsEngine {
			adapter,
			validator: Arc::new(self.validator.unwrap_or_default()),
			units: Arc::new(UnitCache::new(self.cache_size)),
			registry: ComponentRegistry::new(),
			live: Stores::new(),
			overrides: Stores::new(),
			named: HashMap::new(),
			active_layers: Vec::new(),
			active: HashSet::new(),
			listeners: ListenerRegistry::default(),
			lifecycles: HashMap::new(),
			write_buffer: None,
			deferred: DeferredQueue::new(),
		};
		engine.set_active_layers(self.active_layers.as_slice())?;
		Ok(engine)
	}
}

pub struct SettingsEngine {
	pub(crate) adapter: Arc<dyn ConfigAdapter>,
	pub(crate) validator: Arc<Validator>,
	pub(crate) units: Arc<UnitCache>,
	pub(crate) registry: ComponentRegistry,
	pub(crate) live: Stores,
	pub(crate) overrides: Stores,
	pub(crate) named: HashMap<Box<str>, Stores>,
	pub(crate) active_layers: Vec<Box<str>>,
	active: HashSet<Box<str>>,
	listeners: ListenerRegistry,
	lifecycles: HashMap<Box<str>, Arc<dyn Lifecycle>>,
	pub(crate) write_buffer: Option<WriteBuffer>,
	deferred: DeferredQueue,
}

impl fmt::Debug for SettingsEngine {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("SettingsEngine")
			.field("adapter", &self.adapter)
			.field("instances", &self.live.len())
			.field("active_layers", &self.active_layers)
			.field("active", &self.active)
			.field("listeners", &self.listeners)
			.field("bulk", &self.write_buffer.is_some())
			.finish_non_exhaustive()
	}
}

fn is_on_path(path: &SettingPath) -> bool {
	path.len() == 1 && path.name().eq_ignore_ascii_case(ON_SETTING)
}

fn on_path(decl: &ComponentDecl) -> SettingPath {
	SettingPath::root(decl.settings().first().map_or(ON_SETTING, |d| d.name()))
}

/// Prefixes validation errors with the instance and path they concern
pub(crate) fn in_context(err: Error, instance: &str, path: &SettingPath) -> Error {
	match err {
		Error::Parse(msg) => Error::Parse(format!("{}.{}: {}", instance, path, msg)),
		Error::ConstraintViolation(msg) => Error::ConstraintViolation(format!("{}.{}: {}", instance, path, msg)),
		other => other,
	}
}

fn type_mismatch(instance: &str, path: &str, expected: &str, value: &SettingValue) -> Error {
	Error::Parse(format!("{}.{} is a {} value, not {}", instance, path, value.type_name(), expected))
}

impl SettingsEngine {
	pub fn builder() -> SettingsEngineBuilder {
		SettingsEngineBuilder::new()
	}

	pub fn validator(&self) -> &Validator {
		&self.validator
	}

	// Component types
	//*****************

	pub fn register_component(&mut self, builder: ComponentDeclBuilder) -> StResult<Arc<ComponentDecl>> {
		let decl = builder.build(&self.validator)?;
		self.register_decl(decl)
	}

	pub fn register_decl(&mut self, decl: ComponentDecl) -> StResult<Arc<ComponentDecl>> {
		let decl = self.registry.register_type(decl)?;
		info!(
			"Registered component type {} (plugin {}, {} settings)",
			decl.type_name(),
			decl.plugin(),
			decl.leaves().len()
		);
		Ok(decl)
	}

	/// Declaration tree of a component type
	pub fn component_type(&self, type_name: &str) -> StResult<Arc<ComponentDecl>> {
		self.registry.component_type(type_name).cloned()
	}

	pub fn component_types(&self) -> impl Iterator<Item = &Arc<ComponentDecl>> {
		self.registry.types()
	}

	/// Parses every default of a type now instead of on first use
	pub fn verify_defaults(&self, type_name: &str) -> StResult<()> {
		self.registry.component_type(type_name)?.verify_defaults(&self.validator)
	}

	pub fn register_lifecycle(&mut self, type_name: &str, lifecycle: Arc<dyn Lifecycle>) -> StResult<()> {
		let decl = self.registry.component_type(type_name)?;
		self.lifecycles.insert(name_key(decl.type_name()), lifecycle);
		Ok(())
	}

	/// Registers a listener for changes of every instance of a type
	pub fn register_listener<F>(&mut self, type_name: &str, listener: F) -> StResult<ListenerId>
	where
		F: Fn(&mut SettingsEngine, &SettingChange) -> StResult<()> + Send + Sync + 'static,
	{
		let decl = self.registry.component_type(type_name)?;
		let type_name = decl.type_name().to_string();
		let id = self.listeners.register(&type_name, Arc::new(listener));
		debug!("Registered listener {:?} for {}", id, type_name);
		Ok(id)
	}

	pub fn unregister_listener(&mut self, id: ListenerId) -> bool {
		self.listeners.unregister(id)
	}

	// Instances
	//***********

	/// Creates an instance and loads its persisted values.
	///
	/// The instance is activated when its effective `On` is true.
	pub fn add_instance(&mut self, type_name: &str, name: &str) -> StResult<()> {
		let entry = self.registry.add_instance(type_name, name)?;
		let key = entry.key();
		let overrides = codec::load_instance_store(
			&*self.adapter,
			&self.units,
			&self.validator,
			&Layer::Temporary,
			&entry.decl,
			&entry.name,
		);
		for layer in self.active_layers.clone() {
			let store = self.load_layer_store(&layer, &entry);
			self.named.entry(layer).or_default().insert(key.clone(), store);
		}
		let mut live = self.merged_named(&key);
		live.merge(&overrides);
		self.live.insert(key.clone(), live);
		self.overrides.insert(key, overrides);
		info!("Added {} instance {}", entry.decl.type_name(), entry.name);

		if self.live_value(&entry, &on_path(&entry.decl)).ok().and_then(|v| v.as_bool()) == Some(true) {
			self.transition(&entry, true)?;
		}
		Ok(())
	}

	/// Deactivates and drops an instance. Its persisted values are kept.
	pub fn remove_instance(&mut self, name: &str) -> StResult<()> {
		let entry = self.registry.instance(name)?.clone();
		let key = entry.key();
		if self.active.contains(&key)
			&& let Err(e) = self.transition(&entry, false)
		{
			warn!("Deactivating {} failed: {}", entry.name, e);
		}
		self.registry.remove_instance(name)?;
		self.live.remove(&key);
		self.overrides.remove(&key);
		for stores in self.named.values_mut() {
			stores.remove(&key);
		}
		info!("Removed instance {}", entry.name);
		Ok(())
	}

	pub fn instance(&self, name: &str) -> StResult<&InstanceEntry> {
		self.registry.instance(name)
	}

	/// Instances sorted by name
	pub fn instances(&self) -> impl Iterator<Item = &InstanceEntry> {
		self.registry.instances()
	}

	pub fn is_active(&self, instance: &str) -> bool {
		self.active.contains(&name_key(instance))
	}

	// Reads
	//*******

	/// Value of a leaf as seen through one layer.
	///
	/// The temporary layer yields the live view. A named layer yields its own
	/// value. Both fall back to the declared default.
	pub fn get(&self, layer: &Layer, instance: &str, path: &SettingPath) -> StResult<SettingValue> {
		layer.validate()?;
		let entry = self.registry.instance(instance)?;
		let (path, _) = entry.decl.resolve_leaf(path)?;
		match layer {
			Layer::Temporary => self.live_value(entry, &path),
			Layer::Named(name) => match self.layer_store(name, entry).get(&path) {
				Some(value) => Ok(value.clone()),
				None => self.default_value(entry, &path),
			},
		}
	}

	/// Like `get`, substituting `fallback` for an unset setting
	pub fn get_or(
		&self,
		layer: &Layer,
		instance: &str,
		path: &SettingPath,
		fallback: SettingValue,
	) -> StResult<SettingValue> {
		match self.get(layer, instance, path) {
			Err(Error::UnsetSetting(_)) => Ok(fallback),
			other => other,
		}
	}

	/// Reads a leaf value, or the non-empty children of a branch
	pub fn read(&self, layer: &Layer, instance: &str, path: &SettingPath) -> StResult<SettingRead> {
		layer.validate()?;
		let entry = self.registry.instance(instance)?;
		let (path, node) = entry.decl.resolve(path)?;
		if node.is_leaf() {
			return self.get(layer, instance, &path).map(SettingRead::Value);
		}
		let store: Cow<'_, SettingStore> = match layer {
			Layer::Temporary => {
				self.live.get(&entry.key()).map_or_else(|| Cow::Owned(SettingStore::new()), Cow::Borrowed)
			}
			Layer::Named(name) => self.layer_store(name, entry),
		};
		let children = store
			.branch(&path)
			.map(|branch| branch.non_empty_children().into_iter().map(Into::into).collect())
			.unwrap_or_default();
		Ok(SettingRead::Children(children))
	}

	/// Effective value computed from the persisted layers, ignoring the live view
	pub fn resolve(&self, instance: &str, path: &SettingPath) -> StResult<SettingValue> {
		let entry = self.registry.instance(instance)?;
		let (path, _) = entry.decl.resolve_leaf(path)?;
		let key = entry.key();
		if let Some(value) = self.overrides.get(&key).and_then(|store| store.get(&path)) {
			return Ok(value.clone());
		}
		if let Some(value) = self.named_value(&key, &path) {
			return Ok(value);
		}
		self.default_value(entry, &path)
	}

	pub fn get_bool(&self, instance: &str, path: &str) -> StResult<bool> {
		let value = self.get(&Layer::Temporary, instance, &SettingPath::parse(path)?)?;
		value.as_bool().ok_or_else(|| type_mismatch(instance, path, "bool", &value))
	}

	pub fn get_int(&self, instance: &str, path: &str) -> StResult<i64> {
		let value = self.get(&Layer::Temporary, instance, &SettingPath::parse(path)?)?;
		value.as_int().ok_or_else(|| type_mismatch(instance, path, "int", &value))
	}

	/// Integers are widened
	pub fn get_float(&self, instance: &str, path: &str) -> StResult<f64> {
		let value = self.get(&Layer::Temporary, instance, &SettingPath::parse(path)?)?;
		value.as_float().ok_or_else(|| type_mismatch(instance, path, "float", &value))
	}

	pub fn get_string(&self, instance: &str, path: &str) -> StResult<String> {
		let value = self.get(&Layer::Temporary, instance, &SettingPath::parse(path)?)?;
		value.as_str().map(ToString::to_string).ok_or_else(|| type_mismatch(instance, path, "string", &value))
	}

	pub(crate) fn live_value(&self, entry: &InstanceEntry, path: &SettingPath) -> StResult<SettingValue> {
		match self.live.get(&entry.key()).and_then(|store| store.get(path)) {
			Some(value) => Ok(value.clone()),
			None => self.default_value(entry, path),
		}
	}

	pub(crate) fn default_value(&self, entry: &InstanceEntry, path: &SettingPath) -> StResult<SettingValue> {
		let (_, leaf) = entry.decl.resolve_leaf(path)?;
		leaf.default_value(&self.validator).map_err(|e| match e {
			Error::UnsetSetting(msg) => Error::UnsetSetting(format!("{}.{}: {}", entry.name, path, msg)),
			other => other,
		})
	}

	/// First value of an active named layer, in precedence order
	pub(crate) fn named_value(&self, key: &str, path: &SettingPath) -> Option<SettingValue> {
		self.active_layers.iter().find_map(|layer| {
			self.named.get(layer).and_then(|stores| stores.get(key)).and_then(|store| store.get(path)).cloned()
		})
	}

	/// Active named layers merged, highest precedence on top
	pub(crate) fn merged_named(&self, key: &str) -> SettingStore {
		let mut merged = SettingStore::new();
		for layer in self.active_layers.iter().rev() {
			if let Some(store) = self.named.get(layer).and_then(|stores| stores.get(key)) {
				merged.merge(store);
			}
		}
		merged
	}

	/// Store of a named layer, loaded from the backend if the layer is not active
	fn layer_store(&self, layer: &str, entry: &InstanceEntry) -> Cow<'_, SettingStore> {
		match self.named.get(layer).and_then(|stores| stores.get(&entry.key())) {
			Some(store) => Cow::Borrowed(store),
			None => Cow::Owned(self.load_layer_store(layer, entry)),
		}
	}

	pub(crate) fn load_layer_store(&self, layer: &str, entry: &InstanceEntry) -> SettingStore {
		codec::load_instance_store(
			&*self.adapter,
			&self.units,
			&self.validator,
			&Layer::Named(layer.into()),
			&entry.decl,
			&entry.name,
		)
	}

	// Writes
	//********

	/// Validates and stores a value in one layer.
	///
	/// Temporary writes update the live view, persist, and notify listeners
	/// when the effective value changed. Named writes only persist.
	pub fn set(&mut self, layer: &Layer, instance: &str, path: &SettingPath, value: SettingValue) -> StResult<()> {
		let entry = self.registry.instance(instance)?.clone();
		let (path, leaf) = entry.decl.resolve_leaf(path)?;
		let value = self.validator.validate(value, leaf).map_err(|e| in_context(e, &entry.name, &path))?;
		self.write(layer, &entry, &path, value)
	}

	/// Like `set`, parsing the value from text
	pub fn set_text(&mut self, layer: &Layer, instance: &str, path: &SettingPath, text: &str) -> StResult<()> {
		let entry = self.registry.instance(instance)?.clone();
		let (path, leaf) = entry.decl.resolve_leaf(path)?;
		let value = self.validator.parse_for(text, leaf).map_err(|e| in_context(e, &entry.name, &path))?;
		self.write(layer, &entry, &path, value)
	}

	/// Like `set`, converting the value from JSON
	pub fn set_json(
		&mut self,
		layer: &Layer,
		instance: &str,
		path: &SettingPath,
		json: &serde_json::Value,
	) -> StResult<()> {
		let entry = self.registry.instance(instance)?.clone();
		let (path, leaf) = entry.decl.resolve_leaf(path)?;
		let value = self.validator.coerce_for(json, leaf).map_err(|e| in_context(e, &entry.name, &path))?;
		self.write(layer, &entry, &path, value)
	}

	fn write(&mut self, layer: &Layer, entry: &InstanceEntry, path: &SettingPath, value: SettingValue) -> StResult<()> {
		layer.validate()?;
		match layer {
			Layer::Temporary => {
				self.record_write(entry, path, &value);
				self.apply_live(entry, path, value, false)
			}
			Layer::Named(name) => {
				let mut store = self.layer_store(name, entry).into_owned();
				store.set(path, value)?;
				self.store_named(name, entry, store);
				Ok(())
			}
		}
	}

	/// Removes a value from one layer.
	///
	/// Returns the value the layer yields afterwards, which for the temporary
	/// layer is the new effective value.
	pub fn remove(&mut self, layer: &Layer, instance: &str, path: &SettingPath) -> StResult<Option<SettingValue>> {
		layer.validate()?;
		let entry = self.registry.instance(instance)?.clone();
		let (path, _) = entry.decl.resolve_leaf(path)?;
		match layer {
			Layer::Temporary => self.remove_live(&entry, &path),
			Layer::Named(name) => {
				let mut store = self.layer_store(name, &entry).into_owned();
				if store.remove(&path).is_some() {
					self.store_named(name, &entry, store);
				}
				Ok(self.get(layer, instance, &path).ok())
			}
		}
	}

	fn remove_live(&mut self, entry: &InstanceEntry, path: &SettingPath) -> StResult<Option<SettingValue>> {
		let key = entry.key();
		let previous = self.live_value(entry, path).ok();
		let fallback = self.named_value(&key, path);
		let store = self.live.entry(key).or_default();
		match fallback {
			Some(value) => {
				store.set(path, value)?;
			}
			None => {
				store.remove(path);
			}
		}
		self.record_remove(entry, path);

		let current = self.live_value(entry, path).ok();
		if current != previous {
			self.notify(entry, path, current.clone())?;
		}
		Ok(current)
	}

	fn store_named(&mut self, layer: &str, entry: &InstanceEntry, store: SettingStore) {
		let section = Section { instance: &entry.name, decl: &entry.decl, store: &store };
		if let Err(e) =
			codec::persist_plugin(&*self.adapter, &self.units, &Layer::Named(layer.into()), entry.decl.plugin(), &[section])
		{
			error!("Failed to persist {} in layer {}: {}", entry.name, layer, e);
		}
		if let Some(stores) = self.named.get_mut(layer) {
			stores.insert(entry.key(), store);
		}
	}

	/// Updates the live view and notifies on change, without recording the write
	pub(crate) fn apply_live(
		&mut self,
		entry: &InstanceEntry,
		path: &SettingPath,
		value: SettingValue,
		force_notify: bool,
	) -> StResult<()> {
		let previous = self.live_value(entry, path).ok();
		self.live.entry(entry.key()).or_default().set(path, value.clone())?;
		if force_notify || previous.as_ref() != Some(&value) {
			self.notify(entry, path, Some(value))?;
		}
		Ok(())
	}

	/// Records a temporary write in the bulk buffer, or persists it
	fn record_write(&mut self, entry: &InstanceEntry, path: &SettingPath, value: &SettingValue) {
		let key = entry.key();
		if let Some(buffer) = self.write_buffer.as_mut() {
			buffer.record_set(&key, path, value.clone());
			return;
		}
		if let Err(e) = self.overrides.entry(key).or_default().set(path, value.clone()) {
			warn!("Cannot record {}.{}: {}", entry.name, path, e);
			return;
		}
		self.persist_overrides(entry.decl.plugin());
	}

	fn record_remove(&mut self, entry: &InstanceEntry, path: &SettingPath) {
		let key = entry.key();
		if let Some(buffer) = self.write_buffer.as_mut() {
			buffer.record_remove(&key, path);
			return;
		}
		if self.overrides.get_mut(&key).and_then(|store| store.remove(path)).is_some() {
			self.persist_overrides(entry.decl.plugin());
		}
	}

	/// Writes the temporary values of every instance of a plugin
	pub(crate) fn persist_overrides(&self, plugin: &str) {
		let empty = SettingStore::new();
		let entries: Vec<&InstanceEntry> = self.registry.instances_in_plugin(plugin).collect();
		let sections: Vec<Section<'_>> = entries
			.iter()
			.map(|entry| Section {
				instance: &entry.name,
				decl: &entry.decl,
				store: self.overrides.get(&entry.key()).unwrap_or(&empty),
			})
			.collect();
		if let Err(e) = codec::persist_plugin(&*self.adapter, &self.units, &Layer::Temporary, plugin, &sections) {
			error!("Failed to persist temporary values of {}: {}", plugin, e);
		}
	}

	/// Runs the `On` transition, then every listener of the instance's type.
	///
	/// All listeners run. The first failure is returned.
	pub(crate) fn notify(
		&mut self,
		entry: &InstanceEntry,
		path: &SettingPath,
		value: Option<SettingValue>,
	) -> StResult<()> {
		let mut first_error: Option<Error> = None;
		if is_on_path(path)
			&& let Some(on) = value.as_ref().and_then(SettingValue::as_bool)
			&& let Err(e) = self.transition(entry, on)
		{
			warn!("Lifecycle of {} failed: {}", entry.name, e);
			first_error = Some(e);
		}

		let change = SettingChange {
			instance: entry.name.clone(),
			component_type: entry.decl.type_name().into(),
			path: path.clone(),
			value,
		};
		for listener in self.listeners.listeners_for(entry.decl.type_name()) {
			if let Err(e) = listener(self, &change) {
				warn!("Listener of {} failed on {}.{}: {}", entry.decl.type_name(), entry.name, path, e);
				first_error.get_or_insert(e);
			}
		}

		match first_error {
			Some(e) => Err(Error::Listener(format!("{}.{}: {}", entry.name, path, e))),
			None => Ok(()),
		}
	}

	fn transition(&mut self, entry: &InstanceEntry, on: bool) -> StResult<()> {
		let key = entry.key();
		let lifecycle = self.lifecycles.get(&name_key(entry.decl.type_name())).cloned();
		if on {
			if !self.active.insert(key) {
				return Ok(());
			}
			info!("Activating {}", entry.name);
			if let Some(lifecycle) = lifecycle {
				lifecycle.activate(self, &entry.name)?;
			}
		} else {
			if !self.active.remove(&key) {
				return Ok(());
			}
			info!("Deactivating {}", entry.name);
			if let Some(lifecycle) = lifecycle {
				lifecycle.deactivate(self, &entry.name)?;
			}
		}
		Ok(())
	}

	// Layers
	//********

	/// Named layers known to the backend
	pub fn list_layers(&self) -> StResult<Vec<Box<str>>> {
		self.adapter.list_layers()
	}

	/// Active named layers, highest precedence first
	pub fn active_layers(&self) -> &[Box<str>] {
		&self.active_layers
	}

	/// Replaces the active named layers, highest precedence first.
	///
	/// The live view picks the new order up on the next `reload`.
	pub fn set_active_layers<S: AsRef<str>>(&mut self, layers: &[S]) -> StResult<()> {
		let mut ordered: Vec<Box<str>> = Vec::with_capacity(layers.len());
		for layer in layers {
			let name = layer.as_ref();
			validate_layer_name(name)?;
			if !ordered.iter().any(|l| l.as_ref() == name) {
				ordered.push(name.into());
			}
		}
		self.named.retain(|name, _| ordered.contains(name));
		for name in &ordered {
			if !self.named.contains_key(name) {
				let stores = self.load_layer(name);
				self.named.insert(name.clone(), stores);
			}
		}
		self.active_layers = ordered;
		info!("Active layers: [{}]", self.active_layers.join(", "));
		Ok(())
	}

	fn load_layer(&self, layer: &str) -> Stores {
		self.registry.instances().map(|entry| (entry.key(), self.load_layer_store(layer, entry))).collect()
	}

	/// Rereads a named layer from the backend
	pub fn reload_layer(&mut self, name: &str) -> StResult<()> {
		validate_layer_name(name)?;
		self.units.invalidate_layer(name);
		if self.named.contains_key(name) {
			let stores = self.load_layer(name);
			self.named.insert(name.into(), stores);
		}
		debug!("Reloaded layer {}", name);
		Ok(())
	}

	/// Deletes a named layer from the backend and deactivates it
	pub fn delete_layer(&mut self, name: &str) -> StResult<()> {
		validate_layer_name(name)?;
		self.adapter.delete_layer(name)?;
		self.units.invalidate_layer(name);
		self.active_layers.retain(|layer| layer.as_ref() != name);
		self.named.remove(name);
		info!("Deleted layer {}", name);
		Ok(())
	}

	/// Persists the effective value of every leaf of every instance into a named layer
	pub fn snapshot_to_layer(&mut self, name: &str) -> StResult<()> {
		validate_layer_name(name)?;
		let layer = Layer::Named(name.into());
		let mut snapshots: Vec<(InstanceEntry, SettingStore)> = Vec::new();
		for entry in self.registry.instances() {
			let mut store = SettingStore::new();
			for (path, _) in entry.decl.leaves() {
				if let Ok(value) = self.live_value(entry, &path) {
					store.set(&path, value)?;
				}
			}
			snapshots.push((entry.clone(), store));
		}
		for plugin in self.registry.plugins() {
			let sections: Vec<Section<'_>> = snapshots
				.iter()
				.filter(|(entry, _)| entry.decl.plugin() == plugin.as_ref())
				.map(|(entry, store)| Section { instance: &entry.name, decl: &entry.decl, store })
				.collect();
			codec::persist_plugin(&*self.adapter, &self.units, &layer, &plugin, &sections)?;
		}
		if self.named.contains_key(name) {
			let stores = snapshots.into_iter().map(|(entry, store)| (entry.key(), store)).collect();
			self.named.insert(name.into(), stores);
		}
		info!("Saved live values to layer {}", name);
		Ok(())
	}

	// Deferred work
	//***************

	/// Handle for queueing work onto the main flow from any thread
	pub fn deferred_sender(&self) -> DeferredSender {
		self.deferred.sender()
	}

	/// Runs the jobs queued so far. Returns how many ran.
	pub fn run_deferred(&mut self) -> usize {
		let jobs = self.deferred.take_pending();
		let count = jobs.len();
		for job in jobs {
			if let Err(e) = job(self) {
				warn!("Deferred job failed: {}", e);
			}
		}
		count
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::declaration::Declaration;
	use strata_config_adapter_fs::ConfigAdapterFs;
	use tempfile::TempDir;

	fn engine(layers: &[&str]) -> (SettingsEngine, TempDir) {
		let temp = TempDir::new().unwrap();
		let adapter = ConfigAdapterFs::new(temp.path().into()).unwrap();
		let mut engine =
			SettingsEngine::builder().adapter(Arc::new(adapter)).active_layers(layers.iter().copied()).build().unwrap();
		engine
			.register_component(
				ComponentDecl::builder("Sound")
					.setting(Declaration::leaf("Volume", ValueType::Int).default("5").constraint("range:0,10"))
					.setting(Declaration::branch("Mix").child(Declaration::leaf("Bass", ValueType::Double).default("0.5"))),
			)
			.unwrap();
		engine.add_instance("Sound", "Music").unwrap();
		(engine, temp)
	}

	fn path(p: &str) -> SettingPath {
		SettingPath::parse(p).unwrap()
	}

	#[test]
	fn test_builder_requires_adapter() {
		assert!(matches!(SettingsEngine::builder().build(), Err(Error::Internal(_))));
	}

	#[test]
	fn test_builder_rejects_reserved_layer() {
		let temp = TempDir::new().unwrap();
		let adapter = ConfigAdapterFs::new(temp.path().into()).unwrap();
		let result = SettingsEngine::builder().adapter(Arc::new(adapter)).active_layers(["tmp"]).build();
		assert!(matches!(result, Err(Error::UnknownLayer(_))));
	}

	#[test]
	fn test_default_then_live_value() {
		let (mut engine, _temp) = engine(&[]);
		assert_eq!(engine.get_int("Music", "Volume").unwrap(), 5);
		engine.set(&Layer::Temporary, "music", &path("volume"), SettingValue::Int(7)).unwrap();
		assert_eq!(engine.get_int("Music", "Volume").unwrap(), 7);
		assert_eq!(engine.resolve("Music", &path("Volume")).unwrap(), SettingValue::Int(7));
	}

	#[test]
	fn test_rejected_write_keeps_previous_value() {
		let (mut engine, _temp) = engine(&[]);
		engine.set(&Layer::Temporary, "Music", &path("Volume"), SettingValue::Int(3)).unwrap();
		let err = engine.set(&Layer::Temporary, "Music", &path("Volume"), SettingValue::Int(11)).unwrap_err();
		assert!(matches!(err, Error::ConstraintViolation(_)));
		assert_eq!(engine.get_int("Music", "Volume").unwrap(), 3);
	}

	#[test]
	fn test_branch_read_and_leaf_errors() {
		let (mut engine, _temp) = engine(&[]);
		assert_eq!(engine.read(&Layer::Temporary, "Music", &path("Mix")).unwrap(), SettingRead::Children(vec![]));
		engine.set_text(&Layer::Temporary, "Music", &path("Mix.Bass"), "0.75").unwrap();
		assert_eq!(
			engine.read(&Layer::Temporary, "Music", &path("Mix")).unwrap(),
			SettingRead::Children(vec!["Bass".into()])
		);
		assert!(matches!(engine.get(&Layer::Temporary, "Music", &path("Mix")), Err(Error::InvalidPath(_))));
		assert!(matches!(
			engine.set(&Layer::Temporary, "Music", &path("Mix"), SettingValue::Int(1)),
			Err(Error::InvalidPath(_))
		));
	}

	#[test]
	fn test_typed_getter_mismatch() {
		let (engine, _temp) = engine(&[]);
		assert!(matches!(engine.get_bool("Music", "Volume"), Err(Error::Parse(_))));
		assert_eq!(engine.get_float("Music", "Volume").unwrap(), 5.0);
		assert!(matches!(engine.get_int("Video", "Volume"), Err(Error::UnknownComponent(_))));
	}

	#[test]
	fn test_get_or_substitutes_unset() {
		let temp = TempDir::new().unwrap();
		let adapter = ConfigAdapterFs::new(temp.path().into()).unwrap();
		let mut engine = SettingsEngine::builder().adapter(Arc::new(adapter)).build().unwrap();
		engine
			.register_component(ComponentDecl::builder("Net").setting(Declaration::leaf("Host", ValueType::String)))
			.unwrap();
		engine.add_instance("Net", "Net").unwrap();

		let host = path("Host");
		assert!(matches!(engine.get(&Layer::Temporary, "Net", &host), Err(Error::UnsetSetting(_))));
		let fallback = engine.get_or(&Layer::Temporary, "Net", &host, "localhost".into()).unwrap();
		assert_eq!(fallback, SettingValue::from("localhost"));
	}

	#[test]
	fn test_deferred_jobs_run_on_drain() {
		let (mut engine, _temp) = engine(&[]);
		let sender = engine.deferred_sender();
		let handle = std::thread::spawn(move || {
			sender
				.submit(|engine: &mut SettingsEngine| {
					engine.set(&Layer::Temporary, "Music", &SettingPath::root("Volume"), SettingValue::Int(9))
				})
				.unwrap();
		});
		handle.join().unwrap();

		assert_eq!(engine.get_int("Music", "Volume").unwrap(), 5);
		assert_eq!(engine.run_deferred(), 1);
		assert_eq!(engine.get_int("Music", "Volume").unwrap(), 9);
		assert_eq!(engine.run_deferred(), 0);
	}
}

// vim: ts=4
