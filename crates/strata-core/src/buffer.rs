//! Detached, explicitly saved copies of a named layer

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use strata_types::config_adapter::ConfigAdapter;

use crate::cache::UnitCache;
use crate::codec::{self, Section};
use crate::engine::{SettingRead, SettingsEngine, in_context};
use crate::prelude::*;
use crate::registry::{ComponentRegistry, InstanceEntry};
use crate::validator::Validator;

/// Editable copy of one named layer's stores for every instance.
///
/// Edits never reach the engine or listeners. `save` persists the whole
/// buffer, grouped by plugin.
pub struct ConfigBuffer {
	layer: Layer,
	registry: ComponentRegistry,
	stores: HashMap<Box<str>, SettingStore>,
	validator: Arc<Validator>,
	adapter: Arc<dyn ConfigAdapter>,
	units: Arc<UnitCache>,
	modified: bool,
}

impl fmt::Debug for ConfigBuffer {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ConfigBuffer")
			.field("layer", &self.layer)
			.field("instances", &self.stores.len())
			.field("modified", &self.modified)
			.finish_non_exhaustive()
	}
}

impl ConfigBuffer {
	pub fn layer_name(&self) -> &str {
		self.layer.as_str()
	}

	pub fn is_modified(&self) -> bool {
		self.modified
	}

	fn entry(&self, instance: &str) -> StResult<&InstanceEntry> {
		self.registry.instance(instance)
	}

	/// The buffer's value of a leaf, or its default
	pub fn get(&self, instance: &str, path: &SettingPath) -> StResult<SettingValue> {
		let entry = self.entry(instance)?;
		let (path, leaf) = entry.decl.resolve_leaf(path)?;
		if let Some(value) = self.stores.get(&entry.key()).and_then(|store| store.get(&path)) {
			return Ok(value.clone());
		}
		leaf.default_value(&self.validator).map_err(|e| match e {
			Error::UnsetSetting(msg) => Error::UnsetSetting(format!("{}.{}: {}", entry.name, path, msg)),
			other => other,
		})
	}

	pub fn read(&self, instance: &str, path: &SettingPath) -> StResult<SettingRead> {
		let entry = self.entry(instance)?;
		let (path, node) = entry.decl.resolve(path)?;
		if node.is_leaf() {
			return self.get(instance, &path).map(SettingRead::Value);
		}
		let children = self
			.stores
			.get(&entry.key())
			.and_then(|store| store.branch(&path))
			.map(|branch| branch.non_empty_children().into_iter().map(Into::into).collect())
			.unwrap_or_default();
		Ok(SettingRead::Children(children))
	}

	pub fn set(&mut self, instance: &str, path: &SettingPath, value: SettingValue) -> StResult<()> {
		let entry = self.entry(instance)?;
		let (path, leaf) = entry.decl.resolve_leaf(path)?;
		let value = self.validator.validate(value, leaf).map_err(|e| in_context(e, &entry.name, &path))?;
		let key = entry.key();
		self.stores.entry(key).or_default().set(&path, value)?;
		self.modified = true;
		Ok(())
	}

	pub fn set_text(&mut self, instance: &str, path: &SettingPath, text: &str) -> StResult<()> {
		let entry = self.entry(instance)?;
		let (path, leaf) = entry.decl.resolve_leaf(path)?;
		let value = self.validator.parse_for(text, leaf).map_err(|e| in_context(e, &entry.name, &path))?;
		let key = entry.key();
		self.stores.entry(key).or_default().set(&path, value)?;
		self.modified = true;
		Ok(())
	}

	/// Removes a value. Returns the removed value.
	pub fn remove(&mut self, instance: &str, path: &SettingPath) -> StResult<Option<SettingValue>> {
		let entry = self.entry(instance)?;
		let (path, _) = entry.decl.resolve_leaf(path)?;
		let key = entry.key();
		let removed = self.stores.get_mut(&key).and_then(|store| store.remove(&path));
		if removed.is_some() {
			self.modified = true;
		}
		Ok(removed)
	}

	/// Writes every instance's store into the layer, one unit per plugin
	pub fn save(&mut self) -> StResult<()> {
		let empty = SettingStore::new();
		for plugin in self.registry.plugins() {
			let sections: Vec<Section<'_>> = self
				.registry
				.instances_in_plugin(&plugin)
				.map(|entry| Section {
					instance: &entry.name,
					decl: &entry.decl,
					store: self.stores.get(&entry.key()).unwrap_or(&empty),
				})
				.collect();
			codec::persist_plugin(&*self.adapter, &self.units, &self.layer, &plugin, &sections)?;
		}
		self.modified = false;
		info!("Saved config buffer for layer {}", self.layer);
		Ok(())
	}
}

impl SettingsEngine {
	/// Deep copy of a named layer's stores for editing.
	///
	/// The layer does not need to exist yet.
	pub fn load_config_buffer(&self, layer: &str) -> StResult<ConfigBuffer> {
		let layer = Layer::named(layer)?;
		let stores = self
			.registry
			.instances()
			.map(|entry| {
				let store = self
					.named
					.get(layer.as_str())
					.and_then(|stores| stores.get(&entry.key()))
					.cloned()
					.unwrap_or_else(|| self.load_layer_store(layer.as_str(), entry));
				(entry.key(), store)
			})
			.collect();
		Ok(ConfigBuffer {
			layer,
			registry: self.registry.clone(),
			stores,
			validator: self.validator.clone(),
			adapter: self.adapter.clone(),
			units: self.units.clone(),
			modified: false,
		})
	}

	/// Saves a buffer and refreshes the engine's copy of its layer
	pub fn commit_config_buffer(&mut self, buffer: &mut ConfigBuffer) -> StResult<()> {
		buffer.save()?;
		self.reload_layer(buffer.layer_name())
	}
}

// vim: ts=4
