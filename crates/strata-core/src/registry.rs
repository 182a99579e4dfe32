//! Component types and their instances

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::declaration::{ComponentDecl, validate_name};
use crate::prelude::*;

/// Lookup key of a type or instance name. Only ASCII letters fold, like every
/// other name comparison in the engine and in persisted units.
pub fn name_key(name: &str) -> Box<str> {
	name.to_ascii_lowercase().into()
}

#[derive(Debug, Clone)]
pub struct InstanceEntry {
	pub name: Box<str>,
	pub decl: Arc<ComponentDecl>,
}

impl InstanceEntry {
	pub fn key(&self) -> Box<str> {
		name_key(&self.name)
	}
}

/// Registered component types and instances, both case-insensitive
#[derive(Debug, Clone, Default)]
pub struct ComponentRegistry {
	types: BTreeMap<Box<str>, Arc<ComponentDecl>>,
	instances: BTreeMap<Box<str>, InstanceEntry>,
}

impl ComponentRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn register_type(&mut self, decl: ComponentDecl) -> StResult<Arc<ComponentDecl>> {
		let key = name_key(decl.type_name());
		if self.types.contains_key(&key) {
			return Err(Error::Declaration(format!("component type '{}' is already registered", decl.type_name())));
		}
		let decl = Arc::new(decl);
		self.types.insert(key, decl.clone());
		Ok(decl)
	}

	pub fn component_type(&self, type_name: &str) -> StResult<&Arc<ComponentDecl>> {
		self.types.get(&name_key(type_name)).ok_or_else(|| Error::UnknownComponent(type_name.to_string()))
	}

	pub fn types(&self) -> impl Iterator<Item = &Arc<ComponentDecl>> {
		self.types.values()
	}

	pub fn add_instance(&mut self, type_name: &str, name: &str) -> StResult<InstanceEntry> {
		validate_name(name).map_err(|_| Error::Declaration(format!("invalid instance name '{}'", name)))?;
		let decl = self.component_type(type_name)?.clone();
		let key = name_key(name);
		if let Some(existing) = self.instances.get(&key) {
			return Err(Error::Declaration(format!(
				"instance '{}' already exists as {}",
				existing.name,
				existing.decl.type_name()
			)));
		}
		let entry = InstanceEntry { name: name.into(), decl };
		self.instances.insert(key, entry.clone());
		Ok(entry)
	}

	pub fn remove_instance(&mut self, name: &str) -> StResult<InstanceEntry> {
		self.instances.remove(&name_key(name)).ok_or_else(|| Error::UnknownComponent(name.to_string()))
	}

	pub fn instance(&self, name: &str) -> StResult<&InstanceEntry> {
		self.instances.get(&name_key(name)).ok_or_else(|| Error::UnknownComponent(name.to_string()))
	}

	/// Instances sorted by name
	pub fn instances(&self) -> impl Iterator<Item = &InstanceEntry> {
		self.instances.values()
	}

	pub fn instances_of<'a>(&'a self, type_name: &'a str) -> impl Iterator<Item = &'a InstanceEntry> + 'a {
		self.instances.values().filter(move |e| e.decl.type_name().eq_ignore_ascii_case(type_name))
	}

	pub fn instances_in_plugin<'a>(&'a self, plugin: &'a str) -> impl Iterator<Item = &'a InstanceEntry> + 'a {
		self.instances.values().filter(move |e| e.decl.plugin() == plugin)
	}

	/// Plugins of all registered instances
	pub fn plugins(&self) -> BTreeSet<Box<str>> {
		self.instances.values().map(|e| e.decl.plugin().into()).collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::declaration::Declaration;
	use crate::validator::Validator;

	fn registry() -> ComponentRegistry {
		let v = Validator::new();
		let mut registry = ComponentRegistry::new();
		registry
			.register_type(
				ComponentDecl::builder("Sound")
					.plugin("audio")
					.setting(Declaration::leaf("Volume", ValueType::Int).default("5"))
					.build(&v)
					.unwrap(),
			)
			.unwrap();
		registry
	}

	#[test]
	fn test_instances_are_case_insensitive() {
		let mut registry = registry();
		registry.add_instance("sound", "Music").unwrap();
		assert_eq!(registry.instance("MUSIC").unwrap().name.as_ref(), "Music");
		assert!(matches!(registry.add_instance("Sound", "music"), Err(Error::Declaration(_))));
	}

	#[test]
	fn test_non_ascii_names_do_not_fold() {
		let mut registry = registry();
		registry.add_instance("Sound", "Ümlaut").unwrap();
		assert_eq!(name_key("ÜMLAUT").as_ref(), "Ümlaut");
		assert!(registry.instance("ÜMLAUT").is_ok());
		assert!(matches!(registry.instance("ümlaut"), Err(Error::UnknownComponent(_))));
		registry.add_instance("Sound", "ümlaut").unwrap();
		assert_eq!(registry.instances_of("Sound").count(), 2);
	}

	#[test]
	fn test_unknown_type_and_instance() {
		let mut registry = registry();
		assert!(matches!(registry.add_instance("Video", "Main"), Err(Error::UnknownComponent(_))));
		assert!(matches!(registry.instance("Main"), Err(Error::UnknownComponent(_))));
		assert!(matches!(registry.add_instance("Sound", "a.b"), Err(Error::Declaration(_))));
	}

	#[test]
	fn test_duplicate_type_rejected() {
		let mut registry = registry();
		let again = ComponentDecl::builder("SOUND").build(&Validator::new()).unwrap();
		assert!(registry.register_type(again).is_err());
	}

	#[test]
	fn test_plugin_grouping() {
		let mut registry = registry();
		registry.add_instance("Sound", "Music").unwrap();
		registry.add_instance("Sound", "Effects").unwrap();
		assert_eq!(registry.instances_in_plugin("audio").count(), 2);
		assert_eq!(registry.plugins().into_iter().collect::<Vec<_>>(), vec!["audio".into()]);
		registry.remove_instance("music").unwrap();
		assert_eq!(registry.instances_of("sound").count(), 1);
	}
}

// vim: ts=4
