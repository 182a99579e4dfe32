//! YAML schema files describing component types
//!
//! ```yaml
//! components:
//!   - name: Sound
//!     plugin: audio
//!     instances: [Music, Effects]
//!     settings:
//!       - name: Volume
//!         type: int
//!         default: 5
//!         constraint: "range:0,10"
//!       - name: Mix
//!         settings:
//!           - { name: Bass, type: double, default: 0.5 }
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::declaration::{ComponentDecl, ComponentDeclBuilder, Declaration, DeclarationBuilder};
use crate::engine::SettingsEngine;
use crate::prelude::*;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaFile {
	#[serde(default)]
	pub components: Vec<ComponentSchema>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComponentSchema {
	pub name: String,
	pub plugin: Option<String>,
	pub description: Option<String>,
	#[serde(default)]
	pub settings: Vec<SettingSchema>,
	/// Instances to create. A single instance named after the type when absent.
	pub instances: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SettingSchema {
	pub name: String,
	#[serde(rename = "type")]
	pub value_type: Option<String>,
	pub default: Option<serde_yaml::Value>,
	pub constraint: Option<String>,
	pub description: Option<String>,
	/// Present on branches only
	pub settings: Option<Vec<SettingSchema>>,
}

pub fn parse_schema(text: &str) -> StResult<SchemaFile> {
	Ok(serde_yaml::from_str(text)?)
}

impl SettingSchema {
	fn builder(&self) -> StResult<DeclarationBuilder> {
		let mut builder = match (&self.settings, &self.value_type) {
			(Some(_), Some(_)) => {
				return Err(Error::Declaration(format!("'{}' has both a type and child settings", self.name)));
			}
			(Some(children), None) => {
				let mut branch = Declaration::branch(self.name.as_str());
				for child in children {
					branch = branch.child(child.builder()?);
				}
				branch
			}
			(None, Some(value_type)) => {
				let value_type: ValueType = value_type
					.parse()
					.map_err(|e| Error::Declaration(format!("setting '{}': {}", self.name, e)))?;
				let mut leaf = Declaration::leaf(self.name.as_str(), value_type);
				if let Some(default) = self.default.as_ref().filter(|d| !d.is_null()) {
					leaf = leaf.default(default_text(default)?);
				}
				if let Some(constraint) = &self.constraint {
					leaf = leaf.constraint(constraint.as_str());
				}
				leaf
			}
			(None, None) => {
				return Err(Error::Declaration(format!("setting '{}' needs a type or child settings", self.name)));
			}
		};
		if let Some(description) = &self.description {
			builder = builder.description(description.as_str());
		}
		Ok(builder)
	}
}

/// Textual form of a YAML default, as the validator parses it
fn default_text(value: &serde_yaml::Value) -> StResult<String> {
	use serde_yaml::Value;
	match value {
		Value::String(s) => Ok(s.clone()),
		Value::Bool(b) => Ok(b.to_string()),
		Value::Number(n) => Ok(n.to_string()),
		other => Ok(serde_json::to_string(other)?),
	}
}

impl ComponentSchema {
	pub fn builder(&self) -> StResult<ComponentDeclBuilder> {
		let mut builder = ComponentDecl::builder(self.name.as_str());
		if let Some(plugin) = &self.plugin {
			builder = builder.plugin(plugin.as_str());
		}
		if let Some(description) = &self.description {
			builder = builder.description(description.as_str());
		}
		for setting in &self.settings {
			builder = builder.setting(setting.builder()?);
		}
		Ok(builder)
	}

	fn instance_names(&self) -> Vec<&str> {
		match &self.instances {
			Some(instances) => instances.iter().map(String::as_str).collect(),
			None => vec![self.name.as_str()],
		}
	}
}

/// Registers every component type of a schema and creates its instances.
///
/// A type with a malformed declaration or an unusable default is logged and
/// skipped, the others still load. Returns the names of the created instances.
pub fn apply_schema(engine: &mut SettingsEngine, text: &str) -> StResult<Vec<Box<str>>> {
	let schema = parse_schema(text)?;
	let mut created = Vec::new();
	for component in &schema.components {
		let decl = match component.builder().and_then(|b| b.build(engine.validator())) {
			Ok(decl) => decl,
			Err(e) => {
				error!("Skipping component type {}: {}", component.name, e);
				continue;
			}
		};
		if let Err(e) = decl.verify_defaults(engine.validator()) {
			error!("Skipping component type {}: {}", component.name, e);
			continue;
		}
		if let Err(e) = engine.register_decl(decl) {
			error!("Skipping component type {}: {}", component.name, e);
			continue;
		}
		for name in component.instance_names() {
			match engine.add_instance(&component.name, name) {
				Ok(()) => created.push(name.into()),
				Err(e) => error!("Cannot create instance {} of {}: {}", name, component.name, e),
			}
		}
	}
	Ok(created)
}

pub fn load_schema_file(engine: &mut SettingsEngine, path: &Path) -> StResult<Vec<Box<str>>> {
	let text = std::fs::read_to_string(path)?;
	info!("Loading schema {}", path.display());
	apply_schema(engine, &text)
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::Arc;

	use strata_config_adapter_fs::ConfigAdapterFs;
	use tempfile::TempDir;

	const SCHEMA: &str = r#"
components:
  - name: Sound
    plugin: audio
    description: Audio output
    instances: [Music, Effects]
    settings:
      - name: Volume
        type: int
        default: 5
        constraint: "range:0,10"
      - name: Mix
        settings:
          - { name: Bass, type: double, default: 0.5 }
          - { name: Presets, type: "array<string>", default: [flat, rock] }
  - name: Broken
    settings:
      - name: Level
        type: int
        default: loud
  - name: Clock
    settings:
      - name: On
        type: bool
        default: true
      - name: Format
        type: string
        default: "%H:%M"
"#;

	fn engine() -> (SettingsEngine, TempDir) {
		let temp = TempDir::new().unwrap();
		let adapter = ConfigAdapterFs::new(temp.path().into()).unwrap();
		(SettingsEngine::builder().adapter(Arc::new(adapter)).build().unwrap(), temp)
	}

	#[test]
	fn test_parse_schema_tree() {
		let schema = parse_schema(SCHEMA).unwrap();
		assert_eq!(schema.components.len(), 3);
		let sound = &schema.components[0];
		assert_eq!(sound.plugin.as_deref(), Some("audio"));
		assert_eq!(sound.settings[1].settings.as_ref().map(Vec::len), Some(2));
		assert_eq!(sound.instance_names(), vec!["Music", "Effects"]);
		assert_eq!(schema.components[2].instance_names(), vec!["Clock"]);
	}

	#[test]
	fn test_apply_schema_skips_broken_types() {
		let (mut engine, _temp) = engine();
		let created = apply_schema(&mut engine, SCHEMA).unwrap();
		let expected: Vec<Box<str>> = vec!["Music".into(), "Effects".into(), "Clock".into()];
		assert_eq!(created, expected);
		assert!(matches!(engine.component_type("Broken"), Err(Error::UnknownComponent(_))));

		assert_eq!(engine.get_int("Effects", "Volume").unwrap(), 5);
		assert_eq!(engine.get_float("Music", "Mix.Bass").unwrap(), 0.5);
		let presets = engine.get(&Layer::Temporary, "Music", &SettingPath::parse("Mix.Presets").unwrap()).unwrap();
		assert_eq!(presets, SettingValue::Array(vec!["flat".into(), "rock".into()]));
		assert_eq!(engine.component_type("Sound").unwrap().plugin(), "audio");
		assert!(engine.is_active("Clock"));
		assert!(!engine.is_active("Music"));
	}

	#[test]
	fn test_setting_needs_type_or_children() {
		let text = "components:\n  - name: Foo\n    settings:\n      - name: Bar\n";
		let schema = parse_schema(text).unwrap();
		assert!(matches!(schema.components[0].builder(), Err(Error::Declaration(_))));
	}

	#[test]
	fn test_unknown_fields_rejected() {
		assert!(matches!(parse_schema("components:\n  - name: Foo\n    colour: red\n"), Err(Error::Declaration(_))));
	}

	#[test]
	fn test_load_schema_file() {
		let (mut engine, temp) = engine();
		let path = temp.path().join("schema.yaml");
		std::fs::write(&path, "components:\n  - name: Net\n    settings:\n      - { name: Port, type: short, default: 80 }\n")
			.unwrap();
		assert_eq!(load_schema_file(&mut engine, &path).unwrap(), vec![Box::<str>::from("Net")]);
		assert_eq!(engine.get_int("Net", "Port").unwrap(), 80);
	}
}

// vim: ts=4
