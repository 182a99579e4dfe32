//! Command-style access to settings
//!
//! | Arguments | Effect |
//! |---|---|
//! | none | list instances |
//! | `<instance>` | list an instance's settings with their values |
//! | `<instance> <path>` | read a value or a branch's children |
//! | `<instance> <path> <value>` | set through the temporary layer |
//! | `<layer> <instance> <path> <value>` | set in the given layer |
//!
//! A value of `--unset` removes instead of setting.

use std::fmt::Write;

use crate::declaration::{DeclKind, Declaration};
use crate::engine::{SettingRead, SettingsEngine};
use crate::prelude::*;

/// Value token that removes a setting
pub const UNSET_TOKEN: &str = "--unset";

pub const USAGE: &str = "usage: [[layer] instance [path [value|--unset]]]";

pub fn execute(engine: &mut SettingsEngine, args: &[&str]) -> StResult<String> {
	match args {
		[] => Ok(list_instances(engine)),
		[instance] => list_settings(engine, instance),
		[instance, path] => read(engine, &Layer::Temporary, instance, path),
		[instance, path, value] => write(engine, &Layer::Temporary, instance, path, value),
		[layer, instance, path, value] => write(engine, &Layer::parse(layer)?, instance, path, value),
		_ => Err(Error::Parse(USAGE.into())),
	}
}

fn list_instances(engine: &SettingsEngine) -> String {
	let mut out = String::new();
	for entry in engine.instances() {
		let state = if engine.is_active(&entry.name) { "on" } else { "off" };
		let _ = writeln!(out, "{} ({}) {}", entry.name, entry.decl.type_name(), state);
	}
	out
}

fn list_settings(engine: &SettingsEngine, instance: &str) -> StResult<String> {
	let entry = engine.instance(instance)?.clone();
	let mut out = String::new();
	if let Some(description) = entry.decl.description() {
		let _ = writeln!(out, "# {}", description);
	}
	walk(engine, &entry.name, entry.decl.settings(), None, 0, &mut out);
	Ok(out)
}

fn walk(
	engine: &SettingsEngine,
	instance: &str,
	decls: &[Declaration],
	prefix: Option<&SettingPath>,
	depth: usize,
	out: &mut String,
) {
	let indent = "  ".repeat(depth);
	for decl in decls {
		let path = match prefix {
			Some(prefix) => prefix.child(decl.name()),
			None => SettingPath::root(decl.name()),
		};
		match decl.kind() {
			DeclKind::Leaf(leaf) => {
				let value = match engine.get(&Layer::Temporary, instance, &path) {
					Ok(value) => value.to_string(),
					Err(_) => "<unset>".into(),
				};
				let _ = writeln!(out, "{}{} ({}) = {}", indent, decl.name(), leaf.value_type(), value);
			}
			DeclKind::Branch(children) => {
				let _ = writeln!(out, "{}{}:", indent, decl.name());
				walk(engine, instance, children, Some(&path), depth + 1, out);
			}
		}
	}
}

fn read(engine: &SettingsEngine, layer: &Layer, instance: &str, path: &str) -> StResult<String> {
	match engine.read(layer, instance, &SettingPath::parse(path)?)? {
		SettingRead::Value(value) => Ok(value.to_string()),
		SettingRead::Children(children) => Ok(children.join("\n")),
	}
}

fn write(engine: &mut SettingsEngine, layer: &Layer, instance: &str, path: &str, value: &str) -> StResult<String> {
	let path = SettingPath::parse(path)?;
	if value == UNSET_TOKEN {
		let current = engine.remove(layer, instance, &path)?;
		return Ok(match current {
			Some(value) => format!("{} = {}", path, value),
			None => format!("{} is unset", path),
		});
	}
	engine.set_text(layer, instance, &path, value)?;
	let current = engine.get(layer, instance, &path)?;
	Ok(format!("{} = {}", path, current))
}


// vim: ts=4
