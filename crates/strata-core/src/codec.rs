//! Persisted unit encoding
//!
//! Instance sections are nested JSON objects. Branches are plain objects,
//! leaves are single-entry objects `{"$<type>": value}` carrying the type tag.

use serde_json::{Map, Value};
use strata_types::config_adapter::{ConfigAdapter, RawUnit};

use crate::cache::UnitCache;
use crate::declaration::{ComponentDecl, DeclKind, Declaration, LeafDecl};
use crate::prelude::*;
use crate::validator::Validator;

/// Prefix marking a type tag key
pub const TAG_PREFIX: char = '$';

/// How decoding treats entries it cannot use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strictness {
	/// Drop with a diagnostic. Used for persisted units.
	Lenient,
	/// Fail. Used for caller supplied input such as imports.
	Strict,
}

/// Encodes an instance store, tagging each leaf with its declared type
pub fn encode_store(decl: &ComponentDecl, store: &SettingStore) -> Value {
	let mut root = Map::new();
	for (path, value) in store.leaves() {
		let Ok((_, leaf)) = decl.resolve_leaf(&path) else {
			warn!("Not encoding undeclared setting {} of {}", path, decl.type_name());
			continue;
		};
		insert_at(&mut root, path.segments(), encode_leaf(leaf, value));
	}
	Value::Object(root)
}

fn insert_at(map: &mut Map<String, Value>, segments: &[Box<str>], leaf: Value) {
	let Some((first, rest)) = segments.split_first() else {
		return;
	};
	if rest.is_empty() {
		map.insert(first.to_string(), leaf);
		return;
	}
	let entry = map.entry(first.to_string()).or_insert_with(|| Value::Object(Map::new()));
	if !entry.is_object() {
		*entry = Value::Object(Map::new());
	}
	if let Value::Object(child) = entry {
		insert_at(child, rest, leaf);
	}
}

fn encode_leaf(leaf: &LeafDecl, value: &SettingValue) -> Value {
	let mut tagged = Map::new();
	tagged.insert(format!("{}{}", TAG_PREFIX, leaf.value_type().tag()), value.to_json());
	Value::Object(tagged)
}

/// Decodes an instance section against its declaration tree.
///
/// An unknown type tag fails the whole section regardless of strictness.
pub fn decode_store(
	decl: &ComponentDecl,
	validator: &Validator,
	raw: &Value,
	strictness: Strictness,
) -> StResult<SettingStore> {
	let mut store = SettingStore::new();
	decode_level(decl, decl.settings(), validator, raw, None, strictness, &mut store)?;
	Ok(store)
}

fn decode_level(
	decl: &ComponentDecl,
	level: &[Declaration],
	validator: &Validator,
	raw: &Value,
	prefix: Option<&SettingPath>,
	strictness: Strictness,
	store: &mut SettingStore,
) -> StResult<()> {
	let Value::Object(map) = raw else {
		let at = prefix.map_or_else(|| decl.type_name().to_string(), ToString::to_string);
		return Err(match strictness {
			Strictness::Strict => Error::Parse(format!("expected an object at {}", at)),
			Strictness::Lenient => Error::Persistence(format!("expected an object at {}", at)),
		});
	};

	for (name, value) in map {
		let Some(child) = level.iter().find(|d| d.name().eq_ignore_ascii_case(name)) else {
			let at = prefix.map_or_else(|| name.clone(), |p| p.child(name).to_string());
			match strictness {
				Strictness::Strict => {
					return Err(Error::InvalidPath(format!(
						"'{}' is not a setting of {}",
						at,
						decl.type_name()
					)));
				}
				Strictness::Lenient => {
					warn!("Dropping unknown setting '{}' of {}", at, decl.type_name());
					continue;
				}
			}
		};
		let path = match prefix {
			Some(prefix) => prefix.child(child.name()),
			None => SettingPath::root(child.name()),
		};

		match child.kind() {
			DeclKind::Branch(children) => {
				if value.is_object() && !is_tagged(value) {
					decode_level(decl, children, validator, value, Some(&path), strictness, store)?;
				} else if strictness == Strictness::Strict {
					return Err(Error::InvalidPath(format!("'{}' of {} is a branch", path, decl.type_name())));
				} else {
					warn!("Dropping value stored at branch '{}' of {}", path, decl.type_name());
				}
			}
			DeclKind::Leaf(leaf) => match decode_leaf(leaf, validator, value, &path) {
				Ok(Some(decoded)) => {
					store.set(&path, decoded)?;
				}
				Ok(None) => {}
				Err(e @ Error::Persistence(_)) => return Err(e),
				Err(e) if strictness == Strictness::Strict => {
					return Err(with_context(e, &path, decl.type_name()));
				}
				Err(e) => warn!("Dropping {}.{}: {}", decl.type_name(), path, e),
			},
		}
	}
	Ok(())
}

fn is_tagged(value: &Value) -> bool {
	matches!(value, Value::Object(map) if map.len() == 1 && map.keys().all(|k| k.starts_with(TAG_PREFIX)))
}

/// Decodes a single leaf. Unknown tags are a `Persistence` error.
fn decode_leaf(
	leaf: &LeafDecl,
	validator: &Validator,
	value: &Value,
	path: &SettingPath,
) -> StResult<Option<SettingValue>> {
	let Value::Object(map) = value else {
		return validator.coerce_for(value, leaf).map(Some);
	};
	if !is_tagged(value) {
		return validator.coerce_for(value, leaf).map(Some);
	}
	let Some((tag, inner)) = map.iter().next() else {
		return Ok(None);
	};
	let tag = &tag[TAG_PREFIX.len_utf8()..];
	let stored_type: ValueType = tag
		.parse()
		.map_err(|_| Error::Persistence(format!("unknown type tag '{}{}' at {}", TAG_PREFIX, tag, path)))?;
	if &stored_type != leaf.value_type() {
		debug!("Coercing {} from {} to {}", path, stored_type, leaf.value_type());
	}
	validator.coerce_for(inner, leaf).map(Some)
}

fn with_context(err: Error, path: &SettingPath, type_name: &str) -> Error {
	match err {
		Error::Parse(msg) => Error::Parse(format!("{}.{}: {}", type_name, path, msg)),
		Error::ConstraintViolation(msg) => Error::ConstraintViolation(format!("{}.{}: {}", type_name, path, msg)),
		other => other,
	}
}

/// Finds an instance section, matching its name case-insensitively
pub fn find_section<'a>(unit: &'a RawUnit, instance: &str) -> Option<&'a Value> {
	unit.iter().find(|(k, _)| k.eq_ignore_ascii_case(instance)).map(|(_, v)| v)
}

/// Loads one instance's store of a layer.
///
/// Missing units are empty. Unreadable units or sections are logged and
/// treated as empty.
pub fn load_instance_store(
	adapter: &dyn ConfigAdapter,
	units: &UnitCache,
	validator: &Validator,
	layer: &Layer,
	decl: &ComponentDecl,
	instance: &str,
) -> SettingStore {
	let unit = match units.read_through(adapter, layer, decl.plugin()) {
		Ok(Some(unit)) => unit,
		Ok(None) => return SettingStore::new(),
		Err(e) => {
			error!("Failed to read {}/{}: {}", layer, decl.plugin(), e);
			return SettingStore::new();
		}
	};
	let Some(section) = find_section(&unit, instance) else {
		return SettingStore::new();
	};
	match decode_store(decl, validator, section, Strictness::Lenient) {
		Ok(store) => store,
		Err(e) => {
			warn!("Failed to load {} from {}/{}: {}", instance, layer, decl.plugin(), e);
			SettingStore::new()
		}
	}
}

/// One instance section to write into a unit
pub struct Section<'a> {
	pub instance: &'a str,
	pub decl: &'a ComponentDecl,
	pub store: &'a SettingStore,
}

/// Writes instance sections into a plugin's unit.
///
/// The unit is read first so sections of instances not given here survive.
/// Empty stores remove their section. An existing unit that cannot be read is
/// left alone and the write fails.
pub fn persist_plugin(
	adapter: &dyn ConfigAdapter,
	units: &UnitCache,
	layer: &Layer,
	plugin: &str,
	sections: &[Section<'_>],
) -> StResult<()> {
	let mut unit = units
		.read_through(adapter, layer, plugin)
		.map_err(|e| Error::Persistence(format!("refusing to overwrite unreadable unit {}/{}: {}", layer, plugin, e)))?
		.unwrap_or_default();
	for section in sections {
		unit.retain(|name, _| !name.eq_ignore_ascii_case(section.instance));
		if !section.store.is_empty() {
			unit.insert(section.instance.to_string(), encode_store(section.decl, section.store));
		}
	}
	units.invalidate(layer, plugin);
	adapter.write_unit(layer, plugin, &unit)?;
	debug!("Persisted {}/{} ({} sections)", layer, plugin, unit.len());
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::declaration::Declaration;
	use serde_json::json;

	fn decl(v: &Validator) -> ComponentDecl {
		ComponentDecl::builder("Foo")
			.setting(Declaration::leaf("Size", ValueType::Int).default("3").constraint("range:1,10"))
			.setting(Declaration::leaf("Tags", ValueType::Array(Box::new(ValueType::String))).default(""))
			.setting(Declaration::branch("Net").child(Declaration::leaf("Port", ValueType::Short).default("80")))
			.build(v)
			.unwrap()
	}

	fn path(p: &str) -> SettingPath {
		SettingPath::parse(p).unwrap()
	}

	#[test]
	fn test_encode_tags_leaves() {
		let v = Validator::new();
		let decl = decl(&v);
		let mut store = SettingStore::new();
		store.set(&path("Size"), SettingValue::Int(5)).unwrap();
		store.set(&path("Net.Port"), SettingValue::Int(8080)).unwrap();
		store.set(&path("Tags"), SettingValue::Array(vec!["a".into()])).unwrap();

		assert_eq!(
			encode_store(&decl, &store),
			json!({"Size": {"$int": 5}, "Net": {"Port": {"$short": 8080}}, "Tags": {"$array<string>": ["a"]}})
		);
		let decoded = decode_store(&decl, &v, &encode_store(&decl, &store), Strictness::Lenient).unwrap();
		assert_eq!(decoded, store);
	}

	#[test]
	fn test_unknown_keys_are_dropped() {
		let v = Validator::new();
		let raw = json!({"Size": {"$int": 4}, "Ghost": 1, "Net": {"Ghost": {"$int": 1}}});
		let store = decode_store(&decl(&v), &v, &raw, Strictness::Lenient).unwrap();
		assert_eq!(store.get(&path("Size")), Some(&SettingValue::Int(4)));
		assert_eq!(store.leaves().len(), 1);
	}

	#[test]
	fn test_unknown_tag_fails_section() {
		let v = Validator::new();
		let raw = json!({"Size": {"$blob": 4}});
		assert!(matches!(decode_store(&decl(&v), &v, &raw, Strictness::Lenient), Err(Error::Persistence(_))));
	}

	#[test]
	fn test_lenient_drops_invalid_values() {
		let v = Validator::new();
		let raw = json!({"Size": {"$int": 99}, "Net": {"Port": "443"}});
		let store = decode_store(&decl(&v), &v, &raw, Strictness::Lenient).unwrap();
		assert_eq!(store.get(&path("Size")), None);
		assert_eq!(store.get(&path("Net.Port")), Some(&SettingValue::Int(443)));
	}

	#[test]
	fn test_strict_rejects_unknown_and_invalid() {
		let v = Validator::new();
		let decl = decl(&v);
		assert!(matches!(decode_store(&decl, &v, &json!({"Ghost": 1}), Strictness::Strict), Err(Error::InvalidPath(_))));
		assert!(matches!(
			decode_store(&decl, &v, &json!({"Size": 99}), Strictness::Strict),
			Err(Error::ConstraintViolation(_))
		));
		assert!(matches!(decode_store(&decl, &v, &json!({"Net": 1}), Strictness::Strict), Err(Error::InvalidPath(_))));
	}

	#[test]
	fn test_unreadable_unit_is_not_overwritten() {
		let temp = tempfile::TempDir::new().unwrap();
		let adapter = strata_config_adapter_fs::ConfigAdapterFs::new(temp.path().into()).unwrap();
		std::fs::create_dir_all(temp.path().join("tmp")).unwrap();
		std::fs::write(temp.path().join("tmp/Foo.json"), b"{ not json").unwrap();

		let v = Validator::new();
		let decl = decl(&v);
		let mut store = SettingStore::new();
		store.set(&path("Size"), SettingValue::Int(5)).unwrap();
		let units = UnitCache::new(4);
		let section = Section { instance: "Foo", decl: &decl, store: &store };
		let result = persist_plugin(&adapter, &units, &Layer::Temporary, "Foo", &[section]);

		assert!(matches!(result, Err(Error::Persistence(_))));
		assert_eq!(std::fs::read(temp.path().join("tmp/Foo.json")).unwrap(), b"{ not json");
	}

	#[test]
	fn test_mismatched_tag_is_coerced() {
		let v = Validator::new();
		let raw = json!({"Size": {"$long": 7}});
		let store = decode_store(&decl(&v), &v, &raw, Strictness::Lenient).unwrap();
		assert_eq!(store.get(&path("Size")), Some(&SettingValue::Int(7)));
	}
}

// vim: ts=4
