//! Config adapter error handling tests
//!
//! Tests error conditions and edge cases

use std::fs;

use strata::config_adapter::{ConfigAdapter, RawUnit};
use strata::error::Error;
use strata::types::Layer;
use strata_config_adapter_fs::ConfigAdapterFs;
use tempfile::TempDir;

fn create_test_adapter() -> (ConfigAdapterFs, TempDir) {
	let temp_dir = TempDir::new().expect("Failed to create temp directory");
	let adapter = ConfigAdapterFs::new(temp_dir.path().into()).expect("Failed to create adapter");
	(adapter, temp_dir)
}

#[test]
fn test_corrupt_unit_is_an_error() {
	let (adapter, temp) = create_test_adapter();
	fs::create_dir_all(temp.path().join("tmp")).expect("mkdir");
	fs::write(temp.path().join("tmp/core.json"), b"{ not json").expect("write");

	let result = adapter.read_unit(&Layer::Temporary, "core");
	assert!(matches!(result, Err(Error::Persistence(_))));
}

#[test]
fn test_non_object_unit_is_an_error() {
	let (adapter, temp) = create_test_adapter();
	fs::create_dir_all(temp.path().join("tmp")).expect("mkdir");
	fs::write(temp.path().join("tmp/core.json"), b"[1, 2, 3]").expect("write");

	let result = adapter.read_unit(&Layer::Temporary, "core");
	assert!(matches!(result, Err(Error::Persistence(_))));
}

#[test]
fn test_invalid_plugin_id() {
	let (adapter, _temp) = create_test_adapter();
	let mut unit = RawUnit::new();
	unit.insert("A".into(), serde_json::json!({}));

	assert!(adapter.write_unit(&Layer::Temporary, "../escape", &unit).is_err());
	assert!(adapter.write_unit(&Layer::Temporary, "a/b", &unit).is_err());
	assert!(adapter.read_unit(&Layer::Temporary, "").is_err());
}

#[test]
fn test_delete_unknown_layer() {
	let (adapter, _temp) = create_test_adapter();
	assert!(matches!(adapter.delete_layer("ghost"), Err(Error::UnknownLayer(_))));
}

#[test]
fn test_delete_temporary_layer_is_rejected() {
	let (adapter, _temp) = create_test_adapter();
	assert!(adapter.delete_layer("tmp").is_err());
}

#[test]
fn test_stray_files_are_not_plugins() {
	let (adapter, temp) = create_test_adapter();
	fs::create_dir_all(temp.path().join("pvp")).expect("mkdir");
	fs::write(temp.path().join("pvp/notes.txt"), b"hello").expect("write");
	fs::write(temp.path().join("pvp/core.json.tmp"), b"{}").expect("write");
	fs::write(temp.path().join("stray.json"), b"{}").expect("write");

	let layer = Layer::named("pvp").expect("valid layer");
	assert!(adapter.list_plugins(&layer).expect("list").is_empty());
	assert_eq!(adapter.list_layers().expect("list"), vec!["pvp".into()]);
}

#[test]
fn test_named_variant_cannot_reach_temporary_or_escape() {
	let (adapter, temp) = create_test_adapter();
	let base = temp.path().join("base");
	let adapter_in_base = ConfigAdapterFs::new(base.clone().into_boxed_path()).expect("adapter");
	let mut unit = RawUnit::new();
	unit.insert("A".into(), serde_json::json!({ "Size": { "$int": 7 } }));

	let result = adapter_in_base.write_unit(&Layer::Named("tmp".into()), "core", &unit);
	assert!(matches!(result, Err(Error::UnknownLayer(_))));
	assert!(!base.join("tmp/core.json").exists());

	let result = adapter_in_base.write_unit(&Layer::Named("../escaped".into()), "core", &unit);
	assert!(matches!(result, Err(Error::UnknownLayer(_))));
	assert!(!temp.path().join("escaped").exists());

	assert!(adapter.read_unit(&Layer::Named("..".into()), "core").is_err());
	assert!(adapter.list_plugins(&Layer::Named("TMP".into())).is_err());
}
