//! Basic config adapter operation tests
//!
//! Tests unit read/write/list operations for the directory backend

use serde_json::json;
use strata::config_adapter::{ConfigAdapter, RawUnit};
use strata::types::Layer;
use strata_config_adapter_fs::ConfigAdapterFs;
use tempfile::TempDir;

fn create_test_adapter() -> (ConfigAdapterFs, TempDir) {
	let temp_dir = TempDir::new().expect("Failed to create temp directory");
	let adapter = ConfigAdapterFs::new(temp_dir.path().into()).expect("Failed to create adapter");
	(adapter, temp_dir)
}

fn unit(value: serde_json::Value) -> RawUnit {
	match value {
		serde_json::Value::Object(map) => map,
		_ => panic!("test unit must be an object"),
	}
}

#[test]
fn test_write_and_read_unit() {
	let (adapter, _temp) = create_test_adapter();
	let layer = Layer::named("pvp").expect("valid layer");
	let data = unit(json!({ "AutoWalk": { "Speed": { "$int": 5 }, "Render": { "Color": { "$color": "#FF0000" } } } }));

	adapter.write_unit(&layer, "core", &data).expect("Failed to write unit");
	let read = adapter.read_unit(&layer, "core").expect("Failed to read unit");
	assert_eq!(read, Some(data));
}

#[test]
fn test_read_missing_unit_is_none() {
	let (adapter, _temp) = create_test_adapter();
	let read = adapter.read_unit(&Layer::Temporary, "core").expect("Missing unit is not an error");
	assert!(read.is_none());
}

#[test]
fn test_empty_write_deletes_unit() {
	let (adapter, temp) = create_test_adapter();
	let data = unit(json!({ "A": { "On": { "$bool": true } } }));
	adapter.write_unit(&Layer::Temporary, "core", &data).expect("Failed to write unit");
	assert!(temp.path().join("tmp/core.json").exists());

	adapter.write_unit(&Layer::Temporary, "core", &RawUnit::new()).expect("Failed to delete unit");
	assert!(!temp.path().join("tmp/core.json").exists());
	assert!(adapter.read_unit(&Layer::Temporary, "core").expect("read").is_none());

	// Deleting twice is fine
	adapter.write_unit(&Layer::Temporary, "core", &RawUnit::new()).expect("Second delete failed");
}

#[test]
fn test_list_plugins_and_layers() {
	let (adapter, _temp) = create_test_adapter();
	let data = unit(json!({ "A": { "On": { "$bool": true } } }));
	let pvp = Layer::named("pvp").expect("valid layer");
	let build = Layer::named("build").expect("valid layer");

	adapter.write_unit(&pvp, "core", &data).expect("write");
	adapter.write_unit(&pvp, "extras", &data).expect("write");
	adapter.write_unit(&build, "core", &data).expect("write");
	adapter.write_unit(&Layer::Temporary, "core", &data).expect("write");

	let plugins = adapter.list_plugins(&pvp).expect("list plugins");
	assert_eq!(plugins, vec!["core".into(), "extras".into()]);

	// The temporary layer is never listed
	let layers = adapter.list_layers().expect("list layers");
	assert_eq!(layers, vec!["build".into(), "pvp".into()]);
}

#[test]
fn test_list_plugins_of_missing_layer_is_empty() {
	let (adapter, _temp) = create_test_adapter();
	let layer = Layer::named("nothing").expect("valid layer");
	assert!(adapter.list_plugins(&layer).expect("list").is_empty());
}

#[test]
fn test_clear_layer_removes_all_units() {
	let (adapter, _temp) = create_test_adapter();
	let data = unit(json!({ "A": { "On": { "$bool": true } } }));
	adapter.write_unit(&Layer::Temporary, "core", &data).expect("write");
	adapter.write_unit(&Layer::Temporary, "extras", &data).expect("write");

	adapter.clear_layer(&Layer::Temporary).expect("clear");
	assert!(adapter.list_plugins(&Layer::Temporary).expect("list").is_empty());
}

#[test]
fn test_delete_layer() {
	let (adapter, _temp) = create_test_adapter();
	let layer = Layer::named("pvp").expect("valid layer");
	let data = unit(json!({ "A": { "On": { "$bool": true } } }));
	adapter.write_unit(&layer, "core", &data).expect("write");

	adapter.delete_layer("pvp").expect("delete");
	assert!(adapter.list_layers().expect("list").is_empty());
	assert!(adapter.read_unit(&layer, "core").expect("read").is_none());
}
