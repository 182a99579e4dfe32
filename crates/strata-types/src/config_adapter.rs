//! Adapter that persists config layers.
//!
//! A layer's values are split into one persisted unit per plugin. A unit is a
//! JSON object keyed by component instance name; the engine owns the encoding
//! of the values inside, adapters only move units to and from storage.

use std::fmt::Debug;

use crate::prelude::*;

/// Raw content of one persisted unit
pub type RawUnit = serde_json::Map<String, serde_json::Value>;

pub trait ConfigAdapter: Debug + Send + Sync {
	/// Reads the unit of a plugin in a layer.
	///
	/// A missing unit is `Ok(None)`. An existing but unreadable unit is an error.
	fn read_unit(&self, layer: &Layer, plugin: &str) -> StResult<Option<RawUnit>>;

	/// Writes the unit of a plugin in a layer. An empty unit deletes it.
	fn write_unit(&self, layer: &Layer, plugin: &str, unit: &RawUnit) -> StResult<()>;

	/// Lists the plugins that have a persisted unit in a layer
	fn list_plugins(&self, layer: &Layer) -> StResult<Vec<Box<str>>>;

	/// Lists the named layers known to the backend. Never includes the temporary layer.
	fn list_layers(&self) -> StResult<Vec<Box<str>>>;

	/// Deletes a named layer with all of its units
	fn delete_layer(&self, name: &str) -> StResult<()>;

	/// Deletes every unit of a layer
	fn clear_layer(&self, layer: &Layer) -> StResult<()> {
		for plugin in self.list_plugins(layer)? {
			self.write_unit(layer, &plugin, &RawUnit::new())?;
		}
		Ok(())
	}
}

// vim: ts=4
