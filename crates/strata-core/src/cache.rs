//! LRU cache of raw persisted units

use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;
use strata_types::config_adapter::{ConfigAdapter, RawUnit};

use crate::prelude::*;

pub const DEFAULT_CACHE_SIZE: usize = 64;

type UnitKey = (Box<str>, Box<str>);

/// Raw units keyed by (layer, plugin). Missing units are cached as `None`.
pub struct UnitCache {
	units: Mutex<LruCache<UnitKey, Option<RawUnit>>>,
}

impl std::fmt::Debug for UnitCache {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let units = self.units.lock();
		f.debug_struct("UnitCache").field("len", &units.len()).field("cap", &units.cap()).finish()
	}
}

impl UnitCache {
	pub fn new(capacity: usize) -> Self {
		let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
		Self { units: Mutex::new(LruCache::new(capacity)) }
	}

	/// Returns the cached unit or reads it through the adapter
	pub fn read_through(
		&self,
		adapter: &dyn ConfigAdapter,
		layer: &Layer,
		plugin: &str,
	) -> StResult<Option<RawUnit>> {
		let key: UnitKey = (layer.as_str().into(), plugin.into());
		if let Some(unit) = self.units.lock().get(&key) {
			return Ok(unit.clone());
		}
		let unit = adapter.read_unit(layer, plugin)?;
		debug!("Unit cache miss: {}/{}", layer, plugin);
		self.units.lock().put(key, unit.clone());
		Ok(unit)
	}

	pub fn invalidate(&self, layer: &Layer, plugin: &str) {
		self.units.lock().pop(&(layer.as_str().into(), plugin.into()));
	}

	/// Drops every unit of one layer
	pub fn invalidate_layer(&self, layer: &str) {
		let mut units = self.units.lock();
		let stale: Vec<UnitKey> =
			units.iter().filter(|((l, _), _)| l.as_ref() == layer).map(|(k, _)| k.clone()).collect();
		for key in stale {
			units.pop(&key);
		}
	}

	pub fn clear(&self) {
		self.units.lock().clear();
	}

	pub fn len(&self) -> usize {
		self.units.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.units.lock().is_empty()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashMap;
	use std::sync::atomic::{AtomicUsize, Ordering};

	#[derive(Debug, Default)]
	struct CountingAdapter {
		reads: AtomicUsize,
		units: parking_lot::Mutex<HashMap<(String, String), RawUnit>>,
	}

	impl ConfigAdapter for CountingAdapter {
		fn read_unit(&self, layer: &Layer, plugin: &str) -> StResult<Option<RawUnit>> {
			self.reads.fetch_add(1, Ordering::SeqCst);
			Ok(self.units.lock().get(&(layer.to_string(), plugin.to_string())).cloned())
		}

		fn write_unit(&self, layer: &Layer, plugin: &str, unit: &RawUnit) -> StResult<()> {
			self.units.lock().insert((layer.to_string(), plugin.to_string()), unit.clone());
			Ok(())
		}

		fn list_plugins(&self, _layer: &Layer) -> StResult<Vec<Box<str>>> {
			Ok(Vec::new())
		}

		fn list_layers(&self) -> StResult<Vec<Box<str>>> {
			Ok(Vec::new())
		}

		fn delete_layer(&self, _name: &str) -> StResult<()> {
			Ok(())
		}
	}

	#[test]
	fn test_read_through_caches_missing_units() {
		let adapter = CountingAdapter::default();
		let cache = UnitCache::new(4);
		assert_eq!(cache.read_through(&adapter, &Layer::Temporary, "core").unwrap(), None);
		assert_eq!(cache.read_through(&adapter, &Layer::Temporary, "core").unwrap(), None);
		assert_eq!(adapter.reads.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn test_invalidate_forces_reread() {
		let adapter = CountingAdapter::default();
		let cache = UnitCache::new(4);
		cache.read_through(&adapter, &Layer::Temporary, "core").unwrap();

		let mut unit = RawUnit::new();
		unit.insert("Main".into(), serde_json::json!({}));
		adapter.write_unit(&Layer::Temporary, "core", &unit).unwrap();
		cache.invalidate(&Layer::Temporary, "core");

		assert_eq!(cache.read_through(&adapter, &Layer::Temporary, "core").unwrap(), Some(unit));
		assert_eq!(adapter.reads.load(Ordering::SeqCst), 2);
	}

	#[test]
	fn test_invalidate_layer_keeps_other_layers() {
		let adapter = CountingAdapter::default();
		let cache = UnitCache::new(8);
		let pvp = Layer::named("pvp").unwrap();
		cache.read_through(&adapter, &Layer::Temporary, "core").unwrap();
		cache.read_through(&adapter, &pvp, "core").unwrap();
		cache.read_through(&adapter, &pvp, "extra").unwrap();

		cache.invalidate_layer("pvp");
		assert_eq!(cache.len(), 1);
	}

	#[test]
	fn test_capacity_evicts_least_recent() {
		let adapter = CountingAdapter::default();
		let cache = UnitCache::new(1);
		cache.read_through(&adapter, &Layer::Temporary, "a").unwrap();
		cache.read_through(&adapter, &Layer::Temporary, "b").unwrap();
		cache.read_through(&adapter, &Layer::Temporary, "a").unwrap();
		assert_eq!(adapter.reads.load(Ordering::SeqCst), 3);
	}
}

// vim: ts=4
