//! Buffered bulk flows
//!
//! While a bulk flow runs, temporary-layer writes are collected in a
//! `WriteBuffer` instead of being persisted one by one. Writes listeners make
//! in reaction to the flow land in the buffer too, so the flow can tell them
//! apart from its own and persist the result once at the end.

use std::collections::HashMap;
use std::ops::{Deref, DerefMut};

use serde_json::{Map, Value};

use crate::codec::{self, Strictness};
use crate::engine::SettingsEngine;
use crate::prelude::*;
use crate::registry::InstanceEntry;

/// Temporary-layer writes collected during a bulk flow, keyed by instance key
#[derive(Debug, Default)]
pub struct WriteBuffer {
	writes: HashMap<Box<str>, SettingStore>,
	removed: HashMap<Box<str>, Vec<SettingPath>>,
}

impl WriteBuffer {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn record_set(&mut self, key: &str, path: &SettingPath, value: SettingValue) {
		if let Some(removed) = self.removed.get_mut(key) {
			removed.retain(|p| p != path);
		}
		if let Err(e) = self.writes.entry(key.into()).or_default().set(path, value) {
			warn!("Cannot buffer {}.{}: {}", key, path, e);
		}
	}

	pub fn record_remove(&mut self, key: &str, path: &SettingPath) {
		if let Some(store) = self.writes.get_mut(key) {
			store.remove(path);
		}
		let removed = self.removed.entry(key.into()).or_default();
		if !removed.contains(path) {
			removed.push(path.clone());
		}
	}

	pub fn writes(&self, key: &str) -> Option<&SettingStore> {
		self.writes.get(key)
	}

	pub fn removed(&self, key: &str) -> &[SettingPath] {
		self.removed.get(key).map_or(&[], Vec::as_slice)
	}

	/// True if the buffer already holds a write for the path
	pub fn contains(&self, key: &str, path: &SettingPath) -> bool {
		self.writes.get(key).is_some_and(|store| store.get(path).is_some())
	}

	/// True if the path was written or removed during the flow
	pub fn touched(&self, key: &str, path: &SettingPath) -> bool {
		self.contains(key, path) || self.removed(key).contains(path)
	}

	pub fn is_empty(&self) -> bool {
		self.writes.values().all(SettingStore::is_empty) && self.removed.values().all(Vec::is_empty)
	}
}

/// Holds the engine's write buffer for the duration of a bulk flow.
///
/// Dropping the guard without `finish` discards the buffer, so an error path
/// can never leak buffered state into later writes.
pub struct BulkGuard<'a> {
	engine: &'a mut SettingsEngine,
	finished: bool,
}

impl BulkGuard<'_> {
	/// Ends the flow and hands back the buffered writes
	pub fn finish(mut self) -> WriteBuffer {
		self.finished = true;
		self.engine.write_buffer.take().unwrap_or_default()
	}
}

impl Deref for BulkGuard<'_> {
	type Target = SettingsEngine;

	fn deref(&self) -> &SettingsEngine {
		self.engine
	}
}

impl DerefMut for BulkGuard<'_> {
	fn deref_mut(&mut self) -> &mut SettingsEngine {
		self.engine
	}
}

impl Drop for BulkGuard<'_> {
	fn drop(&mut self) {
		if !self.finished && self.engine.write_buffer.take().is_some() {
			warn!("Bulk operation aborted, buffered writes discarded");
		}
	}
}

impl SettingsEngine {
	/// Starts a buffered flow. Fails if one is already running.
	pub fn begin_bulk(&mut self, buffer: WriteBuffer) -> StResult<BulkGuard<'_>> {
		if self.write_buffer.is_some() {
			return Err(Error::BulkInProgress);
		}
		self.write_buffer = Some(buffer);
		Ok(BulkGuard { engine: self, finished: false })
	}

	pub fn bulk_in_progress(&self) -> bool {
		self.write_buffer.is_some()
	}

	/// Rebuilds the live view from the named layers and defaults.
	///
	/// The persisted temporary layer is cleared, then every leaf is set again
	/// with listeners firing. Leaves left without any value are reported as
	/// unset. Values listeners write in reaction that differ from the reloaded
	/// ones become the new temporary layer.
	pub fn reload(&mut self) -> StResult<()> {
		if self.write_buffer.is_some() {
			return Err(Error::BulkInProgress);
		}
		info!("Reloading settings");

		if let Err(e) = self.adapter.clear_layer(&Layer::Temporary) {
			error!("Failed to clear the temporary layer: {}", e);
		}
		self.units.invalidate_layer(Layer::Temporary.as_str());
		for layer in self.active_layers.clone() {
			self.reload_layer(&layer)?;
		}

		let entries: Vec<InstanceEntry> = self.registry.instances().cloned().collect();
		let mut snapshots: Vec<(InstanceEntry, SettingStore)> = Vec::with_capacity(entries.len());
		let mut unset: Vec<(InstanceEntry, SettingPath)> = Vec::new();
		for entry in entries {
			let key = entry.key();
			let mut snapshot = self.merged_named(&key);
			for (path, _) in entry.decl.leaves() {
				if snapshot.get(&path).is_none() {
					match self.default_value(&entry, &path) {
						Ok(value) => {
							snapshot.set(&path, value)?;
						}
						Err(e) => debug!("Reload leaves {}.{} unset: {}", entry.name, path, e),
					}
				}
			}
			self.overrides.insert(key.clone(), SettingStore::new());
			if let Some(live) = self.live.get_mut(&key) {
				for (path, _) in live.clone().leaves() {
					if snapshot.get(&path).is_none() {
						live.remove(&path);
						unset.push((entry.clone(), path));
					}
				}
			}
			snapshots.push((entry, snapshot));
		}

		let buffer = {
			let mut guard = self.begin_bulk(WriteBuffer::new())?;
			for (entry, path) in &unset {
				if guard.write_buffer.as_ref().is_some_and(|b| b.touched(&entry.key(), path)) {
					continue;
				}
				if let Err(e) = guard.notify(entry, path, None) {
					warn!("Reload of {}.{} failed: {}", entry.name, path, e);
				}
			}
			for (entry, snapshot) in &snapshots {
				let key = entry.key();
				for (path, value) in snapshot.leaves() {
					if guard.write_buffer.as_ref().is_some_and(|b| b.touched(&key, &path)) {
						continue;
					}
					if let Err(e) = guard.apply_live(entry, &path, value.clone(), true) {
						warn!("Reload of {}.{} failed: {}", entry.name, path, e);
					}
				}
			}
			guard.finish()
		};

		for (entry, snapshot) in &snapshots {
			let key = entry.key();
			if let Some(written) = buffer.writes(&key) {
				let changed = written.diff(snapshot);
				if !changed.is_empty() {
					debug!("Keeping {} listener values of {}", changed.leaves().len(), entry.name);
					self.overrides.entry(key).or_default().merge(&changed);
				}
			}
		}
		for plugin in self.registry.plugins() {
			self.persist_overrides(&plugin);
		}
		Ok(())
	}

	/// Applies externally supplied values through the temporary layer.
	///
	/// Input maps instance names to (possibly partial) nested settings. It is
	/// validated completely first: one bad entry rejects the whole import and
	/// nothing is written.
	pub fn import_settings(&mut self, input: &Map<String, Value>) -> StResult<()> {
		if self.write_buffer.is_some() {
			return Err(Error::BulkInProgress);
		}

		let mut imports: Vec<(InstanceEntry, SettingStore)> = Vec::with_capacity(input.len());
		for (instance, section) in input {
			let entry = self.registry.instance(instance)?.clone();
			let store = codec::decode_store(&entry.decl, &self.validator, section, Strictness::Strict)
				.map_err(|e| engine_context(e, &entry.name))?;
			imports.push((entry, store));
		}
		info!("Importing settings for {} instances", imports.len());

		let mut prefill = WriteBuffer::new();
		for (entry, store) in &imports {
			for (path, value) in store.leaves() {
				prefill.record_set(&entry.key(), &path, value.clone());
			}
		}

		let buffer = {
			let mut guard = self.begin_bulk(prefill)?;
			for (entry, store) in &imports {
				let key = entry.key();
				for (path, value) in store.leaves() {
					if let Some(buffer) = guard.write_buffer.as_mut() {
						buffer.record_set(&key, &path, value.clone());
					}
					if let Err(e) = guard.apply_live(entry, &path, value.clone(), false) {
						warn!("Import of {}.{} failed: {}", entry.name, path, e);
					}
				}
			}
			guard.finish()
		};

		let mut plugins: Vec<Box<str>> = Vec::new();
		let entries: Vec<InstanceEntry> = self.registry.instances().cloned().collect();
		for entry in entries {
			let key = entry.key();
			let written = buffer.writes(&key);
			let removed = buffer.removed(&key);
			if written.is_none_or(SettingStore::is_empty) && removed.is_empty() {
				continue;
			}
			let overrides = self.overrides.entry(key).or_default();
			if let Some(written) = written {
				overrides.merge(written);
			}
			for path in removed {
				overrides.remove(path);
			}
			if !plugins.iter().any(|p| p.as_ref() == entry.decl.plugin()) {
				plugins.push(entry.decl.plugin().into());
			}
		}
		for plugin in &plugins {
			self.persist_overrides(plugin);
		}
		Ok(())
	}
}

fn engine_context(err: Error, instance: &str) -> Error {
	match err {
		Error::Parse(msg) => Error::Parse(format!("{}: {}", instance, msg)),
		Error::ConstraintViolation(msg) => Error::ConstraintViolation(format!("{}: {}", instance, msg)),
		Error::InvalidPath(msg) => Error::InvalidPath(format!("{}: {}", instance, msg)),
		other => other,
	}
}


// vim: ts=4
