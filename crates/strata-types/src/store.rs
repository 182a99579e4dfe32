//! Owned setting store tree
//!
//! One `SettingStore` holds the values one layer records for one component
//! instance. Nested branches are owned sub-stores, so cloning a store is
//! always a deep structural copy and mutating one layer can never leak into
//! another.

use std::collections::BTreeMap;

use crate::prelude::*;

/// A stored value or a nested store for a branch
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEntry {
	Value(SettingValue),
	Branch(SettingStore),
}

impl StoreEntry {
	/// A branch without any values below it counts as empty
	pub fn is_empty(&self) -> bool {
		match self {
			StoreEntry::Value(_) => false,
			StoreEntry::Branch(store) => store.is_empty(),
		}
	}
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingStore {
	entries: BTreeMap<Box<str>, StoreEntry>,
}

impl SettingStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// True if no value is recorded anywhere in the tree
	pub fn is_empty(&self) -> bool {
		self.entries.values().all(StoreEntry::is_empty)
	}

	/// Number of direct entries
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn entries(&self) -> impl Iterator<Item = (&str, &StoreEntry)> {
		self.entries.iter().map(|(k, v)| (k.as_ref(), v))
	}

	/// Names of direct children that hold at least one value
	pub fn non_empty_children(&self) -> Vec<&str> {
		self.entries.iter().filter(|(_, e)| !e.is_empty()).map(|(k, _)| k.as_ref()).collect()
	}

	pub fn entry(&self, path: &SettingPath) -> Option<&StoreEntry> {
		let (last, parents) = path.segments().split_last()?;
		let mut current = self;
		for segment in parents {
			match current.entries.get(segment)? {
				StoreEntry::Branch(store) => current = store,
				StoreEntry::Value(_) => return None,
			}
		}
		current.entries.get(last)
	}

	pub fn get(&self, path: &SettingPath) -> Option<&SettingValue> {
		match self.entry(path)? {
			StoreEntry::Value(value) => Some(value),
			StoreEntry::Branch(_) => None,
		}
	}

	/// Nested store at a branch path
	pub fn branch(&self, path: &SettingPath) -> Option<&SettingStore> {
		match self.entry(path)? {
			StoreEntry::Branch(store) => Some(store),
			StoreEntry::Value(_) => None,
		}
	}

	/// Store a value, creating intermediate branches on demand.
	///
	/// Returns the previous value at the path, if any.
	pub fn set(&mut self, path: &SettingPath, value: SettingValue) -> StResult<Option<SettingValue>> {
		let (last, parents) = path
			.segments()
			.split_last()
			.ok_or_else(|| Error::InvalidPath("empty setting path".into()))?;
		let mut current = self;
		for segment in parents {
			let entry = current
				.entries
				.entry(segment.clone())
				.or_insert_with(|| StoreEntry::Branch(SettingStore::new()));
			current = match entry {
				StoreEntry::Branch(store) => store,
				StoreEntry::Value(_) => {
					return Err(Error::InvalidPath(format!(
						"'{}' crosses the value at '{}'",
						path, segment
					)));
				}
			};
		}
		match current.entries.insert(last.clone(), StoreEntry::Value(value)) {
			Some(StoreEntry::Value(previous)) => Ok(Some(previous)),
			_ => Ok(None),
		}
	}

	/// Remove the entry at a path and prune branches left empty.
	pub fn remove_entry(&mut self, path: &SettingPath) -> Option<StoreEntry> {
		fn walk(store: &mut SettingStore, segments: &[Box<str>]) -> Option<StoreEntry> {
			let (first, rest) = segments.split_first()?;
			if rest.is_empty() {
				return store.entries.remove(first);
			}
			let removed = match store.entries.get_mut(first)? {
				StoreEntry::Branch(child) => walk(child, rest)?,
				StoreEntry::Value(_) => return None,
			};
			if store.entries.get(first).is_some_and(StoreEntry::is_empty) {
				store.entries.remove(first);
			}
			Some(removed)
		}
		walk(self, path.segments())
	}

	/// Remove a value. Returns the removed value, if the path held one.
	pub fn remove(&mut self, path: &SettingPath) -> Option<SettingValue> {
		if !matches!(self.entry(path), Some(StoreEntry::Value(_))) {
			return None;
		}
		match self.remove_entry(path)? {
			StoreEntry::Value(value) => Some(value),
			StoreEntry::Branch(_) => None,
		}
	}

	/// Insert a whole entry under a direct child name
	pub fn insert_entry(&mut self, name: &str, entry: StoreEntry) {
		self.entries.insert(name.into(), entry);
	}

	/// All values in depth-first, name-sorted order
	pub fn leaves(&self) -> Vec<(SettingPath, &SettingValue)> {
		fn walk<'a>(
			store: &'a SettingStore,
			prefix: Option<&SettingPath>,
			out: &mut Vec<(SettingPath, &'a SettingValue)>,
		) {
			for (name, entry) in &store.entries {
				let path = match prefix {
					Some(prefix) => prefix.child(name),
					None => SettingPath::root(name),
				};
				match entry {
					StoreEntry::Value(value) => out.push((path, value)),
					StoreEntry::Branch(child) => walk(child, Some(&path), out),
				}
			}
		}
		let mut out = Vec::new();
		walk(self, None, &mut out);
		out
	}

	/// Overlay every value of `other` onto this store
	pub fn merge(&mut self, other: &SettingStore) {
		for (name, entry) in &other.entries {
			match entry {
				StoreEntry::Value(value) => {
					self.entries.insert(name.clone(), StoreEntry::Value(value.clone()));
				}
				StoreEntry::Branch(child) => {
					let target = self
						.entries
						.entry(name.clone())
						.or_insert_with(|| StoreEntry::Branch(SettingStore::new()));
					match target {
						StoreEntry::Branch(store) => store.merge(child),
						StoreEntry::Value(_) => *target = StoreEntry::Branch(child.clone()),
					}
				}
			}
		}
	}

	/// Values of this store that are absent from, or differ in, `base`
	pub fn diff(&self, base: &SettingStore) -> SettingStore {
		let mut out = SettingStore::new();
		for (path, value) in self.leaves() {
			if base.get(&path) != Some(value) {
				// Paths come from a valid tree, set cannot cross a value here
				let _ = out.set(&path, value.clone());
			}
		}
		out
	}
}


// vim: ts=4
