//! Change listeners and component lifecycle hooks

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::engine::SettingsEngine;
use crate::prelude::*;
use crate::registry::name_key;

/// A change of an effective value in the live view
#[derive(Debug, Clone, PartialEq)]
pub struct SettingChange {
	pub instance: Box<str>,
	pub component_type: Box<str>,
	pub path: SettingPath,
	/// `None` when the setting became unset, which only happens to leaves without a default
	pub value: Option<SettingValue>,
}

impl SettingChange {
	/// Textual form of the new value, `<unset>` when there is none
	pub fn value_text(&self) -> String {
		self.value.as_ref().map_or_else(|| "<unset>".to_string(), ToString::to_string)
	}
}

/// Listener callback. Receives the engine so it may write settings itself.
pub type Listener = Arc<dyn Fn(&mut SettingsEngine, &SettingChange) -> StResult<()> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Called when an instance's `On` setting turns on or off
pub trait Lifecycle: Send + Sync {
	fn activate(&self, _engine: &mut SettingsEngine, _instance: &str) -> StResult<()> {
		Ok(())
	}

	fn deactivate(&self, _engine: &mut SettingsEngine, _instance: &str) -> StResult<()> {
		Ok(())
	}
}

/// Listeners keyed by component type, in registration order
#[derive(Default)]
pub struct ListenerRegistry {
	next_id: u64,
	by_type: HashMap<Box<str>, Vec<(ListenerId, Listener)>>,
}

impl fmt::Debug for ListenerRegistry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let counts: HashMap<&str, usize> = self.by_type.iter().map(|(k, v)| (k.as_ref(), v.len())).collect();
		f.debug_struct("ListenerRegistry").field("listeners", &counts).finish()
	}
}

impl ListenerRegistry {
	pub fn register(&mut self, component_type: &str, listener: Listener) -> ListenerId {
		self.next_id += 1;
		let id = ListenerId(self.next_id);
		self.by_type.entry(name_key(component_type)).or_default().push((id, listener));
		id
	}

	/// Returns false if the id was not registered
	pub fn unregister(&mut self, id: ListenerId) -> bool {
		for listeners in self.by_type.values_mut() {
			if let Some(pos) = listeners.iter().position(|(lid, _)| *lid == id) {
				listeners.remove(pos);
				return true;
			}
		}
		false
	}

	/// Snapshot of a type's listeners, so they can be called with the engine borrowed
	pub fn listeners_for(&self, component_type: &str) -> Vec<Listener> {
		self.by_type
			.get(&name_key(component_type))
			.map(|listeners| listeners.iter().map(|(_, l)| l.clone()).collect())
			.unwrap_or_default()
	}

	pub fn count(&self, component_type: &str) -> usize {
		self.by_type.get(&name_key(component_type)).map_or(0, Vec::len)
	}
}


// vim: ts=4
