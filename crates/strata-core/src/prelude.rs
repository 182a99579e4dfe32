pub use strata_types::error::{Error, StResult};
pub use strata_types::store::{SettingStore, StoreEntry};
pub use strata_types::types::{Layer, SettingPath};
pub use strata_types::value::{SettingValue, ValueType};

pub use tracing::{debug, error, info, warn};

// vim: ts=4
