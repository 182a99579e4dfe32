pub use crate::error::{Error, StResult};
pub use crate::types::{Layer, SettingPath};
pub use crate::value::{SettingValue, ValueType};

pub use tracing::{debug, error, info, warn};

// vim: ts=4
