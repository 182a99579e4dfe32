//! Error type shared by the engine and its adapters

use std::fmt;

pub type StResult<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
	/// Path does not resolve to a declared node, or crosses a leaf
	InvalidPath(String),
	/// Children were requested from a leaf
	NotABranch(String),
	/// Leaf has no value in any layer and no usable default
	UnsetSetting(String),
	/// Text or JSON could not be converted to the declared type
	Parse(String),
	ConstraintViolation(String),
	/// Backend failed to read or write a unit
	Persistence(String),
	/// Malformed declaration tree, aborts loading of the component type
	Declaration(String),
	UnknownComponent(String),
	UnknownLayer(String),
	/// A buffered bulk flow is already running
	BulkInProgress,
	/// One or more change listeners failed
	Listener(String),
	Internal(String),

	// externals
	Io(std::io::Error),
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			Error::InvalidPath(msg) => write!(f, "invalid path: {}", msg),
			Error::NotABranch(msg) => write!(f, "not a branch: {}", msg),
			Error::UnsetSetting(msg) => write!(f, "unset setting: {}", msg),
			Error::Parse(msg) => write!(f, "parse error: {}", msg),
			Error::ConstraintViolation(msg) => write!(f, "constraint violation: {}", msg),
			Error::Persistence(msg) => write!(f, "persistence error: {}", msg),
			Error::Declaration(msg) => write!(f, "declaration error: {}", msg),
			Error::UnknownComponent(name) => write!(f, "unknown component: {}", name),
			Error::UnknownLayer(name) => write!(f, "unknown layer: {}", name),
			Error::BulkInProgress => write!(f, "another bulk operation is in progress"),
			Error::Listener(msg) => write!(f, "listener failed: {}", msg),
			Error::Internal(msg) => write!(f, "internal error: {}", msg),
			Error::Io(e) => write!(f, "io error: {}", e),
		}
	}
}

impl std::error::Error for Error {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			Error::Io(e) => Some(e),
			_ => None,
		}
	}
}

impl From<std::io::Error> for Error {
	fn from(e: std::io::Error) -> Self {
		Error::Io(e)
	}
}

impl From<serde_json::Error> for Error {
	fn from(e: serde_json::Error) -> Self {
		Error::Persistence(format!("json: {}", e))
	}
}

impl From<serde_yaml::Error> for Error {
	fn from(e: serde_yaml::Error) -> Self {
		Error::Declaration(format!("schema: {}", e))
	}
}

impl Error {
	/// Short machine-readable kind, used by the command surface
	pub fn kind(&self) -> &'static str {
		match self {
			Error::InvalidPath(_) => "InvalidPath",
			Error::NotABranch(_) => "NotABranch",
			Error::UnsetSetting(_) => "UnsetSetting",
			Error::Parse(_) => "ParseError",
			Error::ConstraintViolation(_) => "ConstraintViolation",
			Error::Persistence(_) | Error::Io(_) => "PersistenceError",
			Error::Declaration(_) => "DeclarationError",
			Error::UnknownComponent(_) => "UnknownComponent",
			Error::UnknownLayer(_) => "UnknownLayer",
			Error::BulkInProgress => "BulkInProgress",
			Error::Listener(_) => "ListenerError",
			Error::Internal(_) => "InternalError",
		}
	}
}


// vim: ts=4
