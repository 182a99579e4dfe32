//! Layer selectors and setting paths

use std::fmt;

use crate::prelude::*;

/// Persisted name of the always-present temporary layer
pub const TEMP_LAYER: &str = "tmp";

/// Separator used in the textual form of a setting path
pub const PATH_SEPARATOR: char = '.';

/// Selects one config layer.
///
/// `Temporary` is the live, highest-precedence layer. `Named` layers rank below
/// it in the order the engine's active layer list defines.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Layer {
	Temporary,
	Named(Box<str>),
}

impl Layer {
	/// Create a named layer selector, rejecting reserved or malformed names
	pub fn named(name: &str) -> StResult<Self> {
		validate_layer_name(name)?;
		Ok(Layer::Named(name.into()))
	}

	/// Parse a layer name as given by users, mapping `tmp` onto the temporary layer
	pub fn parse(name: &str) -> StResult<Self> {
		if name.eq_ignore_ascii_case(TEMP_LAYER) {
			Ok(Layer::Temporary)
		} else {
			Self::named(name)
		}
	}

	/// Storage name of the layer
	pub fn as_str(&self) -> &str {
		match self {
			Layer::Temporary => TEMP_LAYER,
			Layer::Named(name) => name,
		}
	}

	pub fn is_temporary(&self) -> bool {
		matches!(self, Layer::Temporary)
	}

	/// Checks a selector built directly from the `Named` variant
	pub fn validate(&self) -> StResult<()> {
		match self {
			Layer::Temporary => Ok(()),
			Layer::Named(name) => validate_layer_name(name),
		}
	}
}

impl fmt::Display for Layer {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Check a named layer's name. Layer names double as directory names in file backends.
pub fn validate_layer_name(name: &str) -> StResult<()> {
	if name.eq_ignore_ascii_case(TEMP_LAYER) {
		return Err(Error::UnknownLayer(format!("'{}' is reserved for the temporary layer", name)));
	}
	if name.is_empty()
		|| name.starts_with('.')
		|| !name.chars().all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.'))
	{
		return Err(Error::UnknownLayer(format!("invalid layer name '{}'", name)));
	}
	Ok(())
}

/// Non-empty sequence of setting names, relative to a component's root
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SettingPath(Box<[Box<str>]>);

impl SettingPath {
	/// Build a path from segments. Fails on an empty sequence or an empty segment.
	pub fn new<I, S>(segments: I) -> StResult<Self>
	where
		I: IntoIterator<Item = S>,
		S: Into<Box<str>>,
	{
		let segments: Box<[Box<str>]> = segments.into_iter().map(Into::into).collect();
		if segments.is_empty() {
			return Err(Error::InvalidPath("empty setting path".into()));
		}
		if segments.iter().any(|s| s.trim().is_empty()) {
			return Err(Error::InvalidPath("empty path segment".into()));
		}
		Ok(Self(segments))
	}

	/// Parse a dotted path such as `Render.Distance`
	pub fn parse(text: &str) -> StResult<Self> {
		Self::new(text.split(PATH_SEPARATOR).map(str::trim))
	}

	pub fn segments(&self) -> &[Box<str>] {
		&self.0
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Always false, paths are non-empty
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Last segment, the name of the addressed node
	pub fn name(&self) -> &str {
		self.0.last().map_or("", AsRef::as_ref)
	}

	/// Path extended with one more segment
	pub fn child(&self, name: &str) -> Self {
		let mut segments = self.0.to_vec();
		segments.push(name.into());
		Self(segments.into_boxed_slice())
	}

	/// Single-segment path
	pub fn root(name: &str) -> Self {
		Self(Box::new([name.into()]))
	}
}

impl fmt::Display for SettingPath {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		for (i, segment) in self.0.iter().enumerate() {
			if i > 0 {
				write!(f, "{}", PATH_SEPARATOR)?;
			}
			f.write_str(segment)?;
		}
		Ok(())
	}
}

impl std::str::FromStr for SettingPath {
	type Err = Error;

	fn from_str(s: &str) -> StResult<Self> {
		Self::parse(s)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_parse_dotted_path() {
		let path = SettingPath::parse("Render.Distance").unwrap();
		assert_eq!(path.len(), 2);
		assert_eq!(path.name(), "Distance");
		assert_eq!(path.to_string(), "Render.Distance");
	}

	#[test]
	fn test_empty_path_rejected() {
		assert!(matches!(SettingPath::parse(""), Err(Error::InvalidPath(_))));
		assert!(matches!(SettingPath::parse("a..b"), Err(Error::InvalidPath(_))));
		assert!(SettingPath::new(Vec::<String>::new()).is_err());
	}

	#[test]
	fn test_child_extends_path() {
		let path = SettingPath::root("Render").child("Distance");
		assert_eq!(path, SettingPath::parse("Render.Distance").unwrap());
	}

	#[test]
	fn test_layer_parse_maps_tmp() {
		assert_eq!(Layer::parse("tmp").unwrap(), Layer::Temporary);
		assert_eq!(Layer::parse("TMP").unwrap(), Layer::Temporary);
		assert_eq!(Layer::parse("pvp").unwrap(), Layer::Named("pvp".into()));
	}

	#[test]
	fn test_named_layer_rejects_reserved_and_paths() {
		assert!(Layer::named("tmp").is_err());
		assert!(Layer::named("../etc").is_err());
		assert!(Layer::named("a/b").is_err());
		assert!(Layer::named("").is_err());
		assert!(Layer::named("pvp-2").is_ok());
	}

	#[test]
	fn test_validate_direct_named_variant() {
		assert!(Layer::Temporary.validate().is_ok());
		assert!(Layer::Named("pvp".into()).validate().is_ok());
		assert!(matches!(Layer::Named("tmp".into()).validate(), Err(Error::UnknownLayer(_))));
		assert!(matches!(Layer::Named("../x".into()).validate(), Err(Error::UnknownLayer(_))));
	}
}

// vim: ts=4
