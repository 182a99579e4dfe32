//! Setting value types
//!
//! `SettingValue` is a closed tagged union over every value kind a leaf can
//! hold. `ValueType` is the declared type of a leaf; the validator in the
//! engine crate is the only place that converts between text/JSON and values
//! of a declared type.

use std::fmt;
use std::str::FromStr;

use crate::prelude::*;

/// Declared type of a leaf setting
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueType {
	Bool,
	Byte,
	Short,
	Int,
	Long,
	Float,
	Double,
	String,
	Color,
	Json,
	Array(Box<ValueType>),
}

impl ValueType {
	/// Type tag used in persisted units and schema files
	pub fn tag(&self) -> String {
		match self {
			ValueType::Array(inner) => format!("array<{}>", inner.tag()),
			other => other.scalar_tag().to_string(),
		}
	}

	fn scalar_tag(&self) -> &'static str {
		match self {
			ValueType::Bool => "bool",
			ValueType::Byte => "byte",
			ValueType::Short => "short",
			ValueType::Int => "int",
			ValueType::Long => "long",
			ValueType::Float => "float",
			ValueType::Double => "double",
			ValueType::String => "string",
			ValueType::Color => "color",
			ValueType::Json => "json",
			ValueType::Array(_) => "array",
		}
	}

	/// Inclusive bounds for the integer family
	pub fn int_bounds(&self) -> Option<(i64, i64)> {
		match self {
			ValueType::Byte => Some((i64::from(i8::MIN), i64::from(i8::MAX))),
			ValueType::Short => Some((i64::from(i16::MIN), i64::from(i16::MAX))),
			ValueType::Int => Some((i64::from(i32::MIN), i64::from(i32::MAX))),
			ValueType::Long => Some((i64::MIN, i64::MAX)),
			_ => None,
		}
	}

	pub fn is_integer(&self) -> bool {
		self.int_bounds().is_some()
	}

	pub fn is_decimal(&self) -> bool {
		matches!(self, ValueType::Float | ValueType::Double)
	}
}

impl fmt::Display for ValueType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.tag())
	}
}

impl FromStr for ValueType {
	type Err = Error;

	fn from_str(s: &str) -> StResult<Self> {
		let tag = s.trim().to_ascii_lowercase();
		if let Some(inner) = tag.strip_prefix("array<").and_then(|rest| rest.strip_suffix('>')) {
			let inner: ValueType = inner.parse()?;
			if matches!(inner, ValueType::Array(_)) {
				return Err(Error::Parse(format!("nested arrays are not supported: '{}'", s)));
			}
			return Ok(ValueType::Array(Box::new(inner)));
		}
		match tag.as_str() {
			"bool" | "boolean" => Ok(ValueType::Bool),
			"byte" => Ok(ValueType::Byte),
			"short" => Ok(ValueType::Short),
			"int" | "integer" => Ok(ValueType::Int),
			"long" => Ok(ValueType::Long),
			"float" => Ok(ValueType::Float),
			"double" => Ok(ValueType::Double),
			"string" => Ok(ValueType::String),
			"color" => Ok(ValueType::Color),
			"json" => Ok(ValueType::Json),
			_ => Err(Error::Parse(format!("unknown value type '{}'", s))),
		}
	}
}

/// RGBA color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
	pub r: u8,
	pub g: u8,
	pub b: u8,
	pub a: u8,
}

impl Color {
	pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
		Self { r, g, b, a }
	}

	/// Parse `#RRGGBB`, `#RRGGBBAA` or `r,g,b[,a]`
	pub fn parse(text: &str) -> StResult<Self> {
		let text = text.trim();
		if let Some(hex) = text.strip_prefix('#') {
			if !(hex.len() == 6 || hex.len() == 8) || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
				return Err(Error::Parse(format!("invalid color '{}'", text)));
			}
			let byte = |i: usize| {
				u8::from_str_radix(&hex[i..i + 2], 16)
					.map_err(|_| Error::Parse(format!("invalid color '{}'", text)))
			};
			let a = if hex.len() == 8 { byte(6)? } else { 255 };
			return Ok(Self::rgba(byte(0)?, byte(2)?, byte(4)?, a));
		}

		let parts = text
			.split(',')
			.map(|p| p.trim().parse::<u8>())
			.collect::<Result<Vec<_>, _>>()
			.map_err(|_| Error::Parse(format!("invalid color '{}'", text)))?;
		match parts.as_slice() {
			[r, g, b] => Ok(Self::rgba(*r, *g, *b, 255)),
			[r, g, b, a] => Ok(Self::rgba(*r, *g, *b, *a)),
			_ => Err(Error::Parse(format!("invalid color '{}'", text))),
		}
	}
}

impl fmt::Display for Color {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.a == 255 {
			write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
		} else {
			write!(f, "#{:02X}{:02X}{:02X}{:02X}", self.r, self.g, self.b, self.a)
		}
	}
}

/// Setting value types
#[derive(Debug, Clone, PartialEq)]
pub enum SettingValue {
	Bool(bool),
	Int(i64),
	Float(f64),
	String(String),
	Color(Color),
	Json(serde_json::Value),
	Array(Vec<SettingValue>),
}

impl SettingValue {
	/// Check whether this value can be stored in a leaf of the given type
	pub fn matches_type(&self, value_type: &ValueType) -> bool {
		match (self, value_type) {
			(SettingValue::Bool(_), ValueType::Bool)
			| (SettingValue::String(_), ValueType::String)
			| (SettingValue::Color(_), ValueType::Color)
			| (SettingValue::Json(_), ValueType::Json)
			| (SettingValue::Float(_), ValueType::Float | ValueType::Double) => true,
			(SettingValue::Int(i), t) => t.int_bounds().is_some_and(|(lo, hi)| (lo..=hi).contains(i)),
			(SettingValue::Array(items), ValueType::Array(inner)) => {
				items.iter().all(|item| item.matches_type(inner))
			}
			_ => false,
		}
	}

	/// Get the type name for error messages
	pub fn type_name(&self) -> &'static str {
		match self {
			SettingValue::Bool(_) => "bool",
			SettingValue::Int(_) => "int",
			SettingValue::Float(_) => "float",
			SettingValue::String(_) => "string",
			SettingValue::Color(_) => "color",
			SettingValue::Json(_) => "json",
			SettingValue::Array(_) => "array",
		}
	}

	pub fn as_bool(&self) -> Option<bool> {
		match self {
			SettingValue::Bool(b) => Some(*b),
			_ => None,
		}
	}

	pub fn as_int(&self) -> Option<i64> {
		match self {
			SettingValue::Int(i) => Some(*i),
			_ => None,
		}
	}

	pub fn as_float(&self) -> Option<f64> {
		match self {
			SettingValue::Float(f) => Some(*f),
			#[allow(clippy::cast_precision_loss)]
			SettingValue::Int(i) => Some(*i as f64),
			_ => None,
		}
	}

	pub fn as_str(&self) -> Option<&str> {
		match self {
			SettingValue::String(s) => Some(s),
			_ => None,
		}
	}

	/// Plain JSON form, without type information
	pub fn to_json(&self) -> serde_json::Value {
		use serde_json::Value;
		match self {
			SettingValue::Bool(b) => Value::Bool(*b),
			SettingValue::Int(i) => Value::from(*i),
			SettingValue::Float(f) => serde_json::Number::from_f64(*f).map_or(Value::Null, Value::Number),
			SettingValue::String(s) => Value::String(s.clone()),
			SettingValue::Color(c) => Value::String(c.to_string()),
			SettingValue::Json(j) => j.clone(),
			SettingValue::Array(items) => Value::Array(items.iter().map(Self::to_json).collect()),
		}
	}
}

impl fmt::Display for SettingValue {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SettingValue::Bool(b) => write!(f, "{}", b),
			SettingValue::Int(i) => write!(f, "{}", i),
			SettingValue::Float(v) => write!(f, "{}", v),
			SettingValue::String(s) => f.write_str(s),
			SettingValue::Color(c) => write!(f, "{}", c),
			SettingValue::Json(_) | SettingValue::Array(_) => write!(f, "{}", self.to_json()),
		}
	}
}

impl From<bool> for SettingValue {
	fn from(b: bool) -> Self {
		SettingValue::Bool(b)
	}
}

impl From<i64> for SettingValue {
	fn from(i: i64) -> Self {
		SettingValue::Int(i)
	}
}

impl From<f64> for SettingValue {
	fn from(f: f64) -> Self {
		SettingValue::Float(f)
	}
}

impl From<&str> for SettingValue {
	fn from(s: &str) -> Self {
		SettingValue::String(s.to_string())
	}
}

impl From<String> for SettingValue {
	fn from(s: String) -> Self {
		SettingValue::String(s)
	}
}

impl From<Color> for SettingValue {
	fn from(c: Color) -> Self {
		SettingValue::Color(c)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_type_tags() {
		assert_eq!(ValueType::Int.tag(), "int");
		assert_eq!(ValueType::Array(Box::new(ValueType::String)).tag(), "array<string>");
		assert_eq!("array<int>".parse::<ValueType>().unwrap(), ValueType::Array(Box::new(ValueType::Int)));
		assert_eq!("Boolean".parse::<ValueType>().unwrap(), ValueType::Bool);
		assert!("array<array<int>>".parse::<ValueType>().is_err());
		assert!("blob".parse::<ValueType>().is_err());
	}

	#[test]
	fn test_int_width_checked_by_matches_type() {
		assert!(SettingValue::Int(127).matches_type(&ValueType::Byte));
		assert!(!SettingValue::Int(128).matches_type(&ValueType::Byte));
		assert!(SettingValue::Int(128).matches_type(&ValueType::Short));
		assert!(!SettingValue::Int(1).matches_type(&ValueType::Float));
	}

	#[test]
	fn test_array_matches_element_type() {
		let v = SettingValue::Array(vec![SettingValue::Int(1), SettingValue::Int(2)]);
		assert!(v.matches_type(&ValueType::Array(Box::new(ValueType::Int))));
		assert!(!v.matches_type(&ValueType::Array(Box::new(ValueType::String))));
	}

	#[test]
	fn test_color_parse_and_display() {
		assert_eq!(Color::parse("#FF0000").unwrap(), Color::rgba(255, 0, 0, 255));
		assert_eq!(Color::parse("#FF00007F").unwrap(), Color::rgba(255, 0, 0, 127));
		assert_eq!(Color::parse("1, 2, 3").unwrap(), Color::rgba(1, 2, 3, 255));
		assert_eq!(Color::rgba(255, 0, 0, 127).to_string(), "#FF00007F");
		assert_eq!(Color::rgba(0, 16, 255, 255).to_string(), "#0010FF");
		assert!(Color::parse("#12345").is_err());
		assert!(Color::parse("300,0,0").is_err());
	}

	#[test]
	fn test_display_array_as_json() {
		let v = SettingValue::Array(vec!["a".into(), "b".into()]);
		assert_eq!(v.to_string(), r#"["a","b"]"#);
	}
}

// vim: ts=4
