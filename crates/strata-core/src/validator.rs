//! Validator
//!
//! Single authority for converting text and JSON into values of a declared
//! type, and for checking values against a leaf's limiter.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use strata_types::value::Color;

use crate::declaration::LeafDecl;
use crate::limiter::{Limiter, LimiterFactory, builtin_factories};
use crate::prelude::*;

pub struct Validator {
	limiters: HashMap<Box<str>, LimiterFactory>,
}

impl Default for Validator {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Debug for Validator {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let mut tags: Vec<&str> = self.limiters.keys().map(AsRef::as_ref).collect();
		tags.sort_unstable();
		f.debug_struct("Validator").field("limiters", &tags).finish()
	}
}

impl Validator {
	/// Validator with the built-in limiter tags
	pub fn new() -> Self {
		let limiters = builtin_factories().into_iter().map(|(tag, f)| (tag.into(), f)).collect();
		Self { limiters }
	}

	/// Registers a limiter tag, replacing an existing one of the same name
	pub fn register_limiter<F>(&mut self, tag: &str, factory: F)
	where
		F: Fn(&str) -> StResult<Arc<dyn Limiter>> + Send + Sync + 'static,
	{
		self.limiters.insert(tag.trim().to_ascii_lowercase().into(), Arc::new(factory));
	}

	pub fn has_limiter(&self, tag: &str) -> bool {
		self.limiters.contains_key(tag.trim().to_ascii_lowercase().as_str())
	}

	/// Compiles a `tag:args` constraint string
	pub fn compile(&self, constraint: &str) -> StResult<Arc<dyn Limiter>> {
		let (tag, args) = constraint.split_once(':').unwrap_or((constraint, ""));
		let tag = tag.trim().to_ascii_lowercase();
		let factory = self
			.limiters
			.get(tag.as_str())
			.ok_or_else(|| Error::Declaration(format!("unknown constraint tag '{}'", tag)))?;
		factory(args).map_err(|e| match e {
			Error::Declaration(msg) => Error::Declaration(format!("constraint '{}': {}", constraint, msg)),
			other => Error::Declaration(format!("constraint '{}': {}", constraint, other)),
		})
	}

	/// Parses text into a value of the given type
	pub fn parse(&self, text: &str, value_type: &ValueType) -> StResult<SettingValue> {
		let trimmed = text.trim();
		match value_type {
			ValueType::Bool => match trimmed.to_ascii_lowercase().as_str() {
				"true" | "on" | "yes" | "1" => Ok(SettingValue::Bool(true)),
				"false" | "off" | "no" | "0" => Ok(SettingValue::Bool(false)),
				_ => Err(Error::Parse(format!("'{}' is not a bool", text))),
			},
			ValueType::Byte | ValueType::Short | ValueType::Int | ValueType::Long => {
				let number = trimmed
					.parse::<i64>()
					.map_err(|_| Error::Parse(format!("'{}' is not an integer", text)))?;
				check_width(number, value_type)
			}
			ValueType::Float | ValueType::Double => {
				let number = trimmed
					.parse::<f64>()
					.map_err(|_| Error::Parse(format!("'{}' is not a number", text)))?;
				check_finite(number)
			}
			ValueType::String => Ok(SettingValue::String(text.to_string())),
			ValueType::Color => Color::parse(trimmed).map(SettingValue::Color),
			ValueType::Json => serde_json::from_str(trimmed)
				.map(SettingValue::Json)
				.map_err(|e| Error::Parse(format!("invalid json '{}': {}", text, e))),
			ValueType::Array(inner) => {
				if trimmed.starts_with('[') {
					let json: Value = serde_json::from_str(trimmed)
						.map_err(|e| Error::Parse(format!("invalid array '{}': {}", text, e)))?;
					return self.from_json(&json, value_type);
				}
				if trimmed.is_empty() {
					return Ok(SettingValue::Array(Vec::new()));
				}
				trimmed
					.split(',')
					.map(|item| self.parse(item.trim(), inner))
					.collect::<StResult<Vec<_>>>()
					.map(SettingValue::Array)
			}
		}
	}

	/// Converts plain JSON into a value of the given type.
	///
	/// Strings are re-parsed as text for non-string types.
	pub fn from_json(&self, json: &Value, value_type: &ValueType) -> StResult<SettingValue> {
		let mismatch = || Error::Parse(format!("cannot convert {} to {}", json, value_type));
		match (value_type, json) {
			(ValueType::Json, json) => Ok(SettingValue::Json(json.clone())),
			(ValueType::String, Value::String(s)) => Ok(SettingValue::String(s.clone())),
			(ValueType::String, Value::Number(n)) => Ok(SettingValue::String(n.to_string())),
			(ValueType::String, Value::Bool(b)) => Ok(SettingValue::String(b.to_string())),
			(_, Value::String(s)) => self.parse(s, value_type),
			(ValueType::Bool, Value::Bool(b)) => Ok(SettingValue::Bool(*b)),
			(t, Value::Number(n)) if t.is_integer() => {
				let number = n.as_i64().ok_or_else(mismatch)?;
				check_width(number, t)
			}
			(t, Value::Number(n)) if t.is_decimal() => check_finite(n.as_f64().ok_or_else(mismatch)?),
			(ValueType::Array(inner), Value::Array(items)) => items
				.iter()
				.map(|item| self.from_json(item, inner))
				.collect::<StResult<Vec<_>>>()
				.map(SettingValue::Array),
			_ => Err(mismatch()),
		}
	}

	/// Checks a value against a leaf's type and limiter.
	///
	/// Integers are widened for decimal leaves. Returns the accepted value.
	pub fn validate(&self, value: SettingValue, leaf: &LeafDecl) -> StResult<SettingValue> {
		let value = widen(value, leaf.value_type());
		if !value.matches_type(leaf.value_type()) {
			return Err(Error::Parse(format!(
				"expected {}, got {} value '{}'",
				leaf.value_type(),
				value.type_name(),
				value
			)));
		}
		if let Some(limiter) = leaf.limiter() {
			limiter.check(&value)?;
		}
		Ok(value)
	}

	/// Parses text for a leaf and checks its limiter
	pub fn parse_for(&self, text: &str, leaf: &LeafDecl) -> StResult<SettingValue> {
		let value = self.parse(text, leaf.value_type())?;
		self.validate(value, leaf)
	}

	/// Converts JSON for a leaf and checks its limiter
	pub fn coerce_for(&self, json: &Value, leaf: &LeafDecl) -> StResult<SettingValue> {
		let value = self.from_json(json, leaf.value_type())?;
		self.validate(value, leaf)
	}
}

fn check_width(number: i64, value_type: &ValueType) -> StResult<SettingValue> {
	match value_type.int_bounds() {
		Some((lo, hi)) if (lo..=hi).contains(&number) => Ok(SettingValue::Int(number)),
		_ => Err(Error::Parse(format!("{} is out of range for {}", number, value_type))),
	}
}

fn check_finite(number: f64) -> StResult<SettingValue> {
	if number.is_finite() {
		Ok(SettingValue::Float(number))
	} else {
		Err(Error::Parse(format!("{} is not a finite number", number)))
	}
}

#[allow(clippy::cast_precision_loss)]
fn widen(value: SettingValue, value_type: &ValueType) -> SettingValue {
	match (value, value_type) {
		(SettingValue::Int(i), t) if t.is_decimal() => SettingValue::Float(i as f64),
		(SettingValue::Array(items), ValueType::Array(inner)) => {
			SettingValue::Array(items.into_iter().map(|item| widen(item, inner)).collect())
		}
		(value, _) => value,
	}
}


// vim: ts=4
