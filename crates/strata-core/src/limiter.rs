//! Value limiters
//!
//! A limiter is compiled once from a `tag:args` constraint string when a
//! declaration is built, then checked on every write and on default parsing.

use std::fmt::Debug;
use std::sync::Arc;

use chrono::format::{Item, StrftimeItems};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;

use crate::prelude::*;

pub trait Limiter: Debug + Send + Sync {
	/// Checks a value of the leaf's declared type
	fn check(&self, value: &SettingValue) -> StResult<()>;
}

/// Builds a limiter from the argument part of a constraint string
pub type LimiterFactory = Arc<dyn Fn(&str) -> StResult<Arc<dyn Limiter>> + Send + Sync>;

/// Tags available in every validator
pub fn builtin_factories() -> Vec<(&'static str, LimiterFactory)> {
	vec![
		("range", factory(RangeLimiter::parse)),
		("enum", factory(EnumLimiter::parse)),
		("regex", factory(RegexLimiter::parse)),
		("format", factory(FormatLimiter::parse)),
	]
}

fn factory<L, F>(parse: F) -> LimiterFactory
where
	L: Limiter + 'static,
	F: Fn(&str) -> StResult<L> + Send + Sync + 'static,
{
	Arc::new(move |args: &str| parse(args).map(|limiter| Arc::new(limiter) as Arc<dyn Limiter>))
}

/// Inclusive numeric bounds, or length bounds for strings
#[derive(Debug, Clone, PartialEq)]
pub struct RangeLimiter {
	min: Option<f64>,
	max: Option<f64>,
}

impl RangeLimiter {
	pub fn new(min: Option<f64>, max: Option<f64>) -> Self {
		Self { min, max }
	}

	/// Parses `min,max`. Either bound may be left empty.
	pub fn parse(args: &str) -> StResult<Self> {
		let (min, max) = args
			.split_once(',')
			.ok_or_else(|| Error::Declaration(format!("range needs 'min,max', got '{}'", args)))?;
		let bound = |text: &str| -> StResult<Option<f64>> {
			let text = text.trim();
			if text.is_empty() {
				return Ok(None);
			}
			text.parse::<f64>()
				.map(Some)
				.map_err(|_| Error::Declaration(format!("invalid range bound '{}'", text)))
		};
		let (min, max) = (bound(min)?, bound(max)?);
		if let (Some(lo), Some(hi)) = (min, max)
			&& lo > hi
		{
			return Err(Error::Declaration(format!("empty range {},{}", lo, hi)));
		}
		Ok(Self { min, max })
	}

	fn check_number(&self, number: f64, shown: &dyn std::fmt::Display) -> StResult<()> {
		if let Some(min) = self.min
			&& number < min
		{
			return Err(Error::ConstraintViolation(format!(
				"value {} is below the minimum {}",
				shown, min
			)));
		}
		if let Some(max) = self.max
			&& number > max
		{
			return Err(Error::ConstraintViolation(format!(
				"value {} is above the maximum {}",
				shown, max
			)));
		}
		Ok(())
	}
}

impl Limiter for RangeLimiter {
	#[allow(clippy::cast_precision_loss)]
	fn check(&self, value: &SettingValue) -> StResult<()> {
		match value {
			SettingValue::Int(i) => self.check_number(*i as f64, i),
			SettingValue::Float(f) => self.check_number(*f, f),
			SettingValue::String(s) => {
				let len = s.chars().count();
				self.check_number(len as f64, &len).map_err(|_| {
					Error::ConstraintViolation(format!(
						"length {} of '{}' is outside {}..{}",
						len,
						s,
						self.min.map(|m| m.to_string()).unwrap_or_default(),
						self.max.map(|m| m.to_string()).unwrap_or_default()
					))
				})
			}
			SettingValue::Array(items) => items.iter().try_for_each(|item| self.check(item)),
			other => Err(Error::ConstraintViolation(format!(
				"range does not apply to {} values",
				other.type_name()
			))),
		}
	}
}

/// Enumerated set of allowed values, compared on their text form
#[derive(Debug, Clone, PartialEq)]
pub struct EnumLimiter {
	allowed: Vec<Box<str>>,
}

impl EnumLimiter {
	pub fn parse(args: &str) -> StResult<Self> {
		let allowed: Vec<Box<str>> =
			args.split(',').map(str::trim).filter(|s| !s.is_empty()).map(Into::into).collect();
		if allowed.is_empty() {
			return Err(Error::Declaration("enum needs at least one value".into()));
		}
		Ok(Self { allowed })
	}

	pub fn allowed(&self) -> &[Box<str>] {
		&self.allowed
	}
}

impl Limiter for EnumLimiter {
	fn check(&self, value: &SettingValue) -> StResult<()> {
		if let SettingValue::Array(items) = value {
			return items.iter().try_for_each(|item| self.check(item));
		}
		let text = value.to_string();
		if self.allowed.iter().any(|a| a.as_ref() == text) {
			Ok(())
		} else {
			Err(Error::ConstraintViolation(format!(
				"value '{}' is not one of [{}]",
				text,
				self.allowed.join(", ")
			)))
		}
	}
}

/// Full match of the value's text form against a pattern
#[derive(Debug, Clone)]
pub struct RegexLimiter {
	pattern: Box<str>,
	regex: Regex,
}

impl RegexLimiter {
	pub fn parse(pattern: &str) -> StResult<Self> {
		let regex = Regex::new(&format!("^(?:{})$", pattern))
			.map_err(|e| Error::Declaration(format!("invalid regex '{}': {}", pattern, e)))?;
		Ok(Self { pattern: pattern.into(), regex })
	}
}

impl Limiter for RegexLimiter {
	fn check(&self, value: &SettingValue) -> StResult<()> {
		if let SettingValue::Array(items) = value {
			return items.iter().try_for_each(|item| self.check(item));
		}
		let text = value.to_string();
		if self.regex.is_match(&text) {
			Ok(())
		} else {
			Err(Error::ConstraintViolation(format!(
				"value '{}' does not match pattern '{}'",
				text, self.pattern
			)))
		}
	}
}

/// Date, time or date-time in a chrono format
#[derive(Debug, Clone, PartialEq)]
pub struct FormatLimiter {
	pattern: Box<str>,
}

impl FormatLimiter {
	pub fn parse(pattern: &str) -> StResult<Self> {
		if pattern.trim().is_empty() || StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error)) {
			return Err(Error::Declaration(format!("invalid format pattern '{}'", pattern)));
		}
		Ok(Self { pattern: pattern.into() })
	}

	fn matches(&self, text: &str) -> bool {
		NaiveDateTime::parse_from_str(text, &self.pattern).is_ok()
			|| NaiveDate::parse_from_str(text, &self.pattern).is_ok()
			|| NaiveTime::parse_from_str(text, &self.pattern).is_ok()
	}
}

impl Limiter for FormatLimiter {
	fn check(&self, value: &SettingValue) -> StResult<()> {
		match value {
			SettingValue::String(text) if self.matches(text) => Ok(()),
			SettingValue::String(text) => Err(Error::ConstraintViolation(format!(
				"value '{}' does not match format '{}'",
				text, self.pattern
			))),
			SettingValue::Array(items) => items.iter().try_for_each(|item| self.check(item)),
			other => Err(Error::ConstraintViolation(format!(
				"format does not apply to {} values",
				other.type_name()
			))),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_range_is_inclusive() {
		let range = RangeLimiter::parse("1,10").unwrap();
		assert!(range.check(&SettingValue::Int(1)).is_ok());
		assert!(range.check(&SettingValue::Int(10)).is_ok());
		assert!(matches!(range.check(&SettingValue::Int(0)), Err(Error::ConstraintViolation(_))));
		assert!(matches!(range.check(&SettingValue::Int(11)), Err(Error::ConstraintViolation(_))));
	}

	#[test]
	fn test_range_open_bounds() {
		let range = RangeLimiter::parse(",0.5").unwrap();
		assert!(range.check(&SettingValue::Float(-1000.0)).is_ok());
		assert!(range.check(&SettingValue::Float(0.75)).is_err());
		assert!(RangeLimiter::parse("5").is_err());
		assert!(RangeLimiter::parse("10,1").is_err());
	}

	#[test]
	fn test_range_message_names_value() {
		let err = RangeLimiter::parse("1,10").unwrap().check(&SettingValue::Int(11)).unwrap_err();
		assert_eq!(err.to_string(), "constraint violation: value 11 is above the maximum 10");
	}

	#[test]
	fn test_range_on_strings_and_arrays() {
		let range = RangeLimiter::parse("2,3").unwrap();
		assert!(range.check(&"abc".into()).is_ok());
		assert!(range.check(&"a".into()).is_err());
		let items = SettingValue::Array(vec![SettingValue::Int(2), SettingValue::Int(4)]);
		assert!(range.check(&items).is_err());
		assert!(range.check(&SettingValue::Bool(true)).is_err());
	}

	#[test]
	fn test_enum_membership() {
		let limiter = EnumLimiter::parse("easy, normal,hard").unwrap();
		assert!(limiter.check(&"normal".into()).is_ok());
		assert!(limiter.check(&"Normal".into()).is_err());
		assert!(EnumLimiter::parse(" , ").is_err());
	}

	#[test]
	fn test_regex_full_match_and_message() {
		let limiter = RegexLimiter::parse("[a-z]+").unwrap();
		assert!(limiter.check(&"hello".into()).is_ok());
		let err = limiter.check(&"hello world".into()).unwrap_err();
		assert!(matches!(err, Error::ConstraintViolation(_)));
		assert!(err.to_string().contains("'hello world'"));
		assert!(RegexLimiter::parse("(").is_err());
	}

	#[test]
	fn test_format_accepts_dates_and_times() {
		let date = FormatLimiter::parse("%Y-%m-%d").unwrap();
		assert!(date.check(&"2024-02-29".into()).is_ok());
		assert!(date.check(&"2023-02-29".into()).is_err());
		let time = FormatLimiter::parse("%H:%M").unwrap();
		assert!(time.check(&"23:59".into()).is_ok());
		assert!(FormatLimiter::parse("%Q").is_err());
	}
}

// vim: ts=4
