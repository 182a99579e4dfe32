//! Setting declaration trees
//!
//! A component type declares a tree of settings once. Trees are immutable
//! after `build` and shared by every instance and every layer through
//! `Arc<ComponentDecl>`.

use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::limiter::Limiter;
use crate::prelude::*;
use crate::validator::Validator;

/// Root leaf every component carries, driving activation
pub const ON_SETTING: &str = "On";

/// Metadata of a leaf setting
pub struct LeafDecl {
	value_type: ValueType,
	default_expr: Option<Box<str>>,
	constraint: Option<Box<str>>,
	limiter: Option<Arc<dyn Limiter>>,
	default: OnceLock<Result<SettingValue, String>>,
}

impl fmt::Debug for LeafDecl {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("LeafDecl")
			.field("value_type", &self.value_type)
			.field("default_expr", &self.default_expr)
			.field("constraint", &self.constraint)
			.finish_non_exhaustive()
	}
}

impl LeafDecl {
	pub fn value_type(&self) -> &ValueType {
		&self.value_type
	}

	pub fn default_expr(&self) -> Option<&str> {
		self.default_expr.as_deref()
	}

	pub fn constraint(&self) -> Option<&str> {
		self.constraint.as_deref()
	}

	pub fn limiter(&self) -> Option<&dyn Limiter> {
		self.limiter.as_deref()
	}

	/// Parsed default, memoised on first use.
	///
	/// A missing or invalid default is `UnsetSetting`.
	pub fn default_value(&self, validator: &Validator) -> StResult<SettingValue> {
		let parsed = self.default.get_or_init(|| match &self.default_expr {
			Some(expr) => validator.parse_for(expr, self).map_err(|e| e.to_string()),
			None => Err("no default declared".into()),
		});
		parsed.clone().map_err(Error::UnsetSetting)
	}
}

#[derive(Debug)]
pub enum DeclKind {
	Leaf(LeafDecl),
	Branch(Vec<Declaration>),
}

#[derive(Debug)]
pub struct Declaration {
	name: Box<str>,
	description: Option<Box<str>>,
	kind: DeclKind,
}

impl Declaration {
	pub fn leaf(name: impl Into<String>, value_type: ValueType) -> DeclarationBuilder {
		DeclarationBuilder {
			name: name.into(),
			description: None,
			kind: BuilderKind::Leaf { value_type, default_expr: None, constraint: None },
			misuse: None,
		}
	}

	pub fn branch(name: impl Into<String>) -> DeclarationBuilder {
		DeclarationBuilder {
			name: name.into(),
			description: None,
			kind: BuilderKind::Branch(Vec::new()),
			misuse: None,
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn description(&self) -> Option<&str> {
		self.description.as_deref()
	}

	pub fn kind(&self) -> &DeclKind {
		&self.kind
	}

	pub fn is_leaf(&self) -> bool {
		matches!(self.kind, DeclKind::Leaf(_))
	}

	pub fn as_leaf(&self) -> Option<&LeafDecl> {
		match &self.kind {
			DeclKind::Leaf(leaf) => Some(leaf),
			DeclKind::Branch(_) => None,
		}
	}

	/// Declared children in declaration order
	pub fn children(&self) -> StResult<&[Declaration]> {
		match &self.kind {
			DeclKind::Branch(children) => Ok(children),
			DeclKind::Leaf(_) => Err(Error::NotABranch(self.name.to_string())),
		}
	}

	/// Case-insensitive child lookup
	pub fn child(&self, name: &str) -> Option<&Declaration> {
		match &self.kind {
			DeclKind::Branch(children) => find(children, name),
			DeclKind::Leaf(_) => None,
		}
	}
}

fn find<'a>(decls: &'a [Declaration], name: &str) -> Option<&'a Declaration> {
	decls.iter().find(|d| d.name.eq_ignore_ascii_case(name))
}

/// Checks a setting or instance name
pub fn validate_name(name: &str) -> StResult<()> {
	if name.is_empty()
		|| name.contains(strata_types::types::PATH_SEPARATOR)
		|| name.starts_with('$')
		|| name.chars().any(char::is_whitespace)
	{
		return Err(Error::Declaration(format!("invalid setting name '{}'", name)));
	}
	Ok(())
}

fn check_unique(decls: &[Declaration], parent: &str) -> StResult<()> {
	for (i, decl) in decls.iter().enumerate() {
		if decls[..i].iter().any(|d| d.name.eq_ignore_ascii_case(&decl.name)) {
			return Err(Error::Declaration(format!("duplicate setting '{}' in {}", decl.name, parent)));
		}
	}
	Ok(())
}

enum BuilderKind {
	Leaf { value_type: ValueType, default_expr: Option<String>, constraint: Option<String> },
	Branch(Vec<DeclarationBuilder>),
}

pub struct DeclarationBuilder {
	name: String,
	description: Option<String>,
	kind: BuilderKind,
	misuse: Option<String>,
}

impl DeclarationBuilder {
	pub fn description(mut self, description: impl Into<String>) -> Self {
		self.description = Some(description.into());
		self
	}

	/// Default expression, parsed lazily with the leaf's type
	pub fn default(mut self, expr: impl Into<String>) -> Self {
		match &mut self.kind {
			BuilderKind::Leaf { default_expr, .. } => *default_expr = Some(expr.into()),
			BuilderKind::Branch(_) => self.misuse = Some(format!("branch '{}' cannot have a default", self.name)),
		}
		self
	}

	/// Constraint in `tag:args` form
	pub fn constraint(mut self, constraint: impl Into<String>) -> Self {
		match &mut self.kind {
			BuilderKind::Leaf { constraint: c, .. } => *c = Some(constraint.into()),
			BuilderKind::Branch(_) => {
				self.misuse = Some(format!("branch '{}' cannot have a constraint", self.name));
			}
		}
		self
	}

	pub fn child(mut self, child: DeclarationBuilder) -> Self {
		match &mut self.kind {
			BuilderKind::Branch(children) => children.push(child),
			BuilderKind::Leaf { .. } => self.misuse = Some(format!("leaf '{}' cannot have children", self.name)),
		}
		self
	}

	pub fn build(self, validator: &Validator) -> StResult<Declaration> {
		if let Some(misuse) = self.misuse {
			return Err(Error::Declaration(misuse));
		}
		validate_name(&self.name)?;
		let kind = match self.kind {
			BuilderKind::Leaf { value_type, default_expr, constraint } => {
				let limiter = constraint.as_deref().map(|c| validator.compile(c)).transpose()?;
				DeclKind::Leaf(LeafDecl {
					value_type,
					default_expr: default_expr.map(Into::into),
					constraint: constraint.map(Into::into),
					limiter,
					default: OnceLock::new(),
				})
			}
			BuilderKind::Branch(children) => {
				let children =
					children.into_iter().map(|c| c.build(validator)).collect::<StResult<Vec<_>>>()?;
				check_unique(&children, &self.name)?;
				DeclKind::Branch(children)
			}
		};
		Ok(Declaration { name: self.name.into(), description: self.description.map(Into::into), kind })
	}
}

/// Declaration tree of one component type
#[derive(Debug)]
pub struct ComponentDecl {
	type_name: Box<str>,
	plugin: Box<str>,
	description: Option<Box<str>>,
	settings: Vec<Declaration>,
}

impl ComponentDecl {
	pub fn builder(type_name: impl Into<String>) -> ComponentDeclBuilder {
		ComponentDeclBuilder { type_name: type_name.into(), plugin: None, description: None, settings: Vec::new() }
	}

	pub fn type_name(&self) -> &str {
		&self.type_name
	}

	/// Persistence grouping this component's values are saved under
	pub fn plugin(&self) -> &str {
		&self.plugin
	}

	pub fn description(&self) -> Option<&str> {
		self.description.as_deref()
	}

	/// Top-level declarations, `On` first
	pub fn settings(&self) -> &[Declaration] {
		&self.settings
	}

	/// Resolves a path and returns it spelled as declared
	pub fn resolve(&self, path: &SettingPath) -> StResult<(SettingPath, &Declaration)> {
		let mut level = self.settings.as_slice();
		let mut canonical: Vec<&str> = Vec::with_capacity(path.len());
		let mut node: Option<&Declaration> = None;
		for segment in path.segments() {
			if let Some(parent) = node {
				level = parent.children().map_err(|_| {
					Error::InvalidPath(format!(
						"'{}' traverses the setting '{}' of {}",
						path,
						parent.name(),
						self.type_name
					))
				})?;
			}
			let found = find(level, segment).ok_or_else(|| {
				Error::InvalidPath(format!("'{}' is not a setting of {}", path, self.type_name))
			})?;
			canonical.push(found.name());
			node = Some(found);
		}
		let node = node.ok_or_else(|| Error::InvalidPath("empty setting path".into()))?;
		Ok((SettingPath::new(canonical)?, node))
	}

	pub fn resolve_node(&self, path: &SettingPath) -> StResult<&Declaration> {
		self.resolve(path).map(|(_, node)| node)
	}

	/// Resolves a path that must end in a leaf
	pub fn resolve_leaf(&self, path: &SettingPath) -> StResult<(SettingPath, &LeafDecl)> {
		let (canonical, node) = self.resolve(path)?;
		match node.as_leaf() {
			Some(leaf) => Ok((canonical, leaf)),
			None => Err(Error::InvalidPath(format!("'{}' of {} is a branch", canonical, self.type_name))),
		}
	}

	/// Children of a branch, or the top level for `None`
	pub fn children(&self, path: Option<&SettingPath>) -> StResult<&[Declaration]> {
		match path {
			None => Ok(&self.settings),
			Some(path) => {
				let (canonical, node) = self.resolve(path)?;
				node.children().map_err(|_| Error::NotABranch(format!("{} of {}", canonical, self.type_name)))
			}
		}
	}

	/// Every leaf in declaration order
	pub fn leaves(&self) -> Vec<(SettingPath, &LeafDecl)> {
		fn walk<'a>(decls: &'a [Declaration], prefix: Option<&SettingPath>, out: &mut Vec<(SettingPath, &'a LeafDecl)>) {
			for decl in decls {
				let path = match prefix {
					Some(prefix) => prefix.child(decl.name()),
					None => SettingPath::root(decl.name()),
				};
				match &decl.kind {
					DeclKind::Leaf(leaf) => out.push((path, leaf)),
					DeclKind::Branch(children) => walk(children, Some(&path), out),
				}
			}
		}
		let mut out = Vec::new();
		walk(&self.settings, None, &mut out);
		out
	}

	/// Parses every default, failing on the first unusable one
	pub fn verify_defaults(&self, validator: &Validator) -> StResult<()> {
		for (path, leaf) in self.leaves() {
			leaf.default_value(validator).map_err(|e| {
				let msg = match e {
					Error::UnsetSetting(msg) => msg,
					other => other.to_string(),
				};
				Error::Declaration(format!("default of {}.{}: {}", self.type_name, path, msg))
			})?;
		}
		Ok(())
	}
}

pub struct ComponentDeclBuilder {
	type_name: String,
	plugin: Option<String>,
	description: Option<String>,
	settings: Vec<DeclarationBuilder>,
}

impl ComponentDeclBuilder {
	/// Persistence grouping, defaults to the type name
	pub fn plugin(mut self, plugin: impl Into<String>) -> Self {
		self.plugin = Some(plugin.into());
		self
	}

	pub fn description(mut self, description: impl Into<String>) -> Self {
		self.description = Some(description.into());
		self
	}

	pub fn setting(mut self, setting: DeclarationBuilder) -> Self {
		self.settings.push(setting);
		self
	}

	pub fn build(self, validator: &Validator) -> StResult<ComponentDecl> {
		validate_name(&self.type_name)
			.map_err(|_| Error::Declaration(format!("invalid component type name '{}'", self.type_name)))?;
		let plugin = self.plugin.unwrap_or_else(|| self.type_name.clone());
		if plugin.is_empty() || !plugin.chars().all(|c| c.is_alphanumeric() || matches!(c, '-' | '_')) {
			return Err(Error::Declaration(format!("invalid plugin id '{}' for {}", plugin, self.type_name)));
		}

		let mut settings =
			self.settings.into_iter().map(|s| s.build(validator)).collect::<StResult<Vec<_>>>()?;
		check_unique(&settings, &self.type_name)?;

		match settings.iter().position(|d| d.name.eq_ignore_ascii_case(ON_SETTING)) {
			Some(pos) => {
				let on = settings.remove(pos);
				if on.as_leaf().is_none_or(|leaf| leaf.value_type != ValueType::Bool) {
					return Err(Error::Declaration(format!(
						"'{}' of {} must be a bool setting",
						ON_SETTING, self.type_name
					)));
				}
				settings.insert(0, on);
			}
			None => {
				let on = Declaration::leaf(ON_SETTING, ValueType::Bool)
					.description("Whether the component is active")
					.default("false")
					.build(validator)?;
				settings.insert(0, on);
			}
		}

		Ok(ComponentDecl {
			type_name: self.type_name.into(),
			plugin: plugin.into(),
			description: self.description.map(Into::into),
			settings,
		})
	}
}


// vim: ts=4
