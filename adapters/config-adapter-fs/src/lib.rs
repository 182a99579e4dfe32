//! Directory based config layer storage.
//!
//! Units are laid out as `<base_dir>/<layer>/<plugin>.json`. The temporary
//! layer lives in `<base_dir>/tmp` and is never reported by `list_layers`.

use std::{
	fs::{self, File, create_dir_all, remove_dir_all, remove_file, rename},
	io::{ErrorKind, Write},
	path::{Path, PathBuf},
};

use strata::{
	config_adapter::{ConfigAdapter, RawUnit},
	prelude::*,
	types::{TEMP_LAYER, validate_layer_name},
};

const UNIT_EXT: &str = "json";

/// Plugin ids become file names, so they are restricted to a safe alphabet
fn check_plugin_id(plugin: &str) -> StResult<()> {
	if plugin.is_empty()
		|| plugin.starts_with('.')
		|| !plugin.chars().all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.'))
	{
		Err(Error::Persistence(format!("invalid plugin id '{}'", plugin)))?;
	}
	Ok(())
}

/// Named layers are checked again here, the variant can be built without `Layer::named`
fn layer_dir(base_dir: &Path, layer: &Layer) -> StResult<PathBuf> {
	layer.validate()?;
	Ok(base_dir.join(layer.as_str()))
}

fn unit_path(base_dir: &Path, layer: &Layer, plugin: &str) -> StResult<PathBuf> {
	check_plugin_id(plugin)?;
	Ok(layer_dir(base_dir, layer)?.join(format!("{}.{}", plugin, UNIT_EXT)))
}

#[derive(Debug)]
pub struct ConfigAdapterFs {
	base_dir: Box<Path>,
}

impl ConfigAdapterFs {
	pub fn new(base_dir: Box<Path>) -> StResult<Self> {
		create_dir_all(&base_dir)?;
		Ok(Self { base_dir })
	}

	pub fn base_dir(&self) -> &Path {
		&self.base_dir
	}
}

impl ConfigAdapter for ConfigAdapterFs {
	fn read_unit(&self, layer: &Layer, plugin: &str) -> StResult<Option<RawUnit>> {
		let path = unit_path(&self.base_dir, layer, plugin)?;
		let text = match fs::read_to_string(&path) {
			Ok(text) => text,
			Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
			Err(e) => {
				return Err(Error::Persistence(format!("cannot read {:?}: {}", path, e)));
			}
		};
		match serde_json::from_str::<serde_json::Value>(&text) {
			Ok(serde_json::Value::Object(unit)) => Ok(Some(unit)),
			Ok(_) => Err(Error::Persistence(format!("{:?} does not hold a JSON object", path))),
			Err(e) => Err(Error::Persistence(format!("cannot parse {:?}: {}", path, e))),
		}
	}

	fn write_unit(&self, layer: &Layer, plugin: &str, unit: &RawUnit) -> StResult<()> {
		let path = unit_path(&self.base_dir, layer, plugin)?;
		if unit.is_empty() {
			match remove_file(&path) {
				Ok(()) => debug!("removed empty unit {:?}", path),
				Err(e) if e.kind() == ErrorKind::NotFound => {}
				Err(e) => Err(e)?,
			}
			return Ok(());
		}

		create_dir_all(layer_dir(&self.base_dir, layer)?)?;
		let tmp_path = path.with_extension(format!("{}.tmp", UNIT_EXT));
		let data = serde_json::to_vec_pretty(unit)?;

		let res = (|| {
			let mut file = File::create(&tmp_path)?;
			file.write_all(&data)?;
			file.sync_all()?;
			rename(&tmp_path, &path)?;
			Ok::<(), Error>(())
		})();
		if res.is_err() {
			info!("unit write failed, removing tmpfile: {:?}", &tmp_path);
			let _ = remove_file(&tmp_path);
		}
		res
	}

	fn list_plugins(&self, layer: &Layer) -> StResult<Vec<Box<str>>> {
		let dir = layer_dir(&self.base_dir, layer)?;
		let entries = match fs::read_dir(&dir) {
			Ok(entries) => entries,
			Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
			Err(e) => Err(e)?,
		};
		let mut plugins = Vec::new();
		for entry in entries {
			let path = entry?.path();
			if path.extension().and_then(|e| e.to_str()) != Some(UNIT_EXT) {
				continue;
			}
			if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
				plugins.push(stem.into());
			}
		}
		plugins.sort();
		Ok(plugins)
	}

	fn list_layers(&self) -> StResult<Vec<Box<str>>> {
		let mut layers = Vec::new();
		for entry in fs::read_dir(&self.base_dir)? {
			let entry = entry?;
			if !entry.file_type()?.is_dir() {
				continue;
			}
			let Some(name) = entry.file_name().to_str().map(str::to_string) else { continue };
			if name.eq_ignore_ascii_case(TEMP_LAYER) || validate_layer_name(&name).is_err() {
				continue;
			}
			layers.push(name.into());
		}
		layers.sort();
		Ok(layers)
	}

	fn delete_layer(&self, name: &str) -> StResult<()> {
		validate_layer_name(name)?;
		match remove_dir_all(self.base_dir.join(name)) {
			Ok(()) => {
				info!("deleted layer '{}'", name);
				Ok(())
			}
			Err(e) if e.kind() == ErrorKind::NotFound => Err(Error::UnknownLayer(name.to_string())),
			Err(e) => Err(e.into()),
		}
	}
}

#[cfg(test)]
mod test {
	use std::path::{Path, PathBuf};

	use crate::unit_path;
	use strata::types::Layer;

	#[test]
	fn test_unit_path() {
		let path = unit_path(Path::new("some_dir"), &Layer::Named("pvp".into()), "core")
			.unwrap_or_default();
		assert_eq!(path, PathBuf::from("some_dir/pvp/core.json"));
		let path = unit_path(Path::new("some_dir"), &Layer::Temporary, "core").unwrap_or_default();
		assert_eq!(path, PathBuf::from("some_dir/tmp/core.json"));
	}

	#[test]
	fn test_unit_path_rejects_traversal() {
		assert!(unit_path(Path::new("d"), &Layer::Temporary, "../x").is_err());
		assert!(unit_path(Path::new("d"), &Layer::Temporary, "").is_err());
	}

	#[test]
	fn test_unit_path_rejects_bad_named_layers() {
		assert!(unit_path(Path::new("d"), &Layer::Named("tmp".into()), "core").is_err());
		assert!(unit_path(Path::new("d"), &Layer::Named("../escaped".into()), "core").is_err());
		assert!(unit_path(Path::new("d"), &Layer::Named("a/b".into()), "core").is_err());
	}
}

// vim: ts=4
