use std::process::ExitCode;
use std::sync::Arc;
use std::{env, path};

use serde_json::{Map, Value};
use strata_config_adapter_fs::ConfigAdapterFs;
use strata_core::prelude::*;
use strata_core::{SettingsEngine, command, schema};

pub struct Config {
	pub schema_file: path::PathBuf,
	pub data_dir: path::PathBuf,
	/// Highest precedence first
	pub layers: Vec<String>,
}

impl Config {
	fn from_env() -> Self {
		let layers = env::var("STRATA_LAYERS")
			.map(|layers| {
				layers.split(',').map(str::trim).filter(|l| !l.is_empty()).map(ToString::to_string).collect()
			})
			.unwrap_or_default();
		Config {
			schema_file: path::PathBuf::from(env::var("STRATA_SCHEMA").unwrap_or_else(|_| "./schema.yaml".into())),
			data_dir: path::PathBuf::from(env::var("STRATA_DIR").unwrap_or_else(|_| "./data".into())),
			layers,
		}
	}
}

fn open_engine(config: &Config) -> StResult<SettingsEngine> {
	let adapter = ConfigAdapterFs::new(config.data_dir.clone().into_boxed_path())?;
	let mut engine =
		SettingsEngine::builder().adapter(Arc::new(adapter)).active_layers(config.layers.iter().cloned()).build()?;
	schema::load_schema_file(&mut engine, &config.schema_file)?;
	Ok(engine)
}

fn import_file(engine: &mut SettingsEngine, file: &str) -> StResult<String> {
	let text = std::fs::read_to_string(file)?;
	let input: Map<String, Value> = serde_json::from_str(&text)
		.map_err(|e| Error::Parse(format!("{}: {}", file, e)))?;
	engine.import_settings(&input)?;
	Ok(format!("imported {} instances", input.len()))
}

fn run(args: &[&str]) -> StResult<String> {
	let config = Config::from_env();
	let mut engine = open_engine(&config)?;
	let out = match args {
		["--reload"] => {
			engine.reload()?;
			"reloaded".to_string()
		}
		["--import", file] => import_file(&mut engine, file)?,
		["--layers"] => engine.list_layers()?.join("\n"),
		args => command::execute(&mut engine, args)?,
	};
	engine.run_deferred();
	Ok(out)
}

fn main() -> ExitCode {
	tracing_subscriber::fmt()
		.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
		.with_target(false)
		.with_writer(std::io::stderr)
		.init();

	let args: Vec<String> = env::args().skip(1).collect();
	let args: Vec<&str> = args.iter().map(String::as_str).collect();
	match run(&args) {
		Ok(out) => {
			let out = out.trim_end();
			if !out.is_empty() {
				println!("{}", out);
			}
			ExitCode::SUCCESS
		}
		Err(e) => {
			eprintln!("error: {}: {}", e.kind(), e);
			ExitCode::FAILURE
		}
	}
}

// vim: ts=4
