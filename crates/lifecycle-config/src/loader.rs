//! Multi-file configuration loading.
//!
//! The main file may name other files with `include`, either a single path or a
//! list. Paths resolve against the loader's base directory. Included files may not
//! include further files, and every top-level section must come from exactly one
//! file so merging never overrides a value.

use crate::{resolve_env_vars, Config, ConfigError};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

const INCLUDE_KEY: &str = "include";

/// A configuration file after environment resolution.
struct Fragment {
	path: PathBuf,
	text: String,
	table: toml::Table,
}

/// Loads a configuration file together with the files it includes.
pub struct ConfigLoader {
	base_path: PathBuf,
	/// Canonical paths read so far; reading one twice means a cycle.
	seen: HashSet<PathBuf>,
}

impl ConfigLoader {
	pub fn new(base_path: impl AsRef<Path>) -> Self {
		Self {
			base_path: base_path.as_ref().to_path_buf(),
			seen: HashSet::new(),
		}
	}

	/// Loads, merges and validates the configuration rooted at `config_path`.
	pub async fn load_config(
		&mut self,
		config_path: impl AsRef<Path>,
	) -> Result<Config, ConfigError> {
		let mut root = self.read_fragment(config_path.as_ref()).await?;
		let includes = take_includes(&mut root.table)?;
		if includes.is_empty() {
			return root.text.parse();
		}

		let mut origins: HashMap<String, PathBuf> = root
			.table
			.keys()
			.map(|section| (section.clone(), root.path.clone()))
			.collect();

		for include in includes {
			let fragment = self.read_fragment(&include).await?;
			if fragment.table.contains_key(INCLUDE_KEY) {
				return Err(ConfigError::Validation(format!(
					"Nested include in {} is not supported",
					fragment.path.display()
				)));
			}

			for (section, value) in fragment.table {
				if let Some(first) = origins.get(&section) {
					return Err(ConfigError::Validation(format!(
						"Duplicate section '{}' found in {} and {}",
						section,
						first.display(),
						fragment.path.display()
					)));
				}
				origins.insert(section.clone(), fragment.path.clone());
				root.table.insert(section, value);
			}
		}

		toml::to_string(&root.table)
			.map_err(|e| ConfigError::Parse(format!("Failed to serialize merged config: {}", e)))?
			.parse()
	}

	async fn read_fragment(&mut self, path: &Path) -> Result<Fragment, ConfigError> {
		let path = if path.is_absolute() {
			path.to_path_buf()
		} else {
			self.base_path.join(path)
		};

		let canonical = tokio::fs::canonicalize(&path).await.map_err(|e| {
			ConfigError::Io(std::io::Error::new(
				e.kind(),
				format!("Configuration file not found: {} ({})", path.display(), e),
			))
		})?;
		if !self.seen.insert(canonical.clone()) {
			return Err(ConfigError::Validation(format!(
				"Circular include: {} was already loaded",
				canonical.display()
			)));
		}

		let text = resolve_env_vars(&tokio::fs::read_to_string(&canonical).await?)?;
		let table: toml::Table = toml::from_str(&text)?;
		Ok(Fragment { path, text, table })
	}
}

/// Removes the include directive from a table and returns the paths it names.
fn take_includes(table: &mut toml::Table) -> Result<Vec<PathBuf>, ConfigError> {
	match table.remove(INCLUDE_KEY) {
		None => Ok(Vec::new()),
		Some(toml::Value::String(path)) => Ok(vec![PathBuf::from(path)]),
		Some(toml::Value::Array(items)) => items
			.into_iter()
			.map(|item| match item {
				toml::Value::String(path) => Ok(PathBuf::from(path)),
				_ => Err(ConfigError::Validation(
					"include list must contain only strings".into(),
				)),
			})
			.collect(),
		Some(_) => Err(ConfigError::Validation(
			"include must be a string or a list of strings".into(),
		)),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::fs;
	use tempfile::TempDir;

	#[tokio::test]
	async fn test_single_file_config() {
		let temp_dir = TempDir::new().unwrap();
		let config_path = temp_dir.path().join("config.toml");
		fs::write(
			&config_path,
			r#"
[service]
id = "lifecycle-test"

[storage]
primary = "memory"
[storage.implementations.memory]

[scanner]
interval_seconds = 5
"#,
		)
		.unwrap();

		let mut loader = ConfigLoader::new(temp_dir.path());
		let config = loader.load_config(&config_path).await.unwrap();

		assert_eq!(config.service.id, "lifecycle-test");
		assert_eq!(config.scanner.interval_seconds, 5);
	}

	#[tokio::test]
	async fn test_config_with_includes() {
		let temp_dir = TempDir::new().unwrap();
		fs::write(
			temp_dir.path().join("main.toml"),
			r#"
include = ["storage.toml", "timeouts.toml"]

[service]
id = "lifecycle-test"
"#,
		)
		.unwrap();
		fs::write(
			temp_dir.path().join("storage.toml"),
			r#"
[storage]
primary = "file"
[storage.implementations.file]
storage_path = "/tmp/lifecycle"
"#,
		)
		.unwrap();
		fs::write(
			temp_dir.path().join("timeouts.toml"),
			r#"
[timeouts]
payment_timeout_minutes = 15
processing_timeout_hours = 24
"#,
		)
		.unwrap();

		let mut loader = ConfigLoader::new(temp_dir.path());
		let config = loader.load_config("main.toml").await.unwrap();

		assert_eq!(config.storage.primary, "file");
		assert_eq!(config.timeouts.payment_timeout_minutes, 15);
		assert_eq!(config.timeouts.processing_timeout_hours, 24);
	}

	#[tokio::test]
	async fn test_duplicate_section_error() {
		let temp_dir = TempDir::new().unwrap();
		fs::write(
			temp_dir.path().join("main.toml"),
			r#"
include = ["duplicate.toml"]

[service]
id = "lifecycle-test"
"#,
		)
		.unwrap();
		fs::write(
			temp_dir.path().join("duplicate.toml"),
			r#"
[service]
id = "another"
"#,
		)
		.unwrap();

		let mut loader = ConfigLoader::new(temp_dir.path());
		let error_msg = loader
			.load_config("main.toml")
			.await
			.unwrap_err()
			.to_string();
		assert!(error_msg.contains("Duplicate section 'service'"));
	}

	#[tokio::test]
	async fn test_self_include_detection() {
		let temp_dir = TempDir::new().unwrap();
		fs::write(
			temp_dir.path().join("self.toml"),
			r#"
include = ["self.toml"]

[service]
id = "lifecycle-test"
"#,
		)
		.unwrap();

		let mut loader = ConfigLoader::new(temp_dir.path());
		let error_msg = loader
			.load_config("self.toml")
			.await
			.unwrap_err()
			.to_string();
		assert!(error_msg.contains("already loaded"));
	}

	#[tokio::test]
	async fn test_nested_include_rejected() {
		let temp_dir = TempDir::new().unwrap();
		fs::write(
			temp_dir.path().join("main.toml"),
			"include = [\"scanner.toml\"]\n[service]\nid = \"x\"\n",
		)
		.unwrap();
		fs::write(
			temp_dir.path().join("scanner.toml"),
			"include = [\"other.toml\"]\n[scanner]\ninterval_seconds = 5\n",
		)
		.unwrap();

		let mut loader = ConfigLoader::new(temp_dir.path());
		let error_msg = loader
			.load_config("main.toml")
			.await
			.unwrap_err()
			.to_string();
		assert!(error_msg.contains("Nested include"));
	}

	#[tokio::test]
	async fn test_missing_include_reported() {
		let temp_dir = TempDir::new().unwrap();
		fs::write(
			temp_dir.path().join("main.toml"),
			"include = \"absent.toml\"\n[service]\nid = \"x\"\n",
		)
		.unwrap();

		let mut loader = ConfigLoader::new(temp_dir.path());
		assert!(matches!(
			loader.load_config("main.toml").await,
			Err(ConfigError::Io(_))
		));
	}
}
