use std::{fs, path::Path};

use hashlink::LinkedHashMap;
use serde::{Deserialize, Serialize};

use crate::core::error::{Error, Result};

/// How compiled stages point back at their source files.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineDirectives {
	/// `#line 12 3`, with the file's index in [`CompiledStage::files`](crate::core::linker::CompiledStage).
	#[default]
	Numeric,
	/// `#line 12 "/path/to/file.glsl"`, for compilers that understand cpp-style line directives.
	Quoted,
	None,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
	/// Used when none of a stage's sources declares a `#version`.
	pub default_version: String,
	/// Emitted as `#define KEY VALUE` after the version line of every stage.
	pub defines: LinkedHashMap<String, String>,
	pub line_directives: LineDirectives,
}

impl Default for CompilerConfig {
	fn default() -> Self {
		Self {
			default_version: "330 core".to_owned(),
			defines: LinkedHashMap::new(),
			line_directives: LineDirectives::default(),
		}
	}
}

impl CompilerConfig {
	pub fn from_ron(text: &str) -> Result<Self> {
		ron::from_str(text).map_err(|err| Error::Config {
			message: err.to_string(),
		})
	}

	pub fn load(path: impl AsRef<Path>) -> Result<Self> {
		let path = path.as_ref();
		let text = fs::read_to_string(path).map_err(|err| Error::Config {
			message: format!("{}: {}", path.display(), err),
		})?;

		Self::from_ron(&text)
	}

	pub fn define(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.defines.insert(key.into(), value.into());
		self
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn missing_fields_take_defaults() {
		let config = CompilerConfig::from_ron("(line_directives: Quoted)").unwrap();
		assert_eq!(config.default_version, "330 core");
		assert_eq!(config.line_directives, LineDirectives::Quoted);
		assert!(config.defines.is_empty());
	}

	#[test]
	fn defines_keep_their_order() {
		let config = CompilerConfig::from_ron(r#"(defines: {"B": "2", "A": "1"}, default_version: "450")"#).unwrap();
		let keys: Vec<_> = config.defines.keys().map(String::as_str).collect();

		assert_eq!(keys, vec!["B", "A"]);
		assert_eq!(config.default_version, "450");
	}

	#[test]
	fn malformed_config() {
		assert!(matches!(CompilerConfig::from_ron("(defines: 3)"), Err(Error::Config { .. })));
	}
}
