use std::{
	collections::HashMap,
	sync::{Arc, PoisonError, RwLock},
};

use log::debug;
use typed_path::{Utf8UnixPath, Utf8UnixPathBuf};

use super::source::{rooted, SourceProvider};
use crate::{
	compiler::{Compilation, Compiler},
	core::{deps::content_hash, error::Result},
};

/// Compiled shaders keyed by root file, reused while none of their files changed.
///
/// A compilation remembers the hash of every text it was built from. It is reused only while
/// the provider still returns those exact texts, so the cache stays correct even without anyone
/// calling [`invalidate`](Self::invalidate). The watcher calling it just saves the hashing.
#[derive(Default)]
pub struct ShaderCache {
	entries: RwLock<HashMap<Utf8UnixPathBuf, Arc<Compilation>>>,
}

impl ShaderCache {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn get_or_compile(&self, compiler: &Compiler, root: &Utf8UnixPath) -> Result<Arc<Compilation>> {
		let root = rooted(root.as_str());

		let cached = self
			.entries
			.read()
			.unwrap_or_else(PoisonError::into_inner)
			.get(&root)
			.filter(|compilation| is_current(compiler.sources(), compilation))
			.cloned();

		if let Some(compilation) = cached {
			debug!("Cache hit for {}", root);
			return Ok(compilation);
		}

		debug!("Cache miss for {}", root);
		let compilation = Arc::new(compiler.compile(&root)?);

		self.entries
			.write()
			.unwrap_or_else(PoisonError::into_inner)
			.insert(root, compilation.clone());

		Ok(compilation)
	}

	/// Drops every entry that depends on `path`. Returns how many were dropped.
	pub fn invalidate(&self, path: &Utf8UnixPath) -> usize {
		let path = rooted(path.as_str());
		let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);

		let before = entries.len();
		entries.retain(|_, compilation| !compilation.dependencies.contents.contains_key(&path));
		before - entries.len()
	}

	pub fn len(&self) -> usize {
		self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

// Every file still reads as the text the compilation was built from
fn is_current(sources: &dyn SourceProvider, compilation: &Compilation) -> bool {
	compilation
		.dependencies
		.contents
		.iter()
		.all(|(path, hash)| sources.read(path).is_ok_and(|text| content_hash(&text) == *hash))
}

/*
--------------------------------------------------------------------------------
||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||
--------------------------------------------------------------------------------
*/
