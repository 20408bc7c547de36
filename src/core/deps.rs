use std::{
	collections::hash_map::DefaultHasher,
	hash::{Hash, Hasher},
};

use hashlink::{LinkedHashMap, LinkedHashSet};
use typed_path::{Utf8UnixPath, Utf8UnixPathBuf};

use super::lexer::SourcePath;

/*
--------------------------------------------------------------------------------
||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||
--------------------------------------------------------------------------------
*/

/// Hash of a source text, as recorded when the text is read for a compile.
pub fn content_hash(text: &str) -> u64 {
	let mut hasher = DefaultHasher::new();
	text.hash(&mut hasher);
	hasher.finish()
}

/// `includer` pulled in `included` with the directive on `line`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct IncludeEdge {
	pub includer: SourcePath,
	pub included: SourcePath,
	pub line: u32,
}

/// The include graph of one root file, for whoever watches files for changes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DependencyGraph {
	pub root: SourcePath,
	pub edges: Vec<IncludeEdge>,
	/// [`content_hash`] of every file as it was read, in read order.
	pub contents: LinkedHashMap<Utf8UnixPathBuf, u64>,
}

impl DependencyGraph {
	pub fn new(root: SourcePath) -> Self {
		Self {
			root,
			edges: Vec::new(),
			contents: LinkedHashMap::new(),
		}
	}

	pub fn extend(&mut self, edges: impl IntoIterator<Item = IncludeEdge>) {
		self.edges.extend(edges);
	}

	/// Remembers what was read. A file read more than once keeps the hash of its first read.
	pub fn record_contents(&mut self, contents: impl IntoIterator<Item = (SourcePath, u64)>) {
		for (path, hash) in contents {
			if !self.contents.contains_key(&*path) {
				self.contents.insert(path.to_path_buf(), hash);
			}
		}
	}

	/// The root and every file it transitively includes, each once, in the order first reached.
	pub fn dependencies(&self) -> LinkedHashSet<Utf8UnixPathBuf> {
		let mut seen = LinkedHashSet::new();
		self.visit(&self.root, &mut seen);
		seen
	}

	fn visit(&self, file: &Utf8UnixPath, seen: &mut LinkedHashSet<Utf8UnixPathBuf>) {
		// `insert` would move an already seen file to the back
		if seen.contains(&file.to_path_buf()) {
			return;
		}
		seen.insert(file.to_path_buf());

		for edge in self.edges.iter().filter(|edge| edge.includer.as_path() == file) {
			self.visit(&edge.included, seen);
		}
	}

	/// Files that directly include `path`.
	pub fn includers_of(&self, path: &Utf8UnixPath) -> LinkedHashSet<Utf8UnixPathBuf> {
		let mut includers = LinkedHashSet::new();
		for edge in self.edges.iter().filter(|edge| edge.included.as_path() == path) {
			if !includers.contains(&*edge.includer) {
				includers.insert(edge.includer.to_path_buf());
			}
		}
		includers
	}

	/// Whether a change to any of `paths` means the root has to be rebuilt.
	pub fn affects<'a>(&self, paths: impl IntoIterator<Item = &'a Utf8UnixPath>) -> bool {
		let dependencies = self.dependencies();
		paths.into_iter().any(|path| dependencies.contains(&path.to_path_buf()))
	}
}

/*
--------------------------------------------------------------------------------
||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||
--------------------------------------------------------------------------------
*/
