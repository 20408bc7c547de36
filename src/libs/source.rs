use std::{
	collections::HashMap,
	fs,
	io,
	path::PathBuf,
	sync::{
		atomic::{AtomicU64, Ordering},
		Arc,
		PoisonError,
		RwLock,
	},
	time::{Duration, SystemTime, UNIX_EPOCH},
};

use log::debug;
use typed_path::{Utf8UnixPath, Utf8UnixPathBuf};

/*
--------------------------------------------------------------------------------
||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||
--------------------------------------------------------------------------------
*/

/// Turns any path into the canonical form used as a file's identity: absolute, with `.` and `..`
/// resolved lexically.
pub fn rooted(path: &str) -> Utf8UnixPathBuf {
	Utf8UnixPath::new("/").join(path).normalize()
}

/// Where shader sources come from. Paths are always [`rooted`].
pub trait SourceProvider: Send + Sync {
	fn read(&self, path: &Utf8UnixPath) -> io::Result<String>;

	fn modified(&self, path: &Utf8UnixPath) -> io::Result<SystemTime>;
}

impl<P: SourceProvider + ?Sized> SourceProvider for Arc<P> {
	fn read(&self, path: &Utf8UnixPath) -> io::Result<String> {
		(**self).read(path)
	}

	fn modified(&self, path: &Utf8UnixPath) -> io::Result<SystemTime> {
		(**self).modified(path)
	}
}

fn not_found(path: &Utf8UnixPath) -> io::Error {
	io::Error::new(io::ErrorKind::NotFound, format!("no such file: {}", path))
}

/*
--------------------------------------------------------------------------------
||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||
--------------------------------------------------------------------------------
*/

/// Sources on disk under a root directory; `/a/b.glsl` is `<root>/a/b.glsl`.
#[derive(Clone, Debug)]
pub struct Directory {
	root: PathBuf,
}

impl Directory {
	pub fn new(root: impl Into<PathBuf>) -> Self {
		Self { root: root.into() }
	}

	fn resolve(&self, path: &Utf8UnixPath) -> PathBuf {
		let relative = rooted(path.as_str());
		self.root.join(relative.as_str().trim_start_matches('/'))
	}
}

impl SourceProvider for Directory {
	fn read(&self, path: &Utf8UnixPath) -> io::Result<String> {
		fs::read_to_string(self.resolve(path))
	}

	fn modified(&self, path: &Utf8UnixPath) -> io::Result<SystemTime> {
		fs::metadata(self.resolve(path))?.modified()
	}
}

/// A trait-object-safe version of rust_embed::Embed
pub trait Assets: Send + Sync {
	fn get(&self, file_path: &str) -> Option<rust_embed::EmbeddedFile>;
}

impl<T: rust_embed::Embed + Send + Sync> Assets for T {
	fn get(&self, file_path: &str) -> Option<rust_embed::EmbeddedFile> {
		<Self as rust_embed::Embed>::get(file_path)
	}
}

/// Sources compiled into the binary with `#[derive(Embed)]`. Use `#[prefix = "/"]` so embedded
/// names line up with rooted paths.
pub struct Embedded<A: Assets>(pub A);

impl<A: Assets> Embedded<A> {
	fn file(&self, path: &Utf8UnixPath) -> io::Result<rust_embed::EmbeddedFile> {
		self.0.get(path.as_str()).ok_or_else(|| not_found(path))
	}
}

impl<A: Assets> SourceProvider for Embedded<A> {
	fn read(&self, path: &Utf8UnixPath) -> io::Result<String> {
		String::from_utf8(self.file(path)?.data.into_owned())
			.map_err(|_| io::Error::new(io::ErrorKind::InvalidData, format!("invalid UTF-8 in {}", path)))
	}

	fn modified(&self, path: &Utf8UnixPath) -> io::Result<SystemTime> {
		let seconds = self.file(path)?.metadata.last_modified().unwrap_or_default();
		Ok(UNIX_EPOCH + Duration::from_secs(seconds))
	}
}

/// In-memory sources. Every insert bumps a revision counter that stands in for the file's
/// modification time.
#[derive(Debug, Default)]
pub struct MemorySources {
	files: RwLock<HashMap<Utf8UnixPathBuf, (String, u64)>>,
	revision: AtomicU64,
}

impl MemorySources {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn insert(&self, path: &str, text: impl Into<String>) {
		let revision = self.revision.fetch_add(1, Ordering::Relaxed) + 1;
		self.files
			.write()
			.unwrap_or_else(PoisonError::into_inner)
			.insert(rooted(path), (text.into(), revision));
	}

	pub fn remove(&self, path: &str) {
		self.files
			.write()
			.unwrap_or_else(PoisonError::into_inner)
			.remove(&rooted(path));
	}

	fn with_file<T>(&self, path: &Utf8UnixPath, f: impl FnOnce(&(String, u64)) -> T) -> io::Result<T> {
		let files = self.files.read().unwrap_or_else(PoisonError::into_inner);
		files.get(&rooted(path.as_str())).map(f).ok_or_else(|| not_found(path))
	}
}

impl SourceProvider for MemorySources {
	fn read(&self, path: &Utf8UnixPath) -> io::Result<String> {
		self.with_file(path, |(text, _)| text.clone())
	}

	fn modified(&self, path: &Utf8UnixPath) -> io::Result<SystemTime> {
		self.with_file(path, |(_, revision)| UNIX_EPOCH + Duration::from_nanos(*revision))
	}
}

/*
--------------------------------------------------------------------------------
||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||
--------------------------------------------------------------------------------
*/

/// One loaded source file. Never changes once read; a newer version is a new `SourceFile`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceFile {
	pub path: Utf8UnixPathBuf,
	pub text: String,
	pub modified: SystemTime,
}

/// Read-mostly cache of file contents in front of another provider.
///
/// A cached file is served as long as the underlying provider reports the same modification
/// time for it. Compilations running in parallel share one cache.
pub struct SourceCache<P> {
	provider: P,
	files: RwLock<HashMap<Utf8UnixPathBuf, Arc<SourceFile>>>,
}

impl<P: SourceProvider> SourceCache<P> {
	pub fn new(provider: P) -> Self {
		Self {
			provider,
			files: RwLock::new(HashMap::new()),
		}
	}

	pub fn provider(&self) -> &P {
		&self.provider
	}

	pub fn file(&self, path: &Utf8UnixPath) -> io::Result<Arc<SourceFile>> {
		let path = rooted(path.as_str());
		let modified = self.provider.modified(&path)?;

		let cached = self
			.files
			.read()
			.unwrap_or_else(PoisonError::into_inner)
			.get(&path)
			.filter(|file| file.modified == modified)
			.cloned();

		if let Some(file) = cached {
			return Ok(file);
		}

		debug!("Reading {}", path);
		let file = Arc::new(SourceFile {
			text: self.provider.read(&path)?,
			path: path.clone(),
			modified,
		});

		self.files
			.write()
			.unwrap_or_else(PoisonError::into_inner)
			.insert(path, file.clone());

		Ok(file)
	}

	pub fn invalidate(&self, path: &Utf8UnixPath) {
		self.files
			.write()
			.unwrap_or_else(PoisonError::into_inner)
			.remove(&rooted(path.as_str()));
	}

	pub fn len(&self) -> usize {
		self.files.read().unwrap_or_else(PoisonError::into_inner).len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

impl<P: SourceProvider> SourceProvider for SourceCache<P> {
	fn read(&self, path: &Utf8UnixPath) -> io::Result<String> {
		self.file(path).map(|file| file.text.clone())
	}

	fn modified(&self, path: &Utf8UnixPath) -> io::Result<SystemTime> {
		self.provider.modified(path)
	}
}

/*
--------------------------------------------------------------------------------
||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||
--------------------------------------------------------------------------------
*/
