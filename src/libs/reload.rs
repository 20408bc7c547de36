use std::sync::{PoisonError, RwLock};

use log::{error, info};
use typed_path::{Utf8UnixPath, Utf8UnixPathBuf};

use super::{handle::Handle, source::rooted};
use crate::{
	compiler::{Compilation, Compiler},
	core::error::{Error, Result},
};

/// What a change notification did to a [`HotShader`].
#[derive(Debug)]
pub enum Reload {
	/// None of the changed files is a dependency.
	Unaffected,
	Reloaded(Handle<Compilation>),
	/// Another reload swapped in a compilation first; this one was dropped.
	Superseded,
	/// The new version does not compile; the previous one stays active.
	Failed(Error),
}

/// A compiled shader that follows changes to its files.
///
/// The active compilation is only ever replaced by a complete, successful compile, and only if
/// nobody replaced it since the reload started.
pub struct HotShader {
	root: Utf8UnixPathBuf,
	active: RwLock<Handle<Compilation>>,
}

impl HotShader {
	pub fn load(compiler: &Compiler, root: &Utf8UnixPath) -> Result<Self> {
		let root = rooted(root.as_str());
		let compilation = compiler.compile(&root)?;

		Ok(Self {
			root,
			active: RwLock::new(Handle::new(compilation)),
		})
	}

	pub fn root(&self) -> &Utf8UnixPath {
		&self.root
	}

	pub fn current(&self) -> Handle<Compilation> {
		self.active.read().unwrap_or_else(PoisonError::into_inner).clone()
	}

	pub fn on_change<'a>(&self, compiler: &Compiler, changed: impl IntoIterator<Item = &'a Utf8UnixPath>) -> Reload {
		let started_from = self.current();
		if !started_from.dependencies.affects(changed) {
			return Reload::Unaffected;
		}

		match compiler.compile(&self.root) {
			Ok(compilation) => self.swap(&started_from, Handle::new(compilation)),
			Err(err) => {
				error!("Reloading {} failed, keeping the previous version: {}", self.root, err);
				Reload::Failed(err)
			}
		}
	}

	/// Makes `next` active if `expected` still is.
	pub fn swap(&self, expected: &Handle<Compilation>, next: Handle<Compilation>) -> Reload {
		let mut active = self.active.write().unwrap_or_else(PoisonError::into_inner);
		if !active.same(expected) {
			return Reload::Superseded;
		}

		*active = next.clone();
		info!("Reloaded {}", self.root);
		Reload::Reloaded(next)
	}
}
