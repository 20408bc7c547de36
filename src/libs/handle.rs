use std::{
	fmt::{self, Debug},
	ops::Deref,
	sync::Arc,
};

/// Shared reference to a compilation whose identity, not value, tells versions apart.
///
/// The hot reloader compares the active handle with the one a reload started from to find out
/// whether another reload got there first.
pub struct Handle<T>(Arc<T>);

impl<T> Handle<T> {
	pub fn new(data: T) -> Self {
		Self(Arc::new(data))
	}

	/// Whether both handles point at the same allocation.
	pub fn same(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.0, &other.0)
	}
}

impl<T> Clone for Handle<T> {
	fn clone(&self) -> Self {
		Self(self.0.clone())
	}
}

impl<T: Debug> Debug for Handle<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_tuple("Handle").field(&*self.0).finish()
	}
}

impl<T> Deref for Handle<T> {
	type Target = T;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
