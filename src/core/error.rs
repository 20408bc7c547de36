use std::io;

use derive_more::Display;
use typed_path::Utf8UnixPathBuf;

use super::{lexer::Position, shader::PropertyType};

/*
--------------------------------------------------------------------------------
||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||
--------------------------------------------------------------------------------
*/

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The scope a duplicated name was declared in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display)]
pub enum NameKind {
	#[display(fmt = "property")]
	Property,
	#[display(fmt = "Properties block")]
	PropertiesBlock,
	#[display(fmt = "GLSL block")]
	Block,
	#[display(fmt = "shared GLSL block")]
	SharedBlock,
	#[display(fmt = "technique")]
	Technique,
	#[display(fmt = "stage binding")]
	Stage,
	#[display(fmt = "uniform")]
	Uniform,
	#[display(fmt = "attribute stream")]
	Stream,
}

/// Everything that can abort a compile. All-or-nothing: the first error stops the parse of that
/// shader and no partial result is handed out.
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("{position}: {message}")]
	Lex { message: String, position: Position },

	#[error("{position}: expected {expected}, found {found}")]
	Syntax {
		expected: String,
		found: String,
		position: Position,
	},

	#[error("{position}: duplicate {kind} `{name}`")]
	DuplicateName {
		kind: NameKind,
		name: String,
		position: Position,
	},

	#[error("{position}: property `{name}` is declared as {expected} but its default is {found}")]
	TypeMismatch {
		name: String,
		expected: PropertyType,
		found: String,
		position: Position,
	},

	#[error("{position}: cannot infer the type of property `{name}` from its default value")]
	AmbiguousDefault { name: String, position: Position },

	#[error("{position}: included file `{path}` does not exist")]
	MissingInclude { path: Utf8UnixPathBuf, position: Position },

	#[error("{position}: cyclic include {}", chain_display(.chain))]
	CyclicInclude {
		chain: Vec<Utf8UnixPathBuf>,
		position: Position,
	},

	#[error("{position}: no GLSL block named `{name}`")]
	UnresolvedBlockReference { name: String, position: Position },

	#[error("{position}: no attribute stream named `{name}`")]
	UnresolvedStreamReference { name: String, position: Position },

	#[error("cannot read `{path}`")]
	Read {
		path: Utf8UnixPathBuf,
		#[source]
		source: io::Error,
	},

	#[error("invalid configuration: {message}")]
	Config { message: String },
}

fn chain_display(chain: &[Utf8UnixPathBuf]) -> String {
	chain.iter().map(|path| path.as_str()).collect::<Vec<_>>().join(" -> ")
}

impl Error {
	pub fn syntax(expected: impl Into<String>, found: impl Into<String>, position: Position) -> Self {
		Self::Syntax {
			expected: expected.into(),
			found: found.into(),
			position,
		}
	}

	pub fn position(&self) -> Option<&Position> {
		match self {
			Error::Lex { position, .. }
			| Error::Syntax { position, .. }
			| Error::DuplicateName { position, .. }
			| Error::TypeMismatch { position, .. }
			| Error::AmbiguousDefault { position, .. }
			| Error::MissingInclude { position, .. }
			| Error::CyclicInclude { position, .. }
			| Error::UnresolvedBlockReference { position, .. }
			| Error::UnresolvedStreamReference { position, .. } => Some(position),
			Error::Read { .. } | Error::Config { .. } => None,
		}
	}

	fn position_mut(&mut self) -> Option<&mut Position> {
		match self {
			Error::Lex { position, .. }
			| Error::Syntax { position, .. }
			| Error::DuplicateName { position, .. }
			| Error::TypeMismatch { position, .. }
			| Error::AmbiguousDefault { position, .. }
			| Error::MissingInclude { position, .. }
			| Error::CyclicInclude { position, .. }
			| Error::UnresolvedBlockReference { position, .. }
			| Error::UnresolvedStreamReference { position, .. } => Some(position),
			Error::Read { .. } | Error::Config { .. } => None,
		}
	}

	/// Rewrites the position carried by the error, if any.
	pub fn map_position(mut self, f: impl FnOnce(Position) -> Position) -> Self {
		if let Some(position) = self.position_mut() {
			*position = f(position.clone());
		}
		self
	}
}
