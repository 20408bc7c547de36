//! Compiles Scribble shader assets (and OGSFX effect files) into one GLSL source per technique,
//! pass and pipeline stage.

pub mod compiler;
pub mod core;
pub mod libs;

pub use compiler::{compile_many, Compilation, Compiler, Dialect};
pub use crate::core::{
	error::{Error, Result},
	linker::{CompiledShader, CompiledStage, StageKey},
	shader::Shader,
};
pub use libs::{
	config::CompilerConfig,
	source::{Directory, MemorySources, SourceProvider},
};
