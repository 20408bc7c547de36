use std::sync::Arc;

use bevy_tasks::{ComputeTaskPool, TaskPool};
use log::{debug, info};
use typed_path::{Utf8UnixPath, Utf8UnixPathBuf};

use crate::{
	core::{
		deps::{content_hash, DependencyGraph},
		error::{Error, Result},
		include,
		lexer::SourcePath,
		linker::{self, CompiledShader},
		ogsfx,
		parser,
		shader::Shader,
	},
	libs::{
		config::CompilerConfig,
		source::{rooted, SourceProvider},
	},
};

/*
--------------------------------------------------------------------------------
||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||
--------------------------------------------------------------------------------
*/

/// Which front end reads a file, decided by its extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dialect {
	Scribble,
	Ogsfx,
}

impl Dialect {
	pub fn from_path(path: &Utf8UnixPath) -> Self {
		match path.extension() {
			Some("ogsfx") => Dialect::Ogsfx,
			_ => Dialect::Scribble,
		}
	}
}

/// Everything one compile produces.
#[derive(Clone, Debug, PartialEq)]
pub struct Compilation {
	pub shader: Shader,
	pub stages: CompiledShader,
	pub dependencies: DependencyGraph,
}

/// Parses, expands and links shaders read from a [`SourceProvider`].
///
/// A compiler holds no state between compiles besides its configuration, so one can be shared
/// by any number of threads.
#[derive(Clone)]
pub struct Compiler {
	sources: Arc<dyn SourceProvider>,
	config: CompilerConfig,
}

impl Compiler {
	pub fn new(sources: impl SourceProvider + 'static) -> Self {
		Self {
			sources: Arc::new(sources),
			config: CompilerConfig::default(),
		}
	}

	pub fn with_config(mut self, config: CompilerConfig) -> Self {
		self.config = config;
		self
	}

	pub fn sources(&self) -> &dyn SourceProvider {
		&*self.sources
	}

	/// Parses `root` and expands every include in it, without linking.
	pub fn parse(&self, root: &Utf8UnixPath) -> Result<(Shader, DependencyGraph)> {
		let path: SourcePath = Arc::new(rooted(root.as_str()));
		let mut graph = DependencyGraph::new(path.clone());

		let shader = match Dialect::from_path(&path) {
			Dialect::Scribble => {
				let text = self.sources.read(&path).map_err(|source| Error::Read {
					path: path.to_path_buf(),
					source,
				})?;
				graph.record_contents([(path.clone(), content_hash(&text))]);

				let mut shader = parser::parse_str(path.clone(), &text)?;
				for block in shader.all_blocks_mut() {
					let mut visited = vec![path.clone()];
					let expansion =
						include::expand_source(self.sources(), &path, &block.body, block.position.line, &mut visited)?;

					graph.extend(expansion.edges);
					graph.record_contents(expansion.contents);
					block.expanded = expansion.source;
				}
				shader
			}
			Dialect::Ogsfx => {
				let expansion = include::expand(self.sources(), &path, &mut Vec::new())?;
				graph.extend(expansion.edges);
				graph.record_contents(expansion.contents);
				ogsfx::parse_expanded(path, &expansion.source)?
			}
		};

		debug!("Parsed {}", shader);
		Ok((shader, graph))
	}

	pub fn compile(&self, root: &Utf8UnixPath) -> Result<Compilation> {
		let (shader, dependencies) = self.parse(root)?;
		let stages = linker::link(&shader, &self.config)?;

		info!(
			"Compiled {} ({} stages, {} files)",
			shader.path,
			stages.len(),
			dependencies.dependencies().len()
		);

		Ok(Compilation {
			shader,
			stages,
			dependencies,
		})
	}

	/// Every file a change to which requires `root` to be recompiled.
	pub fn dependencies_of(&self, root: &Utf8UnixPath) -> Result<DependencyGraph> {
		self.parse(root).map(|(_, dependencies)| dependencies)
	}
}

/// Compiles independent roots in parallel. Results come back in the order of `roots`.
pub fn compile_many(compiler: &Compiler, roots: &[Utf8UnixPathBuf]) -> Vec<Result<Compilation>> {
	let pool = ComputeTaskPool::get_or_init(TaskPool::new);

	pool.scope(|scope| {
		for root in roots {
			scope.spawn(async move { compiler.compile(root) });
		}
	})
}
