use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use log::LevelFilter;
use scribble::{
	libs::source::{rooted, SourceCache},
	Compiler,
	CompilerConfig,
	Directory,
	StageKey,
};

/// Compiles a Scribble or OGSFX shader and prints the result.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
	/// Shader to compile, relative to the root directory.
	file: String,

	/// Directory that include paths starting with `/` resolve from.
	#[arg(long, default_value = ".")]
	root: PathBuf,

	/// Compiler settings in RON.
	#[arg(long)]
	config: Option<PathBuf>,

	/// Print every file the shader depends on.
	#[arg(long)]
	deps: bool,

	/// Print the property table.
	#[arg(long)]
	properties: bool,

	/// Print a single stage, e.g. `Main:0:Fragment`.
	#[arg(long)]
	stage: Option<StageKey>,

	#[arg(short, long, action = clap::ArgAction::Count)]
	verbose: u8,
}

fn main() -> anyhow::Result<()> {
	let args = Args::parse();

	let level = match args.verbose {
		0 => LevelFilter::Warn,
		1 => LevelFilter::Info,
		2 => LevelFilter::Debug,
		_ => LevelFilter::Trace,
	};
	env_logger::Builder::new()
		.filter_level(LevelFilter::Error)
		.filter_module("scribble", level)
		.parse_default_env()
		.init();

	let config = match &args.config {
		Some(path) => CompilerConfig::load(path).with_context(|| format!("Couldn't load config {}", path.display()))?,
		None => CompilerConfig::default(),
	};

	let compiler = Compiler::new(SourceCache::new(Directory::new(args.root.clone()))).with_config(config);
	let file = rooted(&args.file);

	if args.deps {
		let graph = compiler
			.dependencies_of(&file)
			.with_context(|| format!("Couldn't resolve the includes of {}", file))?;
		for path in graph.dependencies() {
			println!("{}", path);
		}
		return Ok(());
	}

	let compilation = compiler.compile(&file).with_context(|| format!("Couldn't compile {}", file))?;

	if args.properties {
		let table = ron::ser::to_string_pretty(&compilation.shader.properties, ron::ser::PrettyConfig::default())
			.context("Couldn't serialize the property table")?;
		println!("{}", table);
		return Ok(());
	}

	match &args.stage {
		Some(key) => {
			let Some(stage) = compilation.stages.get(&key.technique, key.pass, key.slot) else {
				bail!("{} has no stage {}", file, key);
			};
			print!("{}", stage.source);
		}
		None => {
			for (key, stage) in compilation.stages.iter() {
				println!("// ---- {} ----", key);
				print!("{}", stage.source);
			}
		}
	}

	Ok(())
}
