use std::{
	fmt,
	str::FromStr,
	sync::{Arc, LazyLock},
};

use hashlink::LinkedHashMap;
use log::debug;
use regex::Regex;

use super::{
	error::{Error, Result},
	include::{Origin, SourceMap},
	lexer::SourcePath,
	shader::{GlslBlock, Shader, StageArgument, StageBinding, StageInterface, StageSlot},
};
use crate::libs::config::{CompilerConfig, LineDirectives};

/*
--------------------------------------------------------------------------------
||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||
--------------------------------------------------------------------------------
*/

static VERSION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"^\s*#\s*version\s+(.*?)\s*$"#).unwrap());

/// Identifies one compiled stage: `Main:0:Vertex`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StageKey {
	pub technique: String,
	pub pass: usize,
	pub slot: StageSlot,
}

impl StageKey {
	pub fn new(technique: impl Into<String>, pass: usize, slot: StageSlot) -> Self {
		Self {
			technique: technique.into(),
			pass,
			slot,
		}
	}
}

impl fmt::Display for StageKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}:{}:{}", self.technique, self.pass, self.slot)
	}
}

impl FromStr for StageKey {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let mut parts = s.splitn(3, ':');
		match (parts.next(), parts.next(), parts.next()) {
			(Some(technique), Some(pass), Some(slot)) if !technique.is_empty() => Ok(Self {
				technique: technique.to_owned(),
				pass: pass.parse().map_err(|_| format!("invalid pass index `{}`", pass))?,
				slot: slot.parse()?,
			}),
			_ => Err(format!("expected TECHNIQUE:PASS:STAGE, got `{}`", s)),
		}
	}
}

/// Where a line of a compiled stage came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StageOrigin {
	pub file: SourcePath,
	pub line: u32,
	pub block: String,
}

/// Ready-to-compile source for one stage of one pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompiledStage {
	pub source: String,
	/// Source files by the index numeric `#line` markers refer to.
	pub files: Vec<SourcePath>,
	/// Names of the concatenated blocks, in order.
	pub blocks: Vec<String>,
	pub map: SourceMap,
	block_lines: Vec<(u32, u32, usize)>,
}

impl CompiledStage {
	/// Maps a line reported by the GPU compiler back to its file, line and block.
	pub fn locate(&self, line: u32) -> Option<StageOrigin> {
		let origin = self.map.locate(line)?;
		let block = self
			.block_lines
			.iter()
			.find(|(first, last, _)| (*first..=*last).contains(&line))
			.map(|(_, _, index)| self.blocks[*index].clone())?;

		Some(StageOrigin {
			file: origin.file,
			line: origin.line,
			block,
		})
	}
}

/// Every compiled stage of a shader, in technique, pass and stage order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompiledShader {
	pub stages: LinkedHashMap<StageKey, CompiledStage>,
}

impl CompiledShader {
	pub fn get(&self, technique: &str, pass: usize, slot: StageSlot) -> Option<&CompiledStage> {
		self.stages.get(&StageKey::new(technique, pass, slot))
	}

	pub fn iter(&self) -> impl Iterator<Item = (&StageKey, &CompiledStage)> {
		self.stages.iter()
	}

	pub fn len(&self) -> usize {
		self.stages.len()
	}

	pub fn is_empty(&self) -> bool {
		self.stages.is_empty()
	}
}

/*
--------------------------------------------------------------------------------
||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||
--------------------------------------------------------------------------------
*/

/// Assembles every stage of every pass of `shader`.
///
/// Block bodies are expected to be include-expanded already. A reference to a block (or, for
/// OGSFX, an attribute stream) that does not exist fails the whole link.
pub fn link(shader: &Shader, config: &CompilerConfig) -> Result<CompiledShader> {
	let mut compiled = CompiledShader::default();

	for technique in shader.techniques.values() {
		for (index, pass) in technique.passes.iter().enumerate() {
			for slot in StageSlot::ALL {
				let Some(binding) = pass.stage(slot) else {
					continue;
				};

				let key = StageKey::new(technique.name.clone(), index, slot);
				let stage = link_stage(shader, binding, config)?;
				debug!("Linked {} from {:?}", key, stage.blocks);
				compiled.stages.insert(key, stage);
			}
		}
	}

	Ok(compiled)
}

fn link_stage(shader: &Shader, binding: &StageBinding, config: &CompilerConfig) -> Result<CompiledStage> {
	let mut blocks: Vec<&GlslBlock> = shader.shared.iter().collect();
	for block_ref in &binding.blocks {
		let block = shader.block(&block_ref.name).ok_or_else(|| Error::UnresolvedBlockReference {
			name: block_ref.name.clone(),
			position: block_ref.position.clone(),
		})?;
		blocks.push(block);
	}

	let interface = binding
		.interface
		.as_ref()
		.map(|interface| interface_glsl(shader, interface))
		.transpose()?;

	let version = blocks
		.iter()
		.flat_map(|block| block.expanded.text.lines())
		.find_map(|line| VERSION.captures(line))
		.and_then(|caps| caps.get(1))
		.map_or(config.default_version.as_str(), |version| version.as_str());

	let mut writer = StageWriter::new(config.line_directives);
	writer.generated(&format!("#version {}", version));
	if config.line_directives == LineDirectives::Quoted {
		// Core GLSL only accepts file numbers in `#line`
		writer.generated("#extension GL_GOOGLE_cpp_style_line_directive : require");
	}

	for (key, value) in &config.defines {
		writer.generated(&format!("#define {} {}", key, value));
	}

	for uniform in shader.uniforms.values().filter(|uniform| uniform.is_declared()) {
		writer.generated(&format!("uniform {} {};", uniform.glsl_type, uniform.name));
	}

	for line in interface.iter().flatten() {
		writer.generated(line);
	}

	for block in blocks {
		writer.block(block);
	}

	Ok(writer.finish())
}

// Declarations for a stage's `in`/`out` arguments
fn interface_glsl(shader: &Shader, interface: &StageInterface) -> Result<Vec<String>> {
	let mut lines = Vec::new();

	for argument in [&interface.input, &interface.output] {
		let StageArgument {
			direction,
			stream,
			instance,
			position,
		} = argument;

		let fields = &shader
			.streams
			.get(stream)
			.ok_or_else(|| Error::UnresolvedStreamReference {
				name: stream.clone(),
				position: position.clone(),
			})?
			.fields;

		match instance {
			None => {
				for field in fields {
					lines.push(format!("{} {} {};", direction, field.glsl_type, field.name));
				}
			}
			Some(instance) => {
				lines.push(format!("{} {} {{", direction, stream));
				for field in fields {
					lines.push(format!("    {} {};", field.glsl_type, field.name));
				}
				lines.push(format!("}} {};", instance));
			}
		}
	}

	Ok(lines)
}

/*
--------------------------------------------------------------------------------
||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||
--------------------------------------------------------------------------------
*/

struct StageWriter {
	style: LineDirectives,
	source: String,
	lines: u32,
	map: SourceMap,
	files: Vec<SourcePath>,
	blocks: Vec<String>,
	block_lines: Vec<(u32, u32, usize)>,
	// Origin the next line would have without a marker
	expected: Option<Origin>,
}

impl StageWriter {
	fn new(style: LineDirectives) -> Self {
		Self {
			style,
			source: String::new(),
			lines: 0,
			map: SourceMap::new(),
			files: Vec::new(),
			blocks: Vec::new(),
			block_lines: Vec::new(),
			expected: None,
		}
	}

	fn write_line(&mut self, line: &str) {
		self.source.push_str(line);
		if !line.ends_with('\n') {
			self.source.push('\n');
		}
		self.lines += 1;
	}

	fn generated(&mut self, line: &str) {
		self.write_line(line);
		self.expected = None;
	}

	fn file_id(&mut self, file: &SourcePath) -> usize {
		match self.files.iter().position(|known| Arc::ptr_eq(known, file) || known == file) {
			Some(id) => id,
			None => {
				self.files.push(file.clone());
				self.files.len() - 1
			}
		}
	}

	fn marker(&mut self, origin: &Origin) {
		let marker = match self.style {
			LineDirectives::None => return,
			LineDirectives::Numeric => format!("#line {} {}", origin.line, self.file_id(&origin.file)),
			LineDirectives::Quoted => format!("#line {} \"{}\"", origin.line, origin.file),
		};
		self.write_line(&marker);
	}

	fn block(&mut self, block: &GlslBlock) {
		let first = self.lines + 1;
		self.blocks.push(block.name.clone());

		for (index, line) in block.expanded.text.split_inclusive('\n').enumerate() {
			let origin = block.expanded.locate(index as u32 + 1);

			if let Some(origin) = &origin {
				if self.expected.as_ref() != Some(origin) {
					self.marker(origin);
				}
			}

			// `#version` only ever appears hoisted on the first line
			if VERSION.is_match(line.trim_end_matches(['\r', '\n'])) {
				self.write_line("");
			} else {
				self.write_line(line);
			}

			self.expected = origin.map(|origin| {
				self.map.push(self.lines, &origin.file, origin.line);
				Origin {
					file: origin.file,
					line: origin.line + 1,
				}
			});
		}

		if self.lines >= first {
			self.block_lines.push((first, self.lines, self.blocks.len() - 1));
		}
	}

	fn finish(self) -> CompiledStage {
		CompiledStage {
			source: self.source,
			files: self.files,
			blocks: self.blocks,
			map: self.map,
			block_lines: self.block_lines,
		}
	}
}

/*
--------------------------------------------------------------------------------
||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||
--------------------------------------------------------------------------------
*/

#[cfg(test)]
mod tests {
	use typed_path::Utf8UnixPathBuf;

	use super::*;
	use crate::core::parser::parse_str;

	const SHADER: &str = "Shader {
GLSL Common {
#version 450
float shared_value;
}
GLSL VS {
void main() {}
}
GLSL FS {
out vec4 color;
void main() { color = vec4(1); }
}
Technique Main { Pass { Vertex = (Common, VS) Fragment = (Common, FS) } }
}
";

	fn shader(text: &str) -> Shader {
		parse_str(Arc::new(Utf8UnixPathBuf::from("/test.glsl")), text).unwrap()
	}

	fn config(style: LineDirectives) -> CompilerConfig {
		CompilerConfig {
			line_directives: style,
			..CompilerConfig::default()
		}
	}

	#[test]
	fn stage_keys() {
		let key: StageKey = "Main:1:Fragment".parse().unwrap();
		assert_eq!(key, StageKey::new("Main", 1, StageSlot::Fragment));
		assert_eq!(key.to_string(), "Main:1:Fragment");
		assert_eq!("Main:0:PixelShader".parse::<StageKey>().map(|key| key.slot), Ok(StageSlot::Fragment));
		assert!("Main:x:Vertex".parse::<StageKey>().is_err());
		assert!("Main".parse::<StageKey>().is_err());
	}

	#[test]
	fn version_is_hoisted_and_markers_follow_discontinuities() {
		let compiled = link(&shader(SHADER), &config(LineDirectives::Numeric)).unwrap();
		let vertex = compiled.get("Main", 0, StageSlot::Vertex).unwrap();

		assert_eq!(
			vertex.source,
			"#version 450\n#line 2 0\n\n\nfloat shared_value;\n#line 6 0\n\nvoid main() {}\n"
		);
		assert_eq!(vertex.files.len(), 1);
		assert_eq!(vertex.blocks, vec!["Common", "VS"]);
	}

	#[test]
	fn quoted_and_disabled_markers() {
		let quoted = link(&shader(SHADER), &config(LineDirectives::Quoted)).unwrap();
		let quoted = &quoted.get("Main", 0, StageSlot::Vertex).unwrap().source;
		assert!(quoted.starts_with("#version 450\n#extension GL_GOOGLE_cpp_style_line_directive : require\n"));
		assert!(quoted.contains("#line 6 \"/test.glsl\"\n"));

		let bare = link(&shader(SHADER), &config(LineDirectives::None)).unwrap();
		assert_eq!(
			bare.get("Main", 0, StageSlot::Vertex).unwrap().source,
			"#version 450\n\n\nfloat shared_value;\n\nvoid main() {}\n"
		);
	}

	#[test]
	fn lines_map_back_to_blocks() {
		let compiled = link(&shader(SHADER), &config(LineDirectives::Numeric)).unwrap();
		let vertex = compiled.get("Main", 0, StageSlot::Vertex).unwrap();

		let origin = vertex.locate(8).unwrap();
		assert_eq!((origin.line, origin.block.as_str()), (7, "VS"));
		assert_eq!(origin.file.as_str(), "/test.glsl");

		assert_eq!(vertex.locate(5).map(|origin| (origin.line, origin.block)), Some((4, "Common".to_owned())));
		assert_eq!(vertex.locate(1), None);
		assert_eq!(vertex.locate(2), None);
	}

	#[test]
	fn default_version_and_defines() {
		let text = "Shader { GLSL A {\nvoid main() {}\n} Technique T { Pass { Vertex = A Fragment = A } } }";
		let config = config(LineDirectives::None).define("DEBUG", "1").define("LIGHTS", "4");
		let compiled = link(&shader(text), &config).unwrap();

		assert_eq!(
			compiled.get("T", 0, StageSlot::Fragment).unwrap().source,
			"#version 330 core\n#define DEBUG 1\n#define LIGHTS 4\n\nvoid main() {}\n"
		);
	}

	#[test]
	fn shared_block_comes_first() {
		let text = "Shader { GLSL { int shared_first; } GLSL A { int a; } Technique T { Pass { Vertex = A Fragment = A } } }";
		let compiled = link(&shader(text), &config(LineDirectives::None)).unwrap();
		let vertex = compiled.get("T", 0, StageSlot::Vertex).unwrap();

		assert_eq!(vertex.source, "#version 330 core\n int shared_first; \n int a; \n");
		assert_eq!(vertex.blocks, vec!["<shared>", "A"]);
	}

	#[test]
	fn stages_come_out_in_pipeline_order() {
		let text = "Shader { GLSL A {} Technique T { Pass { Fragment = A Geometry = A Vertex = A } } }";
		let compiled = link(&shader(text), &CompilerConfig::default()).unwrap();
		let slots: Vec<_> = compiled.iter().map(|(key, _)| key.slot).collect();

		assert_eq!(slots, vec![StageSlot::Vertex, StageSlot::Geometry, StageSlot::Fragment]);
	}

	#[test]
	fn unresolved_block_reference() {
		let text = "Shader { GLSL A {} Technique T { Pass { Vertex = A Fragment = (A, Missing) } } }";

		match link(&shader(text), &CompilerConfig::default()) {
			Err(Error::UnresolvedBlockReference { name, position }) => {
				assert_eq!(name, "Missing");
				assert_eq!(position.column, 67);
			}
			other => panic!("{:?}", other),
		}
	}
}
