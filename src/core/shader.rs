use std::{fmt, str::FromStr};

use derive_more::Display;
use hashlink::LinkedHashMap;
use serde::{Deserialize, Serialize};

use super::{
	include::ExpandedSource,
	lexer::{Position, SourcePath},
	property::Literal,
};

/*
--------------------------------------------------------------------------------
||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||
--------------------------------------------------------------------------------
*/

/// One parsed shader description: property table, GLSL block table and techniques.
///
/// A `Shader` is a plain value owned by whoever asked for the parse. There is no registry of
/// shaders anywhere in the crate.
#[derive(Clone, Debug, PartialEq)]
pub struct Shader {
	pub path: SourcePath,
	pub properties: LinkedHashMap<String, Property>,
	/// The anonymous `GLSL { ... }` block, prepended to every compiled stage.
	pub shared: Option<GlslBlock>,
	pub blocks: LinkedHashMap<String, GlslBlock>,
	pub techniques: LinkedHashMap<String, Technique>,
	/// Engine-facing uniform declarations (OGSFX only).
	pub uniforms: LinkedHashMap<String, Uniform>,
	/// Vertex attribute streams (OGSFX only).
	pub streams: LinkedHashMap<String, VertexStream>,
}

impl Shader {
	pub fn new(path: SourcePath) -> Self {
		Self {
			path,
			properties: LinkedHashMap::new(),
			shared: None,
			blocks: LinkedHashMap::new(),
			techniques: LinkedHashMap::new(),
			uniforms: LinkedHashMap::new(),
			streams: LinkedHashMap::new(),
		}
	}

	pub fn technique(&self, name: &str) -> Option<&Technique> {
		self.techniques.get(name)
	}

	pub fn block(&self, name: &str) -> Option<&GlslBlock> {
		self.blocks.get(name)
	}

	pub fn property(&self, name: &str) -> Option<&Property> {
		self.properties.get(name)
	}

	/// The shared block followed by the named blocks, in declaration order.
	pub fn all_blocks_mut(&mut self) -> impl Iterator<Item = &mut GlslBlock> {
		self.shared.iter_mut().chain(self.blocks.values_mut())
	}
}

/*
--------------------------------------------------------------------------------
||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||
--------------------------------------------------------------------------------
*/

/// Name given to the anonymous `GLSL { ... }` block.
pub const SHARED_BLOCK: &str = "<shared>";

/// A raw-captured fragment of GLSL.
#[derive(Clone, Debug, PartialEq)]
pub struct GlslBlock {
	pub name: String,
	/// The text between the block's braces, exactly as written.
	pub body: String,
	/// Where the body starts (right after the opening brace).
	pub position: Position,
	/// The body after `#include` expansion, with its line map. Equal to the body until expanded.
	pub expanded: ExpandedSource,
}

impl GlslBlock {
	pub fn new(name: impl Into<String>, body: impl Into<String>, position: Position) -> Self {
		let body = body.into();
		let expanded = ExpandedSource::verbatim(&body, &position.file, position.line);

		Self {
			name: name.into(),
			body,
			position,
			expanded,
		}
	}
}

#[derive(Clone, Debug, PartialEq)]
pub struct Technique {
	pub name: String,
	pub passes: Vec<Pass>,
	pub annotations: LinkedHashMap<String, Literal>,
	pub position: Position,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Pass {
	/// Scribble passes are anonymous, OGSFX passes are named.
	pub name: Option<String>,
	pub stages: LinkedHashMap<StageSlot, StageBinding>,
	pub annotations: LinkedHashMap<String, Literal>,
	pub position: Position,
}

impl Pass {
	pub fn stage(&self, slot: StageSlot) -> Option<&StageBinding> {
		self.stages.get(&slot)
	}
}

/// What a pass binds to one stage slot: an ordered list of blocks to concatenate.
#[derive(Clone, Debug, PartialEq)]
pub struct StageBinding {
	pub blocks: Vec<BlockRef>,
	/// OGSFX stage signature, `VertexShader(in appdata, out v2f vsout)`.
	pub interface: Option<StageInterface>,
	pub position: Position,
}

impl StageBinding {
	pub fn block_names(&self) -> Vec<&str> {
		self.blocks.iter().map(|block| block.name.as_str()).collect()
	}
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockRef {
	pub name: String,
	pub position: Position,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StageInterface {
	pub input: StageArgument,
	pub output: StageArgument,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StageArgument {
	pub direction: Direction,
	pub stream: String,
	/// Instance name. Without one the stream's fields are declared as loose variables.
	pub instance: Option<String>,
	pub position: Position,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display)]
pub enum Direction {
	#[display(fmt = "in")]
	In,
	#[display(fmt = "out")]
	Out,
}

/*
--------------------------------------------------------------------------------
||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||
--------------------------------------------------------------------------------
*/

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Display, Serialize, Deserialize)]
pub enum StageSlot {
	Vertex,
	TessellationControl,
	TessellationEvaluation,
	Geometry,
	Fragment,
}

impl StageSlot {
	pub const ALL: [StageSlot; 5] = [
		StageSlot::Vertex,
		StageSlot::TessellationControl,
		StageSlot::TessellationEvaluation,
		StageSlot::Geometry,
		StageSlot::Fragment,
	];

	/// Stage keyword in the Scribble DSL.
	pub fn from_keyword(keyword: &str) -> Option<Self> {
		Self::ALL.into_iter().find(|slot| slot.keyword() == keyword)
	}

	pub fn keyword(self) -> &'static str {
		match self {
			StageSlot::Vertex => "Vertex",
			StageSlot::TessellationControl => "TessellationControl",
			StageSlot::TessellationEvaluation => "TessellationEvaluation",
			StageSlot::Geometry => "Geometry",
			StageSlot::Fragment => "Fragment",
		}
	}

	/// Stage keyword in OGSFX effect files.
	pub fn from_ogsfx(keyword: &str) -> Option<Self> {
		match keyword {
			"VertexShader" => Some(StageSlot::Vertex),
			"TessControlShader" => Some(StageSlot::TessellationControl),
			"TessEvaluationShader" => Some(StageSlot::TessellationEvaluation),
			"GeometryShader" => Some(StageSlot::Geometry),
			"PixelShader" => Some(StageSlot::Fragment),
			_ => None,
		}
	}
}

impl FromStr for StageSlot {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::from_keyword(s)
			.or_else(|| Self::from_ogsfx(s))
			.ok_or_else(|| format!("unknown stage `{}`", s))
	}
}

/*
--------------------------------------------------------------------------------
||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||
--------------------------------------------------------------------------------
*/

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PropertyType {
	#[display(fmt = "float")]
	Float,
	#[display(fmt = "int")]
	Int,
	#[display(fmt = "vec2")]
	Vec2,
	#[display(fmt = "vec3")]
	Vec3,
	#[display(fmt = "vec4")]
	Vec4,
	#[display(fmt = "color")]
	Color,
	#[display(fmt = "texture2D")]
	Texture2D,
}

impl PropertyType {
	pub const ALL: [PropertyType; 7] = [
		PropertyType::Float,
		PropertyType::Int,
		PropertyType::Vec2,
		PropertyType::Vec3,
		PropertyType::Vec4,
		PropertyType::Color,
		PropertyType::Texture2D,
	];

	pub fn from_keyword(keyword: &str) -> Option<Self> {
		Self::ALL.into_iter().find(|ty| ty.to_string() == keyword)
	}

	/// Component count of vector-shaped types.
	pub fn arity(self) -> Option<usize> {
		match self {
			PropertyType::Vec2 => Some(2),
			PropertyType::Vec3 => Some(3),
			PropertyType::Vec4 | PropertyType::Color => Some(4),
			_ => None,
		}
	}
}

/// A resolved property default.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
	Float(f32),
	Int(i32),
	Vec2([f32; 2]),
	Vec3([f32; 3]),
	Vec4([f32; 4]),
	Color([f32; 4]),
	/// Name of the default image.
	Texture2D(String),
}

/// Editor metadata attached to a property. The set of kinds is closed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum UiAttribute {
	Range { min: f32, max: f32 },
	Toggle,
	Header(String),
}

/// A user-editable property with its resolved type.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Property {
	pub name: String,
	pub label: String,
	#[serde(rename = "type")]
	pub ty: PropertyType,
	pub default: Option<Value>,
	pub attributes: Vec<UiAttribute>,
	#[serde(skip)]
	pub position: Position,
}

/*
--------------------------------------------------------------------------------
||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||
--------------------------------------------------------------------------------
*/

/// `uniform mat4 gWVP : WorldViewProjection;`
#[derive(Clone, Debug, PartialEq)]
pub struct Uniform {
	pub name: String,
	pub glsl_type: String,
	pub semantic: Option<String>,
	pub default: Option<Literal>,
	pub annotations: LinkedHashMap<String, Literal>,
	pub position: Position,
}

impl Uniform {
	/// Texture objects are bound through their sampler and never declared on their own.
	pub fn is_declared(&self) -> bool {
		!self.glsl_type.eq_ignore_ascii_case("texture2d")
	}
}

/// `attribute appdata { vec3 position : POSITION; ... };`
#[derive(Clone, Debug, PartialEq)]
pub struct VertexStream {
	pub name: String,
	pub fields: Vec<StreamField>,
	pub position: Position,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamField {
	pub glsl_type: String,
	pub name: String,
	pub semantic: String,
}

impl fmt::Display for Shader {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"{} ({} properties, {} blocks, {} techniques)",
			self.path,
			self.properties.len(),
			self.blocks.len() + usize::from(self.shared.is_some()),
			self.techniques.len()
		)
	}
}

