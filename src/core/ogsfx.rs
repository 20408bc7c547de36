//! Front end for Maya OGSFX effect files.
//!
//! The whole file is include-expanded before it is tokenized, since headers may declare uniforms
//! and attribute streams as well as code. Parsing happens on the expanded text; every position is
//! translated back to its original file and line afterwards.

use hashlink::LinkedHashMap;
use log::{debug, warn};

use super::{
	error::{Error, NameKind, Result},
	include::{ExpandedSource, SourceMap},
	lexer::{Lexer, Position, SourcePath, TokenKind},
	parser::Cursor,
	property::{self, Literal, PropertyDecl},
	shader::{
		BlockRef,
		Direction,
		GlslBlock,
		Pass,
		PropertyType,
		Shader,
		StageArgument,
		StageBinding,
		StageInterface,
		StageSlot,
		StreamField,
		Technique,
		UiAttribute,
		Uniform,
		VertexStream,
	},
};

/*
--------------------------------------------------------------------------------
||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||
--------------------------------------------------------------------------------
*/

const KNOWN_ANNOTATIONS: [&str; 7] = ["UIName", "UIMin", "UIMax", "UIGroup", "UIWidget", "UIOrder", "ResourceName"];

// `(description, Range(a, b))` or `(description, Color)` after an annotation name
#[derive(Clone, Debug, PartialEq)]
enum UiSpecifier {
	Range(f32, f32),
	Color,
}

#[derive(Clone, Debug, PartialEq)]
struct Annotation {
	name: String,
	description: Option<String>,
	ui: Option<UiSpecifier>,
	value: Option<Literal>,
	position: Position,
}

impl Annotation {
	// What the shader model keeps: the value, or the description when there is none
	fn literal(&self) -> Option<Literal> {
		self.value
			.clone()
			.or_else(|| self.description.clone().map(Literal::String))
	}
}

fn annotation_map(annotations: &[Annotation]) -> LinkedHashMap<String, Literal> {
	annotations
		.iter()
		.filter_map(|annotation| annotation.literal().map(|literal| (annotation.name.clone(), literal)))
		.collect()
}

/*
--------------------------------------------------------------------------------
||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||
--------------------------------------------------------------------------------
*/

/// Parses an OGSFX source that has no includes, or whose includes should be left alone.
pub fn parse_str(path: SourcePath, text: &str) -> Result<Shader> {
	let source = ExpandedSource::verbatim(text, &path, 1);
	parse_expanded(path, &source)
}

/// Parses an include-expanded OGSFX file.
///
/// Errors and every position in the returned [`Shader`] point into the original files, and each
/// `GLSLShader` block gets the slice of `source`'s map covering its body.
pub fn parse_expanded(root: SourcePath, source: &ExpandedSource) -> Result<Shader> {
	let tokens = Lexer::new(root.clone(), &source.text)
		.with_raw_keyword("GLSLShader", 0)
		.collect();

	let mut parser = Parser {
		cursor: Cursor::new(tokens, &root),
		shader: Shader::new(root),
		uniform_annotations: LinkedHashMap::new(),
	};

	let result = parser.file();
	result.map_err(|err| err.map_position(|position| translate(&source.map, position)))?;

	let mut shader = parser.shader;
	translate_shader(&mut shader, &source.map);
	Ok(shader)
}

fn translate(map: &SourceMap, position: Position) -> Position {
	match map.locate(position.line) {
		Some(origin) => Position::new(origin.file, origin.line, position.column),
		None => position,
	}
}

fn translate_shader(shader: &mut Shader, map: &SourceMap) {
	let at = |position: &mut Position| *position = translate(map, position.clone());

	for block in shader.all_blocks_mut() {
		let count = block.body.split_inclusive('\n').count() as u32;
		block.expanded = ExpandedSource::with_map(block.body.clone(), map.slice(block.position.line, count));
		at(&mut block.position);
	}

	for technique in shader.techniques.values_mut() {
		at(&mut technique.position);
		for pass in &mut technique.passes {
			at(&mut pass.position);
			for binding in pass.stages.values_mut() {
				at(&mut binding.position);
				binding.blocks.iter_mut().for_each(|block| at(&mut block.position));
				if let Some(interface) = &mut binding.interface {
					at(&mut interface.input.position);
					at(&mut interface.output.position);
				}
			}
		}
	}

	shader.uniforms.values_mut().for_each(|uniform| at(&mut uniform.position));
	shader.streams.values_mut().for_each(|stream| at(&mut stream.position));
	shader.properties.values_mut().for_each(|property| at(&mut property.position));
}

/*
--------------------------------------------------------------------------------
||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||
--------------------------------------------------------------------------------
*/

struct Parser {
	cursor: Cursor,
	shader: Shader,
	// Kept until the end, when uniforms are turned into properties
	uniform_annotations: LinkedHashMap<String, Vec<Annotation>>,
}

impl Parser {
	fn file(&mut self) -> Result<()> {
		while !self.cursor.check(TokenKind::Eof) {
			let token = self.cursor.peek();
			if token.is_keyword("uniform") {
				self.uniform()?;
			} else if token.is_keyword("attribute") {
				self.stream()?;
			} else if token.is_keyword("GLSLShader") {
				self.glsl()?;
			} else if token.is_keyword("technique") {
				self.technique()?;
			} else {
				return Err(self.cursor.unexpected("`uniform`, `attribute`, `GLSLShader` or `technique`"));
			}
		}

		if self.shader.techniques.is_empty() {
			return Err(self.cursor.unexpected("a technique"));
		}

		self.properties()
	}

	fn uniform(&mut self) -> Result<()> {
		self.cursor.bump();
		let glsl_type = self.cursor.expect_ident("a type")?.lexeme;
		let name = self.cursor.expect_ident("a uniform name")?;

		if self.shader.uniforms.contains_key(&name.lexeme) {
			return Err(Error::DuplicateName {
				kind: NameKind::Uniform,
				name: name.lexeme,
				position: name.position,
			});
		}

		let semantic = match self.cursor.eat(TokenKind::Colon) {
			Some(_) => Some(self.cursor.expect_ident("a semantic")?.lexeme),
			None => None,
		};
		let annotations = self.annotations()?;
		let default = match self.cursor.eat(TokenKind::Eq) {
			Some(_) => Some(self.constant()?),
			None => None,
		};
		self.cursor.expect(TokenKind::Semi, "`;`")?;

		debug!("Uniform {} {}", glsl_type, name.lexeme);
		self.shader.uniforms.insert(name.lexeme.clone(), Uniform {
			name: name.lexeme.clone(),
			glsl_type,
			semantic,
			default,
			annotations: annotation_map(&annotations),
			position: name.position,
		});
		self.uniform_annotations.insert(name.lexeme, annotations);

		Ok(())
	}

	fn stream(&mut self) -> Result<()> {
		self.cursor.bump();
		let name = self.cursor.expect_ident("an attribute stream name")?;
		if self.shader.streams.contains_key(&name.lexeme) {
			return Err(Error::DuplicateName {
				kind: NameKind::Stream,
				name: name.lexeme,
				position: name.position,
			});
		}

		self.cursor.expect(TokenKind::LBrace, "`{`")?;
		let mut fields = Vec::new();
		while self.cursor.eat(TokenKind::RBrace).is_none() {
			let glsl_type = self.cursor.expect_ident("a type or `}`")?.lexeme;
			let field = self.cursor.expect_ident("a field name")?.lexeme;
			self.cursor.expect(TokenKind::Colon, "`:`")?;
			let semantic = self.cursor.expect_ident("a semantic")?.lexeme;
			self.cursor.expect(TokenKind::Semi, "`;`")?;

			fields.push(StreamField {
				glsl_type,
				name: field,
				semantic,
			});
		}
		self.cursor.expect(TokenKind::Semi, "`;`")?;

		self.shader.streams.insert(name.lexeme.clone(), VertexStream {
			name: name.lexeme,
			fields,
			position: name.position,
		});

		Ok(())
	}

	fn glsl(&mut self) -> Result<()> {
		self.cursor.bump();
		let name = self.cursor.expect_ident("a GLSLShader name")?;
		self.cursor.expect(TokenKind::LBrace, "`{`")?;
		let body = self.cursor.expect(TokenKind::Raw, "a GLSLShader body")?;
		self.cursor.expect(TokenKind::RBrace, "`}`")?;

		if self.shader.blocks.contains_key(&name.lexeme) {
			return Err(Error::DuplicateName {
				kind: NameKind::Block,
				name: name.lexeme,
				position: name.position,
			});
		}

		let block = GlslBlock::new(name.lexeme.clone(), body.lexeme, body.position);
		self.shader.blocks.insert(name.lexeme, block);

		Ok(())
	}

	fn technique(&mut self) -> Result<()> {
		let keyword = self.cursor.bump();
		let name = self.cursor.expect_ident("a technique name")?;
		if self.shader.techniques.contains_key(&name.lexeme) {
			return Err(Error::DuplicateName {
				kind: NameKind::Technique,
				name: name.lexeme,
				position: name.position,
			});
		}

		let annotations = self.annotations()?;
		self.cursor.expect(TokenKind::LBrace, "`{`")?;

		let mut passes = Vec::new();
		while self.cursor.check_keyword("pass") {
			passes.push(self.pass()?);
		}
		if passes.is_empty() {
			return Err(self.cursor.unexpected("`pass`"));
		}
		self.cursor.expect(TokenKind::RBrace, "`pass` or `}`")?;

		debug!("Technique {} with {} pass(es)", name.lexeme, passes.len());
		self.shader.techniques.insert(name.lexeme.clone(), Technique {
			name: name.lexeme,
			passes,
			annotations: annotation_map(&annotations),
			position: keyword.position,
		});

		Ok(())
	}

	fn pass(&mut self) -> Result<Pass> {
		let keyword = self.cursor.bump();
		let name = self.cursor.expect_ident("a pass name")?;
		let annotations = self.annotations()?;
		self.cursor.expect(TokenKind::LBrace, "`{`")?;

		let mut stages = LinkedHashMap::new();
		while !self.cursor.check(TokenKind::RBrace) {
			let slot_token = self.cursor.expect_ident("a shader stage or `}`")?;
			let slot = StageSlot::from_ogsfx(&slot_token.lexeme)
				.ok_or_else(|| Error::syntax("a shader stage", slot_token.describe(), slot_token.position.clone()))?;

			if stages.contains_key(&slot) {
				return Err(Error::DuplicateName {
					kind: NameKind::Stage,
					name: slot_token.lexeme,
					position: slot_token.position,
				});
			}

			self.cursor.expect(TokenKind::LParen, "`(`")?;
			let input = self.stage_argument(Direction::In)?;
			self.cursor.expect(TokenKind::Comma, "`,`")?;
			let output = self.stage_argument(Direction::Out)?;
			self.cursor.expect(TokenKind::RParen, "`)`")?;
			self.cursor.expect(TokenKind::Eq, "`=`")?;
			let blocks = self.block_refs()?;
			self.cursor.expect(TokenKind::Semi, "`;`")?;

			stages.insert(slot, StageBinding {
				blocks,
				interface: Some(StageInterface { input, output }),
				position: slot_token.position,
			});
		}
		let close = self.cursor.bump();

		for required in [StageSlot::Vertex, StageSlot::Fragment] {
			if !stages.contains_key(&required) {
				return Err(Error::syntax(
					format!("{} stage binding", required.keyword()),
					close.describe(),
					close.position,
				));
			}
		}

		Ok(Pass {
			name: Some(name.lexeme),
			stages,
			annotations: annotation_map(&annotations),
			position: keyword.position,
		})
	}

	// `in appdata` or `out v2f vsout`
	fn stage_argument(&mut self, direction: Direction) -> Result<StageArgument> {
		let keyword = direction.to_string();
		self.cursor.expect_keyword(&keyword)?;
		let stream = self.cursor.expect_ident("an attribute stream name")?;
		let instance = self.cursor.eat(TokenKind::Ident).map(|token| token.lexeme);

		Ok(StageArgument {
			direction,
			stream: stream.lexeme,
			instance,
			position: stream.position,
		})
	}

	// `Name` or `{ A, B }`
	fn block_refs(&mut self) -> Result<Vec<BlockRef>> {
		let block_ref = |cursor: &mut Cursor| {
			cursor.expect_ident("a GLSLShader name").map(|token| BlockRef {
				name: token.lexeme,
				position: token.position,
			})
		};

		if self.cursor.eat(TokenKind::LBrace).is_none() {
			return Ok(vec![block_ref(&mut self.cursor)?]);
		}

		let mut blocks = vec![block_ref(&mut self.cursor)?];
		while self.cursor.eat(TokenKind::Comma).is_some() {
			blocks.push(block_ref(&mut self.cursor)?);
		}
		self.cursor.expect(TokenKind::RBrace, "`,` or `}`")?;

		Ok(blocks)
	}

	fn annotations(&mut self) -> Result<Vec<Annotation>> {
		let mut annotations = Vec::new();
		if self.cursor.eat(TokenKind::Less).is_none() {
			return Ok(annotations);
		}

		while self.cursor.eat(TokenKind::Greater).is_none() {
			annotations.push(self.annotation()?);
		}

		Ok(annotations)
	}

	// `string UIName("Description", Range(0, 1)) = "value";`
	fn annotation(&mut self) -> Result<Annotation> {
		self.cursor.expect_ident("an annotation type or `>`")?;
		let name = self.cursor.expect_ident("an annotation name")?;

		let mut description = None;
		let mut ui = None;
		if self.cursor.eat(TokenKind::LParen).is_some() {
			description = Some(self.cursor.string("a description")?);
			if self.cursor.eat(TokenKind::Comma).is_some() {
				let specifier = self.cursor.expect_ident("`Range` or `Color`")?;
				ui = Some(match specifier.lexeme.as_str() {
					"Color" => UiSpecifier::Color,
					"Range" => {
						self.cursor.expect(TokenKind::LParen, "`(`")?;
						let min = self.cursor.number()?.value as f32;
						self.cursor.expect(TokenKind::Comma, "`,`")?;
						let max = self.cursor.number()?.value as f32;
						self.cursor.expect(TokenKind::RParen, "`)`")?;
						UiSpecifier::Range(min, max)
					}
					_ => return Err(Error::syntax("`Range` or `Color`", specifier.describe(), specifier.position)),
				});
			}
			self.cursor.expect(TokenKind::RParen, "`)`")?;
		}

		let value = match self.cursor.eat(TokenKind::Eq) {
			Some(_) => Some(self.constant()?),
			None => None,
		};
		self.cursor.expect(TokenKind::Semi, "`;`")?;

		Ok(Annotation {
			name: name.lexeme,
			description,
			ui,
			value,
			position: name.position,
		})
	}

	fn constant(&mut self) -> Result<Literal> {
		if self.cursor.check_keyword("true") || self.cursor.check_keyword("false") {
			return Ok(Literal::Bool(self.cursor.bump().lexeme == "true"));
		}

		if self.cursor.eat_keyword("sampler_state").is_some() {
			self.cursor.expect(TokenKind::LBrace, "`{`")?;
			self.cursor.expect_keyword("Texture")?;
			self.cursor.expect(TokenKind::Eq, "`=`")?;
			self.cursor.expect(TokenKind::Less, "`<`")?;
			let texture = self.cursor.expect_ident("a texture name")?.lexeme;
			self.cursor.expect(TokenKind::Greater, "`>`")?;
			self.cursor.expect(TokenKind::Semi, "`;`")?;
			self.cursor.expect(TokenKind::RBrace, "`}`")?;
			return Ok(Literal::Sampler(texture));
		}

		match self.cursor.peek().kind {
			TokenKind::Number => Ok(Literal::Number(self.cursor.number()?)),
			TokenKind::String => Ok(Literal::String(self.cursor.bump().lexeme)),
			TokenKind::LBrace => {
				self.cursor.bump();
				let mut components = vec![self.cursor.number()?];
				while self.cursor.eat(TokenKind::Comma).is_some() {
					components.push(self.cursor.number()?);
				}
				self.cursor.expect(TokenKind::RBrace, "`,` or `}`")?;
				Ok(Literal::Tuple(components))
			}
			_ => Err(self.cursor.unexpected("a constant")),
		}
	}

	/*
	--------------------------------------------------------------------------------
	||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||
	--------------------------------------------------------------------------------
	*/

	// Uniforms without a semantic and with a property-shaped type are user-editable
	fn properties(&mut self) -> Result<()> {
		for uniform in self.shader.uniforms.values() {
			let annotations = self
				.uniform_annotations
				.get(&uniform.name)
				.map(Vec::as_slice)
				.unwrap_or_default();

			for annotation in annotations {
				if !KNOWN_ANNOTATIONS.contains(&annotation.name.as_str()) {
					warn!("{}: ignoring annotation {}", annotation.position, annotation.name);
				}
			}

			if uniform.semantic.is_some() {
				continue;
			}

			let Some(decl) = property_decl(uniform, annotations) else {
				continue;
			};

			let property = property::resolve(decl)?;
			debug!("Property {}: {}", property.name, property.ty);
			self.shader.properties.insert(property.name.clone(), property);
		}

		Ok(())
	}
}

fn property_type(glsl_type: &str, annotations: &[Annotation]) -> Option<PropertyType> {
	let color = annotations.iter().any(|annotation| {
		annotation.ui == Some(UiSpecifier::Color)
			|| (annotation.name == "UIWidget" && annotation.value.as_ref().and_then(Literal::as_str) == Some("Color"))
	});

	match glsl_type {
		"float" => Some(PropertyType::Float),
		"int" => Some(PropertyType::Int),
		"vec2" => Some(PropertyType::Vec2),
		"vec3" => Some(PropertyType::Vec3),
		"vec4" if color => Some(PropertyType::Color),
		"vec4" => Some(PropertyType::Vec4),
		"texture2D" | "Texture2D" => Some(PropertyType::Texture2D),
		_ => None,
	}
}

fn property_decl(uniform: &Uniform, annotations: &[Annotation]) -> Option<PropertyDecl> {
	let ty = property_type(&uniform.glsl_type, annotations)?;
	let find = |name: &str| annotations.iter().find(|annotation| annotation.name == name);

	let label = find("UIName")
		.and_then(|annotation| annotation.value.as_ref())
		.and_then(Literal::as_str)
		.unwrap_or(&uniform.name)
		.to_owned();

	let mut attributes = Vec::new();
	if let Some(group) = find("UIGroup").and_then(|annotation| annotation.value.as_ref()).and_then(Literal::as_str) {
		attributes.push(UiAttribute::Header(group.to_owned()));
	}

	let bound = |name: &str| find(name).and_then(|annotation| annotation.value.as_ref()).and_then(Literal::as_number);
	let range = match (bound("UIMin"), bound("UIMax")) {
		(Some(min), Some(max)) => Some((min as f32, max as f32)),
		_ => annotations.iter().find_map(|annotation| match annotation.ui {
			Some(UiSpecifier::Range(min, max)) => Some((min, max)),
			_ => None,
		}),
	};
	if let Some((min, max)) = range {
		attributes.push(UiAttribute::Range { min, max });
	}

	let default = match ty {
		PropertyType::Texture2D => find("ResourceName").and_then(|annotation| annotation.value.clone()),
		_ => uniform.default.clone(),
	};

	Some(PropertyDecl {
		name: uniform.name.clone(),
		label,
		declared: Some(ty),
		default,
		attributes,
		position: uniform.position.clone(),
	})
}

/*
--------------------------------------------------------------------------------
||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||
--------------------------------------------------------------------------------
*/
