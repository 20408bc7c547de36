use hashlink::LinkedHashMap;
use log::debug;

use super::{
	error::{Error, NameKind, Result},
	lexer::{tokenize, LexIssue, Position, SourcePath, Token, TokenKind},
	property::{self, Literal, Number, PropertyDecl},
	shader::{BlockRef, GlslBlock, Pass, PropertyType, Shader, StageBinding, StageSlot, Technique, UiAttribute, SHARED_BLOCK},
};

/*
--------------------------------------------------------------------------------
||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||
--------------------------------------------------------------------------------
*/

/// Token cursor shared by both front ends. The token list always ends with `Eof`.
pub(crate) struct Cursor {
	tokens: Vec<Token>,
	index: usize,
}

impl Cursor {
	pub fn new(mut tokens: Vec<Token>, file: &SourcePath) -> Self {
		if tokens.last().map(|token| token.kind) != Some(TokenKind::Eof) {
			let position = tokens
				.last()
				.map(|token| token.position.clone())
				.unwrap_or_else(|| Position::start_of(file.clone()));
			tokens.push(Token {
				kind: TokenKind::Eof,
				lexeme: String::new(),
				position,
			});
		}

		Self { tokens, index: 0 }
	}

	pub fn peek(&self) -> &Token {
		self.peek_nth(0)
	}

	pub fn peek_nth(&self, n: usize) -> &Token {
		let last = self.tokens.len() - 1;
		&self.tokens[(self.index + n).min(last)]
	}

	pub fn position(&self) -> Position {
		self.peek().position.clone()
	}

	pub fn bump(&mut self) -> Token {
		let token = self.peek().clone();
		if self.index < self.tokens.len() - 1 {
			self.index += 1;
		}
		token
	}

	pub fn check(&self, kind: TokenKind) -> bool {
		self.peek().kind == kind
	}

	pub fn check_keyword(&self, keyword: &str) -> bool {
		self.peek().is_keyword(keyword)
	}

	pub fn eat(&mut self, kind: TokenKind) -> Option<Token> {
		self.check(kind).then(|| self.bump())
	}

	pub fn eat_keyword(&mut self, keyword: &str) -> Option<Token> {
		self.check_keyword(keyword).then(|| self.bump())
	}

	pub fn expect(&mut self, kind: TokenKind, expected: &str) -> Result<Token> {
		self.eat(kind).ok_or_else(|| self.unexpected(expected))
	}

	pub fn expect_keyword(&mut self, keyword: &str) -> Result<Token> {
		self.eat_keyword(keyword)
			.ok_or_else(|| self.unexpected(&format!("`{}`", keyword)))
	}

	pub fn expect_ident(&mut self, expected: &str) -> Result<Token> {
		self.expect(TokenKind::Ident, expected)
	}

	/// The error for finding the current token where `expected` should be.
	///
	/// Lexer error tokens turn into lex errors here, so the first one the parser reaches is the one
	/// reported.
	pub fn unexpected(&self, expected: &str) -> Error {
		let token = self.peek();
		match token.kind {
			TokenKind::Error(issue) if issue != LexIssue::UnexpectedChar => Error::Lex {
				message: issue.to_string(),
				position: token.position.clone(),
			},
			_ => Error::syntax(expected, token.describe(), token.position.clone()),
		}
	}

	pub fn number(&mut self) -> Result<Number> {
		let token = self.expect(TokenKind::Number, "a number")?;
		Number::parse(&token.lexeme).ok_or_else(|| Error::syntax("a number", token.describe(), token.position))
	}

	pub fn string(&mut self, expected: &str) -> Result<String> {
		self.expect(TokenKind::String, expected).map(|token| token.lexeme)
	}
}

/*
--------------------------------------------------------------------------------
||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||
--------------------------------------------------------------------------------
*/

/// Tokenizes and parses one Scribble source.
pub fn parse_str(path: SourcePath, text: &str) -> Result<Shader> {
	parse(tokenize(path.clone(), text), path)
}

/// Parses a Scribble token stream into a [`Shader`].
///
/// ```text
/// Shader {
///     Properties { [Range(0, 1)] _name("Label", float) = 0.5 ... }
///     GLSL { shared code }
///     GLSL Name { raw code }
///     Technique Name { Pass { Vertex = (A, B) Fragment = C } }
/// }
/// ```
///
/// The first error aborts the parse. Block references are only resolved when linking.
pub fn parse(tokens: Vec<Token>, path: SourcePath) -> Result<Shader> {
	let mut parser = Parser {
		cursor: Cursor::new(tokens, &path),
		shader: Shader::new(path),
		seen_properties: false,
	};

	parser.shader()?;
	Ok(parser.shader)
}

struct Parser {
	cursor: Cursor,
	shader: Shader,
	seen_properties: bool,
}

impl Parser {
	fn shader(&mut self) -> Result<()> {
		self.cursor.expect_keyword("Shader")?;
		self.cursor.expect(TokenKind::LBrace, "`{`")?;

		while !self.cursor.check(TokenKind::RBrace) {
			let token = self.cursor.peek();
			if token.is_keyword("Properties") {
				self.properties()?;
			} else if token.is_keyword("GLSL") {
				self.glsl()?;
			} else if token.is_keyword("Technique") {
				self.technique()?;
			} else {
				return Err(self.cursor.unexpected("`Properties`, `GLSL` or `Technique`"));
			}
		}

		let close = self.cursor.bump();
		self.cursor.expect(TokenKind::Eof, "end of file")?;

		if self.shader.techniques.is_empty() {
			return Err(Error::syntax("a Technique", close.describe(), close.position));
		}

		Ok(())
	}

	fn properties(&mut self) -> Result<()> {
		let keyword = self.cursor.bump();
		if self.seen_properties {
			return Err(Error::DuplicateName {
				kind: NameKind::PropertiesBlock,
				name: keyword.lexeme,
				position: keyword.position,
			});
		}
		self.seen_properties = true;

		self.cursor.expect(TokenKind::LBrace, "`{`")?;
		while !self.cursor.check(TokenKind::RBrace) {
			let decl = self.property_decl()?;
			if self.shader.properties.contains_key(&decl.name) {
				return Err(Error::DuplicateName {
					kind: NameKind::Property,
					name: decl.name,
					position: decl.position,
				});
			}

			let property = property::resolve(decl)?;
			debug!("Property {}: {}", property.name, property.ty);
			self.shader.properties.insert(property.name.clone(), property);
		}
		self.cursor.bump();

		Ok(())
	}

	fn property_decl(&mut self) -> Result<PropertyDecl> {
		let mut attributes = Vec::new();
		while self.cursor.check(TokenKind::LBracket) {
			attributes.push(self.attribute()?);
		}

		let name = self.cursor.expect_ident("a property name")?;
		self.cursor.expect(TokenKind::LParen, "`(`")?;
		let label = self.cursor.string("a property label")?;

		let declared = match self.cursor.eat(TokenKind::Comma) {
			Some(_) => {
				let ty = self.cursor.expect_ident("a property type")?;
				Some(
					PropertyType::from_keyword(&ty.lexeme)
						.ok_or_else(|| Error::syntax("a property type", ty.describe(), ty.position))?,
				)
			}
			None => None,
		};
		self.cursor.expect(TokenKind::RParen, "`)`")?;

		let default = match self.cursor.eat(TokenKind::Eq) {
			Some(_) => Some(self.literal()?),
			None => None,
		};

		Ok(PropertyDecl {
			name: name.lexeme,
			label,
			declared,
			default,
			attributes,
			position: name.position,
		})
	}

	fn attribute(&mut self) -> Result<UiAttribute> {
		self.cursor.bump();
		let name = self.cursor.expect_ident("an attribute")?;

		let attribute = match name.lexeme.as_str() {
			"Range" => {
				self.cursor.expect(TokenKind::LParen, "`(`")?;
				let min = self.cursor.number()?.value as f32;
				self.cursor.expect(TokenKind::Comma, "`,`")?;
				let max = self.cursor.number()?.value as f32;
				self.cursor.expect(TokenKind::RParen, "`)`")?;
				UiAttribute::Range { min, max }
			}
			"Toggle" => UiAttribute::Toggle,
			"Header" => {
				self.cursor.expect(TokenKind::LParen, "`(`")?;
				let text = self.cursor.string("a header")?;
				self.cursor.expect(TokenKind::RParen, "`)`")?;
				UiAttribute::Header(text)
			}
			_ => return Err(Error::syntax("`Range`, `Toggle` or `Header`", name.describe(), name.position)),
		};

		self.cursor.expect(TokenKind::RBracket, "`]`")?;
		Ok(attribute)
	}

	fn literal(&mut self) -> Result<Literal> {
		if self.cursor.check_keyword("true") || self.cursor.check_keyword("false") {
			return Ok(Literal::Bool(self.cursor.bump().lexeme == "true"));
		}

		match self.cursor.peek().kind {
			TokenKind::String => Ok(Literal::String(self.cursor.bump().lexeme)),
			TokenKind::Number => Ok(Literal::Number(self.cursor.number()?)),
			TokenKind::LParen => {
				self.cursor.bump();
				let mut components = vec![self.cursor.number()?];
				while self.cursor.eat(TokenKind::Comma).is_some() {
					components.push(self.cursor.number()?);
				}
				self.cursor.expect(TokenKind::RParen, "`,` or `)`")?;
				Ok(Literal::Tuple(components))
			}
			_ => Err(self.cursor.unexpected("a literal")),
		}
	}

	fn glsl(&mut self) -> Result<()> {
		let keyword = self.cursor.bump();
		let name = self.cursor.eat(TokenKind::Ident);
		self.cursor.expect(TokenKind::LBrace, "`{`")?;
		let body = self.cursor.expect(TokenKind::Raw, "a GLSL block body")?;
		self.cursor.expect(TokenKind::RBrace, "`}`")?;

		match name {
			None => {
				if self.shader.shared.is_some() {
					return Err(Error::DuplicateName {
						kind: NameKind::SharedBlock,
						name: keyword.lexeme,
						position: keyword.position,
					});
				}
				debug!("Shared GLSL block at {}", body.position);
				self.shader.shared = Some(GlslBlock::new(SHARED_BLOCK, body.lexeme, body.position));
			}
			Some(name) => {
				if self.shader.blocks.contains_key(&name.lexeme) {
					return Err(Error::DuplicateName {
						kind: NameKind::Block,
						name: name.lexeme,
						position: name.position,
					});
				}
				debug!("GLSL block {} at {}", name.lexeme, body.position);
				let block = GlslBlock::new(name.lexeme.clone(), body.lexeme, body.position);
				self.shader.blocks.insert(name.lexeme, block);
			}
		}

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

		self.cursor.expect(TokenKind::LBrace, "`{`")?;
		let mut passes = Vec::new();
		while !self.cursor.check(TokenKind::RBrace) {
			if !self.cursor.check_keyword("Pass") {
				return Err(self.cursor.unexpected("`Pass` or `}`"));
			}
			passes.push(self.pass()?);
		}

		let close = self.cursor.bump();
		if passes.is_empty() {
			return Err(Error::syntax("`Pass`", close.describe(), close.position));
		}

		debug!("Technique {} with {} pass(es)", name.lexeme, passes.len());
		self.shader.techniques.insert(name.lexeme.clone(), Technique {
			name: name.lexeme,
			passes,
			annotations: LinkedHashMap::new(),
			position: keyword.position,
		});

		Ok(())
	}

	fn pass(&mut self) -> Result<Pass> {
		let keyword = self.cursor.bump();
		self.cursor.expect(TokenKind::LBrace, "`{`")?;

		let mut stages = LinkedHashMap::new();
		while !self.cursor.check(TokenKind::RBrace) {
			let slot_token = self.cursor.expect_ident("a stage slot or `}`")?;
			let slot = StageSlot::from_keyword(&slot_token.lexeme)
				.ok_or_else(|| Error::syntax("a stage slot", slot_token.describe(), slot_token.position.clone()))?;

			if stages.contains_key(&slot) {
				return Err(Error::DuplicateName {
					kind: NameKind::Stage,
					name: slot.keyword().to_owned(),
					position: slot_token.position,
				});
			}

			self.cursor.expect(TokenKind::Eq, "`=`")?;
			let blocks = self.block_refs()?;

			stages.insert(slot, StageBinding {
				blocks,
				interface: None,
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
			name: None,
			stages,
			annotations: LinkedHashMap::new(),
			position: keyword.position,
		})
	}

	// `Name` or `(A, B, C)`
	fn block_refs(&mut self) -> Result<Vec<BlockRef>> {
		let block_ref = |cursor: &mut Cursor| {
			cursor.expect_ident("a GLSL block name").map(|token| BlockRef {
				name: token.lexeme,
				position: token.position,
			})
		};

		if self.cursor.eat(TokenKind::LParen).is_none() {
			return Ok(vec![block_ref(&mut self.cursor)?]);
		}

		let mut blocks = vec![block_ref(&mut self.cursor)?];
		while self.cursor.eat(TokenKind::Comma).is_some() {
			blocks.push(block_ref(&mut self.cursor)?);
		}
		self.cursor.expect(TokenKind::RParen, "`,` or `)`")?;

		Ok(blocks)
	}
}

/*
--------------------------------------------------------------------------------
||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||
--------------------------------------------------------------------------------
*/

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use typed_path::Utf8UnixPathBuf;

	use super::*;
	use crate::core::shader::Value;

	fn parse_text(text: &str) -> Result<Shader> {
		parse_str(Arc::new(Utf8UnixPathBuf::from("/test.glsl")), text)
	}

	const MINIMAL: &str = "
Shader {
	GLSL VS { void main() { gl_Position = vec4(0); } }
	GLSL FS { void main() {} }
	Technique Main { Pass { Vertex = VS Fragment = FS } }
}
";

	#[test]
	fn minimal_shader() {
		let shader = parse_text(MINIMAL).unwrap();
		let pass = &shader.technique("Main").unwrap().passes[0];

		assert_eq!(pass.stage(StageSlot::Vertex).unwrap().block_names(), vec!["VS"]);
		assert_eq!(pass.stage(StageSlot::Fragment).unwrap().block_names(), vec!["FS"]);
		assert_eq!(shader.block("VS").unwrap().body, " void main() { gl_Position = vec4(0); } ");
		assert_eq!(shader.block("FS").unwrap().position.line, 4);
	}

	#[test]
	fn parse_is_idempotent() {
		assert_eq!(parse_text(MINIMAL).unwrap(), parse_text(MINIMAL).unwrap());
	}

	#[test]
	fn properties_with_attributes() {
		let shader = parse_text(
			r#"
Shader {
	Properties {
		[Header("Surface")]
		[Range(0, 1)]
		_rough("Roughness", float) = 0.5
		[Toggle] _flag("Flag") = 1
		_tint("Tint", color) = (1.0, 0.5, 0.25, 1.0)
		_tex("Albedo", texture2D) = "white"
		_empty("Unset", vec2)
	}
	GLSL A { }
	Technique T { Pass { Vertex = A Fragment = A } }
}
"#,
		)
		.unwrap();

		let names: Vec<_> = shader.properties.keys().map(String::as_str).collect();
		assert_eq!(names, vec!["_rough", "_flag", "_tint", "_tex", "_empty"]);

		let rough = shader.property("_rough").unwrap();
		assert_eq!(rough.label, "Roughness");
		assert_eq!(rough.default, Some(Value::Float(0.5)));
		assert_eq!(rough.attributes, vec![
			UiAttribute::Header("Surface".to_owned()),
			UiAttribute::Range { min: 0.0, max: 1.0 },
		]);

		assert_eq!(shader.property("_flag").unwrap().ty, PropertyType::Int);
		assert_eq!(shader.property("_flag").unwrap().attributes, vec![UiAttribute::Toggle]);
		assert_eq!(shader.property("_tint").unwrap().ty, PropertyType::Color);
		assert_eq!(shader.property("_tex").unwrap().default, Some(Value::Texture2D("white".to_owned())));
		assert_eq!(shader.property("_empty").unwrap().default, None);
	}

	#[test]
	fn shared_block_is_kept_apart() {
		let shader = parse_text("Shader { GLSL { int shared; } GLSL A {} Technique T { Pass { Vertex = A Fragment = A } } }").unwrap();

		assert_eq!(shader.shared.as_ref().map(|block| block.body.as_str()), Some(" int shared; "));
		assert_eq!(shader.blocks.len(), 1);
	}

	#[test]
	fn glsl_is_an_ordinary_name_outside_block_declarations() {
		let shader = parse_text("Shader { GLSL A { int a; } Technique GLSL { Pass { Vertex = A Fragment = A } } }").unwrap();

		assert_eq!(shader.block("A").unwrap().body, " int a; ");
		assert_eq!(shader.technique("GLSL").unwrap().passes.len(), 1);
	}

	#[test]
	fn duplicate_names() {
		let duplicate = |text: &str| match parse_text(text) {
			Err(Error::DuplicateName { kind, name, .. }) => (kind, name),
			other => panic!("{:?}", other),
		};

		assert_eq!(
			duplicate("Shader { GLSL A {} GLSL A {} }"),
			(NameKind::Block, "A".to_owned())
		);
		assert_eq!(
			duplicate("Shader { GLSL {} GLSL {} }").0,
			NameKind::SharedBlock
		);
		assert_eq!(
			duplicate("Shader { Properties { _a(\"a\") = 1 _a(\"b\") = 2 } }"),
			(NameKind::Property, "_a".to_owned())
		);
		assert_eq!(
			duplicate("Shader { Properties { } Properties { } }").0,
			NameKind::PropertiesBlock
		);
		assert_eq!(
			duplicate("Shader { GLSL A {} Technique T { Pass { Vertex = A Fragment = A } } Technique T { } }"),
			(NameKind::Technique, "T".to_owned())
		);
		assert_eq!(
			duplicate("Shader { Technique T { Pass { Vertex = A Vertex = B } } }"),
			(NameKind::Stage, "Vertex".to_owned())
		);
	}

	#[test]
	fn syntax_errors_carry_positions() {
		match parse_text("Shader {\n\tTechnique Main {\n\t\tPass { Vertex = }\n\t}\n}") {
			Err(Error::Syntax { expected, found, position }) => {
				assert_eq!(expected, "a GLSL block name");
				assert_eq!(found, "`}`");
				assert_eq!((position.line, position.column), (3, 19));
			}
			other => panic!("{:?}", other),
		}
	}

	#[test]
	fn pass_needs_vertex_and_fragment() {
		match parse_text("Shader { Technique T { Pass { Vertex = A } } }") {
			Err(Error::Syntax { expected, .. }) => assert_eq!(expected, "Fragment stage binding"),
			other => panic!("{:?}", other),
		}
	}

	#[test]
	fn shader_needs_a_technique_with_a_pass() {
		assert!(matches!(parse_text("Shader { GLSL A {} }"), Err(Error::Syntax { .. })));
		assert!(matches!(parse_text("Shader { Technique T { } }"), Err(Error::Syntax { .. })));
	}

	#[test]
	fn lexer_errors_surface_when_reached() {
		assert!(matches!(
			parse_text("Shader { Properties { _a(\"open\n) } }"),
			Err(Error::Lex { .. })
		));
		assert!(matches!(parse_text("Shader { GLSL A { {"), Err(Error::Lex { .. })));

		match parse_text("Shader { @ }") {
			Err(Error::Syntax { found, .. }) => assert_eq!(found, "unexpected character `@`"),
			other => panic!("{:?}", other),
		}
	}

	#[test]
	fn type_errors_come_from_the_resolver() {
		assert!(matches!(
			parse_text("Shader { Properties { _v(\"v\", vec3) = (1, 2) } }"),
			Err(Error::TypeMismatch { .. })
		));
		assert!(matches!(
			parse_text("Shader { Properties { _v(\"v\") } }"),
			Err(Error::AmbiguousDefault { .. })
		));
		assert!(matches!(
			parse_text("Shader { Properties { _v(\"v\", mat4) = 1 } }"),
			Err(Error::Syntax { .. })
		));
	}

	#[test]
	fn unknown_attribute() {
		assert!(matches!(
			parse_text("Shader { Properties { [Slider(0, 1)] _v(\"v\") = 0.5 } }"),
			Err(Error::Syntax { .. })
		));
	}
}
