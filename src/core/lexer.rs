use std::{fmt, sync::Arc};

use derive_more::Display;
use typed_path::{Utf8UnixPath, Utf8UnixPathBuf};

/*
--------------------------------------------------------------------------------
||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||
--------------------------------------------------------------------------------
*/

/// Shared, cheaply clonable canonical path of a source file.
pub type SourcePath = Arc<Utf8UnixPathBuf>;

/// A location in a source file. Lines and columns are 1-based, columns count characters.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Position {
	pub file: SourcePath,
	pub line: u32,
	pub column: u32,
}

impl Position {
	pub fn new(file: SourcePath, line: u32, column: u32) -> Self {
		Self { file, line, column }
	}

	pub fn start_of(file: SourcePath) -> Self {
		Self::new(file, 1, 1)
	}

	pub fn path(&self) -> &Utf8UnixPath {
		self.file.as_path()
	}
}

impl fmt::Display for Position {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}:{}:{}", self.file, self.line, self.column)
	}
}

/*
--------------------------------------------------------------------------------
||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||
--------------------------------------------------------------------------------
*/

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display)]
pub enum LexIssue {
	#[display(fmt = "unexpected character")]
	UnexpectedChar,
	#[display(fmt = "unterminated string")]
	UnterminatedString,
	#[display(fmt = "unterminated comment")]
	UnterminatedComment,
	#[display(fmt = "unterminated block")]
	UnterminatedBlock,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display)]
pub enum TokenKind {
	#[display(fmt = "identifier")]
	Ident,
	#[display(fmt = "string")]
	String,
	#[display(fmt = "number")]
	Number,
	/// Verbatim body of a raw-captured block, between its outer braces.
	#[display(fmt = "block body")]
	Raw,
	#[display(fmt = "`{{`")]
	LBrace,
	#[display(fmt = "`}}`")]
	RBrace,
	#[display(fmt = "`(`")]
	LParen,
	#[display(fmt = "`)`")]
	RParen,
	#[display(fmt = "`[`")]
	LBracket,
	#[display(fmt = "`]`")]
	RBracket,
	#[display(fmt = "`<`")]
	Less,
	#[display(fmt = "`>`")]
	Greater,
	#[display(fmt = "`=`")]
	Eq,
	#[display(fmt = "`,`")]
	Comma,
	#[display(fmt = "`:`")]
	Colon,
	#[display(fmt = "`;`")]
	Semi,
	#[display(fmt = "{}", _0)]
	Error(LexIssue),
	#[display(fmt = "end of file")]
	Eof,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
	pub kind: TokenKind,
	/// Source text of the token. Strings are unquoted and unescaped, raw blocks hold their body.
	pub lexeme: String,
	pub position: Position,
}

impl Token {
	pub fn is_keyword(&self, keyword: &str) -> bool {
		self.kind == TokenKind::Ident && self.lexeme == keyword
	}

	/// How the token reads in a diagnostic.
	pub fn describe(&self) -> String {
		match self.kind {
			TokenKind::Ident => format!("`{}`", self.lexeme),
			TokenKind::Number => format!("number `{}`", self.lexeme),
			TokenKind::String => format!("string \"{}\"", self.lexeme),
			TokenKind::Error(LexIssue::UnexpectedChar) => format!("unexpected character `{}`", self.lexeme),
			kind => kind.to_string(),
		}
	}
}

/*
--------------------------------------------------------------------------------
||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||
--------------------------------------------------------------------------------
*/

// Where we are in recognizing `<keyword> [Name] {`, after which the body is captured verbatim
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RawState {
	Idle,
	Keyword,
	Named,
	Capture,
}

/// Restartable token stream over one source text.
///
/// The lexer never fails: anything it cannot make sense of comes out as a [`TokenKind::Error`]
/// token and the parser decides what to do with it. Comments are skipped but still advance the
/// line/column counters. The stream always ends with a single [`TokenKind::Eof`] token.
///
/// When a raw keyword is set (`GLSL` for the Scribble DSL, `GLSLShader` for OGSFX), the body of
/// `<keyword> [Name] { ... }` is not tokenized: it is captured by counting braces and emitted as
/// one [`TokenKind::Raw`] token followed by the closing brace. The keyword only opens a raw block
/// where a declaration can start: at the given brace depth, first in the file or right after a
/// `{`, `}` or `;`. Elsewhere it is an ordinary identifier.
#[derive(Clone, Debug)]
pub struct Lexer<'a> {
	file: SourcePath,
	text: &'a str,
	offset: usize,
	line: u32,
	column: u32,
	raw_keyword: Option<&'a str>,
	raw_depth: usize,
	raw_state: RawState,
	depth: usize,
	previous: Option<TokenKind>,
	pending_close: Option<Token>,
	finished: bool,
}

impl<'a> Lexer<'a> {
	pub fn new(file: SourcePath, text: &'a str) -> Self {
		Self {
			file,
			text,
			offset: 0,
			line: 1,
			column: 1,
			raw_keyword: None,
			raw_depth: 0,
			raw_state: RawState::Idle,
			depth: 0,
			previous: None,
			pending_close: None,
			finished: false,
		}
	}

	pub fn with_raw_keyword(mut self, keyword: &'a str, depth: usize) -> Self {
		self.raw_keyword = Some(keyword);
		self.raw_depth = depth;
		self
	}

	fn here(&self) -> Position {
		Position::new(self.file.clone(), self.line, self.column)
	}

	fn peek(&self) -> Option<char> {
		self.text[self.offset..].chars().next()
	}

	fn peek_nth(&self, n: usize) -> Option<char> {
		self.text[self.offset..].chars().nth(n)
	}

	fn bump(&mut self) -> Option<char> {
		let c = self.peek()?;
		self.offset += c.len_utf8();
		if c == '\n' {
			self.line += 1;
			self.column = 1;
		} else {
			self.column += 1;
		}
		Some(c)
	}

	fn token(&self, kind: TokenKind, lexeme: impl Into<String>, position: Position) -> Token {
		Token {
			kind,
			lexeme: lexeme.into(),
			position,
		}
	}

	// Skips whitespace and comments. Returns an error token for an unterminated block comment.
	fn skip_trivia(&mut self) -> Option<Token> {
		loop {
			match (self.peek(), self.peek_nth(1)) {
				(Some(c), _) if c.is_whitespace() => {
					self.bump();
				}
				(Some('/'), Some('/')) => {
					while let Some(c) = self.peek() {
						if c == '\n' {
							break;
						}
						self.bump();
					}
				}
				(Some('/'), Some('*')) => {
					let start = self.here();
					self.bump();
					self.bump();
					loop {
						match (self.peek(), self.peek_nth(1)) {
							(Some('*'), Some('/')) => {
								self.bump();
								self.bump();
								break;
							}
							(Some(_), _) => {
								self.bump();
							}
							(None, _) => {
								return Some(self.token(TokenKind::Error(LexIssue::UnterminatedComment), "/*", start));
							}
						}
					}
				}
				_ => return None,
			}
		}
	}

	fn lex_ident(&mut self, start: Position) -> Token {
		let begin = self.offset;
		while let Some(c) = self.peek() {
			if c.is_ascii_alphanumeric() || c == '_' {
				self.bump();
			} else {
				break;
			}
		}
		self.token(TokenKind::Ident, &self.text[begin..self.offset], start)
	}

	fn lex_number(&mut self, start: Position) -> Token {
		let begin = self.offset;

		if matches!(self.peek(), Some('-' | '+')) {
			self.bump();
		}
		self.eat_digits();
		if self.peek() == Some('.') {
			self.bump();
			self.eat_digits();
		}
		if matches!(self.peek(), Some('e' | 'E')) {
			let signed = matches!(self.peek_nth(1), Some('-' | '+'));
			let digit_at = if signed { 2 } else { 1 };
			if self.peek_nth(digit_at).is_some_and(|c| c.is_ascii_digit()) {
				self.bump();
				if signed {
					self.bump();
				}
				self.eat_digits();
			}
		}
		if matches!(self.peek(), Some('f' | 'F')) {
			self.bump();
		}

		self.token(TokenKind::Number, &self.text[begin..self.offset], start)
	}

	fn eat_digits(&mut self) {
		while self.peek().is_some_and(|c| c.is_ascii_digit()) {
			self.bump();
		}
	}

	fn lex_string(&mut self, start: Position) -> Token {
		// Opening quote
		self.bump();

		let mut value = String::new();
		loop {
			match self.peek() {
				Some('"') => {
					self.bump();
					return self.token(TokenKind::String, value, start);
				}
				Some('\\') => {
					self.bump();
					match self.peek() {
						Some('\n') | None => {}
						Some(escaped) => {
							self.bump();
							value.push(escaped);
						}
					}
				}
				Some('\n') | None => {
					return self.token(TokenKind::Error(LexIssue::UnterminatedString), value, start);
				}
				Some(c) => {
					self.bump();
					value.push(c);
				}
			}
		}
	}

	fn starts_number(&self) -> bool {
		let digit_or_dot = |first: Option<char>, second: Option<char>| match first {
			Some(c) if c.is_ascii_digit() => true,
			Some('.') => second.is_some_and(|c| c.is_ascii_digit()),
			_ => false,
		};

		match self.peek() {
			Some('-' | '+') => digit_or_dot(self.peek_nth(1), self.peek_nth(2)),
			first => digit_or_dot(first, self.peek_nth(1)),
		}
	}

	// Called right after the opening brace of a raw block has been consumed
	fn capture_raw(&mut self) -> Token {
		let start = self.here();
		let text = self.text;
		let begin = self.offset;
		let mut depth = 1usize;

		while let Some(c) = self.peek() {
			match c {
				'{' => depth += 1,
				'}' => {
					depth -= 1;
					if depth == 0 {
						let body = &text[begin..self.offset];
						let close = self.here();
						self.bump();
						self.pending_close = Some(self.token(TokenKind::RBrace, "}", close));
						return self.token(TokenKind::Raw, body, start);
					}
				}
				_ => {}
			}
			self.bump();
		}

		self.token(TokenKind::Error(LexIssue::UnterminatedBlock), &text[begin..], start)
	}

	fn advance_raw_state(&mut self, token: &Token) {
		let at_declaration = self.depth == self.raw_depth
			&& matches!(
				self.previous,
				None | Some(TokenKind::LBrace | TokenKind::RBrace | TokenKind::Semi)
			);

		self.raw_state = match (self.raw_keyword, self.raw_state, token.kind) {
			(Some(keyword), _, TokenKind::Ident) if at_declaration && token.lexeme == keyword => RawState::Keyword,
			(Some(_), RawState::Keyword, TokenKind::Ident) => RawState::Named,
			(Some(_), RawState::Keyword | RawState::Named, TokenKind::LBrace) => RawState::Capture,
			_ => RawState::Idle,
		};

		match token.kind {
			TokenKind::LBrace => self.depth += 1,
			TokenKind::RBrace => self.depth = self.depth.saturating_sub(1),
			_ => {}
		}
		self.previous = Some(token.kind);
	}

	fn lex_token(&mut self) -> Token {
		if let Some(error) = self.skip_trivia() {
			self.finished = true;
			return error;
		}

		let start = self.here();
		let Some(c) = self.peek() else {
			self.finished = true;
			return self.token(TokenKind::Eof, "", start);
		};

		let punctuation = match c {
			'{' => Some(TokenKind::LBrace),
			'}' => Some(TokenKind::RBrace),
			'(' => Some(TokenKind::LParen),
			')' => Some(TokenKind::RParen),
			'[' => Some(TokenKind::LBracket),
			']' => Some(TokenKind::RBracket),
			'<' => Some(TokenKind::Less),
			'>' => Some(TokenKind::Greater),
			'=' => Some(TokenKind::Eq),
			',' => Some(TokenKind::Comma),
			':' => Some(TokenKind::Colon),
			';' => Some(TokenKind::Semi),
			_ => None,
		};

		if let Some(kind) = punctuation {
			self.bump();
			return self.token(kind, c.to_string(), start);
		}

		if c.is_ascii_alphabetic() || c == '_' {
			self.lex_ident(start)
		} else if self.starts_number() {
			self.lex_number(start)
		} else if c == '"' {
			self.lex_string(start)
		} else {
			self.bump();
			self.token(TokenKind::Error(LexIssue::UnexpectedChar), c.to_string(), start)
		}
	}
}

impl Iterator for Lexer<'_> {
	type Item = Token;

	fn next(&mut self) -> Option<Token> {
		if let Some(close) = self.pending_close.take() {
			self.advance_raw_state(&close);
			return Some(close);
		}

		if self.raw_state == RawState::Capture {
			self.raw_state = RawState::Idle;
			let raw = self.capture_raw();
			if matches!(raw.kind, TokenKind::Error(_)) {
				self.finished = true;
			}
			return Some(raw);
		}

		if self.finished {
			return None;
		}

		let token = self.lex_token();
		self.advance_raw_state(&token);
		Some(token)
	}
}

/// Tokenizes a whole Scribble source. `GLSL` blocks directly inside `Shader { }` come out as raw
/// tokens.
pub fn tokenize(file: SourcePath, text: &str) -> Vec<Token> {
	Lexer::new(file, text).with_raw_keyword("GLSL", 1).collect()
}

/*
--------------------------------------------------------------------------------
||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||
--------------------------------------------------------------------------------
*/

#[cfg(test)]
mod tests {
	use super::*;

	fn file() -> SourcePath {
		Arc::new(Utf8UnixPathBuf::from("/test.glsl"))
	}

	fn kinds(text: &str) -> Vec<TokenKind> {
		tokenize(file(), text).into_iter().map(|t| t.kind).collect()
	}

	#[test]
	fn punctuation_and_identifiers() {
		assert_eq!(
			kinds("Pass { Vertex = (A, B) }"),
			vec![
				TokenKind::Ident,
				TokenKind::LBrace,
				TokenKind::Ident,
				TokenKind::Eq,
				TokenKind::LParen,
				TokenKind::Ident,
				TokenKind::Comma,
				TokenKind::Ident,
				TokenKind::RParen,
				TokenKind::RBrace,
				TokenKind::Eof,
			]
		);
	}

	#[test]
	fn numbers_accept_sign_fraction_and_exponent() {
		let tokens = tokenize(file(), "-1 0.5 +2.5e-3 .25 1.0f 3e2");
		let lexemes: Vec<_> = tokens.iter().filter(|t| t.kind == TokenKind::Number).map(|t| t.lexeme.as_str()).collect();
		assert_eq!(lexemes, vec!["-1", "0.5", "+2.5e-3", ".25", "1.0f", "3e2"]);
	}

	#[test]
	fn strings_unescape_quotes() {
		let tokens = tokenize(file(), r#""say \"hi\"""#);
		assert_eq!(tokens[0].kind, TokenKind::String);
		assert_eq!(tokens[0].lexeme, r#"say "hi""#);
	}

	#[test]
	fn comments_keep_positions() {
		let tokens = tokenize(file(), "/* one\ntwo */ a // trailing\n  b");
		assert_eq!(tokens[0].lexeme, "a");
		assert_eq!((tokens[0].position.line, tokens[0].position.column), (2, 8));
		assert_eq!(tokens[1].lexeme, "b");
		assert_eq!((tokens[1].position.line, tokens[1].position.column), (3, 3));
	}

	#[test]
	fn malformed_input_yields_error_tokens() {
		assert_eq!(kinds("a @ b")[1], TokenKind::Error(LexIssue::UnexpectedChar));
		assert_eq!(kinds("\"open\nx")[0], TokenKind::Error(LexIssue::UnterminatedString));
		assert_eq!(kinds("a /* open")[1], TokenKind::Error(LexIssue::UnterminatedComment));
	}

	#[test]
	fn glsl_blocks_are_captured_verbatim() {
		let text = "Shader { GLSL Common {\nvoid f() { if (x) { y(); } }\n#define Z @\n}\nTechnique }";
		let tokens = tokenize(file(), text);

		assert_eq!(tokens[5].kind, TokenKind::Raw);
		assert_eq!(tokens[5].lexeme, "\nvoid f() { if (x) { y(); } }\n#define Z @\n");
		assert_eq!((tokens[5].position.line, tokens[5].position.column), (1, 23));
		assert_eq!(tokens[6].kind, TokenKind::RBrace);
		assert_eq!(tokens[6].position.line, 4);
		assert!(tokens[7].is_keyword("Technique"));
		assert_eq!(tokens[8].kind, TokenKind::RBrace);
	}

	#[test]
	fn anonymous_glsl_block_is_captured() {
		let tokens = tokenize(file(), "Shader { GLSL { int a; } }");
		assert_eq!(tokens[4].kind, TokenKind::Raw);
		assert_eq!(tokens[4].lexeme, " int a; ");
	}

	#[test]
	fn raw_keyword_elsewhere_is_an_identifier() {
		let text = "Shader { GLSL A { x } Technique GLSL { Pass { Vertex = GLSL } } }";
		let kinds: Vec<_> = tokenize(file(), text).into_iter().map(|t| t.kind).collect();

		assert_eq!(kinds.iter().filter(|kind| **kind == TokenKind::Raw).count(), 1);
		assert_eq!(kinds[kinds.len() - 2], TokenKind::RBrace);

		let top_level: Vec<_> = tokenize(file(), "GLSL { x }").into_iter().map(|t| t.kind).collect();
		assert!(!top_level.contains(&TokenKind::Raw));
	}

	#[test]
	fn unterminated_glsl_block() {
		let tokens = tokenize(file(), "Shader { GLSL A { {");
		assert_eq!(tokens.last().map(|t| t.kind), Some(TokenKind::Error(LexIssue::UnterminatedBlock)));
	}

	#[test]
	fn tokenizing_is_restartable() {
		let lexer = Lexer::new(file(), "a b c").with_raw_keyword("GLSL", 1);
		let first: Vec<_> = lexer.clone().collect();
		let second: Vec<_> = lexer.collect();
		assert_eq!(first, second);
	}
}
