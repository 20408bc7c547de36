use std::{io, sync::{Arc, LazyLock}};

use log::trace;
use regex::Regex;
use typed_path::{Utf8UnixPath, Utf8UnixPathBuf};

use super::{
	deps::{content_hash, IncludeEdge},
	error::{Error, Result},
	lexer::{Position, SourcePath},
};
use crate::libs::source::{rooted, SourceProvider};

/*
--------------------------------------------------------------------------------
||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||
--------------------------------------------------------------------------------
*/

// Any line that looks like an include, well-formed or not
static INCLUDE_LINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"^\s*#\s*include\b"#).unwrap());

// `#include "path"` or `#include <path>`, optionally followed by a line comment
static INCLUDE_DIRECTIVE: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r#"^\s*#\s*include\s*(?:"([^"]+)"|<([^>]+)>)\s*(?://.*)?$"#).unwrap()
});

/// Where one line of expanded text came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Origin {
	pub file: SourcePath,
	pub line: u32,
}

/// A run of consecutive output lines that map onto consecutive lines of one source file.
#[derive(Clone, Debug, PartialEq, Eq)]
struct Segment {
	/// First output line, 1-based.
	start: u32,
	len: u32,
	file: SourcePath,
	/// Source line of the first output line.
	line: u32,
}

/// Maps lines of assembled text back to the files and lines they were taken from.
///
/// Lines without an origin (generated text) simply have no segment.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceMap {
	segments: Vec<Segment>,
}

impl SourceMap {
	pub fn new() -> Self {
		Self::default()
	}

	/// Records that `output_line` came from `line` of `file`. Lines must be pushed in increasing order.
	pub fn push(&mut self, output_line: u32, file: &SourcePath, line: u32) {
		if let Some(last) = self.segments.last_mut() {
			if last.start + last.len == output_line && last.line + last.len == line && last.file == *file {
				last.len += 1;
				return;
			}
		}

		self.segments.push(Segment {
			start: output_line,
			len: 1,
			file: file.clone(),
			line,
		});
	}

	pub fn locate(&self, output_line: u32) -> Option<Origin> {
		let index = self.segments.partition_point(|segment| segment.start + segment.len <= output_line);
		let segment = self.segments.get(index)?;

		(segment.start <= output_line).then(|| Origin {
			file: segment.file.clone(),
			line: segment.line + (output_line - segment.start),
		})
	}

	/// The part of the map covering output lines `first..first + count`, renumbered from 1.
	pub fn slice(&self, first: u32, count: u32) -> SourceMap {
		let mut sliced = SourceMap::new();
		for output_line in first..first + count {
			if let Some(origin) = self.locate(output_line) {
				sliced.push(output_line - first + 1, &origin.file, origin.line);
			}
		}
		sliced
	}
}

/// Text with every `#include` substituted, plus the map back to the original files.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExpandedSource {
	pub text: String,
	pub map: SourceMap,
	lines: u32,
}

impl ExpandedSource {
	/// `text` as-is, its first line being `first_line` of `file`.
	pub fn verbatim(text: &str, file: &SourcePath, first_line: u32) -> Self {
		let mut source = Self::default();
		for (index, line) in text.split_inclusive('\n').enumerate() {
			source.push_line(line, file, first_line + index as u32);
		}
		source
	}

	/// `text` with an existing map, such as a slice of a larger expansion.
	pub fn with_map(text: String, map: SourceMap) -> Self {
		let lines = text.split_inclusive('\n').count() as u32;
		Self { text, map, lines }
	}

	pub fn line_count(&self) -> u32 {
		self.lines
	}

	pub fn locate(&self, line: u32) -> Option<Origin> {
		self.map.locate(line)
	}

	fn push_line(&mut self, line: &str, file: &SourcePath, source_line: u32) {
		self.text.push_str(line);
		self.lines += 1;
		self.map.push(self.lines, file, source_line);
	}

	// Included text has to end its last line before the includer carries on
	fn terminate_line(&mut self) {
		if !self.text.is_empty() && !self.text.ends_with('\n') {
			self.text.push('\n');
		}
	}
}

/// The result of expanding one text: the expanded source and every include that happened.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Expansion {
	pub source: ExpandedSource,
	pub edges: Vec<IncludeEdge>,
	/// Every file read, with the [`content_hash`] of the text that was expanded.
	pub contents: Vec<(SourcePath, u64)>,
}

/*
--------------------------------------------------------------------------------
||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||
--------------------------------------------------------------------------------
*/

/// Reads `path` and expands its includes recursively.
///
/// `visited` holds the chain of files currently being expanded. Requesting one of them again is
/// a cycle; sibling includes of the same file are expanded each time.
pub fn expand(sources: &dyn SourceProvider, path: &Utf8UnixPath, visited: &mut Vec<SourcePath>) -> Result<Expansion> {
	let path: SourcePath = Arc::new(rooted(path.as_str()));
	let text = sources.read(&path).map_err(|source| Error::Read {
		path: path.to_path_buf(),
		source,
	})?;

	visited.push(path.clone());
	let expansion = expand_source(sources, &path, &text, 1, visited);
	visited.pop();

	let mut expansion = expansion?;
	expansion.contents.insert(0, (path, content_hash(&text)));
	Ok(expansion)
}

/// Expands includes in `text`, which is a piece of `file` starting at `first_line`.
pub fn expand_source(
	sources: &dyn SourceProvider,
	file: &SourcePath,
	text: &str,
	first_line: u32,
	visited: &mut Vec<SourcePath>,
) -> Result<Expansion> {
	let mut expander = Expander {
		sources,
		visited,
		edges: Vec::new(),
		contents: Vec::new(),
	};

	let mut source = ExpandedSource::default();
	expander.expand_into(file, text, first_line, &mut source)?;

	Ok(Expansion {
		source,
		edges: expander.edges,
		contents: expander.contents,
	})
}

/// Resolves an include target against the file that includes it.
pub fn resolve_include(includer: &Utf8UnixPath, target: &str) -> Utf8UnixPathBuf {
	let target = Utf8UnixPath::new(target);
	if target.is_absolute() {
		return rooted(target.as_str());
	}

	let parent = includer.parent().map(|parent| parent.to_path_buf()).unwrap_or_else(|| rooted(""));
	rooted(parent.join(target).as_str())
}

struct Expander<'a, 'b> {
	sources: &'a dyn SourceProvider,
	visited: &'b mut Vec<SourcePath>,
	edges: Vec<IncludeEdge>,
	contents: Vec<(SourcePath, u64)>,
}

impl Expander<'_, '_> {
	fn expand_into(&mut self, file: &SourcePath, text: &str, first_line: u32, out: &mut ExpandedSource) -> Result<()> {
		for (index, line) in text.split_inclusive('\n').enumerate() {
			let line_number = first_line + index as u32;

			if !INCLUDE_LINE.is_match(line) {
				out.push_line(line, file, line_number);
				continue;
			}

			let column = line.find('#').map_or(1, |offset| line[..offset].chars().count() as u32 + 1);
			let position = Position::new(file.clone(), line_number, column);

			let target = INCLUDE_DIRECTIVE
				.captures(line.trim_end())
				.and_then(|caps| caps.get(1).or_else(|| caps.get(2)))
				.map(|target| target.as_str().trim().to_owned())
				.filter(|target| !target.is_empty())
				.ok_or_else(|| Error::syntax("a quoted include path", line.trim(), position.clone()))?;

			self.include(file, &target, position, out)?;
		}

		Ok(())
	}

	fn include(&mut self, includer: &SourcePath, target: &str, position: Position, out: &mut ExpandedSource) -> Result<()> {
		let included: SourcePath = Arc::new(resolve_include(includer, target));

		if let Some(start) = self.visited.iter().position(|path| *path == included) {
			let mut chain: Vec<_> = self.visited[start..].iter().map(|path| path.to_path_buf()).collect();
			chain.push(included.to_path_buf());
			return Err(Error::CyclicInclude { chain, position });
		}

		let text = self.sources.read(&included).map_err(|source| match source.kind() {
			io::ErrorKind::NotFound => Error::MissingInclude {
				path: included.to_path_buf(),
				position: position.clone(),
			},
			_ => Error::Read {
				path: included.to_path_buf(),
				source,
			},
		})?;

		trace!("{}: including {}", position, included);
		self.contents.push((included.clone(), content_hash(&text)));

		self.edges.push(IncludeEdge {
			includer: includer.clone(),
			included: included.clone(),
			line: position.line,
		});

		self.visited.push(included.clone());
		let result = self.expand_into(&included, &text, 1, out);
		self.visited.pop();
		result?;

		out.terminate_line();
		Ok(())
	}
}

/*
--------------------------------------------------------------------------------
||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||||
--------------------------------------------------------------------------------
*/
