//! Source file ownership and position tracking.
//!
//! Every token and AST node refers back into a [`SourceRegistry`] through a
//! [`Location`]. Source buffers are loaded once and never mutated, so the
//! registry is shared read-only between the pipeline stages.

use std::fs;
use std::path::Path;

/// Index of a file inside a [`SourceRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId(pub u32);

#[derive(Debug)]
pub struct SourceFile {
    pub name: String,
    pub text: String,
}

/// Owns the text of every input file for the duration of a compilation.
#[derive(Debug, Default)]
pub struct SourceRegistry {
    files: Vec<SourceFile>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_source(&mut self, name: impl Into<String>, text: impl Into<String>) -> FileId {
        self.files.push(SourceFile {
            name: name.into(),
            text: text.into(),
        });
        FileId(self.files.len() as u32 - 1)
    }

    pub fn add_path(&mut self, path: &Path) -> anyhow::Result<FileId> {
        let text = fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("could not open file '{}': {e}", path.display()))?;
        Ok(self.add_source(path.display().to_string(), text))
    }

    pub fn file(&self, id: FileId) -> &SourceFile {
        &self.files[id.0 as usize]
    }

    pub fn file_ids(&self) -> impl Iterator<Item = FileId> {
        (0..self.files.len() as u32).map(FileId)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// A span of bytes inside one source file.
///
/// `line` is 1-based, `column` is 0-based. `line_index` is the byte offset of
/// the start of the line, which lets diagnostics print the offending line
/// without rescanning the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub file: FileId,
    pub line: usize,
    pub column: usize,
    pub length: usize,
    pub line_index: usize,
}

impl Location {
    pub fn new(file: FileId, line: usize, column: usize, length: usize, line_index: usize) -> Self {
        Self {
            file,
            line,
            column,
            length,
            line_index,
        }
    }

    /// The source line this location points into, without its trailing newline.
    pub fn source_line<'a>(&self, registry: &'a SourceRegistry) -> &'a str {
        let text = &registry.file(self.file).text;
        let rest = &text[self.line_index.min(text.len())..];
        rest.split('\n').next().unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_roundtrip() {
        let mut registry = SourceRegistry::new();
        let id = registry.add_source("hello.fl", "var x = 1\n");
        assert_eq!(registry.file(id).name, "hello.fl");
        assert_eq!(registry.file(id).text, "var x = 1\n");
    }

    #[test]
    fn test_source_line() {
        let mut registry = SourceRegistry::new();
        let id = registry.add_source("t.fl", "first\nsecond\nthird");
        let loc = Location::new(id, 2, 0, 6, 6);
        assert_eq!(loc.source_line(&registry), "second");
    }
}
