//! A deliberately small page template: literal text interleaved with
//! `{{ name }}` placeholders. There are no loops or conditionals; every
//! placeholder is replaced by a value from a [`Values`] map.

use pulldown_cmark::escape::escape_html;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// The values substituted into a [`Template`], keyed by placeholder name.
pub type Values = HashMap<&'static str, String>;

#[derive(Clone, Debug, PartialEq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// A parsed template.
#[derive(Clone, Debug, PartialEq)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    /// Parses a template from its source text.
    pub fn parse(source: &str) -> Result<Template> {
        let mut segments = Vec::new();
        let mut rest = source;
        let mut offset = 0;
        while let Some(start) = rest.find(OPEN) {
            if start > 0 {
                segments.push(Segment::Literal(rest[..start].to_owned()));
            }
            let after_open = &rest[start + OPEN.len()..];
            let end = after_open
                .find(CLOSE)
                .ok_or(Error::Unterminated(offset + start))?;
            let name = after_open[..end].trim();
            if name.is_empty()
                || !name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_')
            {
                return Err(Error::InvalidName(after_open[..end].to_owned()));
            }
            segments.push(Segment::Placeholder(name.to_owned()));

            let consumed = start + OPEN.len() + end + CLOSE.len();
            offset += consumed;
            rest = &rest[consumed..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_owned()));
        }
        Ok(Template { segments })
    }

    /// Reads and parses the template file at `path`.
    pub fn load(path: &Path) -> Result<Template> {
        let source = fs::read_to_string(path).map_err(|err| Error::Open {
            path: path.to_owned(),
            err,
        })?;
        Template::parse(&source).map_err(|err| Error::Annotated(path.to_owned(), Box::new(err)))
    }

    /// Fails with [`Error::UnknownPlaceholder`] on the first placeholder not
    /// named in `known`, so a template can be checked before any page is
    /// rendered with it.
    pub fn check(&self, known: &[&str]) -> Result<()> {
        for segment in &self.segments {
            if let Segment::Placeholder(name) = segment {
                if !known.contains(&name.as_str()) {
                    return Err(Error::UnknownPlaceholder(name.clone()));
                }
            }
        }
        Ok(())
    }

    /// Substitutes `values` into the template. Every placeholder must have a
    /// value; extra values are ignored.
    pub fn render(&self, values: &Values) -> Result<String> {
        let mut output = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => output.push_str(text),
                Segment::Placeholder(name) => match values.get(name.as_str()) {
                    Some(value) => output.push_str(value),
                    None => return Err(Error::UnknownPlaceholder(name.clone())),
                },
            }
        }
        Ok(output)
    }
}

/// Escapes `text` for use as HTML text or a quoted attribute value.
pub fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    // Writing into a `String` can't fail.
    let _ = escape_html(&mut escaped, text);
    escaped
}

/// The result of a fallible template operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error parsing or rendering a [`Template`].
#[derive(Debug)]
pub enum Error {
    /// Returned when a `{{` has no matching `}}`. Holds the byte offset of
    /// the opening braces.
    Unterminated(usize),

    /// Returned when the text between the braces isn't a placeholder name.
    InvalidName(String),

    /// Returned when rendering a placeholder that has no value.
    UnknownPlaceholder(String),

    /// Returned when a template file can't be read.
    Open { path: PathBuf, err: std::io::Error },

    /// An error in a particular template file.
    Annotated(PathBuf, Box<Error>),
}

impl fmt::Display for Error {
    /// Displays an [`Error`] as human-readable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Unterminated(offset) => {
                write!(f, "unterminated `{}` at byte {}", OPEN, offset)
            }
            Error::InvalidName(name) => {
                write!(f, "invalid placeholder name `{}`", name)
            }
            Error::UnknownPlaceholder(name) => {
                write!(f, "unknown placeholder `{}`", name)
            }
            Error::Open { path, err } => {
                write!(f, "Opening template file '{}': {}", path.display(), err)
            }
            Error::Annotated(path, err) => {
                write!(f, "template '{}': {}", path.display(), err)
            }
        }
    }
}

impl std::error::Error for Error {
    /// Implements the [`std::error::Error`] trait for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Unterminated(_) => None,
            Error::InvalidName(_) => None,
            Error::UnknownPlaceholder(_) => None,
            Error::Open { path: _, err } => Some(err),
            Error::Annotated(_, err) => Some(err),
        }
    }
}
