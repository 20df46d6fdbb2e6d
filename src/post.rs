//! Defines the [`Post`] type and the logic for loading a post from its
//! directory: locating the Markdown file, converting it, and deriving the
//! post's slug, date, and title.

use crate::markdown::{self, Rendered};
use chrono::{DateTime, Utc};
use log::{debug, warn};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// The extension of post source files.
pub const MARKDOWN_EXTENSION: &str = "md";

/// The extension of generated pages.
pub const HTML_EXTENSION: &str = "html";

/// A single blog entry, created fresh on every build from a post directory.
#[derive(Clone, Debug)]
pub struct Post {
    /// The directory holding the post's source file and assets.
    pub source_directory: PathBuf,

    /// The post's Markdown source file.
    pub markdown_file: PathBuf,

    /// The slugified directory name. The post page is written to
    /// `{slug}.html` and the post's assets to `{slug}/`.
    pub slug: String,

    /// The text of the first level-1 heading, falling back to the slug for
    /// posts which have none.
    pub title: String,

    /// The source file's modification time.
    pub date: DateTime<Utc>,

    /// The rendered HTML fragment for the post body.
    pub body: String,

    /// The rendered HTML for the post's index-page preview.
    pub summary: String,
}

impl Post {
    /// Loads the post in `directory`.
    pub fn load(directory: &Path) -> Result<Post> {
        match Post::_load(directory) {
            Ok(post) => Ok(post),
            Err(e) => Err(Error::Annotated(directory.to_owned(), Box::new(e))),
        }
    }

    fn _load(directory: &Path) -> Result<Post> {
        let markdown_file = find_markdown_file(directory)?;
        let slug = slug_for(directory)?;
        debug!(
            "Loading post `{}` from `{}`",
            slug,
            markdown_file.display()
        );

        let date: DateTime<Utc> = fs::metadata(&markdown_file)?.modified()?.into();
        let Rendered {
            title,
            body,
            summary,
        } = markdown::convert_bytes(fs::read(&markdown_file)?, &slug)?;

        let title = match title {
            Some(title) if !title.is_empty() => title,
            _ => {
                warn!(
                    "`{}` has no level-1 heading; using `{}` as its title",
                    markdown_file.display(),
                    slug
                );
                slug.clone()
            }
        };

        Ok(Post {
            source_directory: directory.to_owned(),
            markdown_file,
            slug,
            title,
            date,
            body,
            summary,
        })
    }

    /// The post page's file name, relative to the output directory.
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.slug, HTML_EXTENSION)
    }

    /// Lists the post's assets: every non-hidden file in the post directory
    /// other than the Markdown source. Paths are relative to the post
    /// directory.
    pub fn assets(&self) -> Result<Vec<PathBuf>> {
        use walkdir::WalkDir;

        let mut assets = Vec::new();
        let walker = WalkDir::new(&self.source_directory)
            .min_depth(1)
            .sort_by(|a, b| a.file_name().cmp(b.file_name()))
            .into_iter()
            .filter_entry(|entry| !is_hidden(entry.file_name()));
        for result in walker {
            let entry = result?;
            if entry.file_type().is_file() && entry.path() != self.markdown_file {
                // strip_prefix shouldn't fail since the walk is rooted at
                // `source_directory`
                if let Ok(relative) = entry.path().strip_prefix(&self.source_directory) {
                    assets.push(relative.to_owned());
                }
            }
        }
        Ok(assets)
    }
}

fn is_hidden(file_name: &std::ffi::OsStr) -> bool {
    file_name.to_string_lossy().starts_with('.')
}

/// Derives a post's slug from its directory name.
pub fn slug_for(directory: &Path) -> Result<String> {
    let name = directory
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| Error::InvalidDirectoryName(directory.to_owned()))?;
    let slug = slug::slugify(name);
    if slug.is_empty() {
        return Err(Error::InvalidDirectoryName(directory.to_owned()));
    }
    Ok(slug)
}

/// Finds the Markdown file in a post directory. A file named after the
/// directory (`first-post/first-post.md`) wins; otherwise the directory
/// must contain exactly one Markdown file.
pub fn find_markdown_file(directory: &Path) -> Result<PathBuf> {
    if !directory.is_dir() {
        return Err(Error::NotFound(directory.to_owned()));
    }

    if let Some(name) = directory.file_name() {
        let preferred =
            directory.join(format!("{}.{}", name.to_string_lossy(), MARKDOWN_EXTENSION));
        if preferred.is_file() {
            return Ok(preferred);
        }
    }

    let mut candidates = Vec::new();
    for result in fs::read_dir(directory)? {
        let path = result?.path();
        if path.is_file() && is_markdown(&path) {
            candidates.push(path);
        }
    }
    candidates.sort();

    match candidates.len() {
        0 => Err(Error::NoMarkdown(directory.to_owned())),
        1 => Ok(candidates.remove(0)),
        _ => Err(Error::AmbiguousMarkdown(directory.to_owned(), candidates)),
    }
}

/// Reports whether `path` has the Markdown extension.
pub fn is_markdown(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case(MARKDOWN_EXTENSION))
        .unwrap_or(false)
}

/// Represents the result of a [`Post`]-load operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error loading a [`Post`].
#[derive(Debug)]
pub enum Error {
    /// Returned when the post directory doesn't exist.
    NotFound(PathBuf),

    /// Returned when the post directory holds no Markdown file.
    NoMarkdown(PathBuf),

    /// Returned when the post directory holds several Markdown files and
    /// none is named after the directory.
    AmbiguousMarkdown(PathBuf, Vec<PathBuf>),

    /// Returned when a slug can't be derived from the directory name.
    InvalidDirectoryName(PathBuf),

    /// Returned when the Markdown source can't be converted.
    Conversion(markdown::Error),

    /// Returned for other I/O errors.
    Io(std::io::Error),

    /// Returned for WalkDir I/O errors.
    WalkDir(walkdir::Error),

    /// An error annotated with the post directory.
    Annotated(PathBuf, Box<Error>),
}

impl fmt::Display for Error {
    /// Displays an [`Error`] as human-readable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::NotFound(path) => {
                write!(f, "post directory '{}' does not exist", path.display())
            }
            Error::NoMarkdown(path) => {
                write!(f, "no Markdown file found in '{}'", path.display())
            }
            Error::AmbiguousMarkdown(path, candidates) => write!(
                f,
                "'{}' holds {} Markdown files; name the post body '{}.{}'",
                path.display(),
                candidates.len(),
                path.file_name()
                    .map(|name| name.to_string_lossy())
                    .unwrap_or_default(),
                MARKDOWN_EXTENSION,
            ),
            Error::InvalidDirectoryName(path) => {
                write!(f, "can't derive a slug from '{}'", path.display())
            }
            Error::Conversion(err) => err.fmt(f),
            Error::Io(err) => err.fmt(f),
            Error::WalkDir(err) => err.fmt(f),
            Error::Annotated(path, err) => {
                write!(f, "loading post '{}': {}", path.display(), err)
            }
        }
    }
}

impl std::error::Error for Error {
    /// Implements the [`std::error::Error`] trait for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::NotFound(_) => None,
            Error::NoMarkdown(_) => None,
            Error::AmbiguousMarkdown(_, _) => None,
            Error::InvalidDirectoryName(_) => None,
            Error::Conversion(err) => Some(err),
            Error::Io(err) => Some(err),
            Error::WalkDir(err) => Some(err),
            Error::Annotated(_, err) => Some(err),
        }
    }
}

impl From<markdown::Error> for Error {
    /// Converts a [`markdown::Error`] into an [`Error`].
    fn from(err: markdown::Error) -> Error {
        Error::Conversion(err)
    }
}

impl From<walkdir::Error> for Error {
    /// Converts a [`walkdir::Error`] into an [`Error`]. It allows us to
    /// use the `?` operator while walking post directories.
    fn from(err: walkdir::Error) -> Error {
        Error::WalkDir(err)
    }
}

impl From<std::io::Error> for Error {
    /// Converts a [`std::io::Error`] into an [`Error`]. It allows us to
    /// use the `?` operator for fallible I/O functions.
    fn from(err: std::io::Error) -> Error {
        Error::Io(err)
    }
}
