//! The post registry: the ordered list of post directories known to the
//! build, persisted as a JSON array in `.auteur/listing.json`. The `add`
//! command appends to it; `build` reads it.

use crate::config::Project;
use crate::post::{self, find_markdown_file, is_markdown};
use log::{debug, info};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// The registered post directories of a single project, in the order they
/// were added.
#[derive(Debug)]
pub struct Registry {
    /// The project root. Entries under it are stored relative to it.
    root: PathBuf,

    /// The listing file the registry was loaded from and is saved to.
    listing_file: PathBuf,

    entries: Vec<PathBuf>,
}

impl Registry {
    /// Loads the registry of `project`. A project without a listing file has
    /// an empty registry.
    pub fn load(project: &Project) -> Result<Registry> {
        let listing_file = project.listing_file();
        let entries: Vec<PathBuf> = match fs::read(&listing_file) {
            Ok(contents) => serde_json::from_slice(&contents).map_err(|err| Error::Json {
                path: listing_file.clone(),
                err,
            })?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(err) => {
                return Err(Error::Io {
                    path: listing_file,
                    err,
                })
            }
        };
        debug!(
            "Loaded {} post(s) from `{}`",
            entries.len(),
            listing_file.display()
        );
        Ok(Registry {
            root: project.root().to_owned(),
            listing_file,
            entries,
        })
    }

    /// The registered post directories in registration order. Relative
    /// entries are relative to the project root.
    pub fn list(&self) -> &[PathBuf] {
        &self.entries
    }

    /// Registers a post. `path` may be the post's Markdown file or the post
    /// directory itself; either way the directory is what gets registered.
    /// Returns the new entry.
    pub fn register(&mut self, path: &Path) -> Result<&Path> {
        if !path.exists() {
            return Err(Error::NotFound(path.to_owned()));
        }

        let directory = if path.is_file() {
            if !is_markdown(path) {
                return Err(Error::NotMarkdown(path.to_owned()));
            }
            match path.parent() {
                Some(parent) if parent.as_os_str().is_empty() => PathBuf::from("."),
                Some(parent) => parent.to_owned(),
                None => return Err(Error::NotFound(path.to_owned())),
            }
        } else {
            path.to_owned()
        };

        // The directory must hold a usable post body now, not only at build
        // time, and a named file must be the one the build will use.
        let body = find_markdown_file(&directory)?;
        if path.is_file() && canonicalize(&body)? != canonicalize(path)? {
            return Err(Error::NotPostBody {
                file: path.to_owned(),
                body,
            });
        }

        let entry = self.entry_for(&directory)?;
        if self.contains(&entry)? {
            return Err(Error::Duplicate(entry));
        }

        info!("Registered post `{}`", entry.display());
        self.entries.push(entry);
        Ok(self.entries[self.entries.len() - 1].as_path())
    }

    /// Writes the registry back to its listing file. The new listing is
    /// written beside the old one and renamed over it.
    pub fn save(&self) -> Result<()> {
        let io_err = |path: &Path| {
            let path = path.to_owned();
            move |err| Error::Io { path, err }
        };

        if let Some(parent) = self.listing_file.parent() {
            fs::create_dir_all(parent).map_err(io_err(parent))?;
        }

        let contents = serde_json::to_vec_pretty(&self.entries).map_err(|err| Error::Json {
            path: self.listing_file.clone(),
            err,
        })?;
        let staging = self.listing_file.with_extension("json.tmp");
        fs::write(&staging, contents).map_err(io_err(&staging))?;
        fs::rename(&staging, &self.listing_file).map_err(io_err(&self.listing_file))?;
        debug!("Saved `{}`", self.listing_file.display());
        Ok(())
    }

    // Canonicalizes `directory` and, if it lives under the project root,
    // makes it relative to the root so the project can be moved.
    fn entry_for(&self, directory: &Path) -> Result<PathBuf> {
        let directory = canonicalize(directory)?;
        let root = canonicalize(&self.root)?;
        Ok(match directory.strip_prefix(&root) {
            Ok(relative) if relative.as_os_str().is_empty() => directory,
            Ok(relative) => relative.to_owned(),
            Err(_) => directory,
        })
    }

    fn contains(&self, entry: &Path) -> Result<bool> {
        let wanted = canonicalize(&self.root.join(entry))?;
        for existing in &self.entries {
            // Entries whose directories have since disappeared can't match.
            if let Ok(existing) = fs::canonicalize(self.root.join(existing)) {
                if existing == wanted {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }
}

/// Registers the post at `path` with `project` and persists the registry.
/// This is the whole of the `add` command.
pub fn add(project: &Project, path: &Path) -> Result<PathBuf> {
    let mut registry = Registry::load(project)?;
    let entry = registry.register(path)?.to_owned();
    registry.save()?;
    Ok(entry)
}

fn canonicalize(path: &Path) -> Result<PathBuf> {
    fs::canonicalize(path).map_err(|err| Error::Io {
        path: path.to_owned(),
        err,
    })
}

/// The result of a fallible registry operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error reading, updating, or writing the registry.
#[derive(Debug)]
pub enum Error {
    /// Returned when the path to register doesn't exist.
    NotFound(PathBuf),

    /// Returned when the path to register is already registered.
    Duplicate(PathBuf),

    /// Returned when the path to register is a file but not a Markdown file.
    NotMarkdown(PathBuf),

    /// Returned when the named Markdown file isn't the one its directory's
    /// post is built from, e.g. `notes.md` beside `essay/essay.md`.
    NotPostBody { file: PathBuf, body: PathBuf },

    /// Returned when the post directory doesn't hold a usable post body.
    Post(post::Error),

    /// Returned when the listing file isn't a JSON array of paths.
    Json {
        path: PathBuf,
        err: serde_json::Error,
    },

    /// Returned for I/O errors on the listing file or the post directory.
    Io { path: PathBuf, err: io::Error },
}

impl fmt::Display for Error {
    /// Displays an [`Error`] as human-readable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::NotFound(path) => write!(f, "'{}' does not exist", path.display()),
            Error::Duplicate(path) => {
                write!(f, "'{}' is already registered", path.display())
            }
            Error::NotMarkdown(path) => {
                write!(f, "'{}' is not a Markdown file", path.display())
            }
            Error::NotPostBody { file, body } => write!(
                f,
                "'{}' would be ignored since the post is built from '{}'",
                file.display(),
                body.display()
            ),
            Error::Post(err) => err.fmt(f),
            Error::Json { path, err } => {
                write!(f, "Reading listing file '{}': {}", path.display(), err)
            }
            Error::Io { path, err } => write!(f, "'{}': {}", path.display(), err),
        }
    }
}

impl std::error::Error for Error {
    /// Implements the [`std::error::Error`] trait for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::NotFound(_) => None,
            Error::Duplicate(_) => None,
            Error::NotMarkdown(_) => None,
            Error::NotPostBody { .. } => None,
            Error::Post(err) => Some(err),
            Error::Json { path: _, err } => Some(err),
            Error::Io { path: _, err } => Some(err),
        }
    }
}

impl From<post::Error> for Error {
    /// Converts a [`post::Error`] into an [`Error`].
    fn from(err: post::Error) -> Error {
        match err {
            post::Error::NotFound(path) => Error::NotFound(path),
            err => Error::Post(err),
        }
    }
}
