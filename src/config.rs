//! Locates an Auteur project on disk ([`Project`]) and loads its site-wide
//! settings ([`SiteConfig`]) from `resources/config.json`.

use log::debug;
use serde::Deserialize;
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use url::Url;

/// The name of this program, used in user-facing messages.
pub const PROGRAM_NAME: &str = "Auteur";

/// The directory (relative to the project root) holding the config file,
/// stylesheet, background image, and template overrides.
pub const RESOURCES_DIRECTORY: &str = "resources";

/// The hidden directory (relative to the project root) holding the post
/// listing.
pub const STATE_DIRECTORY: &str = ".auteur";

const CONFIG_FILE_NAME: &str = "config.json";
const LISTING_FILE_NAME: &str = "listing.json";
const DEFAULT_OUTPUT_DIRECTORY: &str = "site";
const DEFAULT_STYLE_SHEET: &str = "style.css";

/// The on-disk layout of an Auteur project rooted at a single directory.
#[derive(Clone, Debug)]
pub struct Project {
    root: PathBuf,
}

impl Project {
    /// Creates a [`Project`] rooted at `root`. Nothing is checked on disk.
    pub fn new<P: Into<PathBuf>>(root: P) -> Project {
        Project { root: root.into() }
    }

    /// Searches `dir` and then each of its ancestors for a directory which
    /// looks like an Auteur project, i.e., one containing either
    /// `resources/config.json` or the `.auteur` state directory.
    pub fn discover(dir: &Path) -> Result<Project> {
        let project = Project::new(dir);
        if project.config_file().is_file() || project.state_directory().is_dir() {
            debug!("Found project root `{}`", dir.display());
            return Ok(project);
        }
        match dir.parent() {
            Some(parent) => Project::discover(parent),
            None => Err(Error::ProjectNotFound),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resources_directory(&self) -> PathBuf {
        self.root.join(RESOURCES_DIRECTORY)
    }

    pub fn config_file(&self) -> PathBuf {
        self.resources_directory().join(CONFIG_FILE_NAME)
    }

    pub fn state_directory(&self) -> PathBuf {
        self.root.join(STATE_DIRECTORY)
    }

    pub fn listing_file(&self) -> PathBuf {
        self.state_directory().join(LISTING_FILE_NAME)
    }

    pub fn default_output_directory(&self) -> PathBuf {
        self.root.join(DEFAULT_OUTPUT_DIRECTORY)
    }

    /// Resolves a registry entry (relative to the project root or absolute)
    /// to a post directory path.
    pub fn post_directory(&self, entry: &Path) -> PathBuf {
        self.root.join(entry)
    }
}

/// Site-wide settings. Loaded once per command and never mutated afterwards.
#[derive(Clone, Debug, PartialEq)]
pub struct SiteConfig {
    /// The URL of the site's root directory. Always ends in a `/` so that
    /// post URLs can be joined onto it.
    pub root_url: Url,

    /// The blog's title, shown in every page header and used as the index
    /// page's title.
    pub blog_title: String,

    pub blog_subtitle: Option<String>,

    /// The blog's owner. Also used as the feed's author.
    pub owner: String,

    pub email_address: String,

    pub description: String,

    /// The stylesheet's path relative to the resources directory.
    pub style_sheet: PathBuf,

    /// The background image's path relative to the resources directory, if
    /// the site has one.
    pub background_image: Option<PathBuf>,
}

// The config file exactly as it appears on disk, before validation.
#[derive(Deserialize)]
struct RawConfig {
    root_url: String,
    blog_title: String,
    #[serde(default)]
    blog_subtitle: Option<String>,
    owner: String,
    email_address: String,
    description: String,
    #[serde(default)]
    style_sheet: Option<PathBuf>,
    #[serde(default)]
    background_image: Option<PathBuf>,
}

impl SiteConfig {
    /// Loads and validates the config file at `path`.
    pub fn load(path: &Path) -> Result<SiteConfig> {
        let file = File::open(path).map_err(|err| Error::Open {
            path: path.to_owned(),
            err,
        })?;
        let raw: RawConfig = serde_json::from_reader(file)?;
        SiteConfig::from_raw(raw)
    }

    /// Parses and validates a config from a JSON string.
    pub fn from_json(input: &str) -> Result<SiteConfig> {
        SiteConfig::from_raw(serde_json::from_str(input)?)
    }

    fn from_raw(raw: RawConfig) -> Result<SiteConfig> {
        for (field, value) in [
            ("root_url", &raw.root_url),
            ("blog_title", &raw.blog_title),
            ("owner", &raw.owner),
            ("email_address", &raw.email_address),
            ("description", &raw.description),
        ]
        .iter()
        {
            if value.trim().is_empty() {
                return Err(Error::EmptyField(*field));
            }
        }

        // Post URLs are joined onto the root URL, and `Url::join` drops the
        // last path segment unless it ends in a slash.
        let mut root_url = raw.root_url;
        if !root_url.ends_with('/') {
            root_url.push('/');
        }
        let root_url = Url::parse(&root_url).map_err(|err| Error::InvalidRootUrl {
            url: root_url.clone(),
            err,
        })?;

        Ok(SiteConfig {
            root_url,
            blog_title: raw.blog_title,
            blog_subtitle: raw.blog_subtitle.filter(|s| !s.trim().is_empty()),
            owner: raw.owner,
            email_address: raw.email_address,
            description: raw.description,
            style_sheet: raw
                .style_sheet
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STYLE_SHEET)),
            background_image: raw.background_image,
        })
    }
}

/// The result of a fallible configuration operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents a problem locating a project or loading its config file.
#[derive(Debug)]
pub enum Error {
    /// Returned when no ancestor of the starting directory is a project.
    ProjectNotFound,

    /// Returned when the config file can't be opened.
    Open { path: PathBuf, err: std::io::Error },

    /// Returned when the config file isn't valid JSON or is missing a
    /// required field.
    Json(serde_json::Error),

    /// Returned when a required field is present but blank.
    EmptyField(&'static str),

    /// Returned when `root_url` isn't an absolute URL.
    InvalidRootUrl { url: String, err: url::ParseError },
}

impl fmt::Display for Error {
    /// Displays an [`Error`] as human-readable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::ProjectNotFound => write!(
                f,
                "An {} project could not be found in the current directory",
                PROGRAM_NAME
            ),
            Error::Open { path, err } => {
                write!(f, "Opening configuration file '{}': {}", path.display(), err)
            }
            Error::Json(err) => write!(f, "Invalid configuration file: {}", err),
            Error::EmptyField(field) => {
                write!(f, "'{}' field in configuration file must not be empty", field)
            }
            Error::InvalidRootUrl { url, err } => {
                write!(f, "Invalid 'root_url' `{}`: {}", url, err)
            }
        }
    }
}

impl std::error::Error for Error {
    /// Implements the [`std::error::Error`] trait for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::ProjectNotFound => None,
            Error::Open { path: _, err } => Some(err),
            Error::Json(err) => Some(err),
            Error::EmptyField(_) => None,
            Error::InvalidRootUrl { url: _, err } => Some(err),
        }
    }
}

impl From<serde_json::Error> for Error {
    /// Converts a [`serde_json::Error`] into an [`Error`]. It allows us to use
    /// the `?` operator for [`serde_json`] deserialization functions.
    fn from(err: serde_json::Error) -> Error {
        Error::Json(err)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const MINIMAL: &str = r#"{
        "root_url": "http://x/",
        "blog_title": "X",
        "owner": "A",
        "email_address": "a@x",
        "description": "d"
    }"#;

    #[test]
    fn test_load_minimal_config() -> Result<()> {
        let config = SiteConfig::from_json(MINIMAL)?;
        assert_eq!("http://x/", config.root_url.as_str());
        assert_eq!("X", config.blog_title);
        assert_eq!(None, config.blog_subtitle);
        assert_eq!(PathBuf::from("style.css"), config.style_sheet);
        assert_eq!(None, config.background_image);
        Ok(())
    }

    #[test]
    fn test_root_url_gets_trailing_slash() -> Result<()> {
        let config = SiteConfig::from_json(&MINIMAL.replace("http://x/", "https://x.org/blog"))?;
        assert_eq!("https://x.org/blog/", config.root_url.as_str());
        assert_eq!(
            "https://x.org/blog/hello.html",
            config.root_url.join("hello.html").unwrap().as_str()
        );
        Ok(())
    }

    #[test]
    fn test_missing_field_is_rejected() {
        let input = MINIMAL.replace(r#""owner": "A","#, "");
        match SiteConfig::from_json(&input) {
            Err(Error::Json(err)) => assert!(err.to_string().contains("owner")),
            other => panic!("wanted a JSON error, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_field_is_rejected() {
        let input = MINIMAL.replace(r#""blog_title": "X""#, r#""blog_title": "  ""#);
        match SiteConfig::from_json(&input) {
            Err(Error::EmptyField(field)) => assert_eq!("blog_title", field),
            other => panic!("wanted an empty field error, got {:?}", other),
        }
    }

    #[test]
    fn test_relative_root_url_is_rejected() {
        let input = MINIMAL.replace("http://x/", "blog/");
        assert!(matches!(
            SiteConfig::from_json(&input),
            Err(Error::InvalidRootUrl { .. })
        ));
    }

    #[test]
    fn test_optional_fields() -> Result<()> {
        let input = MINIMAL.replace(
            r#""description": "d""#,
            r#""description": "d",
               "blog_subtitle": "Notes",
               "style_sheet": "css/main.css",
               "background_image": "bg.jpg""#,
        );
        let config = SiteConfig::from_json(&input)?;
        assert_eq!(Some("Notes".to_owned()), config.blog_subtitle);
        assert_eq!(PathBuf::from("css/main.css"), config.style_sheet);
        assert_eq!(Some(PathBuf::from("bg.jpg")), config.background_image);
        Ok(())
    }

    #[test]
    fn test_discover_searches_ancestors() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        std::fs::create_dir_all(dir.path().join(RESOURCES_DIRECTORY))?;
        std::fs::write(dir.path().join(RESOURCES_DIRECTORY).join(CONFIG_FILE_NAME), MINIMAL)?;
        let nested = dir.path().join("posts").join("first");
        std::fs::create_dir_all(&nested)?;

        let project = Project::discover(&nested)?;
        assert_eq!(dir.path(), project.root());
        let config = SiteConfig::load(&project.config_file())?;
        assert_eq!("X", config.blog_title);
        Ok(())
    }
}
