//! Exports the [`build_site`] function which stitches together the high-level
//! steps of building the output static site: loading the registered posts
//! ([`crate::post`]), rendering post and index pages ([`crate::write`]),
//! copying post assets and site resources into the output directory, and
//! generating the Atom feed ([`crate::feed`]).

use crate::config::{Error as ConfigError, Project, SiteConfig};
use crate::feed::{write_feed, Error as FeedError, FEED_FILE_NAME};
use crate::post::{Error as PostError, Post};
use crate::registry::{Error as RegistryError, Registry};
use crate::template::Error as TemplateError;
use crate::write::{Error as WriteError, Theme, Writer, INDEX_FILE_NAME};
use log::{debug, info, warn};
use std::collections::HashSet;
use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// The files produced by a build.
#[derive(Debug)]
pub struct SiteOutput {
    /// The output directory everything below lives in.
    pub directory: PathBuf,

    pub index: PathBuf,

    /// One page per post, in registry order.
    pub posts: Vec<PathBuf>,

    /// Copied post assets, stylesheet, and background image.
    pub resources: Vec<PathBuf>,

    pub feed: PathBuf,
}

/// Builds the site for `project` into `output_directory`. This loads the
/// config and registry and hands them to [`build`].
pub fn build_site(project: &Project, output_directory: &Path) -> Result<SiteOutput> {
    let config = SiteConfig::load(&project.config_file())?;
    let registry = Registry::load(project)?;
    let directories: Vec<PathBuf> = registry
        .list()
        .iter()
        .map(|entry| project.post_directory(entry))
        .collect();
    build(project, &config, &directories, output_directory)
}

/// Builds the site from the posts in `post_directories` (in display order).
/// The output directory is deleted and fully regenerated; any failure aborts
/// the whole build.
pub fn build(
    project: &Project,
    config: &SiteConfig,
    post_directories: &[PathBuf],
    output_directory: &Path,
) -> Result<SiteOutput> {
    // Load and check everything before touching the output directory so that
    // a bad post or template doesn't leave a half-deleted site behind.
    let posts = post_directories
        .iter()
        .map(|dir| Post::load(dir))
        .collect::<std::result::Result<Vec<Post>, PostError>>()?;
    check_slugs(&posts)?;
    let theme = Theme::load(&project.resources_directory())?;
    let stylesheet = resource_name(&config.style_sheet)?;
    let background_name = match &config.background_image {
        Some(path) => Some(resource_name(path)?),
        None => None,
    };

    clean(project, &posts, output_directory)?;
    info!(
        "Building {} post(s) into `{}`",
        posts.len(),
        output_directory.display()
    );

    let mut resources = Vec::new();
    for post in &posts {
        resources.extend(copy_assets(post, output_directory)?);
    }

    let resources_directory = project.resources_directory();
    let stylesheet_source = resources_directory.join(&config.style_sheet);
    if stylesheet_source.is_file() {
        resources.push(copy_file(
            &stylesheet_source,
            &output_directory.join(&stylesheet),
        )?);
    } else {
        warn!(
            "Stylesheet `{}` not found; pages will be unstyled",
            stylesheet_source.display()
        );
    }

    if let (Some(path), Some(name)) = (&config.background_image, &background_name) {
        resources.push(copy_file(
            &resources_directory.join(path),
            &output_directory.join(name),
        )?);
    }

    let writer = Writer {
        theme: &theme,
        config,
        output_directory,
        stylesheet: &stylesheet,
        background_image: background_name.as_deref(),
    };
    let written = writer.write_posts(&posts)?;

    let feed = output_directory.join(FEED_FILE_NAME);
    let file = File::create(&feed).map_err(|err| Error::Io {
        path: feed.clone(),
        err,
    })?;
    let mut feed_writer = BufWriter::new(file);
    write_feed(config, &posts, &mut feed_writer)?;
    feed_writer.flush().map_err(|err| Error::Io {
        path: feed.clone(),
        err,
    })?;

    info!(
        "Wrote {} post page(s), `{}`, and `{}`",
        written.posts.len(),
        INDEX_FILE_NAME,
        FEED_FILE_NAME
    );
    Ok(SiteOutput {
        directory: output_directory.to_owned(),
        index: written.index,
        posts: written.posts,
        resources,
        feed,
    })
}

/// Rejects post sets whose pages would overwrite each other or the index.
fn check_slugs(posts: &[Post]) -> Result<()> {
    let reserved = Path::new(INDEX_FILE_NAME)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut seen: HashSet<&str> = HashSet::new();
    for post in posts {
        if post.slug == reserved || !seen.insert(post.slug.as_str()) {
            return Err(Error::SlugCollision {
                slug: post.slug.clone(),
                directory: post.source_directory.clone(),
            });
        }
    }
    Ok(())
}

/// Deletes and recreates the output directory. Refuses to delete anything
/// the build reads from: the project root, its resources and state
/// directories, and every post directory.
fn clean(project: &Project, posts: &[Post], output_directory: &Path) -> Result<()> {
    // A missing output directory can't contain anything.
    if let Ok(output) = fs::canonicalize(output_directory) {
        let protected = [
            project.root().to_owned(),
            project.resources_directory(),
            project.state_directory(),
        ];
        let sources = posts.iter().map(|post| post.source_directory.clone());
        for path in protected.iter().cloned().chain(sources) {
            if let Ok(path) = fs::canonicalize(&path) {
                if path.starts_with(&output) {
                    return Err(Error::UnsafeOutputDirectory {
                        output: output_directory.to_owned(),
                        contains: path,
                    });
                }
            }
        }
    }

    match fs::remove_dir_all(output_directory) {
        Ok(()) => debug!("Removed `{}`", output_directory.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(Error::Clean {
                path: output_directory.to_owned(),
                err: e,
            })
        }
    }
    fs::create_dir_all(output_directory).map_err(|err| Error::Io {
        path: output_directory.to_owned(),
        err,
    })
}

/// Copies a post's assets to `{output_directory}/{slug}/`, preserving their
/// paths relative to the post directory.
fn copy_assets(post: &Post, output_directory: &Path) -> Result<Vec<PathBuf>> {
    let mut copied = Vec::new();
    for relative in post.assets()? {
        copied.push(copy_file(
            &post.source_directory.join(&relative),
            &output_directory.join(&post.slug).join(&relative),
        )?);
    }
    Ok(copied)
}

fn copy_file(src: &Path, dst: &Path) -> Result<PathBuf> {
    let io_err = |err| Error::Copy {
        src: src.to_owned(),
        dst: dst.to_owned(),
        err,
    };
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    fs::copy(src, dst).map_err(io_err)?;
    debug!("Copied `{}` to `{}`", src.display(), dst.display());
    Ok(dst.to_owned())
}

/// Resources are published at the top of the output directory under their
/// own file name. The name ends up inside a CSS `url("...")` and an HTML
/// attribute, so quotes, brackets and backslashes are rejected.
fn resource_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .filter(|name| {
            !name
                .chars()
                .any(|c| c.is_control() || "\"'\\<>()".contains(c))
        })
        .map(str::to_owned)
        .ok_or_else(|| Error::InvalidResource(path.to_owned()))
}

type Result<T> = std::result::Result<T, Error>;

/// The error type for building a site. Errors can be during config and
/// registry loading, post loading, templating, writing, cleaning the output
/// directory, copying files, and other I/O.
#[derive(Debug)]
pub enum Error {
    /// Returned for errors loading the config file.
    Config(ConfigError),

    /// Returned for errors loading the registry.
    Registry(RegistryError),

    /// Returned for errors loading and converting posts.
    Post(PostError),

    /// Returned for errors parsing template files.
    Template(TemplateError),

    /// Returned for errors writing pages to disk.
    Write(WriteError),

    /// Returned for errors writing the feed.
    Feed(FeedError),

    /// Returned when two posts share a slug or a post uses a reserved one.
    SlugCollision { slug: String, directory: PathBuf },

    /// Returned when the output directory is, or contains, the project root,
    /// its resources or state directory, or a post directory.
    UnsafeOutputDirectory { output: PathBuf, contains: PathBuf },

    /// Returned when a configured resource path has no usable file name.
    InvalidResource(PathBuf),

    /// Returned for I/O problems while cleaning the output directory.
    Clean { path: PathBuf, err: std::io::Error },

    /// Returned for I/O problems while copying assets and resources.
    Copy {
        src: PathBuf,
        dst: PathBuf,
        err: std::io::Error,
    },

    /// Returned for other I/O errors.
    Io { path: PathBuf, err: std::io::Error },
}

impl fmt::Display for Error {
    /// Implements [`fmt::Display`] for [`Error`].
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Config(err) => err.fmt(f),
            Error::Registry(err) => err.fmt(f),
            Error::Post(err) => err.fmt(f),
            Error::Template(err) => err.fmt(f),
            Error::Write(err) => err.fmt(f),
            Error::Feed(err) => write!(f, "Writing feed: {}", err),
            Error::SlugCollision { slug, directory } => write!(
                f,
                "Post '{}' would be written to '{}.html', which is already taken",
                directory.display(),
                slug
            ),
            Error::UnsafeOutputDirectory { output, contains } => write!(
                f,
                "Refusing to use '{}' as the output directory since it contains '{}'",
                output.display(),
                contains.display()
            ),
            Error::InvalidResource(path) => {
                write!(f, "Invalid resource path '{}'", path.display())
            }
            Error::Clean { path, err } => {
                write!(f, "Cleaning directory '{}': {}", path.display(), err)
            }
            Error::Copy { src, dst, err } => write!(
                f,
                "Copying '{}' to '{}': {}",
                src.display(),
                dst.display(),
                err
            ),
            Error::Io { path, err } => write!(f, "'{}': {}", path.display(), err),
        }
    }
}

impl std::error::Error for Error {
    /// Implements [`std::error::Error`] for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Config(err) => Some(err),
            Error::Registry(err) => Some(err),
            Error::Post(err) => Some(err),
            Error::Template(err) => Some(err),
            Error::Write(err) => Some(err),
            Error::Feed(err) => Some(err),
            Error::SlugCollision { .. } => None,
            Error::UnsafeOutputDirectory { .. } => None,
            Error::InvalidResource(_) => None,
            Error::Clean { path: _, err } => Some(err),
            Error::Copy { err, .. } => Some(err),
            Error::Io { path: _, err } => Some(err),
        }
    }
}

impl From<ConfigError> for Error {
    /// Converts [`ConfigError`]s into [`Error`]. This allows us to use the `?`
    /// operator.
    fn from(err: ConfigError) -> Error {
        Error::Config(err)
    }
}

impl From<RegistryError> for Error {
    /// Converts [`RegistryError`]s into [`Error`]. This allows us to use the
    /// `?` operator.
    fn from(err: RegistryError) -> Error {
        Error::Registry(err)
    }
}

impl From<PostError> for Error {
    /// Converts [`PostError`]s into [`Error`]. This allows us to use the `?`
    /// operator.
    fn from(err: PostError) -> Error {
        Error::Post(err)
    }
}

impl From<TemplateError> for Error {
    /// Converts [`TemplateError`]s into [`Error`]. This allows us to use the
    /// `?` operator.
    fn from(err: TemplateError) -> Error {
        Error::Template(err)
    }
}

impl From<WriteError> for Error {
    /// Converts [`WriteError`]s into [`Error`]. This allows us to use the `?`
    /// operator.
    fn from(err: WriteError) -> Error {
        Error::Write(err)
    }
}

impl From<FeedError> for Error {
    /// Converts [`FeedError`]s into [`Error`]. This allows us to use the `?`
    /// operator.
    fn from(err: FeedError) -> Error {
        Error::Feed(err)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::RESOURCES_DIRECTORY;
    use std::fs::{create_dir_all, read, read_to_string, write};
    use tempfile::TempDir;
    use walkdir::WalkDir;

    type TestResult = std::result::Result<(), Box<dyn std::error::Error>>;

    const CONFIG: &str = r#"{"root_url":"http://x/","blog_title":"X","owner":"A","email_address":"a@x","description":"d"}"#;

    fn project() -> std::io::Result<(TempDir, Project)> {
        let dir = tempfile::tempdir()?;
        create_dir_all(dir.path().join(RESOURCES_DIRECTORY))?;
        write(
            dir.path().join(RESOURCES_DIRECTORY).join("config.json"),
            CONFIG,
        )?;
        let project = Project::new(dir.path());
        Ok((dir, project))
    }

    fn add_post(project: &Project, name: &str, markdown: &str) -> TestResult {
        let post_dir = project.root().join(name);
        create_dir_all(&post_dir)?;
        write(post_dir.join(format!("{}.md", name)), markdown)?;
        let mut registry = Registry::load(project)?;
        registry.register(&post_dir.join(format!("{}.md", name)))?;
        registry.save()?;
        Ok(())
    }

    fn snapshot(dir: &Path) -> Vec<(PathBuf, Vec<u8>)> {
        WalkDir::new(dir)
            .sort_by(|a, b| a.file_name().cmp(b.file_name()))
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| {
                let contents = read(entry.path()).unwrap();
                (entry.path().to_owned(), contents)
            })
            .collect()
    }

    #[test]
    fn test_hello_world_site() -> TestResult {
        let (_dir, project) = project()?;
        add_post(&project, "post", "# Hello\nWorld")?;

        let output = project.default_output_directory();
        let site = build_site(&project, &output)?;

        assert_eq!(output.join("index.html"), site.index);
        assert_eq!(vec![output.join("post.html")], site.posts);

        let index = read_to_string(&site.index)?;
        assert!(index.contains(r#"<a href="post.html">Hello</a>"#));

        let post = read_to_string(output.join("post.html"))?;
        assert!(post.contains("<title>Hello | X</title>"));
        assert!(post.contains(r#"<h2 class="article_title">Hello</h2>"#));
        assert!(post.contains("<p>World</p>"));

        let feed = read_to_string(&site.feed)?;
        assert!(feed.contains("http://x/post.html"));
        Ok(())
    }

    #[test]
    fn test_one_page_per_post() -> TestResult {
        let (_dir, project) = project()?;
        add_post(&project, "first", "# First\n\nOne.\n")?;
        add_post(&project, "second", "# Second\n\nTwo.\n")?;
        add_post(&project, "third", "# Third\n\nThree.\n")?;

        let output = project.default_output_directory();
        build_site(&project, &output)?;

        let mut pages: Vec<String> = fs::read_dir(&output)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(".html"))
            .collect();
        pages.sort();
        assert_eq!(
            vec!["first.html", "index.html", "second.html", "third.html"],
            pages
        );

        let second = read_to_string(output.join("second.html"))?;
        assert!(second.contains(r#"<a href="first.html">Previous</a>"#));
        assert!(second.contains(r#"<a href="third.html">Next</a>"#));
        Ok(())
    }

    #[test]
    fn test_rebuild_is_byte_identical() -> TestResult {
        let (_dir, project) = project()?;
        add_post(&project, "first", "# First\n\nOne.\n\n![x](x.png)\n")?;
        write(project.root().join("first").join("x.png"), [1u8, 2, 3])?;
        add_post(&project, "second", "# Second\n\nTwo.\n")?;
        write(
            project.resources_directory().join("style.css"),
            "body { color: black; }",
        )?;

        let output = project.default_output_directory();
        build_site(&project, &output)?;
        let first = snapshot(&output);
        build_site(&project, &output)?;
        let second = snapshot(&output);

        assert!(!first.is_empty());
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn test_resources_and_assets_are_copied() -> TestResult {
        let (dir, project) = project()?;
        write(
            dir.path().join(RESOURCES_DIRECTORY).join("config.json"),
            CONFIG.replace(
                r#""description":"d""#,
                r#""description":"d","background_image":"bg.jpg""#,
            ),
        )?;
        write(project.resources_directory().join("style.css"), "p {}")?;
        write(project.resources_directory().join("bg.jpg"), [0xffu8, 0xd8])?;
        add_post(&project, "trip", "# Trip\n\n![view](photos/view.jpg)\n")?;
        create_dir_all(project.root().join("trip").join("photos"))?;
        write(
            project.root().join("trip").join("photos").join("view.jpg"),
            [7u8],
        )?;

        let output = project.default_output_directory();
        let site = build_site(&project, &output)?;

        assert_eq!(b"p {}".to_vec(), read(output.join("style.css"))?);
        assert_eq!(vec![0xffu8, 0xd8], read(output.join("bg.jpg"))?);
        assert_eq!(vec![7u8], read(output.join("trip").join("photos").join("view.jpg"))?);
        assert_eq!(3, site.resources.len());

        let page = read_to_string(output.join("trip.html"))?;
        assert!(page.contains(r#"src="trip/photos/view.jpg""#));
        assert!(page.contains(r#"url("bg.jpg")"#));
        Ok(())
    }

    #[test]
    fn test_missing_background_image_aborts() -> TestResult {
        let (dir, project) = project()?;
        write(
            dir.path().join(RESOURCES_DIRECTORY).join("config.json"),
            CONFIG.replace(
                r#""description":"d""#,
                r#""description":"d","background_image":"missing.png""#,
            ),
        )?;
        let result = build_site(&project, &project.default_output_directory());
        assert!(matches!(result, Err(Error::Copy { .. })));
        Ok(())
    }

    #[test]
    fn test_missing_post_aborts_build() -> TestResult {
        let (_dir, project) = project()?;
        add_post(&project, "gone", "# Gone\n")?;
        fs::remove_dir_all(project.root().join("gone"))?;

        let output = project.default_output_directory();
        match build_site(&project, &output) {
            Err(Error::Post(PostError::Annotated(_, err))) => {
                assert!(matches!(*err, PostError::NotFound(_)))
            }
            other => panic!("wanted a missing post error, got {:?}", other),
        }
        assert!(!output.join("index.html").exists());
        Ok(())
    }

    #[test]
    fn test_missing_config_is_config_error() -> TestResult {
        let dir = tempfile::tempdir()?;
        let project = Project::new(dir.path());
        assert!(matches!(
            build_site(&project, &project.default_output_directory()),
            Err(Error::Config(ConfigError::Open { .. }))
        ));
        Ok(())
    }

    #[test]
    fn test_slug_collision() -> TestResult {
        let (_dir, project) = project()?;
        add_post(&project, "index", "# Not the index\n")?;
        assert!(matches!(
            build_site(&project, &project.default_output_directory()),
            Err(Error::SlugCollision { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_refuses_project_root_as_output() -> TestResult {
        let (dir, project) = project()?;
        add_post(&project, "post", "# Hello\n")?;
        assert!(matches!(
            build_site(&project, dir.path()),
            Err(Error::UnsafeOutputDirectory { .. })
        ));
        assert!(project.config_file().is_file());
        Ok(())
    }

    #[test]
    fn test_refuses_resources_directory_as_output() -> TestResult {
        let (_dir, project) = project()?;
        write(project.resources_directory().join("style.css"), "p {}")?;
        add_post(&project, "post", "# Hello\n")?;
        assert!(matches!(
            build_site(&project, &project.resources_directory()),
            Err(Error::UnsafeOutputDirectory { .. })
        ));
        assert!(project.config_file().is_file());
        assert!(project.resources_directory().join("style.css").is_file());
        Ok(())
    }

    #[test]
    fn test_refuses_state_directory_as_output() -> TestResult {
        let (_dir, project) = project()?;
        add_post(&project, "post", "# Hello\n")?;
        assert!(matches!(
            build_site(&project, &project.state_directory()),
            Err(Error::UnsafeOutputDirectory { .. })
        ));
        assert!(project.listing_file().is_file());
        Ok(())
    }

    #[test]
    fn test_refuses_post_directory_as_output() -> TestResult {
        let (_dir, project) = project()?;
        add_post(&project, "post", "# Hello\n")?;
        let post_dir = project.root().join("post");
        match build_site(&project, &post_dir) {
            Err(Error::UnsafeOutputDirectory { contains, .. }) => {
                assert_eq!(fs::canonicalize(&post_dir)?, contains)
            }
            other => panic!("wanted an unsafe output directory error, got {:?}", other),
        }
        assert!(post_dir.join("post.md").is_file());
        Ok(())
    }

    #[test]
    fn test_output_inside_project_is_allowed() -> TestResult {
        let (_dir, project) = project()?;
        add_post(&project, "post", "# Hello\n")?;
        let output = project.root().join("public").join("blog");
        let site = build_site(&project, &output)?;
        assert!(site.index.is_file());
        Ok(())
    }

    #[test]
    fn test_bad_template_keeps_previous_site() -> TestResult {
        let (_dir, project) = project()?;
        add_post(&project, "post", "# Hello\n")?;
        let output = project.default_output_directory();
        build_site(&project, &output)?;

        write(
            project
                .resources_directory()
                .join(crate::write::POST_TEMPLATE_FILE_NAME),
            "{{ title }} {{ sidebar }}",
        )?;
        assert!(matches!(
            build_site(&project, &output),
            Err(Error::Template(_))
        ));
        assert!(output.join("index.html").is_file());
        assert!(output.join("post.html").is_file());
        Ok(())
    }

    #[test]
    fn test_background_image_name_with_quote_is_rejected() -> TestResult {
        let (dir, project) = project()?;
        write(
            dir.path().join(RESOURCES_DIRECTORY).join("config.json"),
            CONFIG.replace(
                r#""description":"d""#,
                r#""description":"d","background_image":"a\"b.png""#,
            ),
        )?;
        write(project.resources_directory().join("a\"b.png"), [0u8])?;
        assert!(matches!(
            build_site(&project, &project.default_output_directory()),
            Err(Error::InvalidResource(_))
        ));
        Ok(())
    }

    #[test]
    fn test_empty_registry_builds_index() -> TestResult {
        let (_dir, project) = project()?;
        let output = project.default_output_directory();
        let site = build_site(&project, &output)?;
        assert!(site.posts.is_empty());
        assert!(site.index.is_file());
        assert!(site.feed.is_file());
        Ok(())
    }
}
