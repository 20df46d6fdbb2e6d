use crate::config::SiteConfig;
use crate::feed::FEED_FILE_NAME;
use crate::post::Post;
use crate::template::{self, escape, Template, Values};
use log::debug;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

/// The index page's file name, relative to the output directory.
pub const INDEX_FILE_NAME: &str = "index.html";

/// The file name of the post template override in the resources directory.
pub const POST_TEMPLATE_FILE_NAME: &str = "post-template.html";

/// The file name of the index template override in the resources directory.
pub const INDEX_TEMPLATE_FILE_NAME: &str = "index-template.html";

/// Every placeholder a page template may use.
pub const PLACEHOLDERS: &[&str] = &[
    "title",
    "date",
    "content",
    "navigation",
    "blog_title",
    "blog_subtitle",
    "owner",
    "email_address",
    "description",
    "root_url",
    "stylesheet",
    "background",
    "feed_url",
    "home_link",
];

const DEFAULT_POST_TEMPLATE: &str = include_str!("theme/post.html");
const DEFAULT_INDEX_TEMPLATE: &str = include_str!("theme/index.html");

/// The pair of templates pages are rendered with.
pub struct Theme {
    pub post_template: Template,
    pub index_template: Template,
}

impl Theme {
    /// Loads the templates from `resources_directory`, falling back to the
    /// built-in templates for any which aren't overridden. Overrides using a
    /// placeholder outside [`PLACEHOLDERS`] are rejected here rather than
    /// when the first page is rendered.
    pub fn load(resources_directory: &Path) -> template::Result<Theme> {
        Ok(Theme {
            post_template: load_or_default(
                &resources_directory.join(POST_TEMPLATE_FILE_NAME),
                DEFAULT_POST_TEMPLATE,
            )?,
            index_template: load_or_default(
                &resources_directory.join(INDEX_TEMPLATE_FILE_NAME),
                DEFAULT_INDEX_TEMPLATE,
            )?,
        })
    }
}

fn load_or_default(path: &Path, default: &str) -> template::Result<Template> {
    if path.is_file() {
        debug!("Using template `{}`", path.display());
        let template = Template::load(path)?;
        template
            .check(PLACEHOLDERS)
            .map_err(|err| template::Error::Annotated(path.to_owned(), Box::new(err)))?;
        Ok(template)
    } else {
        Template::parse(default)
    }
}

/// Responsible for templating and writing HTML pages to disk from [`Post`]
/// sources.
pub struct Writer<'a> {
    pub theme: &'a Theme,

    pub config: &'a SiteConfig,

    /// The directory in which the post pages and the index page will be
    /// written. Post pages are written to `{output_directory}/{slug}.html`
    /// and the index page to `{output_directory}/index.html`.
    pub output_directory: &'a Path,

    /// The stylesheet's URL relative to the output directory.
    pub stylesheet: &'a str,

    /// The background image's URL relative to the output directory, if any.
    pub background_image: Option<&'a str>,
}

/// The files written by [`Writer::write_posts`].
#[derive(Debug, Default)]
pub struct Written {
    pub index: PathBuf,
    pub posts: Vec<PathBuf>,
}

impl Writer<'_> {
    /// Takes a slice of [`Post`]s in registry order and writes a page for
    /// each of them followed by the index page.
    pub fn write_posts(&self, posts: &[Post]) -> Result<Written> {
        let mut written = Written::default();
        for page in post_pages(posts, self.output_directory, &self.theme.post_template) {
            self.write_page(&page)?;
            written.posts.push(page.file_path);
        }

        let index = index_page(
            self.config,
            posts,
            self.output_directory,
            &self.theme.index_template,
        );
        self.write_page(&index)?;
        written.index = index.file_path;
        Ok(written)
    }

    /// Takes a single [`Page`], templates it, and writes it to disk.
    fn write_page(&self, page: &Page) -> Result<()> {
        let mut values = self.site_values();
        values.insert("title", escape(&page.title));
        values.insert("date", escape(&page.date));
        values.insert("content", page.content.clone());
        values.insert("navigation", page.navigation());

        let html = page
            .template
            .render(&values)
            .map_err(|err| Error::Template(page.file_path.clone(), err))?;
        std::fs::write(&page.file_path, html).map_err(|err| Error::Io {
            path: page.file_path.clone(),
            err,
        })?;
        debug!("Wrote `{}`", page.file_path.display());
        Ok(())
    }

    /// The values shared by every page: the config fields and the site-wide
    /// links.
    fn site_values(&self) -> Values {
        let config = self.config;
        let mut values = Values::new();
        values.insert("blog_title", escape(&config.blog_title));
        values.insert(
            "blog_subtitle",
            escape(config.blog_subtitle.as_deref().unwrap_or_default()),
        );
        values.insert("owner", escape(&config.owner));
        values.insert("email_address", escape(&config.email_address));
        values.insert("description", escape(&config.description));
        values.insert("root_url", escape(config.root_url.as_str()));
        values.insert("stylesheet", escape(self.stylesheet));
        values.insert(
            "background",
            match self.background_image {
                Some(href) => format!("url(\"{}\")", href),
                None => String::from("none"),
            },
        );
        values.insert("feed_url", String::from(FEED_FILE_NAME));
        values.insert("home_link", String::from(INDEX_FILE_NAME));
        values
    }
}

/// An object representing an output HTML file.
struct Page<'a> {
    /// The page title: the post title, or the blog title for the index.
    title: String,

    /// The post's display date. Empty for the index.
    date: String,

    /// The HTML fragment for the main content.
    content: String,

    /// The target location on disk for the output file.
    file_path: PathBuf,

    /// The URL for the previous (older) post, if any.
    prev: Option<String>,

    /// The URL for the next (newer) post, if any.
    next: Option<String>,

    /// Whether to render navigation links at all. The index page has none.
    has_navigation: bool,

    /// The template with which the page will be rendered.
    template: &'a Template,
}

impl Page<'_> {
    /// Renders the navigation bar: `Previous`, `Home`, and `Next` links,
    /// leaving out the ones with nowhere to go.
    fn navigation(&self) -> String {
        if !self.has_navigation {
            return String::new();
        }
        let mut links = Vec::with_capacity(3);
        if let Some(prev) = &self.prev {
            links.push(format!(r#"<a href="{}">Previous</a>"#, escape(prev)));
        }
        links.push(format!(r#"<a href="{}">Home</a>"#, INDEX_FILE_NAME));
        if let Some(next) = &self.next {
            links.push(format!(r#"<a href="{}">Next</a>"#, escape(next)));
        }
        links.join(" ")
    }
}

/// Formats a post's date for display.
fn display_date(post: &Post) -> String {
    post.date.format("%B %d, %Y").to_string()
}

/// Creates the post [`Page`]s for a set of [`Post`]s in registry order, each
/// linked to its neighbors.
fn post_pages<'a>(
    posts: &'a [Post],
    output_directory: &'a Path,
    template: &'a Template,
) -> impl Iterator<Item = Page<'a>> {
    posts.iter().enumerate().map(move |(i, post)| Page {
        title: post.title.clone(),
        date: display_date(post),
        content: post.body.clone(),
        file_path: output_directory.join(post.file_name()),
        prev: match i < 1 {
            true => None,
            false => Some(posts[i - 1].file_name()),
        },
        next: match i + 1 >= posts.len() {
            true => None,
            false => Some(posts[i + 1].file_name()),
        },
        has_navigation: true,
        template,
    })
}

/// Creates the index [`Page`]: a preview of every post, newest first.
fn index_page<'a>(
    config: &SiteConfig,
    posts: &[Post],
    output_directory: &Path,
    template: &'a Template,
) -> Page<'a> {
    let content: String = posts.iter().rev().map(preview).collect();
    Page {
        title: config.blog_title.clone(),
        date: String::new(),
        content,
        file_path: output_directory.join(INDEX_FILE_NAME),
        prev: None,
        next: None,
        has_navigation: false,
        template,
    }
}

/// Renders a post's preview for the index page.
fn preview(post: &Post) -> String {
    let url = escape(&post.file_name());
    format!(
        concat!(
            "<section class=\"article_preview\">\n",
            "<h2 class=\"article_title\"><a href=\"{url}\">{title}</a></h2>\n",
            "<p class=\"article_subtitle\">{date}</p>\n",
            "{summary}",
            "<p><a href=\"{url}\">Continue reading...</a></p>\n",
            "</section>\n",
        ),
        url = url,
        title = escape(&post.title),
        date = escape(&display_date(post)),
        summary = post.summary,
    )
}

/// The result of a fallible page-writing operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error in a page-writing operation.
#[derive(Debug)]
pub enum Error {
    /// An error during templating, with the page being rendered.
    Template(PathBuf, template::Error),

    /// An error writing the output files.
    Io { path: PathBuf, err: io::Error },
}

impl fmt::Display for Error {
    /// Displays an [`Error`] as presentable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Template(path, err) => {
                write!(f, "Rendering '{}': {}", path.display(), err)
            }
            Error::Io { path, err } => {
                write!(f, "Writing '{}': {}", path.display(), err)
            }
        }
    }
}

impl std::error::Error for Error {
    /// Implements the [`std::error::Error`] trait for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Template(_, err) => Some(err),
            Error::Io { path: _, err } => Some(err),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn post(slug: &str, title: &str) -> Post {
        Post {
            source_directory: PathBuf::from(slug),
            markdown_file: PathBuf::from(slug).join(format!("{}.md", slug)),
            slug: slug.to_owned(),
            title: title.to_owned(),
            date: Utc.timestamp_opt(1_467_590_400, 0).unwrap(),
            body: format!("<p>{} body</p>\n", title),
            summary: format!("<p>{} summary</p>\n", title),
        }
    }

    #[test]
    fn test_post_pages_link_neighbors() {
        let posts = vec![post("a", "A"), post("b", "B"), post("c", "C")];
        let template = Template::parse("").unwrap();
        let pages: Vec<Page> = post_pages(&posts, Path::new("/out"), &template).collect();

        assert_eq!(3, pages.len());
        assert_eq!(PathBuf::from("/out/a.html"), pages[0].file_path);
        assert_eq!(None, pages[0].prev);
        assert_eq!(Some("b.html".to_owned()), pages[0].next);
        assert_eq!(Some("a.html".to_owned()), pages[1].prev);
        assert_eq!(Some("c.html".to_owned()), pages[1].next);
        assert_eq!(None, pages[2].next);

        assert_eq!(
            r#"<a href="index.html">Home</a> <a href="b.html">Next</a>"#,
            pages[0].navigation()
        );
        assert_eq!(
            r#"<a href="a.html">Previous</a> <a href="index.html">Home</a> <a href="c.html">Next</a>"#,
            pages[1].navigation()
        );
    }

    #[test]
    fn test_index_lists_newest_first() {
        let config = SiteConfig::from_json(
            r#"{"root_url":"http://x/","blog_title":"X","owner":"A",
                "email_address":"a@x","description":"d"}"#,
        )
        .unwrap();
        let posts = vec![post("older", "Older"), post("newer", "Newer")];
        let template = Template::parse("").unwrap();
        let page = index_page(&config, &posts, Path::new("/out"), &template);

        assert_eq!("X", page.title);
        assert_eq!("", page.navigation());
        let newer = page.content.find(r#"<a href="newer.html">Newer</a>"#).unwrap();
        let older = page.content.find(r#"<a href="older.html">Older</a>"#).unwrap();
        assert!(newer < older);
        assert!(page.content.contains("<p>Newer summary</p>"));
        assert!(page.content.contains("July 04, 2016"));
    }

    #[test]
    fn test_builtin_templates_render() -> template::Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let theme = Theme::load(dir.path())?;
        let mut values = Values::new();
        for key in PLACEHOLDERS {
            values.insert(*key, format!("[{}]", key));
        }
        assert!(theme.post_template.render(&values)?.contains("[content]"));
        assert!(theme.index_template.render(&values)?.contains("[content]"));
        Ok(())
    }

    #[test]
    fn test_template_override() -> template::Result<()> {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(POST_TEMPLATE_FILE_NAME), "<h1>{{ title }}</h1>").unwrap();
        let theme = Theme::load(dir.path())?;
        let mut values = Values::new();
        values.insert("title", String::from("Hi"));
        assert_eq!("<h1>Hi</h1>", theme.post_template.render(&values)?);
        Ok(())
    }

    #[test]
    fn test_template_override_with_unknown_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(INDEX_TEMPLATE_FILE_NAME);
        std::fs::write(&path, "{{ content }} {{ sidebar }}").unwrap();
        match Theme::load(dir.path()) {
            Err(template::Error::Annotated(annotated, err)) => {
                assert_eq!(path, annotated);
                assert!(matches!(
                    *err,
                    template::Error::UnknownPlaceholder(ref name) if name == "sidebar"
                ));
            }
            Err(other) => panic!("wanted an annotated error, got {:?}", other),
            Ok(_) => panic!("wanted an error"),
        }
    }
}
