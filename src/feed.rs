//! Support for creating an Atom feed from a list of posts.

use crate::config::SiteConfig;
use crate::post::Post;
use atom_syndication::{Entry, Error as AtomError, Feed, Link, Person, Text};
use chrono::{DateTime, FixedOffset, Utc};
use std::fmt;
use std::io::Write;
use url::Url;

/// The feed's file name, relative to the output directory.
pub const FEED_FILE_NAME: &str = "feed.atom";

/// Creates a feed from the site config and a list of [`Post`]s and writes the
/// result to a [`std::io::Write`]. Entries are ordered newest first.
pub fn write_feed<W: Write>(config: &SiteConfig, posts: &[Post], w: W) -> Result<()> {
    feed(config, posts)?.write_to(w)?;
    Ok(())
}

fn feed(config: &SiteConfig, posts: &[Post]) -> Result<Feed> {
    // The newest post date keeps the feed identical between builds of the
    // same posts.
    let updated = posts
        .iter()
        .map(|post| post.date)
        .max()
        .unwrap_or_else(|| DateTime::<Utc>::from(std::time::UNIX_EPOCH));

    let mut feed = Feed::default();
    feed.set_title(Text::plain(config.blog_title.as_str()));
    feed.set_id(config.root_url.as_str());
    feed.set_updated(updated);
    feed.set_subtitle(Text::plain(config.description.as_str()));
    feed.set_authors(vec![author(config)]);
    feed.set_links(vec![link(config.root_url.as_str())]);
    feed.set_entries(feed_entries(config, posts)?);
    Ok(feed)
}

fn feed_entries(config: &SiteConfig, posts: &[Post]) -> Result<Vec<Entry>> {
    let mut entries: Vec<Entry> = Vec::with_capacity(posts.len());

    for post in posts.iter().rev() {
        let url = post_url(&config.root_url, post)?;
        let date: DateTime<Utc> = post.date;

        let mut entry = Entry::default();
        entry.set_id(url.as_str());
        entry.set_title(Text::plain(post.title.as_str()));
        entry.set_updated(date);
        entry.set_published(Some(DateTime::<FixedOffset>::from(date)));
        entry.set_authors(vec![author(config)]);
        entry.set_links(vec![link(url.as_str())]);
        entry.set_summary(Some(Text::html(post.summary.as_str())));
        entries.push(entry);
    }
    Ok(entries)
}

/// The absolute URL of a post's page.
pub fn post_url(root_url: &Url, post: &Post) -> Result<Url> {
    Ok(root_url.join(&post.file_name())?)
}

fn author(config: &SiteConfig) -> Person {
    let mut person = Person::default();
    person.set_name(config.owner.as_str());
    person.set_email(Some(config.email_address.clone()));
    person
}

fn link(href: &str) -> Link {
    let mut link = Link::default();
    link.set_href(href);
    link.set_rel("alternate");
    link
}

type Result<T> = std::result::Result<T, Error>;

/// Represents a problem creating a feed. Variants inlude I/O, Atom, and
/// URL issues.
#[derive(Debug)]
pub enum Error {
    /// Returned when there is a generic I/O error.
    Io(std::io::Error),

    /// Returned when there is an Atom-related error.
    Atom(AtomError),

    /// Returned when a post URL can't be joined onto the root URL.
    UrlParse(url::ParseError),
}

impl fmt::Display for Error {
    /// Implements [`fmt::Display`] for [`Error`].
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(err) => err.fmt(f),
            Error::Atom(err) => err.fmt(f),
            Error::UrlParse(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    /// Implements [`std::error::Error`] for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Atom(err) => Some(err),
            Error::UrlParse(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for Error {
    /// Converts [`std::io::Error`]s into [`Error`]. This allows us to use the
    /// `?` operator in fallible feed operations.
    fn from(err: std::io::Error) -> Error {
        Error::Io(err)
    }
}

impl From<AtomError> for Error {
    /// Converts [`AtomError`]s into [`Error`]. This allows us to use the `?`
    /// operator in fallible feed operations.
    fn from(err: AtomError) -> Error {
        Error::Atom(err)
    }
}

impl From<url::ParseError> for Error {
    /// Converts [`url::ParseError`]s into [`Error`].
    fn from(err: url::ParseError) -> Error {
        Error::UrlParse(err)
    }
}
