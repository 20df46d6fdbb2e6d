use pulldown_cmark::{html, CowStr, Event, LinkType, Options, Parser, Tag};
use std::fmt;
use std::string::FromUtf8Error;
use url::{ParseError as UrlParseError, Url};

/// Marks the end of a post's summary when it appears on its own line.
const FOLD_TAG: &str = "<!-- more -->";

/// The result of converting a post's Markdown source.
#[derive(Clone, Debug, PartialEq)]
pub struct Rendered {
    /// The plain text of the first level-1 heading, if there is one.
    pub title: Option<String>,

    /// The HTML fragment for the post body, less the title heading.
    pub body: String,

    /// The HTML for the post's preview on the index page: everything above
    /// the `<!-- more -->` marker, or else the first paragraph.
    pub summary: String,
}

/// Converts raw Markdown bytes. Fails only if `source` isn't UTF-8.
pub fn convert_bytes(source: Vec<u8>, asset_prefix: &str) -> Result<Rendered> {
    Ok(convert(&String::from_utf8(source)?, asset_prefix))
}

/// Converts markdown to HTML and extracts the post title.
///
/// * `markdown` is the contents of the source file.
/// * `asset_prefix` is prepended onto relative link and image destinations,
///   since a post's assets are published under a directory named for the
///   post rather than next to its page. Pass an empty string to leave
///   destinations untouched.
pub fn convert(markdown: &str, asset_prefix: &str) -> Rendered {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_SMART_PUNCTUATION);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_TASKLISTS);

    let event_converter = EventConverter { asset_prefix };
    let events: Vec<Event> = Parser::new_ext(markdown, options)
        .map(|ev| event_converter.convert(ev))
        .collect();

    let (title, events) = take_title(events);

    let mut body = String::new();
    html::push_html(&mut body, events.iter().cloned());

    let mut summary = String::new();
    html::push_html(&mut summary, summary_events(&events).iter().cloned());

    Rendered {
        title,
        body,
        summary,
    }
}

/// Removes the first level-1 heading from `events`, returning its plain text
/// alongside the remaining events.
fn take_title(events: Vec<Event>) -> (Option<String>, Vec<Event>) {
    let start = match events
        .iter()
        .position(|ev| matches!(ev, Event::Start(Tag::Heading(1))))
    {
        Some(start) => start,
        None => return (None, events),
    };

    let mut title = String::new();
    let mut end = events.len();
    for (i, ev) in events.iter().enumerate().skip(start + 1) {
        match ev {
            Event::End(Tag::Heading(1)) => {
                end = i;
                break;
            }
            Event::Text(text) | Event::Code(text) => title.push_str(text),
            Event::SoftBreak | Event::HardBreak => title.push(' '),
            _ => {}
        }
    }

    let remaining = events
        .into_iter()
        .enumerate()
        .filter(|(i, _)| *i < start || *i > end)
        .map(|(_, ev)| ev)
        .collect();
    (Some(title.trim().to_owned()), remaining)
}

/// Picks the events that make up the post's summary.
fn summary_events<'a, 'b>(events: &'b [Event<'a>]) -> &'b [Event<'a>] {
    if let Some(fold) = fold_position(events) {
        return &events[..fold];
    }

    let start = match events
        .iter()
        .position(|ev| matches!(ev, Event::Start(Tag::Paragraph)))
    {
        Some(start) => start,
        None => return &[],
    };

    // Paragraphs don't nest, so the first end tag closes this one.
    match events[start..]
        .iter()
        .position(|ev| matches!(ev, Event::End(Tag::Paragraph)))
    {
        Some(len) => &events[start..=start + len],
        None => &events[start..],
    }
}

/// Finds the fold marker. Only a marker outside every block counts; inside
/// a paragraph it's inline HTML.
fn fold_position(events: &[Event]) -> Option<usize> {
    let mut depth = 0usize;
    for (i, ev) in events.iter().enumerate() {
        match ev {
            Event::Start(_) => depth += 1,
            Event::End(_) => depth = depth.saturating_sub(1),
            Event::Html(html) if depth == 0 && html.trim() == FOLD_TAG => return Some(i),
            _ => {}
        }
    }
    None
}

struct EventConverter<'a> {
    asset_prefix: &'a str,
}

impl<'a> EventConverter<'a> {
    fn convert_tag<'b>(&self, tag: Tag<'b>) -> Tag<'b> {
        match tag {
            Tag::Link(
                link @ (LinkType::Inline
                | LinkType::Reference
                | LinkType::ReferenceUnknown
                | LinkType::Collapsed
                | LinkType::CollapsedUnknown
                | LinkType::Shortcut
                | LinkType::ShortcutUnknown),
                dest,
                title,
            ) => Tag::Link(link, self.convert_destination(dest), title),
            Tag::Image(link, dest, title) => {
                Tag::Image(link, self.convert_destination(dest), title)
            }
            _ => tag,
        }
    }

    fn convert_destination<'b>(&self, dest: CowStr<'b>) -> CowStr<'b> {
        if self.asset_prefix.is_empty() || !is_local_relative(&dest) {
            return dest;
        }
        CowStr::Boxed(
            format!(
                "{}/{}",
                self.asset_prefix.trim_end_matches('/'),
                dest.trim_start_matches("./")
            )
            .into_boxed_str(),
        )
    }

    fn convert<'b>(&self, ev: Event<'b>) -> Event<'b> {
        match ev {
            Event::Start(tag) => Event::Start(self.convert_tag(tag)),
            Event::End(tag) => Event::End(self.convert_tag(tag)),
            _ => ev,
        }
    }
}

/// Reports whether `dest` points at a file inside the post's own directory,
/// e.g. `photo.jpg` or `./img/photo.jpg`, as opposed to an absolute URL, a
/// site-absolute path, a fragment, or a path leaving the post directory.
fn is_local_relative(dest: &str) -> bool {
    if dest.is_empty() || dest.starts_with('/') || dest.starts_with('#') || dest.starts_with("../")
    {
        return false;
    }
    matches!(Url::parse(dest), Err(UrlParseError::RelativeUrlWithoutBase))
}

/// The result of a fallible conversion.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error converting markdown to HTML. The parser itself
/// renders malformed markdown literally, so the only failure is input that
/// isn't text.
#[derive(Debug)]
pub enum Error {
    /// Returned when the source isn't valid UTF-8.
    Encoding(FromUtf8Error),
}

impl fmt::Display for Error {
    /// Displays an [`Error`] as human-readable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Encoding(err) => write!(f, "markdown source is not UTF-8: {}", err),
        }
    }
}

impl std::error::Error for Error {
    /// Implements the [`std::error::Error`] trait for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Encoding(err) => Some(err),
        }
    }
}

impl From<FromUtf8Error> for Error {
    /// Converts a [`FromUtf8Error`] into an [`Error`]. It allows us to use the
    /// `?` operator when decoding source files.
    fn from(err: FromUtf8Error) -> Error {
        Error::Encoding(err)
    }
}
