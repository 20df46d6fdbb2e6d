//! The library code for the `auteur` static blog generator. A blog is a
//! project directory holding a config file, optional stylesheet and
//! templates, and any number of post directories, each with one Markdown
//! file. The work splits into two commands:
//!
//! 1. `add` registers a post directory with the project ([`crate::registry`])
//! 2. `build` regenerates the whole site from the registered posts
//!    ([`crate::build`])
//!
//! Of the two, the second is the more involved. It is itself composed of
//! four distinct sub-steps:
//!
//! 1. Loading each post: finding its Markdown file and converting it to an
//!    HTML fragment and a title ([`crate::post`], [`crate::markdown`])
//! 2. Copying post assets, the stylesheet, and the background image into the
//!    output directory
//! 3. Substituting the fragments and config fields into the post and index
//!    templates and writing the pages to disk ([`crate::write`],
//!    [`crate::template`])
//! 4. Writing the Atom feed ([`crate::feed`])
//!
//! Nothing is incremental: every build deletes the output directory and
//! regenerates it from scratch.

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]

pub mod build;
pub mod config;
pub mod feed;
pub mod logging;
pub mod markdown;
pub mod post;
pub mod registry;
pub mod template;
pub mod write;
