//! Mastodon admin HTTP API backend.

mod applier;
pub mod link;

pub use applier::*;
pub use link::{parse_link_header, parse_link_headers, Link, LinkError};
