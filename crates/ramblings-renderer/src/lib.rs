//! Ramblings renderer
//!
//! Turns publication records into sanitized HTML: byte-offset rich text,
//! the block compiler, the document sanitizer, comment threads, and the
//! [`ContentService`] facade that ties them to the record cache.

pub mod blocks;
pub mod facet;
pub mod sanitize;
pub mod service;
pub mod summary;
pub mod thread;

pub use blocks::{Block, BlockRenderContext, compile};
pub use facet::{byte_slice, render_rich_text, render_social_text};
pub use sanitize::sanitize_html;
pub use service::{ContentService, Publication, RenderedDocument, redirect_location};
pub use summary::{DocumentSummary, reading_time};
pub use thread::{CommentsUnavailable, ThreadFailure, ThreadFetcher, ThreadNode};
