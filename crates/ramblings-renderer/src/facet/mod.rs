mod html_output;
mod markdown;
mod processor;
mod slice;
mod types;

pub use html_output::{escape_html, escape_html_into};
pub(crate) use html_output::{external_link, profile_url};
pub use markdown::apply_inline_markdown;
pub use processor::{render_facet_text, render_rich_text, render_social_text};
pub use slice::byte_slice;
pub use types::{ByteRange, DocumentFeature, Facet, SocialFeature, parse_facets};

/// A facet feature that knows its HTML markup.
pub trait Feature {
    /// Wrap already-escaped HTML in this feature's markup. A feature missing
    /// its payload (a link without a target, say) returns `inner` unchanged.
    fn wrap(&self, inner: String) -> String;
}
