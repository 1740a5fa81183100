//! Source resolution and text extraction.
//!
//! A [`SourceDescriptor`](paperpage_shared::SourceDescriptor) becomes bytes via
//! [`SourceResolver`], and PDF bytes become bounded plain text via
//! [`PdfTextExtractor`]. Video pages are reduced to [`VideoMetadata`].

mod extract;
mod hosting;
mod resolver;
mod video;

pub use extract::{PdfTextExtractor, TextExtractor, assemble_text, normalize_page};
pub use hosting::{HostingClient, HostingLocation, README_PATH};
pub use resolver::{ResolvedFrom, ResolvedSource, SourceFetcher, SourceResolver, upload_path};
pub use video::{VideoMetadata, parse_video_page, video_id};
