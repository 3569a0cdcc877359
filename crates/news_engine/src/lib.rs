//! News engine: archive IO, record decoding, extraction and the partitioned driver.
mod body;
mod decode;
mod engine;
mod extract;
mod fetch;
mod input;
mod pipeline;
mod sink;
mod text;
mod types;
mod warc;

pub use body::{decode_http_body, BodyError};
pub use decode::{decode_html, DecodedHtml};
pub use engine::Engine;
pub use extract::{parse_date, ArticleExtractor, ExtractError, MetaTagExtractor};
pub use fetch::{range_header, ArchiveFetcher, FetchSettings, HttpArchiveFetcher, ScratchFile};
pub use input::{parse_index_csv, parse_uri_listing, read_index_csv, read_uri_listing, InputError};
pub use pipeline::Pipeline;
pub use sink::{ChannelRecordSink, CollectingSink, RecordSink};
pub use text::{document_text, element_text};
pub use tokio_util::sync::CancellationToken;
pub use types::{FailureKind, FetchError};
pub use warc::{ArchiveError, ArchiveFormat, ArchiveReader, PayloadReader, RawRecord};
