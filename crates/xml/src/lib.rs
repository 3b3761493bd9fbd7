// XML for the record meta-model: a writer with deferred attributes and
// scoped element encryption, a traversal-driven emitter, and an
// event-driven reader over a third-party tokenizer that feeds the
// navigator, including the W3C XML-Encryption envelope.

mod emit;
mod read;
mod write;

pub use emit::{emit, to_bytes, to_string, XmlOut};
pub use read::{from_bytes, from_str, Handler, XmlReader};
pub use write::{Charset, Writer};

/// Failures of XML parsing, writing, and record population.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("xml error at byte {pos}: {source}")]
    Xml {
        pos: usize,
        #[source]
        source: quick_xml::Error,
    },

    #[error(transparent)]
    Record(#[from] record::Error),

    #[error("prefix mismatch in element '{element}'")]
    PrefixMismatch { element: String },

    #[error("input charset could not be decoded")]
    Charset,

    #[error("invalid base64 cipher payload")]
    CipherPayload(#[from] base64::DecodeError),

    #[error("no root object found")]
    NoRoot,

    /// Accumulated per-field problems of one completed record, one line
    /// each.
    #[error("{0}")]
    Fields(String),
}
