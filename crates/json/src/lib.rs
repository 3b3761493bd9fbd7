// JSON for the record meta-model: a relaxed streaming parser with event
// callbacks, a traversal-driven emitter, and the navigator bridge that
// populates records from parser events.

mod emit;
mod parse;
mod read;

pub use emit::to_string;
pub use parse::{parse, Sink};
pub use read::from_str;

/// Failures of JSON parsing and record population.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Malformed input; `pos` is the byte offset in the buffer.
    #[error("syntax error at byte {pos}: {msg}")]
    Syntax { pos: usize, msg: String },

    #[error(transparent)]
    Record(#[from] record::Error),
}
