use std::path::PathBuf;
use thiserror::Error;

/// Why pasted or uploaded text could not be read as a result table.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("the input is empty")]
    Empty,

    #[error("no header row found")]
    MissingHeader,

    #[error("header column {column} is blank")]
    BlankHeader { column: usize },

    #[error("header `{0}` appears more than once")]
    DuplicateHeader(String),

    #[error("line {line} has {found} cells but the header has {expected}")]
    ExtraCells {
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("no data rows below the header")]
    NoDataRows,

    #[error("line {line}: {message}")]
    Malformed { line: usize, message: String },
}

/// Failures of a bulk result upload. Row rejections are not errors; they come
/// back inside a successful response.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("{0}")]
    Validation(String),

    #[error("Could not read the data: {0}")]
    Parse(#[from] ParseError),

    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Upload failed: {0}")]
    Submission(String),
}
