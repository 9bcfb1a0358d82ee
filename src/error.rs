//! Error contract for the CSV engine.
//!
//! Every error carries a machine-readable [`ErrorCode`] plus the position
//! context a bulk-ingestion caller needs to locate the offending input:
//! the 1-based row and column, the physical source line, and (for quote
//! errors) the byte offset of the unterminated opening quote.
//!
//! Field values embedded in error messages are truncated to
//! [`FIELD_TRUNCATE_LEN`] bytes so a hostile input cannot poison logs.

use thiserror::Error;

/// Maximum number of field bytes reproduced inside an error message.
pub const FIELD_TRUNCATE_LEN: usize = 100;

/// Machine-readable error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Malformed input that is not covered by a more specific code.
    ParseError,
    /// A row exceeded the configured column limit.
    TooManyColumns,
    /// The input exceeded the configured row limit.
    TooManyRows,
    /// A single field exceeded the configured size limit.
    FieldTooLarge,
    /// A single row exceeded the configured size limit.
    RowTooLarge,
    /// The writer's output buffer would exceed its configured cap.
    OutputTooLarge,
    /// The configured delimiter is not a valid single ASCII byte.
    InvalidDelimiter,
    /// The option set is internally inconsistent.
    InvalidOptions,
    /// A quoted field was still open at end of input.
    UnterminatedQuote,
    /// A quote byte appeared where none is legal (strict mode).
    UnexpectedQuote,
    /// A required header name was not found in the header row.
    HeaderNotFound,
    /// A bound column index lies beyond the row's column count.
    MissingColumn,
    /// A field failed to parse as the bound type.
    TypeConversionFailed,
    /// A field's leading byte would trigger spreadsheet formula evaluation.
    InjectionDetected,
}

impl core::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Self::ParseError => "parse error",
            Self::TooManyColumns => "too many columns",
            Self::TooManyRows => "too many rows",
            Self::FieldTooLarge => "field too large",
            Self::RowTooLarge => "row too large",
            Self::OutputTooLarge => "output too large",
            Self::InvalidDelimiter => "invalid delimiter",
            Self::InvalidOptions => "invalid options",
            Self::UnterminatedQuote => "unterminated quote",
            Self::UnexpectedQuote => "unexpected quote",
            Self::HeaderNotFound => "header not found",
            Self::MissingColumn => "missing column",
            Self::TypeConversionFailed => "type conversion failed",
            Self::InjectionDetected => "injection detected",
        };
        f.write_str(name)
    }
}

/// Structured error for all read, bind, and write failures.
///
/// `row` and `column` are 1-based and refer to logical CSV coordinates;
/// `line` is the 1-based physical line of the row's first byte. A zero
/// means the coordinate was not applicable (e.g. option validation).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{code}: {message}{}", format_context(.row, .column, .line, .field, .quote_start))]
pub struct Error {
    /// Machine-readable classification.
    pub code: ErrorCode,
    /// Human-readable description.
    pub message: String,
    /// 1-based logical row number, 0 when not applicable.
    pub row: u64,
    /// 1-based column number, 0 when not applicable.
    pub column: u64,
    /// 1-based physical source line, 0 when not applicable.
    pub line: u64,
    /// Offending field bytes, truncated to [`FIELD_TRUNCATE_LEN`].
    pub field: Option<Vec<u8>>,
    /// Byte offset of the opening quote for [`ErrorCode::UnterminatedQuote`].
    pub quote_start: Option<usize>,
}

fn format_context(
    row: &u64,
    column: &u64,
    line: &u64,
    field: &Option<Vec<u8>>,
    quote_start: &Option<usize>,
) -> String {
    let mut out = String::new();
    if *row != 0 {
        out.push_str(&format!(" (row {row}"));
        if *column != 0 {
            out.push_str(&format!(", column {column}"));
        }
        if *line != 0 {
            out.push_str(&format!(", line {line}"));
        }
        out.push(')');
    }
    if let Some(pos) = quote_start {
        out.push_str(&format!(" [quote opened at byte {pos}]"));
    }
    if let Some(bytes) = field {
        out.push_str(&format!(" in {:?}", String::from_utf8_lossy(bytes)));
    }
    out
}

impl Error {
    /// Create an error with no position context.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            row: 0,
            column: 0,
            line: 0,
            field: None,
            quote_start: None,
        }
    }

    /// Attach 1-based row/column/line coordinates.
    pub fn at(mut self, row: u64, column: u64, line: u64) -> Self {
        self.row = row;
        self.column = column;
        self.line = line;
        self
    }

    /// Attach the offending field bytes, truncated to [`FIELD_TRUNCATE_LEN`].
    pub fn with_field(mut self, bytes: &[u8]) -> Self {
        let take = bytes.len().min(FIELD_TRUNCATE_LEN);
        self.field = Some(bytes[..take].to_vec());
        self
    }

    /// Attach the byte offset of an unterminated opening quote.
    pub fn with_quote_start(mut self, pos: usize) -> Self {
        self.quote_start = Some(pos);
        self
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;
