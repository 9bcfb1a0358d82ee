//! Read and write option sets.
//!
//! Options are plain structs with builder-style `with_*` methods and
//! sensible defaults. Validation happens once, when a reader or writer is
//! constructed, so the hot loops never re-check configuration.

use crate::error::{Error, ErrorCode, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Default cap on columns per row.
pub const DEFAULT_MAX_COLUMN_COUNT: usize = 10_000;
/// Default cap on rows per input (opt-out by setting `max_row_count` to `None`).
pub const DEFAULT_MAX_ROW_COUNT: u64 = 100_000;
/// Default cap on a single field's byte length (1 MiB).
pub const DEFAULT_MAX_FIELD_SIZE: usize = 1 << 20;
/// Default cap on a single row's byte length (16 MiB).
pub const DEFAULT_MAX_ROW_SIZE: usize = 16 << 20;

/// How a binding failure on one field affects the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ErrorPolicy {
    /// Abort the row and surface a fatal error.
    #[default]
    Throw,
    /// Drop the row and continue with the next one.
    Skip,
    /// Leave the field at its default value and continue.
    UseDefault,
}

/// Options governing the read path.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ReadOptions {
    /// Field delimiter (single ASCII byte, default `,`).
    pub delimiter: u8,
    /// Quote byte (default `"`). `None` disables quote parsing entirely.
    pub quote: Option<u8>,
    /// Permit CR/LF bytes inside quoted fields (default true).
    pub allow_newlines_in_quotes: bool,
    /// Drop zero-byte rows instead of yielding one empty column.
    pub skip_empty_rows: bool,
    /// Treat the first row as a header row.
    pub has_header: bool,
    /// Skip a UTF-8 byte order mark at the start of the buffer.
    pub skip_bom: bool,
    /// Maximum columns per row.
    pub max_column_count: usize,
    /// Maximum rows per input; `None` removes the cap.
    pub max_row_count: Option<u64>,
    /// Maximum bytes per field.
    pub max_field_size: usize,
    /// Maximum bytes per row.
    pub max_row_size: usize,
    /// Field values bound as the target type's null.
    pub null_values: Vec<String>,
    /// Header name matching is byte-exact when true, ASCII-case-folded when false.
    pub case_sensitive_headers: bool,
    /// Skip bindings whose column index lies beyond the row instead of failing.
    pub allow_missing_columns: bool,
    /// Reject structurally dubious input (stray quotes, newlines in quotes
    /// when disallowed) instead of tolerating it.
    pub strict: bool,
    /// Per-field binding failure policy.
    pub error_policy: ErrorPolicy,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quote: Some(b'"'),
            allow_newlines_in_quotes: true,
            skip_empty_rows: false,
            has_header: true,
            skip_bom: true,
            max_column_count: DEFAULT_MAX_COLUMN_COUNT,
            max_row_count: Some(DEFAULT_MAX_ROW_COUNT),
            max_field_size: DEFAULT_MAX_FIELD_SIZE,
            max_row_size: DEFAULT_MAX_ROW_SIZE,
            null_values: Vec::new(),
            case_sensitive_headers: false,
            allow_missing_columns: false,
            strict: false,
            error_policy: ErrorPolicy::Throw,
        }
    }
}

impl ReadOptions {
    /// Comma-separated values (the default dialect).
    pub fn csv() -> Self {
        Self::default()
    }

    /// Tab-separated values.
    pub fn tsv() -> Self {
        Self {
            delimiter: b'\t',
            ..Self::default()
        }
    }

    /// Pipe-separated values.
    pub fn psv() -> Self {
        Self {
            delimiter: b'|',
            ..Self::default()
        }
    }

    /// Set the field delimiter.
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Set the quote byte, or disable quote parsing with `None`.
    pub fn with_quote(mut self, quote: Option<u8>) -> Self {
        self.quote = quote;
        self
    }

    /// Toggle header-row handling.
    pub fn with_header(mut self, has_header: bool) -> Self {
        self.has_header = has_header;
        self
    }

    /// Toggle zero-byte row skipping.
    pub fn with_skip_empty_rows(mut self, skip: bool) -> Self {
        self.skip_empty_rows = skip;
        self
    }

    /// Toggle newlines-in-quotes support.
    pub fn with_newlines_in_quotes(mut self, allow: bool) -> Self {
        self.allow_newlines_in_quotes = allow;
        self
    }

    /// Toggle strict structural validation.
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Set the per-field binding failure policy.
    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }

    /// Set the strings treated as null field values.
    pub fn with_null_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.null_values = values.into_iter().map(Into::into).collect();
        self
    }

    /// Check internal consistency. Called by reader construction.
    pub fn validate(&self) -> Result<()> {
        if self.delimiter > 127 {
            return Err(Error::new(
                ErrorCode::InvalidDelimiter,
                format!("delimiter 0x{:02x} is not ASCII", self.delimiter),
            ));
        }
        if matches!(self.delimiter, b'\r' | b'\n') {
            return Err(Error::new(
                ErrorCode::InvalidDelimiter,
                "delimiter cannot be a line terminator byte",
            ));
        }
        if let Some(q) = self.quote {
            if q > 127 {
                return Err(Error::new(
                    ErrorCode::InvalidOptions,
                    format!("quote 0x{q:02x} is not ASCII"),
                ));
            }
            if q == self.delimiter {
                return Err(Error::new(
                    ErrorCode::InvalidOptions,
                    "quote and delimiter must differ",
                ));
            }
            if matches!(q, b'\r' | b'\n') {
                return Err(Error::new(
                    ErrorCode::InvalidOptions,
                    "quote cannot be a line terminator byte",
                ));
            }
        }
        if self.max_column_count == 0 {
            return Err(Error::new(
                ErrorCode::InvalidOptions,
                "max_column_count must be at least 1",
            ));
        }
        if self.max_field_size == 0 || self.max_row_size == 0 {
            return Err(Error::new(
                ErrorCode::InvalidOptions,
                "size limits must be at least 1",
            ));
        }
        if self.max_row_size > u32::MAX as usize {
            return Err(Error::new(
                ErrorCode::InvalidOptions,
                "max_row_size must fit in 32 bits",
            ));
        }
        if self.max_field_size > self.max_row_size {
            return Err(Error::new(
                ErrorCode::InvalidOptions,
                "max_field_size cannot exceed max_row_size",
            ));
        }
        Ok(())
    }
}

/// Line terminator emitted by the writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum LineTerminator {
    /// `\n`
    #[default]
    Lf,
    /// `\r\n`
    CrLf,
}

impl LineTerminator {
    /// The terminator's byte sequence.
    #[inline]
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            Self::Lf => b"\n",
            Self::CrLf => b"\r\n",
        }
    }
}

/// Per-field quoting policy for the writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum QuotePolicy {
    /// Quote every field.
    Always,
    /// Never quote. A field containing a special byte is emitted literally
    /// (tolerant) or rejected (strict).
    Never,
    /// Quote only fields containing a delimiter, quote, CR, or LF, or a
    /// field whose leading byte trips injection protection.
    #[default]
    WhenNeeded,
}

/// Output-time defense against spreadsheet formula injection.
///
/// Triggers on a leading `=`, `@`, `+`, `-`, TAB, or CR byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum InjectionProtection {
    /// No detection.
    #[default]
    Off,
    /// Surface [`crate::ErrorCode::InjectionDetected`] for risky fields.
    Reject,
    /// Prepend a single-quote byte before the risky leading byte.
    Sanitize,
    /// Force quoting regardless of the quote policy.
    EscapeWithQuote,
    /// Prepend a TAB byte before the risky leading byte.
    EscapeWithTab,
}

/// Options governing the write path.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct WriteOptions {
    /// Field delimiter (single ASCII byte, default `,`).
    pub delimiter: u8,
    /// Quote byte (default `"`).
    pub quote: u8,
    /// Row terminator (default LF).
    pub terminator: LineTerminator,
    /// Quoting policy (default [`QuotePolicy::WhenNeeded`]).
    pub quote_policy: QuotePolicy,
    /// Bytes emitted verbatim for null values.
    pub null_representation: String,
    /// Injection protection mode.
    pub injection_protection: InjectionProtection,
    /// Cap on total output bytes; `None` removes the cap.
    pub max_output_size: Option<usize>,
    /// Reject fields the `Never` policy cannot represent faithfully.
    pub strict: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quote: b'"',
            terminator: LineTerminator::Lf,
            quote_policy: QuotePolicy::WhenNeeded,
            null_representation: String::new(),
            injection_protection: InjectionProtection::Off,
            max_output_size: None,
            strict: false,
        }
    }
}

impl WriteOptions {
    /// Set the field delimiter.
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Set the quoting policy.
    pub fn with_quote_policy(mut self, policy: QuotePolicy) -> Self {
        self.quote_policy = policy;
        self
    }

    /// Set the row terminator.
    pub fn with_terminator(mut self, terminator: LineTerminator) -> Self {
        self.terminator = terminator;
        self
    }

    /// Set the injection protection mode.
    pub fn with_injection_protection(mut self, mode: InjectionProtection) -> Self {
        self.injection_protection = mode;
        self
    }

    /// Set the bytes emitted for null values.
    pub fn with_null_representation(mut self, repr: impl Into<String>) -> Self {
        self.null_representation = repr.into();
        self
    }

    /// Check internal consistency. Called by writer construction.
    pub fn validate(&self) -> Result<()> {
        if self.delimiter > 127 {
            return Err(Error::new(
                ErrorCode::InvalidDelimiter,
                format!("delimiter 0x{:02x} is not ASCII", self.delimiter),
            ));
        }
        if matches!(self.delimiter, b'\r' | b'\n') {
            return Err(Error::new(
                ErrorCode::InvalidDelimiter,
                "delimiter cannot be a line terminator byte",
            ));
        }
        if self.quote > 127 || self.quote == self.delimiter || matches!(self.quote, b'\r' | b'\n') {
            return Err(Error::new(
                ErrorCode::InvalidOptions,
                "quote must be a non-delimiter, non-terminator ASCII byte",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_read_options_are_valid() {
        assert!(ReadOptions::default().validate().is_ok());
    }

    #[test]
    fn dialect_presets() {
        assert_eq!(ReadOptions::csv().delimiter, b',');
        assert_eq!(ReadOptions::tsv().delimiter, b'\t');
        assert_eq!(ReadOptions::psv().delimiter, b'|');
    }

    #[test]
    fn non_ascii_delimiter_rejected() {
        let err = ReadOptions::default().with_delimiter(0xC3).validate().unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidDelimiter);
    }

    #[test]
    fn quote_equal_to_delimiter_rejected() {
        let err = ReadOptions::default()
            .with_delimiter(b';')
            .with_quote(Some(b';'))
            .validate()
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidOptions);
    }

    #[test]
    fn newline_delimiter_rejected() {
        let err = ReadOptions::default().with_delimiter(b'\n').validate().unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidDelimiter);
    }

    #[test]
    fn write_options_validate() {
        assert!(WriteOptions::default().validate().is_ok());
        let err = WriteOptions::default().with_delimiter(b'"').validate().unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidOptions);
    }
}
