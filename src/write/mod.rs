//! Canonical CSV emission: quote analysis and field serialization.
//!
//! Each outgoing field is scanned once for the four special bytes
//! (delimiter, quote, CR, LF), counting quotes so the exact output
//! length is known before a single byte is copied. Long fields reuse the
//! block scanner from the read path; short fields take a scalar loop.
//!
//! Injection protection inspects the field's leading byte and, when
//! enabled, neutralizes or rejects values a spreadsheet would evaluate
//! as a formula.

use crate::error::{Error, ErrorCode, Result};
use crate::field::FieldWrite;
use crate::options::{InjectionProtection, QuotePolicy, WriteOptions};
use crate::pool;
use crate::read::INJECTION_TRIGGERS;
use crate::scan::{Scanner, BLOCK};

/// Single-pass field statistics.
#[derive(Debug, Clone, Copy, Default)]
struct FieldStats {
    /// Any delimiter, quote, CR, or LF present.
    special: bool,
    /// Number of quote bytes (each doubles on output).
    quote_count: usize,
}

/// Buffered CSV writer emitting into a pooled byte buffer.
pub struct CsvWriter {
    opts: WriteOptions,
    scanner: Scanner,
    buf: Vec<u8>,
    scratch: Vec<u8>,
    col: usize,
    rows: u64,
}

impl CsvWriter {
    /// Create a writer. Validates the option set.
    pub fn new(options: WriteOptions) -> Result<Self> {
        options.validate()?;
        let scanner = Scanner::new(options.delimiter, Some(options.quote));
        Ok(Self {
            opts: options,
            scanner,
            buf: pool::take_bytes(),
            scratch: pool::take_bytes(),
            col: 0,
            rows: 0,
        })
    }

    /// Bytes emitted so far.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Finish writing and take the output buffer.
    pub fn into_bytes(mut self) -> Vec<u8> {
        core::mem::take(&mut self.buf)
    }

    /// Rows completed so far.
    pub fn rows_written(&self) -> u64 {
        self.rows
    }

    /// Discard all buffered output and reset row state.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.col = 0;
        self.rows = 0;
    }

    /// Write one raw field, applying quote policy and injection
    /// protection.
    pub fn write_field(&mut self, field: &[u8]) -> Result<()> {
        let stats = self.analyze(field);

        let mut prefix: Option<u8> = None;
        let mut force_quote = false;
        if field.first().is_some_and(|b| INJECTION_TRIGGERS.contains(b)) {
            match self.opts.injection_protection {
                InjectionProtection::Off => {}
                InjectionProtection::Reject => {
                    return Err(Error::new(
                        ErrorCode::InjectionDetected,
                        "field starts with a formula trigger byte",
                    )
                    .at(self.rows + 1, self.col as u64 + 1, 0)
                    .with_field(field));
                }
                InjectionProtection::Sanitize => prefix = Some(b'\''),
                InjectionProtection::EscapeWithQuote => force_quote = true,
                InjectionProtection::EscapeWithTab => prefix = Some(b'\t'),
            }
        }

        let needs_quoting = force_quote
            || match self.opts.quote_policy {
                QuotePolicy::Always => true,
                QuotePolicy::Never => {
                    if stats.special && self.opts.strict {
                        return Err(Error::new(
                            ErrorCode::ParseError,
                            "field requires quoting but the policy forbids quotes",
                        )
                        .at(self.rows + 1, self.col as u64 + 1, 0)
                        .with_field(field));
                    }
                    false
                }
                QuotePolicy::WhenNeeded => stats.special,
            };

        let emitted = (self.col > 0) as usize
            + prefix.is_some() as usize
            + field.len()
            + if needs_quoting { 2 + stats.quote_count } else { 0 };
        self.reserve(emitted)?;

        if self.col > 0 {
            self.buf.push(self.opts.delimiter);
        }
        if needs_quoting {
            self.buf.push(self.opts.quote);
        }
        if let Some(p) = prefix {
            self.buf.push(p);
        }
        if needs_quoting && stats.quote_count > 0 {
            let quote = self.opts.quote;
            let mut i = 0;
            while let Some(found) = memchr::memchr(quote, &field[i..]) {
                let q = i + found;
                self.buf.extend_from_slice(&field[i..=q]);
                self.buf.push(quote);
                i = q + 1;
            }
            self.buf.extend_from_slice(&field[i..]);
        } else {
            self.buf.extend_from_slice(field);
        }
        if needs_quoting {
            self.buf.push(self.opts.quote);
        }
        self.col += 1;
        Ok(())
    }

    /// Write the configured null representation, verbatim.
    pub fn write_null(&mut self) -> Result<()> {
        self.reserve((self.col > 0) as usize + self.opts.null_representation.len())?;
        if self.col > 0 {
            self.buf.push(self.opts.delimiter);
        }
        self.buf.extend_from_slice(self.opts.null_representation.as_bytes());
        self.col += 1;
        Ok(())
    }

    /// Serialize a typed value through [`FieldWrite`].
    pub fn write_value<T: FieldWrite + ?Sized>(&mut self, value: &T) -> Result<()> {
        self.write_value_fmt(value, None)
    }

    /// Serialize a typed value with a format hint (dates, mostly).
    pub fn write_value_fmt<T: FieldWrite + ?Sized>(
        &mut self,
        value: &T,
        format_hint: Option<&str>,
    ) -> Result<()> {
        if value.is_null() {
            return self.write_null();
        }
        let mut staging = core::mem::take(&mut self.scratch);
        staging.clear();
        value.write_field(&mut staging, format_hint);
        let result = self.write_field(&staging);
        self.scratch = staging;
        result
    }

    /// Re-emit a parsed row in this writer's dialect: each column is
    /// unquoted and re-quoted per the current policy. Useful for
    /// canonicalization pipelines.
    pub fn write_row(&mut self, row: &crate::read::Row<'_>) -> Result<()> {
        // The staging buffer is detached from `self`, so a field slice
        // borrowed from it can be passed straight to `write_field`.
        let mut staging = core::mem::take(&mut self.scratch);
        let mut result = Ok(());
        for i in 0..row.column_count() {
            staging.clear();
            let Some(field) = row.unquoted(i, &mut staging) else {
                break;
            };
            if let Err(err) = self.write_field(field) {
                result = Err(err);
                break;
            }
        }
        self.scratch = staging;
        result?;
        self.end_row()
    }

    /// Write a full record of raw fields and terminate the row.
    pub fn write_record<I>(&mut self, fields: I) -> Result<()>
    where
        I: IntoIterator,
        I::Item: AsRef<[u8]>,
    {
        for field in fields {
            self.write_field(field.as_ref())?;
        }
        self.end_row()
    }

    /// Terminate the current row.
    pub fn end_row(&mut self) -> Result<()> {
        let terminator = self.opts.terminator.as_bytes();
        self.reserve(terminator.len())?;
        self.buf.extend_from_slice(terminator);
        self.col = 0;
        self.rows += 1;
        Ok(())
    }

    fn reserve(&mut self, extra: usize) -> Result<()> {
        if let Some(max) = self.opts.max_output_size {
            if self.buf.len() + extra > max {
                return Err(Error::new(
                    ErrorCode::OutputTooLarge,
                    format!("output would exceed {max} bytes"),
                )
                .at(self.rows + 1, self.col as u64 + 1, 0));
            }
        }
        self.buf.reserve(extra);
        Ok(())
    }

    /// One pass over the field: specials present, quote count.
    fn analyze(&self, field: &[u8]) -> FieldStats {
        let mut stats = FieldStats::default();
        if field.len() >= BLOCK {
            let mut chunks = field.chunks_exact(BLOCK);
            for chunk in &mut chunks {
                let block: &[u8; BLOCK] = chunk.try_into().expect("exact chunk");
                let masks = self.scanner.scan_block(block);
                stats.quote_count += masks.quotes.count_ones() as usize;
                stats.special |=
                    (masks.delimiters | masks.quotes | masks.cr | masks.lf) != 0;
            }
            let masks = self.scanner.scan_tail(chunks.remainder());
            stats.quote_count += masks.quotes.count_ones() as usize;
            stats.special |= (masks.delimiters | masks.quotes | masks.cr | masks.lf) != 0;
        } else {
            for &b in field {
                if b == self.opts.quote {
                    stats.special = true;
                    stats.quote_count += 1;
                } else if b == self.opts.delimiter || b == b'\r' || b == b'\n' {
                    stats.special = true;
                }
            }
        }
        stats
    }
}

impl Drop for CsvWriter {
    fn drop(&mut self) {
        pool::give_bytes(core::mem::take(&mut self.buf));
        pool::give_bytes(core::mem::take(&mut self.scratch));
    }
}
