//! Row/column emission: the streaming heart of the read path.
//!
//! [`RowReader`] walks a byte buffer block by block, combining the
//! special-byte masks with the quote-state mask and consuming the set
//! bits in position order. Delimiter bits append column end offsets to a
//! pooled table; terminator bits publish a [`Row`]. The reader holds no
//! per-row allocations beyond that table, so memory use is independent
//! of input size.
//!
//! ## Row lifetime
//!
//! A [`Row`] borrows the reader: it is valid until the next
//! [`RowReader::next_row`] call, and the borrow checker enforces exactly
//! that window. Consumers that need to keep data must copy it out.
//!
//! ## Line endings
//!
//! LF, CRLF, and bare CR all terminate a row. A CR directly followed by
//! LF consumes both bytes as one terminator, even across a block
//! boundary. Newlines inside quoted fields terminate nothing but still
//! advance the physical line counter.

pub(crate) mod unquote;

use crate::error::{Error, ErrorCode, Result};
use crate::options::ReadOptions;
use crate::pool;
use crate::scan::{quotes, BlockMasks, Scanner, BLOCK};

/// UTF-8 byte order mark.
const BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Spreadsheet-formula trigger bytes, shared with the writer.
pub(crate) const INJECTION_TRIGGERS: [u8; 6] = [b'=', b'@', b'+', b'-', b'\t', b'\r'];

/// One parsed row, valid until the next `next_row` call.
///
/// Column `i` spans `ends[i-1] + 1 .. ends[i]` relative to the row start
/// (column 0 starts at offset 0), which makes slice reconstruction O(1).
#[derive(Debug, Clone, Copy)]
pub struct Row<'r> {
    buffer: &'r [u8],
    row_start: usize,
    ends: &'r [u32],
    line: u64,
    quote: Option<u8>,
}

impl<'r> Row<'r> {
    /// Number of columns in this row (at least 1).
    #[inline]
    pub fn column_count(&self) -> usize {
        self.ends.len()
    }

    /// 1-based physical line of the row's first byte.
    #[inline]
    pub fn line_number(&self) -> u64 {
        self.line
    }

    /// Column `i`'s raw bytes, quotes included.
    ///
    /// Panics if `i >= column_count()`; use [`Row::try_column_span`] for a
    /// checked variant.
    #[inline]
    pub fn column(&self, i: usize) -> &'r [u8] {
        let start = if i == 0 { 0 } else { self.ends[i - 1] as usize + 1 };
        let end = self.ends[i] as usize;
        &self.buffer[self.row_start + start..self.row_start + end]
    }

    /// Column `i`'s raw bytes, or `None` when `i` is out of range.
    #[inline]
    pub fn try_column_span(&self, i: usize) -> Option<&'r [u8]> {
        (i < self.ends.len()).then(|| self.column(i))
    }

    /// First byte and length of column `i` without materializing the
    /// slice. `None` for out-of-range or empty columns. Fast path for
    /// single-byte discriminators.
    #[inline]
    pub fn try_column_first_byte(&self, i: usize) -> Option<(u8, usize)> {
        let span = self.try_column_span(i)?;
        span.first().map(|&b| (b, span.len()))
    }

    /// Column `i` with surrounding quotes stripped and doubled quotes
    /// collapsed. Borrows from the input or from `scratch`.
    pub fn unquoted<'s>(&'s self, i: usize, scratch: &'s mut Vec<u8>) -> Option<&'s [u8]> {
        let raw = self.try_column_span(i)?;
        Some(match self.quote {
            Some(q) => unquote::unquote(raw, q, scratch),
            None => raw,
        })
    }

    /// The row's full byte span, terminator excluded.
    #[inline]
    pub fn bytes(&self) -> &'r [u8] {
        let end = self.ends.last().map(|&e| e as usize).unwrap_or(0);
        &self.buffer[self.row_start..self.row_start + end]
    }
}

/// Streaming row reader over one byte buffer.
pub struct RowReader<'a> {
    input: &'a [u8],
    opts: ReadOptions,
    scanner: Scanner,
    scan_start: usize,

    // Block cursor: masks of the block at `block_base`, with already
    // consumed bits cleared from `union`.
    block_base: usize,
    loaded: bool,
    union: u64,
    delim_mask: u64,
    cr_mask: u64,
    quoted_lf_mask: u64,
    inside: bool,
    quote_open_at: Option<usize>,
    skip_lf_at: Option<usize>,
    pending: Option<(usize, Error)>,

    // Row accumulators.
    cur_row_start: usize,
    ends: Vec<u32>,
    line: u64,
    row_line: u64,
    rows: u64,
    emitted_row_start: usize,
    emitted_row_line: u64,
    finished: bool,
}

impl<'a> RowReader<'a> {
    /// Create a reader over `input`. Validates the option set.
    pub fn new(input: &'a [u8], options: ReadOptions) -> Result<Self> {
        options.validate()?;
        let scanner = Scanner::new(options.delimiter, options.quote);
        let scan_start = if options.skip_bom && input.starts_with(BOM) {
            BOM.len()
        } else {
            0
        };
        tracing::debug!(
            path = scanner.path_name(),
            len = input.len(),
            "row reader constructed"
        );
        Ok(Self {
            input,
            opts: options,
            scanner,
            scan_start,
            block_base: scan_start,
            loaded: false,
            union: 0,
            delim_mask: 0,
            cr_mask: 0,
            quoted_lf_mask: 0,
            inside: false,
            quote_open_at: None,
            skip_lf_at: None,
            pending: None,
            cur_row_start: scan_start,
            ends: pool::take_end_table(),
            line: 1,
            row_line: 1,
            rows: 0,
            emitted_row_start: scan_start,
            emitted_row_line: 1,
            finished: false,
        })
    }

    /// 1-based physical line at the current parse position.
    #[inline]
    pub fn current_line_number(&self) -> u64 {
        self.line
    }

    /// Rows emitted so far.
    #[inline]
    pub fn rows_emitted(&self) -> u64 {
        self.rows
    }

    /// Bytes consumed through the last completed row.
    #[inline]
    pub fn bytes_consumed(&self) -> usize {
        self.cur_row_start
    }

    /// Advance to the next row.
    ///
    /// Returns `None` at end of input. Structural errors are fatal: after
    /// an `Err` the reader yields `None` forever.
    pub fn next_row(&mut self) -> Option<Result<Row<'_>>> {
        if self.finished {
            return None;
        }
        self.ends.clear();

        loop {
            if self.union == 0 {
                match self.advance_block() {
                    Err(err) => return Some(self.fail(err)),
                    Ok(false) => return self.finish_at_eof(),
                    Ok(true) => continue,
                }
            }

            let bit = self.union.trailing_zeros() as usize;
            let bit_mask = 1u64 << bit;
            self.union &= self.union - 1;
            let p = self.block_base + bit;

            if let Some((at, err)) = self.pending.take() {
                if at <= p {
                    return Some(self.fail(err));
                }
                self.pending = Some((at, err));
            }

            if self.delim_mask & bit_mask != 0 {
                if let Err(err) = self.push_column_end(p) {
                    return Some(self.fail(err));
                }
            } else if self.quoted_lf_mask & bit_mask != 0 {
                // Newline inside a quoted field: data, but a physical line.
                self.line += 1;
            } else {
                // Row terminator (LF, bare CR, or the CR of a CRLF).
                let mut term_len = 1;
                if self.cr_mask & bit_mask != 0 && self.input.get(p + 1) == Some(&b'\n') {
                    term_len = 2;
                    if bit + 1 < BLOCK {
                        self.union &= !(1u64 << (bit + 1));
                    } else {
                        self.skip_lf_at = Some(p + 1);
                    }
                }
                match self.finalize_row(p, term_len) {
                    Err(err) => return Some(self.fail(err)),
                    Ok(true) => return Some(Ok(self.make_row())),
                    Ok(false) => continue, // skipped empty row
                }
            }
        }
    }

    fn fail<T>(&mut self, err: Error) -> Result<T> {
        self.finished = true;
        Err(err)
    }

    fn make_row(&self) -> Row<'_> {
        Row {
            buffer: self.input,
            row_start: self.emitted_row_start,
            ends: &self.ends,
            line: self.emitted_row_line,
            quote: self.opts.quote,
        }
    }

    /// Load the next 64-byte block, resolving quote state and filtering
    /// the masks. Returns `Ok(false)` at end of input.
    fn advance_block(&mut self) -> Result<bool> {
        let base = if self.loaded {
            self.block_base + BLOCK
        } else {
            self.block_base
        };
        if base >= self.input.len() {
            return Ok(false);
        }
        if base.saturating_sub(self.cur_row_start) > self.opts.max_row_size {
            return Err(Error::new(
                ErrorCode::RowTooLarge,
                format!("row exceeds {} bytes", self.opts.max_row_size),
            )
            .at(self.rows + 1, (self.ends.len() + 1) as u64, self.row_line));
        }

        let masks = if base + BLOCK <= self.input.len() {
            let block: &[u8; BLOCK] = self.input[base..base + BLOCK]
                .try_into()
                .expect("full block slice");
            self.scanner.scan_block(block)
        } else {
            self.scanner.scan_tail(&self.input[base..])
        };

        let entry_inside = self.inside;
        let (inside_mask, exit_inside) = quotes::resolve(masks.quotes, entry_inside);

        if masks.quotes != 0 {
            // The last toggle decides whether a region is still open; its
            // position is the opening quote reported on EOF.
            self.quote_open_at = exit_inside
                .then(|| base + 63 - masks.quotes.leading_zeros() as usize);
        }

        let eff_delim = masks.delimiters & !inside_mask;
        let eff_cr = masks.cr & !inside_mask;
        let mut eff_lf = masks.lf & !inside_mask;
        let quoted_lf = masks.lf & inside_mask;
        let quoted_cr = masks.cr & inside_mask;

        if self.opts.strict {
            self.strict_checks(base, &masks, inside_mask, entry_inside, quoted_lf, quoted_cr);
        }

        if let Some(pos) = self.skip_lf_at {
            if pos >= base && pos < base + BLOCK {
                eff_lf &= !(1u64 << (pos - base));
                self.skip_lf_at = None;
            }
        }

        self.block_base = base;
        self.loaded = true;
        self.delim_mask = eff_delim;
        self.cr_mask = eff_cr;
        self.quoted_lf_mask = quoted_lf;
        self.union = eff_delim | eff_cr | eff_lf | quoted_lf;
        self.inside = exit_inside;
        Ok(true)
    }

    /// Strict-mode structural checks over a freshly loaded block. A
    /// violation is recorded as a pending error and fires when the
    /// consumption point reaches it, so rows before it still come out.
    fn strict_checks(
        &mut self,
        base: usize,
        masks: &BlockMasks,
        inside_mask: u64,
        entry_inside: bool,
        quoted_lf: u64,
        quoted_cr: u64,
    ) {
        let record = |this: &mut Self, at: usize, err: Error| {
            if this.pending.as_ref().map_or(true, |(p, _)| at < *p) {
                this.pending = Some((at, err));
            }
        };

        if !self.opts.allow_newlines_in_quotes {
            let bad = quoted_lf | quoted_cr;
            if bad != 0 {
                let at = base + bad.trailing_zeros() as usize;
                let err = Error::new(
                    ErrorCode::ParseError,
                    "newline inside quoted field is not permitted",
                )
                .at(self.rows + 1, (self.ends.len() + 1) as u64, self.row_line);
                record(self, at, err);
            }
        }

        if masks.quotes != 0 {
            let before = quotes::before_mask(inside_mask, entry_inside);
            let opening = masks.quotes & inside_mask & !before;
            let closing = masks.quotes & !inside_mask & before;

            let mut m = opening;
            while m != 0 {
                let p = base + m.trailing_zeros() as usize;
                m &= m - 1;
                let legal = p == self.scan_start || self.is_boundary_byte(self.input[p - 1]);
                if !legal {
                    let err = Error::new(
                        ErrorCode::UnexpectedQuote,
                        "quote byte inside an unquoted field",
                    )
                    .at(self.rows + 1, (self.ends.len() + 1) as u64, self.row_line);
                    record(self, p, err);
                }
            }
            let mut m = closing;
            while m != 0 {
                let p = base + m.trailing_zeros() as usize;
                m &= m - 1;
                let legal = p + 1 == self.input.len() || self.is_boundary_byte(self.input[p + 1]);
                if !legal {
                    let err = Error::new(
                        ErrorCode::UnexpectedQuote,
                        "data after the closing quote of a quoted field",
                    )
                    .at(self.rows + 1, (self.ends.len() + 1) as u64, self.row_line);
                    record(self, p, err);
                }
            }
        }
    }

    /// Bytes that may legally neighbor a quote at a field boundary.
    #[inline]
    fn is_boundary_byte(&self, b: u8) -> bool {
        b == self.opts.delimiter || b == b'\r' || b == b'\n' || Some(b) == self.opts.quote
    }

    fn push_column_end(&mut self, p: usize) -> Result<()> {
        let rel = p - self.cur_row_start;
        if self.ends.len() + 2 > self.opts.max_column_count {
            return Err(Error::new(
                ErrorCode::TooManyColumns,
                format!("row exceeds {} columns", self.opts.max_column_count),
            )
            .at(self.rows + 1, (self.ends.len() + 2) as u64, self.row_line));
        }
        if rel > self.opts.max_row_size {
            return Err(Error::new(
                ErrorCode::RowTooLarge,
                format!("row exceeds {} bytes", self.opts.max_row_size),
            )
            .at(self.rows + 1, (self.ends.len() + 1) as u64, self.row_line));
        }
        self.check_field_size(rel)?;
        self.ends.push(rel as u32);
        Ok(())
    }

    fn check_field_size(&self, rel_end: usize) -> Result<()> {
        let col_start = self.ends.last().map(|&e| e as usize + 1).unwrap_or(0);
        let len = rel_end - col_start;
        if len > self.opts.max_field_size {
            let abs = self.cur_row_start + col_start;
            return Err(Error::new(
                ErrorCode::FieldTooLarge,
                format!("field exceeds {} bytes", self.opts.max_field_size),
            )
            .at(self.rows + 1, (self.ends.len() + 1) as u64, self.row_line)
            .with_field(&self.input[abs..abs + len.min(crate::error::FIELD_TRUNCATE_LEN)]));
        }
        Ok(())
    }

    /// Complete the row whose content ends (exclusive) at absolute `p`.
    /// Returns `Ok(false)` when the row was an empty one to skip.
    fn finalize_row(&mut self, p: usize, term_len: usize) -> Result<bool> {
        let rel = p - self.cur_row_start;

        if rel == 0 && self.ends.is_empty() && self.opts.skip_empty_rows {
            self.line += 1;
            self.cur_row_start = p + term_len;
            self.row_line = self.line;
            return Ok(false);
        }

        if rel > self.opts.max_row_size {
            return Err(Error::new(
                ErrorCode::RowTooLarge,
                format!("row exceeds {} bytes", self.opts.max_row_size),
            )
            .at(self.rows + 1, (self.ends.len() + 1) as u64, self.row_line));
        }
        self.check_field_size(rel)?;
        self.ends.push(rel as u32);

        self.rows += 1;
        if let Some(max) = self.opts.max_row_count {
            if self.rows > max {
                return Err(Error::new(
                    ErrorCode::TooManyRows,
                    format!("input exceeds {max} rows"),
                )
                .at(self.rows, 0, self.row_line));
            }
        }

        self.emitted_row_start = self.cur_row_start;
        self.emitted_row_line = self.row_line;
        self.line += 1;
        self.cur_row_start = p + term_len;
        self.row_line = self.line;
        Ok(true)
    }

    /// End-of-input: surface deferred errors, detect unterminated quotes,
    /// and flush a final unterminated row.
    fn finish_at_eof(&mut self) -> Option<Result<Row<'_>>> {
        if let Some((_, err)) = self.pending.take() {
            return Some(self.fail(err));
        }
        if self.inside {
            let err = Error::new(
                ErrorCode::UnterminatedQuote,
                "quoted field still open at end of input",
            )
            .at(self.rows + 1, (self.ends.len() + 1) as u64, self.row_line)
            .with_quote_start(self.quote_open_at.unwrap_or(self.cur_row_start));
            return Some(self.fail(err));
        }
        if self.cur_row_start < self.input.len() {
            let rel = self.input.len() - self.cur_row_start;
            if let Err(err) = self.check_field_size(rel) {
                return Some(self.fail(err));
            }
            if rel > self.opts.max_row_size {
                let err = Error::new(
                    ErrorCode::RowTooLarge,
                    format!("row exceeds {} bytes", self.opts.max_row_size),
                )
                .at(self.rows + 1, (self.ends.len() + 1) as u64, self.row_line);
                return Some(self.fail(err));
            }
            self.ends.push(rel as u32);
            self.rows += 1;
            if let Some(max) = self.opts.max_row_count {
                if self.rows > max {
                    let err = Error::new(
                        ErrorCode::TooManyRows,
                        format!("input exceeds {max} rows"),
                    )
                    .at(self.rows, 0, self.row_line);
                    return Some(self.fail(err));
                }
            }
            self.emitted_row_start = self.cur_row_start;
            self.emitted_row_line = self.row_line;
            self.cur_row_start = self.input.len();
            return Some(Ok(self.make_row()));
        }
        self.finished = true;
        None
    }
}

impl Drop for RowReader<'_> {
    fn drop(&mut self) {
        pool::give_end_table(core::mem::take(&mut self.ends));
    }
}
