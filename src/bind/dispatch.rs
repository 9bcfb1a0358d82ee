//! Multi-schema row dispatch.
//!
//! Heterogeneous files carry a discriminator column that selects the
//! schema of each row. [`SchemaDispatcher`] maps discriminator bytes to
//! a caller-defined schema id and memoizes the most recent match in a
//! one-slot sticky cache, because real inputs arrive in long runs of the
//! same row type.
//!
//! A dispatcher is a single-threaded resource: the sticky cache mutates
//! on every dispatch, and the type is deliberately `!Sync`. Give each
//! thread its own instance.

use core::cell::Cell;
use core::marker::PhantomData;

use crate::error::{Error, ErrorCode, Result};
use crate::read::Row;

/// What to do with a row whose discriminator matches no schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnmatchedRowBehavior {
    /// Surface an error naming the discriminator.
    #[default]
    Error,
    /// Drop the row.
    Skip,
}

/// Maps a discriminator column to schema ids with a sticky cache.
pub struct SchemaDispatcher {
    column: usize,
    arms: Vec<(Vec<u8>, usize)>,
    sticky: Option<(Vec<u8>, usize)>,
    unmatched: UnmatchedRowBehavior,
    // Sticky-cache mutation makes sharing across threads undefined.
    _single_thread: PhantomData<Cell<()>>,
}

impl SchemaDispatcher {
    /// Dispatch on the given discriminator column.
    pub fn new(column: usize, unmatched: UnmatchedRowBehavior) -> Self {
        Self {
            column,
            arms: Vec::new(),
            sticky: None,
            unmatched,
            _single_thread: PhantomData,
        }
    }

    /// Map a discriminator value to a schema id.
    pub fn with_schema(mut self, discriminator: impl Into<Vec<u8>>, schema: usize) -> Self {
        self.arms.push((discriminator.into(), schema));
        self
    }

    /// Resolve the schema id for one row.
    ///
    /// `Ok(None)` means the row is to be dropped
    /// ([`UnmatchedRowBehavior::Skip`]).
    pub fn dispatch(&mut self, row: &Row<'_>, row_number: u64) -> Result<Option<usize>> {
        let Some(bytes) = row.try_column_span(self.column) else {
            return self.on_unmatched(b"", row_number, row.line_number());
        };
        if let Some((key, schema)) = &self.sticky {
            // First-byte probe rejects most sticky misses before the
            // full compare.
            let probe_hit = match row.try_column_first_byte(self.column) {
                Some((first, len)) => key.len() == len && key.first() == Some(&first),
                None => key.is_empty(),
            };
            if probe_hit && key.as_slice() == bytes {
                return Ok(Some(*schema));
            }
        }
        match self.arms.iter().find(|(key, _)| key.as_slice() == bytes) {
            Some((key, schema)) => {
                self.sticky = Some((key.clone(), *schema));
                Ok(Some(*schema))
            }
            None => self.on_unmatched(bytes, row_number, row.line_number()),
        }
    }

    fn on_unmatched(&self, bytes: &[u8], row_number: u64, line: u64) -> Result<Option<usize>> {
        match self.unmatched {
            UnmatchedRowBehavior::Skip => Ok(None),
            UnmatchedRowBehavior::Error => Err(Error::new(
                ErrorCode::ParseError,
                "no schema registered for discriminator",
            )
            .at(row_number, self.column as u64 + 1, line)
            .with_field(bytes)),
        }
    }
}
