//! # HeroParser
//!
//! High-throughput CSV reading and writing for Rust.
//!
//! The engine is built around a vectorized, RFC 4180-compliant tokenizer:
//! 64-byte blocks are classified into delimiter/quote/CR/LF bitmasks,
//! quote state resolves branch-free via a parity-prefix XOR, and the row
//! emitter walks the filtered bits to build per-row column end tables.
//! On top of that sit a zero-allocation typed-record binding layer and a
//! symmetric single-pass writer.
//!
//! ## Module Organization
//!
//! - [`read`] - [`RowReader`], [`Row`], limits, line numbers
//! - [`bind`] - [`RecordBinder`], header resolution, the binder registry,
//!   multi-schema dispatch
//! - [`field`] - [`FieldParse`] / [`FieldWrite`] primitives
//! - [`write`] - [`CsvWriter`], quote analysis, injection protection
//! - [`options`] - [`ReadOptions`] / [`WriteOptions`]
//! - [`error`] - structured [`Error`] with row/column/line context
//!
//! ## Quick Start
//!
//! ```
//! use heroparser::{ReadOptions, RowReader};
//!
//! let mut reader = RowReader::new(b"city,population\nparis,2102650\n", ReadOptions::default())
//!     .unwrap();
//! while let Some(row) = reader.next_row() {
//!     let row = row.unwrap();
//!     assert_eq!(row.column_count(), 2);
//! }
//! ```
//!
//! Typed records bind by header name:
//!
//! ```
//! use heroparser::{ColumnBinding, ReadOptions, RecordBinder, RecordReader};
//!
//! #[derive(Default)]
//! struct City {
//!     name: String,
//!     population: u64,
//! }
//!
//! let options = ReadOptions::default();
//! let binder = RecordBinder::new(&options)
//!     .with_column(ColumnBinding::new("city", |c: &mut City, v: String| c.name = v).required())
//!     .with_column(ColumnBinding::new("population", |c: &mut City, v: u64| c.population = v));
//!
//! let input = b"city,population\nparis,2102650\n";
//! let mut reader = RecordReader::new(input, binder, &options).unwrap();
//! let city = reader.next_record().unwrap().unwrap();
//! assert_eq!(city.name, "paris");
//! assert_eq!(city.population, 2_102_650);
//! ```
//!
//! ## Threading
//!
//! A reader or writer is a linear, single-threaded resource. Parallelism
//! is achieved by splitting the input at row boundaries and running one
//! reader per partition; the binder registry is the only process-wide
//! state and is insert-once.
//!
//! ## Features
//!
//! - `serde` - derive `Serialize`/`Deserialize` on option types
//! - `chrono` - date field parsing/formatting with format hints

// =============================================================================
// Core modules
// =============================================================================

/// Error contract.
pub mod error;

/// Option sets for the read and write paths.
pub mod options;

/// Pooled working buffers.
pub mod pool;

pub(crate) mod scan;

// =============================================================================
// Engine modules
// =============================================================================

/// Row/column emission (the read path).
pub mod read;

/// Typed record binding, registry, and multi-schema dispatch.
pub mod bind;

/// Typed field parse/serialize primitives.
pub mod field;

/// CSV emission (the write path).
pub mod write;

// =============================================================================
// Public re-exports (convenience)
// =============================================================================

pub use bind::dispatch::{SchemaDispatcher, UnmatchedRowBehavior};
pub use bind::registry::{binder_for, register};
pub use bind::{ColumnBinding, RecordBinder, RecordReader};
pub use error::{Error, ErrorCode, Result};
pub use field::{FieldError, FieldParse, FieldWrite};
pub use options::{
    ErrorPolicy, InjectionProtection, LineTerminator, QuotePolicy, ReadOptions, WriteOptions,
};
pub use read::{Row, RowReader};
pub use write::CsvWriter;
