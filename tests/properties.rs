//! Property-based tests for the engine's universal invariants.
//!
//! Slice stability (invariant: a row's slices live until the next
//! `next_row` call) is enforced at compile time by the borrow on the
//! reader and needs no runtime test.

use heroparser::{CsvWriter, ReadOptions, RowReader, WriteOptions};
use proptest::prelude::*;

// ============================================================================
// Strategies
// ============================================================================

fn field_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z0-9,\"\r\n=@+ -]{0,12}").expect("valid regex")
}

fn records_strategy() -> impl Strategy<Value = Vec<Vec<String>>> {
    prop::collection::vec(prop::collection::vec(field_strategy(), 1..5), 0..8)
}

fn soup_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(
        prop::sample::select(vec![b'a', b'z', b'0', b',', b'"', b'\r', b'\n', b' ']),
        0..300,
    )
}

fn write_records(records: &[Vec<String>]) -> Vec<u8> {
    let mut writer = CsvWriter::new(WriteOptions::default()).expect("default options");
    for record in records {
        writer
            .write_record(record.iter().map(|f| f.as_bytes()))
            .expect("in-memory write");
    }
    writer.into_bytes()
}

fn parse_unquoted(input: &[u8], options: ReadOptions) -> Result<Vec<Vec<Vec<u8>>>, heroparser::Error> {
    let mut reader = RowReader::new(input, options)?;
    let mut rows = Vec::new();
    let mut scratch = Vec::new();
    while let Some(row) = reader.next_row() {
        let row = row?;
        rows.push(
            (0..row.column_count())
                .map(|i| row.unquoted(i, &mut scratch).expect("in range").to_vec())
                .collect(),
        );
    }
    Ok(rows)
}

// ============================================================================
// Scalar reference parser (same dialect rules, byte at a time)
// ============================================================================

struct Reference {
    rows: Vec<Vec<Vec<u8>>>,
    unterminated: bool,
}

fn reference_parse(input: &[u8]) -> Reference {
    let mut rows = Vec::new();
    let mut row: Vec<Vec<u8>> = Vec::new();
    let mut field: Vec<u8> = Vec::new();
    let mut inside = false;
    let mut saw_byte = false;
    let mut i = 0;

    while i < input.len() {
        let b = input[i];
        if inside {
            if b == b'"' {
                inside = false;
            }
            field.push(b);
            saw_byte = true;
            i += 1;
            continue;
        }
        match b {
            b'"' => {
                inside = true;
                field.push(b);
                saw_byte = true;
                i += 1;
            }
            b',' => {
                row.push(std::mem::take(&mut field));
                saw_byte = true;
                i += 1;
            }
            b'\n' | b'\r' => {
                row.push(std::mem::take(&mut field));
                rows.push(std::mem::take(&mut row));
                saw_byte = false;
                i += 1;
                if b == b'\r' && input.get(i) == Some(&b'\n') {
                    i += 1;
                }
            }
            _ => {
                field.push(b);
                saw_byte = true;
                i += 1;
            }
        }
    }

    if inside {
        return Reference { rows, unterminated: true };
    }
    if saw_byte {
        row.push(field);
        rows.push(row);
    }
    Reference { rows, unterminated: false }
}

fn quotes_outside_state(bytes: &[u8]) -> (usize, usize) {
    // (delimiters outside quotes, quote bytes) for one row's span.
    let mut inside = false;
    let mut delimiters = 0;
    let mut quotes = 0;
    for &b in bytes {
        if b == b'"' {
            inside = !inside;
            quotes += 1;
        } else if b == b',' && !inside {
            delimiters += 1;
        }
    }
    (delimiters, quotes)
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    /// Serialize then parse recovers the original records.
    #[test]
    fn round_trip(records in records_strategy()) {
        let bytes = write_records(&records);
        let parsed = parse_unquoted(&bytes, ReadOptions::default()).expect("own output parses");
        let expected: Vec<Vec<Vec<u8>>> = records
            .iter()
            .map(|r| r.iter().map(|f| f.as_bytes().to_vec()).collect())
            .collect();
        prop_assert_eq!(parsed, expected);
    }

    /// Serializing the same records twice is byte-identical.
    #[test]
    fn reserialization_is_deterministic(records in records_strategy()) {
        prop_assert_eq!(write_records(&records), write_records(&records));
    }

    /// columns == unquoted delimiters + 1, and quote bytes per row are
    /// even, for every row of well-formed output.
    #[test]
    fn column_count_and_quote_parity(records in records_strategy()) {
        let bytes = write_records(&records);
        let mut reader = RowReader::new(&bytes, ReadOptions::default()).expect("options");
        while let Some(row) = reader.next_row() {
            let row = row.expect("well-formed");
            let (delimiters, quotes) = quotes_outside_state(row.bytes());
            prop_assert_eq!(row.column_count(), delimiters + 1);
            prop_assert_eq!(quotes % 2, 0);
        }
    }

    /// The vectorized tokenizer agrees with a byte-at-a-time reference on
    /// arbitrary input, including malformed quoting.
    #[test]
    fn matches_scalar_reference(input in soup_strategy()) {
        let reference = reference_parse(&input);

        let mut options = ReadOptions::default();
        options.max_row_count = None;
        let mut reader = RowReader::new(&input, options).expect("options");
        let mut rows = Vec::new();
        let mut failed = false;
        while let Some(row) = reader.next_row() {
            match row {
                Ok(row) => rows.push(
                    (0..row.column_count())
                        .map(|i| row.column(i).to_vec())
                        .collect::<Vec<_>>(),
                ),
                Err(err) => {
                    prop_assert_eq!(err.code, heroparser::ErrorCode::UnterminatedQuote);
                    failed = true;
                    break;
                }
            }
        }
        prop_assert_eq!(failed, reference.unterminated);
        prop_assert_eq!(rows, reference.rows);
    }

    /// Physical line numbers strictly increase row over row.
    #[test]
    fn line_numbers_monotone(input in soup_strategy()) {
        let mut options = ReadOptions::default();
        options.max_row_count = None;
        let mut reader = RowReader::new(&input, options).expect("options");
        let mut last = 0u64;
        while let Some(row) = reader.next_row() {
            match row {
                Ok(row) => {
                    prop_assert!(row.line_number() > last);
                    last = row.line_number();
                }
                Err(_) => break,
            }
        }
    }
}
