//! Pool accounting runs in its own test binary: the rental counters are
//! process-wide, so this must not share a process with concurrent tests.

use heroparser::{
    ColumnBinding, CsvWriter, ReadOptions, RecordBinder, RecordReader, RowReader, WriteOptions,
};

#[derive(Default)]
struct Entry {
    key: String,
    value: i64,
}

#[test]
fn rentals_equal_returns_at_shutdown() {
    {
        let mut reader = RowReader::new(b"a,b\nc,d\n", ReadOptions::default()).unwrap();
        while let Some(row) = reader.next_row() {
            row.unwrap();
        }

        let options = ReadOptions::default();
        let binder = RecordBinder::new(&options)
            .with_column(ColumnBinding::new("key", |e: &mut Entry, v: String| e.key = v))
            .with_column(ColumnBinding::new("value", |e: &mut Entry, v: i64| e.value = v));
        let mut records = RecordReader::new(b"key,value\nk,\"1\"\n", binder, &options).unwrap();
        while let Some(record) = records.next_record() {
            record.unwrap();
        }

        let mut writer = CsvWriter::new(WriteOptions::default()).unwrap();
        writer.write_record([b"x" as &[u8], b"y,z"]).unwrap();
        writer.write_value(&17i64).unwrap();
        writer.end_row().unwrap();
        let _ = writer.into_bytes();
    }

    let (rented, returned) = heroparser::pool::balance();
    assert_eq!(rented, returned, "every pooled buffer must be returned on drop");
}
