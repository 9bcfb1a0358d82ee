//! Typed record binding.
//!
//! A [`RecordBinder`] carries an ordered list of [`ColumnBinding`]s, each
//! pairing a header name (or explicit index) with a parse-and-assign
//! closure for one field of the target record. Header resolution runs
//! once against the first row; after that, binding a row is a straight
//! walk over resolved indices with zero allocation beyond the shared
//! unquote scratch.
//!
//! Records are built from `R::default()`, so the `UseDefault` policy
//! simply leaves a failed field untouched.

pub mod dispatch;
pub mod registry;

use indexmap::IndexMap;

use crate::error::{Error, ErrorCode, Result};
use crate::field::{FieldError, FieldParse};
use crate::options::{ErrorPolicy, ReadOptions};
use crate::pool;
use crate::read::unquote::unquote;
use crate::read::{Row, RowReader};

/// What a binding receives for one field.
pub(crate) enum FieldSource<'a> {
    /// The field matched the configured null set.
    Null,
    /// Unquoted field bytes.
    Bytes(&'a [u8]),
}

type BindFn<R> =
    Box<dyn Fn(&mut R, FieldSource<'_>, Option<&str>) -> core::result::Result<(), FieldError> + Send + Sync>;

/// One column of a record schema.
pub struct ColumnBinding<R> {
    header: String,
    explicit_index: Option<usize>,
    required: bool,
    format_hint: Option<String>,
    resolved: Option<usize>,
    apply: BindFn<R>,
}

impl<R> ColumnBinding<R> {
    /// Bind a header name to a record field through its [`FieldParse`]
    /// type and an assignment closure.
    pub fn new<T, F>(header: impl Into<String>, assign: F) -> Self
    where
        T: FieldParse + 'static,
        F: Fn(&mut R, T) + Send + Sync + 'static,
    {
        let apply: BindFn<R> = Box::new(move |record, source, hint| match source {
            FieldSource::Bytes(bytes) => {
                let value = T::parse_field(bytes, hint)?;
                assign(record, value);
                Ok(())
            }
            FieldSource::Null => match T::null_field() {
                Some(value) => {
                    assign(record, value);
                    Ok(())
                }
                None => Err(FieldError::NullNotAllowed),
            },
        });
        Self {
            header: header.into(),
            explicit_index: None,
            required: false,
            format_hint: None,
            resolved: None,
            apply,
        }
    }

    /// Pin the binding to a column index, bypassing header matching.
    pub fn at_index(mut self, index: usize) -> Self {
        self.explicit_index = Some(index);
        self
    }

    /// Fail header resolution when this binding's header is absent.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Attach a format hint passed through to [`FieldParse`].
    pub fn with_format(mut self, hint: impl Into<String>) -> Self {
        self.format_hint = Some(hint.into());
        self
    }

    /// The binding's header name.
    pub fn header(&self) -> &str {
        &self.header
    }

    /// The column index filled in by resolution, if any.
    pub fn resolved_index(&self) -> Option<usize> {
        self.resolved
    }
}

/// Binds parsed rows onto instances of `R`.
pub struct RecordBinder<R> {
    bindings: Vec<ColumnBinding<R>>,
    null_values: Vec<Vec<u8>>,
    case_sensitive: bool,
    allow_missing: bool,
    policy: ErrorPolicy,
    quote: Option<u8>,
    scratch: Vec<u8>,
    resolved: bool,
}

impl<R> RecordBinder<R> {
    /// Create an empty binder snapshotting the relevant options.
    pub fn new(options: &ReadOptions) -> Self {
        Self {
            bindings: Vec::new(),
            null_values: options.null_values.iter().map(|s| s.clone().into_bytes()).collect(),
            case_sensitive: options.case_sensitive_headers,
            allow_missing: options.allow_missing_columns,
            policy: options.error_policy,
            quote: options.quote,
            scratch: pool::take_bytes(),
            resolved: false,
        }
    }

    /// Append a column binding.
    pub fn with_column(mut self, binding: ColumnBinding<R>) -> Self {
        self.bindings.push(binding);
        self
    }

    /// Whether header/positional resolution has run.
    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    /// The bindings in declaration order.
    pub fn bindings(&self) -> &[ColumnBinding<R>] {
        &self.bindings
    }

    /// Resolve bindings against a header row. Runs once; the first row of
    /// the stream when headers are enabled.
    pub fn resolve_headers(&mut self, header: &Row<'_>) -> Result<()> {
        let mut by_name: IndexMap<Vec<u8>, usize> = IndexMap::with_capacity(header.column_count());
        for i in 0..header.column_count() {
            let mut scratch = Vec::new();
            let Some(name) = header.unquoted(i, &mut scratch) else {
                continue;
            };
            let key = if self.case_sensitive {
                name.to_vec()
            } else {
                name.to_ascii_lowercase()
            };
            // First occurrence wins for duplicated header names.
            by_name.entry(key).or_insert(i);
        }

        for binding in &mut self.bindings {
            if let Some(index) = binding.explicit_index {
                binding.resolved = Some(index);
                continue;
            }
            let key = if self.case_sensitive {
                binding.header.clone().into_bytes()
            } else {
                binding.header.to_ascii_lowercase().into_bytes()
            };
            match by_name.get(&key) {
                Some(&index) => binding.resolved = Some(index),
                None if binding.required && !self.allow_missing => {
                    return Err(Error::new(
                        ErrorCode::HeaderNotFound,
                        format!("required column {:?} not present in header", binding.header),
                    )
                    .at(1, 0, header.line_number()));
                }
                None => binding.resolved = None,
            }
        }
        self.resolved = true;
        tracing::debug!(
            columns = header.column_count(),
            bound = self.bindings.iter().filter(|b| b.resolved.is_some()).count(),
            "resolved header bindings"
        );
        Ok(())
    }

    /// Resolve bindings by declaration order (no header row): each
    /// binding takes its explicit index or its ordinal position.
    pub fn resolve_positional(&mut self) {
        for (i, binding) in self.bindings.iter_mut().enumerate() {
            binding.resolved = Some(binding.explicit_index.unwrap_or(i));
        }
        self.resolved = true;
    }
}

impl<R: Default> RecordBinder<R> {
    /// Bind one row. `Ok(None)` means the row was skipped by policy.
    pub fn bind_row(&mut self, row: &Row<'_>, row_number: u64) -> Result<Option<R>> {
        debug_assert!(self.resolved, "bind_row before resolution");
        let mut record = R::default();
        for binding in &self.bindings {
            let Some(index) = binding.resolved else {
                continue;
            };
            let Some(raw) = row.try_column_span(index) else {
                if self.allow_missing {
                    continue;
                }
                return Err(Error::new(
                    ErrorCode::MissingColumn,
                    format!(
                        "column {:?} resolved to index {} but the row has {} columns",
                        binding.header,
                        index,
                        row.column_count()
                    ),
                )
                .at(row_number, index as u64 + 1, row.line_number()));
            };
            let field = match self.quote {
                Some(q) => unquote(raw, q, &mut self.scratch),
                None => raw,
            };
            let source = if self.null_values.iter().any(|n| n == field) {
                FieldSource::Null
            } else {
                FieldSource::Bytes(field)
            };
            match (binding.apply)(&mut record, source, binding.format_hint.as_deref()) {
                Ok(()) => {}
                Err(cause) => match self.policy {
                    ErrorPolicy::Throw => {
                        return Err(Error::new(
                            ErrorCode::TypeConversionFailed,
                            format!("column {:?}: {cause}", binding.header),
                        )
                        .at(row_number, index as u64 + 1, row.line_number())
                        .with_field(field));
                    }
                    ErrorPolicy::Skip => return Ok(None),
                    ErrorPolicy::UseDefault => {}
                },
            }
        }
        Ok(Some(record))
    }
}

impl<R> Drop for RecordBinder<R> {
    fn drop(&mut self) {
        pool::give_bytes(core::mem::take(&mut self.scratch));
    }
}

/// Streaming typed-record reader: a [`RowReader`] plus a [`RecordBinder`].
pub struct RecordReader<'a, R> {
    rows: RowReader<'a>,
    binder: RecordBinder<R>,
    headers: Option<Vec<String>>,
    has_header: bool,
    started: bool,
}

impl<'a, R: Default> RecordReader<'a, R> {
    /// Create a reader over `input` with the given binder.
    pub fn new(input: &'a [u8], binder: RecordBinder<R>, options: &ReadOptions) -> Result<Self> {
        let rows = RowReader::new(input, options.clone())?;
        Ok(Self {
            rows,
            binder,
            headers: None,
            has_header: options.has_header,
            started: false,
        })
    }

    /// Header names observed on the first row, unquoted. `None` before
    /// the first record (or when headers are disabled).
    pub fn headers(&self) -> Option<&[String]> {
        self.headers.as_deref()
    }

    /// 1-based physical line at the current parse position.
    pub fn current_line_number(&self) -> u64 {
        self.rows.current_line_number()
    }

    /// Advance to the next bound record. Rows skipped by policy are
    /// consumed silently.
    pub fn next_record(&mut self) -> Option<Result<R>> {
        if !self.started {
            self.started = true;
            if let Err(err) = self.start() {
                return Some(Err(err));
            }
        }
        loop {
            let row_number = self.rows.rows_emitted() + 1;
            let row = match self.rows.next_row()? {
                Ok(row) => row,
                Err(err) => return Some(Err(err)),
            };
            match self.binder.bind_row(&row, row_number) {
                Ok(Some(record)) => return Some(Ok(record)),
                Ok(None) => continue,
                Err(err) => return Some(Err(err)),
            }
        }
    }

    fn start(&mut self) -> Result<()> {
        if !self.has_header {
            self.binder.resolve_positional();
            return Ok(());
        }
        match self.rows.next_row() {
            // Empty input: zero records, nothing to resolve.
            None => {
                self.binder.resolve_positional();
                Ok(())
            }
            Some(Err(err)) => Err(err),
            Some(Ok(header)) => {
                let mut names = Vec::with_capacity(header.column_count());
                let mut scratch = Vec::new();
                for i in 0..header.column_count() {
                    if let Some(name) = header.unquoted(i, &mut scratch) {
                        names.push(String::from_utf8_lossy(name).into_owned());
                    }
                }
                self.headers = Some(names);
                self.binder.resolve_headers(&header)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::ErrorPolicy;

    #[derive(Debug, Default, PartialEq)]
    struct Person {
        name: String,
        age: i64,
        score: Option<f64>,
    }

    fn person_binder(options: &ReadOptions) -> RecordBinder<Person> {
        RecordBinder::new(options)
            .with_column(ColumnBinding::new("name", |p: &mut Person, v: String| p.name = v).required())
            .with_column(ColumnBinding::new("age", |p: &mut Person, v: i64| p.age = v).required())
            .with_column(ColumnBinding::new("score", |p: &mut Person, v: Option<f64>| {
                p.score = v;
            }))
    }

    fn read_people(input: &[u8], options: ReadOptions) -> Result<Vec<Person>> {
        let binder = person_binder(&options);
        let mut reader = RecordReader::new(input, binder, &options)?;
        let mut out = Vec::new();
        while let Some(record) = reader.next_record() {
            out.push(record?);
        }
        Ok(out)
    }

    #[test]
    fn binds_by_header_name() {
        let people = read_people(b"name,age,score\nada,36,9.5\ngrace,45,\n", ReadOptions::default())
            .unwrap();
        assert_eq!(
            people,
            vec![
                Person { name: "ada".into(), age: 36, score: Some(9.5) },
                Person { name: "grace".into(), age: 45, score: None },
            ]
        );
    }

    #[test]
    fn header_order_does_not_matter() {
        let people =
            read_people(b"age,score,name\n36,9.5,ada\n", ReadOptions::default()).unwrap();
        assert_eq!(people[0].name, "ada");
        assert_eq!(people[0].age, 36);
    }

    #[test]
    fn header_matching_is_case_insensitive_by_default() {
        let people = read_people(b"Name,AGE,Score\nada,36,1\n", ReadOptions::default()).unwrap();
        assert_eq!(people[0].age, 36);
    }

    #[test]
    fn case_sensitive_headers_fail_on_mismatch() {
        let mut options = ReadOptions::default();
        options.case_sensitive_headers = true;
        let err = read_people(b"Name,age,score\nada,36,1\n", options).unwrap_err();
        assert_eq!(err.code, ErrorCode::HeaderNotFound);
        assert!(err.message.contains("name"));
    }

    #[test]
    fn quoted_headers_are_unquoted_before_matching() {
        let people = read_people(b"\"name\",\"age\",score\nada,36,\n", ReadOptions::default())
            .unwrap();
        assert_eq!(people[0].name, "ada");
    }

    #[test]
    fn missing_required_header_is_reported() {
        let err = read_people(b"name,score\nada,1\n", ReadOptions::default()).unwrap_err();
        assert_eq!(err.code, ErrorCode::HeaderNotFound);
        assert_eq!(err.row, 1);
    }

    #[test]
    fn positional_binding_without_header() {
        let options = ReadOptions::default().with_header(false);
        let people = read_people(b"ada,36,9.5\n", options).unwrap();
        assert_eq!(people[0].name, "ada");
        assert_eq!(people[0].score, Some(9.5));
    }

    #[test]
    fn explicit_index_overrides_header() {
        let options = ReadOptions::default().with_header(false);
        let binder: RecordBinder<Person> = RecordBinder::new(&options)
            .with_column(ColumnBinding::new("name", |p: &mut Person, v: String| p.name = v).at_index(1));
        let mut reader = RecordReader::new(b"x,ada\n", binder, &options).unwrap();
        let person = reader.next_record().unwrap().unwrap();
        assert_eq!(person.name, "ada");
    }

    #[test]
    fn quoted_field_is_unquoted_before_parsing() {
        let people = read_people(
            b"name,age,score\n\"last, first\",36,\n",
            ReadOptions::default(),
        )
        .unwrap();
        assert_eq!(people[0].name, "last, first");

        let people = read_people(
            b"name,age,score\n\"say \"\"hi\"\"\",36,\n",
            ReadOptions::default(),
        )
        .unwrap();
        assert_eq!(people[0].name, "say \"hi\"");
    }

    #[test]
    fn null_values_bind_as_none() {
        let options = ReadOptions::default().with_null_values(["NULL", "n/a"]);
        let people = read_people(b"name,age,score\nada,36,NULL\nbob,20,n/a\n", options).unwrap();
        assert_eq!(people[0].score, None);
        assert_eq!(people[1].score, None);
    }

    #[test]
    fn null_into_non_nullable_respects_policy() {
        let options = ReadOptions::default().with_null_values(["NULL"]);
        let err = read_people(b"name,age,score\nada,NULL,1\n", options.clone()).unwrap_err();
        assert_eq!(err.code, ErrorCode::TypeConversionFailed);

        let options = options.with_error_policy(ErrorPolicy::UseDefault);
        let people = read_people(b"name,age,score\nada,NULL,1\n", options).unwrap();
        assert_eq!(people[0].age, 0, "default value survives");
    }

    #[test]
    fn throw_policy_reports_context() {
        let err =
            read_people(b"name,age,score\nada,not-a-number,1\n", ReadOptions::default()).unwrap_err();
        assert_eq!(err.code, ErrorCode::TypeConversionFailed);
        assert_eq!(err.row, 2);
        assert_eq!(err.column, 2);
        assert_eq!(err.line, 2);
        assert_eq!(err.field.as_deref(), Some(b"not-a-number".as_slice()));
    }

    #[test]
    fn skip_policy_drops_bad_rows() {
        let options = ReadOptions::default().with_error_policy(ErrorPolicy::Skip);
        let people =
            read_people(b"name,age,score\nada,bad,1\ngrace,45,2\n", options).unwrap();
        assert_eq!(people.len(), 1);
        assert_eq!(people[0].name, "grace");
    }

    #[test]
    fn missing_column_policy() {
        let err = read_people(b"name,age,score\nada,36\n", ReadOptions::default()).unwrap_err();
        assert_eq!(err.code, ErrorCode::MissingColumn);

        let mut options = ReadOptions::default();
        options.allow_missing_columns = true;
        let people = read_people(b"name,age,score\nada,36\n", options).unwrap();
        assert_eq!(people[0].score, None);
    }

    #[test]
    fn headers_are_exposed() {
        let options = ReadOptions::default();
        let binder = person_binder(&options);
        let mut reader =
            RecordReader::new(b"name,age,score\nada,36,\n", binder, &options).unwrap();
        assert!(reader.headers().is_none(), "headers appear after the first record");
        let _ = reader.next_record();
        assert_eq!(
            reader.headers().unwrap(),
            &["name".to_owned(), "age".into(), "score".into()]
        );
    }

    #[test]
    fn empty_input_yields_no_records() {
        let people = read_people(b"", ReadOptions::default()).unwrap();
        assert!(people.is_empty());
    }
}
