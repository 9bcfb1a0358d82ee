//! Field unquoting.
//!
//! A field slice that begins and ends with the quote byte has the quotes
//! stripped and every doubled quote collapsed. The common case — no
//! embedded quotes — borrows straight from the input; only fields with
//! escaped quotes touch the pooled scratch buffer.

use memchr::memchr;

/// Unquote `field`, writing into `scratch` only when collapsing is needed.
///
/// The returned slice borrows from `field` or from `scratch`; both live
/// at least as long as the current row.
#[inline]
pub(crate) fn unquote<'a>(field: &'a [u8], quote: u8, scratch: &'a mut Vec<u8>) -> &'a [u8] {
    if field.len() < 2 || field[0] != quote || field[field.len() - 1] != quote {
        return field;
    }
    let inner = &field[1..field.len() - 1];
    if memchr(quote, inner).is_none() {
        return inner;
    }
    scratch.clear();
    scratch.reserve(inner.len());
    let mut i = 0;
    while let Some(found) = memchr(quote, &inner[i..]) {
        let q = i + found;
        // Copy through the first quote of the pair, skip its twin.
        scratch.extend_from_slice(&inner[i..=q]);
        i = q + 1;
        if inner.get(i) == Some(&quote) {
            i += 1;
        }
    }
    scratch.extend_from_slice(&inner[i..]);
    scratch.as_slice()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(field: &[u8]) -> Vec<u8> {
        let mut scratch = Vec::new();
        unquote(field, b'"', &mut scratch).to_vec()
    }

    #[test]
    fn unquoted_field_passes_through() {
        assert_eq!(run(b"hello"), b"hello");
        assert_eq!(run(b""), b"");
    }

    #[test]
    fn surrounding_quotes_stripped() {
        assert_eq!(run(b"\"hello\""), b"hello");
        assert_eq!(run(b"\"\""), b"");
    }

    #[test]
    fn doubled_quotes_collapse() {
        assert_eq!(run(b"\"a\"\"b\""), b"a\"b");
        assert_eq!(run(b"\"\"\"\""), b"\"");
        assert_eq!(run(b"\"say \"\"hi\"\"\""), b"say \"hi\"");
    }

    #[test]
    fn lone_quote_is_not_a_quoted_field() {
        assert_eq!(run(b"\""), b"\"");
    }

    #[test]
    fn embedded_delimiter_and_newline_preserved() {
        assert_eq!(run(b"\"a,b\""), b"a,b");
        assert_eq!(run(b"\"a\nb\""), b"a\nb");
    }

    #[test]
    fn borrowed_fast_path_does_not_touch_scratch() {
        let mut scratch = Vec::new();
        let out = unquote(b"\"plain\"", b'"', &mut scratch);
        assert_eq!(out, b"plain");
        assert!(scratch.is_empty());
    }
}
