//! Natural ("human") ordering of file names
//!
//! Strings are split into maximal runs of ASCII digits and maximal runs of
//! everything else. Runs are compared pairwise: two digit runs compare by
//! numeric value, anything else compares literally. When every run compares
//! equal, the shorter run sequence sorts first, and remaining ties (such as
//! `file1` against `file01`) fall back to plain string comparison so the
//! result is a strict total order.

use std::cmp::Ordering;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Run<'a> {
    Digits(&'a str),
    Text(&'a str),
}

impl Run<'_> {
    fn compare(&self, other: &Run<'_>) -> Ordering {
        match (self, other) {
            (Run::Digits(a), Run::Digits(b)) => compare_numeric(a, b),
            (a, b) => a.as_str().cmp(b.as_str()),
        }
    }

    fn as_str(&self) -> &str {
        match self {
            Run::Digits(s) | Run::Text(s) => s,
        }
    }
}

/// Iterator over the alternating digit / non-digit runs of a string
struct Runs<'a> {
    rest: &'a str,
}

impl<'a> Iterator for Runs<'a> {
    type Item = Run<'a>;

    fn next(&mut self) -> Option<Run<'a>> {
        let first = self.rest.chars().next()?;
        let digits = first.is_ascii_digit();
        let end = self
            .rest
            .find(|c: char| c.is_ascii_digit() != digits)
            .unwrap_or(self.rest.len());
        let (run, rest) = self.rest.split_at(end);
        self.rest = rest;
        Some(if digits { Run::Digits(run) } else { Run::Text(run) })
    }
}

/// Compare two digit strings by value without parsing, so arbitrarily long
/// runs never overflow.
fn compare_numeric(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Compare two strings in natural order
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = Runs { rest: a };
    let mut right = Runs { rest: b };

    loop {
        match (left.next(), right.next()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => match x.compare(&y) {
                Ordering::Equal => continue,
                unequal => return unequal,
            },
        }
    }
}

/// Compare two paths in natural order using their lossy UTF-8 rendering.
/// Paths that render alike fall back to their raw bytes.
pub fn compare_paths(a: &Path, b: &Path) -> Ordering {
    natural_cmp(&a.to_string_lossy(), &b.to_string_lossy())
        .then_with(|| a.as_os_str().cmp(b.as_os_str()))
}
