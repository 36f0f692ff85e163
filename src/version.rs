//! # Version Strings and Ordering
//!
//! Recipe version lists mix several styles: bgfx uses semver-like
//! `1.128.8786`, bx and bimg use a bare revision number (`8980`), and older
//! entries sometimes use `cci.20230216` dates. This module compares such
//! strings, detects which order an existing list is kept in, and builds the
//! version strings this tool records.
//!
//! ## Comparison
//!
//! When both strings are valid semantic versions they are compared with the
//! `semver` crate. Otherwise they are split on `.`, `-`, `_` and `+` and the
//! segments are compared pairwise: numeric segments numerically, numeric
//! segments before alphabetic ones, alphabetic ones lexically. A string that
//! is a prefix of another sorts first.
//!
//! ## Insertion
//!
//! A new version is only placed by comparison when it has the same style as
//! every listed version (all starting with a number, or all with a word such
//! as `cci`). Otherwise it goes first, where conan-center-index keeps the
//! newest release.

use std::cmp::Ordering;

use regex::Regex;
use semver::Version;

/// Compare two version strings.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    if let (Ok(va), Ok(vb)) = (Version::parse(a), Version::parse(b)) {
        return va.cmp(&vb);
    }

    let mut left = segments(a);
    let mut right = segments(b);
    loop {
        match (left.next(), right.next()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ord = compare_segment(x, y);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

fn segments(version: &str) -> impl Iterator<Item = &str> {
    version
        .split(['.', '-', '_', '+'])
        .filter(|segment| !segment.is_empty())
}

fn compare_segment(x: &str, y: &str) -> Ordering {
    match (x.parse::<u64>(), y.parse::<u64>()) {
        (Ok(nx), Ok(ny)) => nx.cmp(&ny),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => x.cmp(y),
    }
}

fn starts_with_number(version: &str) -> bool {
    segments(version)
        .next()
        .is_some_and(|segment| segment.parse::<u64>().is_ok())
}

/// The ordering convention of an existing version list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListOrder {
    /// Oldest first.
    Ascending,
    /// Newest first (the conan-center-index convention).
    Descending,
    /// No consistent order, or too few entries to tell.
    Unsorted,
}

/// Detect how `versions` are ordered.
pub fn detect_order<S: AsRef<str>>(versions: &[S]) -> ListOrder {
    if versions.len() < 2 {
        return ListOrder::Unsorted;
    }

    let pairs = versions.windows(2).map(|w| compare_versions(w[0].as_ref(), w[1].as_ref()));
    let (mut ascending, mut descending) = (true, true);
    for ord in pairs {
        match ord {
            Ordering::Less => descending = false,
            Ordering::Greater => ascending = false,
            Ordering::Equal => {}
        }
    }

    match (ascending, descending) {
        (true, false) => ListOrder::Ascending,
        (false, true) => ListOrder::Descending,
        _ => ListOrder::Unsorted,
    }
}

/// Index at which `new_version` belongs in `versions`.
///
/// Sorted lists keep their order. Unsorted lists, and lists holding a
/// different style of version than `new_version`, get it at the front.
pub fn insertion_index<S: AsRef<str>>(versions: &[S], new_version: &str) -> usize {
    let numeric = starts_with_number(new_version);
    if versions.iter().any(|v| starts_with_number(v.as_ref()) != numeric) {
        return 0;
    }

    let position = |wanted: Ordering| {
        versions
            .iter()
            .position(|v| compare_versions(new_version, v.as_ref()) == wanted)
            .unwrap_or(versions.len())
    };

    match detect_order(versions) {
        ListOrder::Descending => position(Ordering::Greater),
        ListOrder::Ascending => position(Ordering::Less),
        ListOrder::Unsorted => 0,
    }
}

/// Turn a release tag into a version string (`v1.2.3` becomes `1.2.3`).
pub fn version_from_tag(tag: &str) -> String {
    match tag.strip_prefix('v') {
        Some(rest) if rest.starts_with(|c: char| c.is_ascii_digit()) => rest.to_string(),
        _ => tag.to_string(),
    }
}

/// Read the numeric value of `define` from a C header.
///
/// Accepts both `#define NAME 128` and `#define NAME UINT32_C(128)`.
pub fn parse_api_version(header: &str, define: &str) -> Option<u64> {
    let pattern = format!(
        r"(?m)^\s*#\s*define\s+{}\s+(?:UINT32_C\s*\(\s*)?(\d+)",
        regex::escape(define)
    );
    let re = Regex::new(&pattern).ok()?;
    re.captures(header)?.get(1)?.as_str().parse().ok()
}

/// Version string of an untagged primary revision: `1.<api>.<revision count>`.
pub fn api_revision_version(api_version: u64, revision_count: u64) -> String {
    format!("1.{}.{}", api_version, revision_count)
}
