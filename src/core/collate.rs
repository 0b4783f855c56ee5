// Subscript collation: canonical numbers first (numeric order), then strings by byte value.
use std::cmp::Ordering;

/// Decimal parts of a canonical number; the integer part is never empty.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct Canonical<'a> {
    negative: bool,
    int: &'a str,
    frac: &'a str,
}

/// True when `sub` is a canonical MUMPS number (`7`, `-3`, `.5`, `120.51`).
///
/// Leading zeros, trailing fractional zeros, `-0`, a bare `.` and `0.5`
/// (canonical form is `.5`) are all strings, not numbers.
pub fn is_canonical_number(sub: &str) -> bool {
    parse_canonical(sub).is_some()
}

fn parse_canonical(sub: &str) -> Option<Canonical<'_>> {
    let (negative, body) = match sub.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, sub),
    };
    if body.is_empty() {
        return None;
    }
    let (int, frac) = match body.split_once('.') {
        Some((int, frac)) => {
            if frac.is_empty() || frac.ends_with('0') {
                return None;
            }
            (int, frac)
        }
        None => (body, ""),
    };
    if !int.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if int.starts_with('0') && (int.len() > 1 || !frac.is_empty() || negative) {
        return None;
    }
    let int = if int.is_empty() { "0" } else { int };
    Some(Canonical {
        negative,
        int,
        frac,
    })
}

fn compare_magnitude(a: &Canonical<'_>, b: &Canonical<'_>) -> Ordering {
    a.int
        .len()
        .cmp(&b.int.len())
        .then_with(|| a.int.cmp(b.int))
        .then_with(|| a.frac.cmp(b.frac))
}

fn compare_numbers(a: &Canonical<'_>, b: &Canonical<'_>) -> Ordering {
    match (a.negative, b.negative) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => compare_magnitude(a, b),
        (true, true) => compare_magnitude(b, a),
    }
}

/// Total order over subscripts used by every listing and paging operation.
pub fn compare(a: &str, b: &str) -> Ordering {
    match (parse_canonical(a), parse_canonical(b)) {
        (Some(x), Some(y)) => compare_numbers(&x, &y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.as_bytes().cmp(b.as_bytes()),
    }
}

/// Owned subscript ordered by [`compare`], usable as an ordered-map key.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct Collated(pub String);

impl Collated {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Ord for Collated {
    fn cmp(&self, other: &Self) -> Ordering {
        compare(&self.0, &other.0)
    }
}

impl PartialOrd for Collated {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<&str> for Collated {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}
