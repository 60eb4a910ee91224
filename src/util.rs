//! Utility functions shared by the entity mappers and the data manager.
//!
//! Numeric columns in the inventory CSVs are typed by hand and frequently hold
//! stray units, blanks or free text. The parsers here never fail: anything that
//! is not a number becomes zero.

/// Parse an integer column leniently.
///
/// Leading whitespace and a leading run of digits are honoured (`"12 vials"`
/// parses as 12); anything without a leading digit yields 0.
///
/// # Example
///
/// ```
/// use lab_inventory::util::parse_int;
///
/// assert_eq!(parse_int("42"), 42);
/// assert_eq!(parse_int(" 7 tubes"), 7);
/// assert_eq!(parse_int("n/a"), 0);
/// ```
#[must_use]
pub fn parse_int(value: &str) -> i64 {
    let trimmed = value.trim();
    let (negative, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    match digits[..end].parse::<i64>() {
        Ok(n) if negative => -n,
        Ok(n) => n,
        Err(_) => 0,
    }
}

/// Parse an identifier column. Negative or non-numeric values yield 0,
/// which is never a valid id.
#[must_use]
pub fn parse_id(value: &str) -> u64 {
    u64::try_from(parse_int(value)).unwrap_or(0)
}

/// Parse a currency or measurement column leniently.
///
/// The longest numeric prefix is used (`"12.50 EUR"` parses as 12.5); values
/// with no numeric prefix, and non-finite results, yield 0.0.
#[must_use]
pub fn parse_float(value: &str) -> f64 {
    let trimmed = value.trim();
    let mut end = 0;
    let mut seen_dot = false;
    for (i, c) in trimmed.char_indices() {
        let ok = match c {
            '0'..='9' => true,
            '-' | '+' => i == 0,
            '.' if !seen_dot => {
                seen_dot = true;
                true
            }
            _ => false,
        };
        if !ok {
            break;
        }
        end = i + c.len_utf8();
    }
    match trimmed[..end].parse::<f64>() {
        Ok(n) if n.is_finite() => n,
        _ => 0.0,
    }
}

/// Format a float for storage, without a trailing `.0` for whole numbers.
#[must_use]
pub fn format_float(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

/// Allocate the next id for a table: `max(existing) + 1`, or 1 when empty.
///
/// # Example
///
/// ```
/// use lab_inventory::util::next_id;
///
/// assert_eq!(next_id([1, 3, 7]), 8);
/// assert_eq!(next_id(std::iter::empty()), 1);
/// ```
#[must_use]
pub fn next_id(ids: impl IntoIterator<Item = u64>) -> u64 {
    ids.into_iter().max().unwrap_or(0) + 1
}

/// Shorten a version token for log output.
#[must_use]
pub fn short_sha(sha: &str) -> &str {
    sha.get(..7).unwrap_or(sha)
}
