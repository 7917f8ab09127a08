//! Field-level helpers for `^`-separated payloads.

/// Parse a feed integer, saturating every failure to 0.
///
/// Accepts trimmed input made only of ASCII digits and `-`. Empty input,
/// anything else (including a leading `+`), unparsable sequences such as
/// `1-2`, and values outside the `i32` range all yield 0.
pub fn safe_int(raw: &str) -> i64 {
    let s = raw.trim();
    if !s.bytes().any(|b| b.is_ascii_digit()) {
        return 0;
    }
    if !s.bytes().all(|b| b.is_ascii_digit() || b == b'-') {
        return 0;
    }

    match s.parse::<i64>() {
        Ok(n) if (i64::from(i32::MIN)..=i64::from(i32::MAX)).contains(&n) => n,
        _ => 0,
    }
}

/// Render a KIS `HHMMSS` time as `HH:MM:SS`.
///
/// Only the first six characters are used; shorter input is returned as is.
pub fn format_time(raw: &str) -> String {
    let chars: Vec<char> = raw.chars().take(6).collect();
    if chars.len() < 6 {
        return raw.to_string();
    }

    let part = |range: std::ops::Range<usize>| chars[range].iter().collect::<String>();
    format!("{}:{}:{}", part(0..2), part(2..4), part(4..6))
}

/// Field at `idx`, or empty when the payload is shorter.
pub(crate) fn field<'a>(fields: &[&'a str], idx: usize) -> &'a str {
    fields.get(idx).copied().unwrap_or("")
}

/// Parse `N` consecutive fields starting at `start`.
pub(crate) fn int_array<const N: usize>(fields: &[&str], start: usize) -> [i64; N] {
    std::array::from_fn(|i| safe_int(field(fields, start + i)))
}
