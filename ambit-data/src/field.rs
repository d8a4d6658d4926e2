/// Returns `true` if `field` is safe to splice into a query as an identifier.
///
/// Accepted: ASCII letters, digits and `_`, with single `.` separators
/// between segments (`table.column`). Rejected: the empty string, leading,
/// trailing or consecutive dots, whitespace, any other punctuation, control
/// characters and every non-ASCII code point.
///
/// Identifiers cannot be bound as parameters, so this allow-list is the only
/// injection guard for dynamic column names. Callers must reject input that
/// fails it rather than trying to clean it up.
pub fn is_valid_field_name(field: &str) -> bool {
    if field.is_empty() {
        return false;
    }
    let mut prev_dot = false;
    for (i, b) in field.bytes().enumerate() {
        if b == b'.' {
            if i == 0 || prev_dot {
                return false;
            }
            prev_dot = true;
            continue;
        }
        prev_dot = false;
        if !(b.is_ascii_alphanumeric() || b == b'_') {
            return false;
        }
    }
    !prev_dot
}
