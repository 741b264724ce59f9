//! small string helpers shared by the parser, the query layer and the rewriter

/// Cut an inline comment off a line
///
/// A `;` starts a comment unless it sits inside single or double quotes or is
/// escaped with a backslash. A quote without a partner later on the line, such as
/// the apostrophe in `Bob's`, is literal. The returned slice is not trimmed.
pub(crate) fn strip_inline_comment(line: &str) -> &str {
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (index, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }

        match (c, quote) {
            ('\\', _) => escaped = true,
            ('\'' | '"', None) if line[index + 1..].contains(c) => quote = Some(c),
            (c, Some(open)) if c == open => quote = None,
            (';', None) => return &line[..index],
            _ => {}
        }
    }

    line
}

/// Split a line into its first whitespace-delimited token and the trimmed remainder
pub(crate) fn split_key_value(content: &str) -> (&str, &str) {
    let content = content.trim();
    match content.split_once(char::is_whitespace) {
        Some((key, value)) => (key, value.trim()),
        None => (content, ""),
    }
}

/// Iterate the members of a comma separated attribute value
///
/// A leading `+` (additive inheritance marker) is dropped, members are trimmed
/// and empty members skipped.
pub(crate) fn split_list(value: &str) -> impl Iterator<Item = &str> {
    let value = value.trim();
    value
        .strip_prefix('+')
        .unwrap_or(value)
        .split(',')
        .map(str::trim)
        .filter(|member| !member.is_empty())
}

/// Compare two attribute values the way definitions are matched on disk
///
/// Numbers are compared as floats truncated to integers so `30` and `30.000`
/// count as the same value.
pub(crate) fn values_equivalent(left: &str, right: &str) -> bool {
    let (left, right) = (left.trim(), right.trim());
    if left == right {
        return true;
    }

    match (left.parse::<f64>(), right.parse::<f64>()) {
        (Ok(l), Ok(r)) if l.is_finite() && r.is_finite() => l.trunc() as i64 == r.trunc() as i64,
        _ => false,
    }
}
