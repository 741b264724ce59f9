//! physical lines to logical lines
//!
//! A physical line ending in a single backslash continues on the next line. The
//! backslash is dropped and the two lines are joined before anything else (comment
//! stripping included) looks at them.

/// One logical line and the physical lines it was assembled from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalLine {
    /// 1-based number of the first physical line
    pub first: usize,
    /// 1-based number of the last physical line
    pub last: usize,
    pub text: String,
}

impl LogicalLine {
    /// Blank lines and full-line `#`/`;` comments carry no content
    pub fn is_ignorable(&self) -> bool {
        let text = self.text.trim();
        text.is_empty() || text.starts_with('#') || text.starts_with(';')
    }
}

/// Iterator over the logical lines of a text
#[derive(Debug)]
pub struct LogicalLines<'a> {
    lines: std::iter::Enumerate<std::str::Lines<'a>>,
}

impl<'a> LogicalLines<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            lines: text.lines().enumerate(),
        }
    }
}

impl Iterator for LogicalLines<'_> {
    type Item = LogicalLine;

    fn next(&mut self) -> Option<Self::Item> {
        let mut text = String::new();
        let mut first = None;
        let mut last = 0;

        for (index, line) in self.lines.by_ref() {
            let number = index + 1;
            first.get_or_insert(number);
            last = number;

            match continued(line) {
                Some(head) => text.push_str(head),
                None => {
                    text.push_str(line);
                    return Some(LogicalLine {
                        first: first.unwrap_or(number),
                        last,
                        text,
                    });
                }
            }
        }

        // input ended in the middle of a continuation
        first.map(|first| LogicalLine { first, last, text })
    }
}

/// The part of `line` before its continuation backslash, if it has one
///
/// A doubled backslash is an escaped backslash and does not continue the line.
pub(crate) fn continued(line: &str) -> Option<&str> {
    let line = line.trim_end();
    let head = line.strip_suffix('\\')?;
    if head.ends_with('\\') {
        return None;
    }
    Some(head)
}
