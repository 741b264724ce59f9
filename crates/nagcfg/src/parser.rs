//! object definitions from text
//!
//! [DefinitionReader] walks the [logical lines](crate::lexer) of one file and yields
//! each `define <type> { ... }` block as an [ObjectDefinition] as soon as its closing
//! `}` is seen. Problems are yielded inline as [Issue]s and never end the stream: a
//! `define` inside an open definition implicitly closes the open one, stray lines
//! outside of definitions are reported and skipped.
use crate::issue::{Issue, Issues};
use crate::lexer::{LogicalLine, LogicalLines};
use crate::object::ObjectDefinition;
use crate::util::{split_key_value, strip_inline_comment};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Object types the monitoring daemon knows about
pub const KNOWN_OBJECT_TYPES: &[&str] = &[
    "host",
    "hostgroup",
    "service",
    "servicegroup",
    "contact",
    "contactgroup",
    "timeperiod",
    "command",
    "hostdependency",
    "servicedependency",
    "hostescalation",
    "serviceescalation",
    "hostextinfo",
    "serviceextinfo",
];

fn define_regex() -> &'static regex::Regex {
    static DEFINE: OnceLock<regex::Regex> = OnceLock::new();
    DEFINE.get_or_init(|| {
        regex::Regex::new(r"^define\s+(\w+)\s*\{?(.*)$").expect("define pattern must compile")
    })
}

/// Normalize an attribute key the way the parser stores it
///
/// Services accept the legacy `description` for `service_description`.
pub(crate) fn normalize_key<'a>(object_type: &str, key: &'a str) -> &'a str {
    if object_type == "service" && key == "description" {
        "service_description"
    } else {
        key
    }
}

/// Split an attribute line (inline comment already removed) into key and value
///
/// Timeperiod schedule lines such as `monday 09:00-17:00` are kept whole as the key
/// with an empty value.
pub(crate) fn attribute_of<'a>(object_type: &str, content: &'a str) -> (&'a str, &'a str) {
    let content = content.trim();
    let (key, value) = split_key_value(content);
    let key = normalize_key(object_type, key);

    if object_type == "timeperiod" && key != "timeperiod_name" && key != "alias" {
        return (content, "");
    }

    (key, value)
}

/// Position of the `}` closing a definition in `content`, if any
///
/// Only a brace at the very start or the very end of the (comment free) content
/// counts, so braces inside values are left alone.
fn closing_brace(content: &str) -> Option<usize> {
    let trimmed = content.trim_start();
    if trimmed.starts_with('}') {
        return Some(content.len() - trimmed.len());
    }

    let trimmed = content.trim_end();
    if trimmed.ends_with('}') {
        return Some(trimmed.len() - 1);
    }

    None
}

/// Lazy reader of the definitions in one text
///
/// Can only be used once, create a new reader to parse the text again.
#[derive(Debug)]
pub struct DefinitionReader<'a> {
    lines: LogicalLines<'a>,
    physical: Vec<&'a str>,
    source_file: PathBuf,
    /// Unconsumed rest of a line, read before the next logical line
    pending: Option<LogicalLine>,
    current: Option<ObjectDefinition>,
    queued: VecDeque<Result<ObjectDefinition, Issue>>,
    finished: bool,
}

impl<'a> DefinitionReader<'a> {
    pub fn new(text: &'a str, source_file: impl Into<PathBuf>) -> Self {
        Self {
            lines: LogicalLines::new(text),
            physical: text.lines().collect(),
            source_file: source_file.into(),
            pending: None,
            current: None,
            queued: VecDeque::new(),
            finished: false,
        }
    }

    fn raw_text(&self, line_start: usize, line_end: usize) -> String {
        let start = line_start.saturating_sub(1).min(self.physical.len());
        let end = line_end.min(self.physical.len()).max(start);
        self.physical[start..end].join("\n")
    }

    fn close(&mut self, mut object: ObjectDefinition, line_end: usize) {
        object.meta.line_end = line_end.max(object.meta.line_start);
        object.meta.raw_text = self.raw_text(object.meta.line_start, object.meta.line_end);
        self.queued.push_back(Ok(object));
    }

    fn handle(&mut self, line: LogicalLine) {
        if line.is_ignorable() {
            return;
        }
        let text = line.text.trim();

        if let Some(captures) = define_regex().captures(text) {
            if let Some(open) = self.current.take() {
                self.queued.push_back(Err(Issue::UnexpectedDefine {
                    file: self.source_file.clone(),
                    line: line.first,
                }));
                self.close(open, line.first.saturating_sub(1));
            }

            let object_type = &captures[1];
            if !KNOWN_OBJECT_TYPES.contains(&object_type) {
                self.queued.push_back(Err(Issue::UnknownObjectType {
                    file: self.source_file.clone(),
                    line: line.first,
                    object_type: object_type.to_string(),
                }));
            }

            let mut object = ObjectDefinition::new(object_type, self.source_file.clone());
            object.meta.line_start = line.first;
            self.current = Some(object);

            let rest = captures[2].trim();
            if !rest.is_empty() {
                self.pending = Some(LogicalLine {
                    first: line.last,
                    last: line.last,
                    text: rest.to_string(),
                });
            }
            return;
        }

        let content = strip_inline_comment(text);

        let Some(object) = self.current.as_mut() else {
            let issue = if content.trim_start().starts_with('}') {
                Issue::UnexpectedClose {
                    file: self.source_file.clone(),
                    line: line.first,
                }
            } else {
                Issue::UnexpectedToken {
                    file: self.source_file.clone(),
                    line: line.first,
                    token: text.to_string(),
                }
            };
            self.queued.push_back(Err(issue));
            return;
        };

        let Some(brace) = closing_brace(content) else {
            add_attribute(object, content);
            return;
        };

        add_attribute(object, &content[..brace]);
        let rest = text[brace + 1..].trim();
        if !rest.is_empty() {
            self.pending = Some(LogicalLine {
                first: line.last,
                last: line.last,
                text: rest.to_string(),
            });
        }

        if let Some(object) = self.current.take() {
            self.close(object, line.last);
        }
    }
}

fn add_attribute(object: &mut ObjectDefinition, content: &str) {
    if content.trim().is_empty() {
        return;
    }

    let (key, value) = attribute_of(object.object_type(), content);
    object.set(key, value);
}

impl Iterator for DefinitionReader<'_> {
    type Item = Result<ObjectDefinition, Issue>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.queued.pop_front() {
                return Some(item);
            }

            if self.finished {
                return None;
            }

            match self.pending.take().or_else(|| self.lines.next()) {
                Some(line) => self.handle(line),
                None => {
                    self.finished = true;
                    if let Some(open) = self.current.take() {
                        return Some(Err(Issue::UnexpectedEof {
                            file: self.source_file.clone(),
                            line: open.meta.line_start,
                        }));
                    }
                }
            }
        }
    }
}

/// All definitions and issues of one file
#[derive(Debug, Default)]
pub struct ParsedFile {
    pub objects: Vec<ObjectDefinition>,
    pub issues: Issues,
}

impl ParsedFile {
    /// The definitions, panicking if the text had any issue
    ///
    /// Intended for tests and fixtures.
    pub fn into_clean_objects(self) -> Vec<ObjectDefinition> {
        assert!(self.issues.is_empty(), "text must parse cleanly: {}", self.issues);
        self.objects
    }
}

/// Parse a whole text eagerly
pub fn parse_str(text: &str, source_file: impl Into<PathBuf>) -> ParsedFile {
    let mut parsed = ParsedFile::default();
    for item in DefinitionReader::new(text, source_file) {
        match item {
            Ok(object) => parsed.objects.push(object),
            Err(issue) => parsed.issues.log(issue),
        }
    }
    parsed
}

/// Read and parse one object file
pub fn parse_file(path: &Path) -> std::io::Result<ParsedFile> {
    tracing::info!(path=%path.display(), "loading file");
    let text = std::fs::read_to_string(path)?;
    Ok(parse_str(&text, path))
}

/// Utility macro to create a list of [ObjectDefinition]s
///
/// From a single text
/// ```
/// # use nagcfg::objects;
/// let objects = objects!("define host {\n host_name web01\n}");
/// assert_eq!(objects.len(), 1);
/// ```
///
/// From multiple texts (source file required)
/// ```
/// # use nagcfg::objects;
/// let objects = objects! {
///   "hosts.cfg" => "define host {\n host_name web01\n}",
///   "commands.cfg" => "define command {\n command_name check_ping\n}"
/// };
/// assert_eq!(objects[1].source_file().to_str(), Some("commands.cfg"));
/// ```
///
/// # Panic
/// Panics on text with parse issues
///
/// ```should_panic
/// # use nagcfg::objects;
/// objects!("define host {\n host_name web01\n");
/// ```
#[macro_export]
macro_rules! objects {
    // single text without source
    { $text:expr } => {
        $crate::parser::parse_str($text, "<string>").into_clean_objects()
    };
    // multiple texts with sources
    { $($source:expr => $text:expr),+ } => {{
        let mut objects = Vec::new();
        $(
            objects.extend($crate::parser::parse_str($text, $source).into_clean_objects());
        )+

        objects
    }};
}
