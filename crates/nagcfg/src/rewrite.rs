//! non-destructive edits of object files
//!
//! An edit never trusts line numbers kept in memory. The target file is parsed again
//! and the definition whose defined attributes equal the caller's is located. Only
//! the lines of that definition are touched, every other byte of the file is kept.
//!
//! All writes go through [write_file], which serializes them on a process wide
//! re-entrant lock.
use crate::object::{format_attribute, ObjectDefinition};
use crate::parser::{attribute_of, normalize_key, parse_str};
use crate::util::{split_key_value, strip_inline_comment, values_equivalent};
use parking_lot::ReentrantMutex;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Start of the comment line written above edited definitions
pub const BANNER_PREFIX: &str = "# Edited by ";

static WRITE_LOCK: ReentrantMutex<()> = parking_lot::const_reentrant_mutex(());

#[derive(thiserror::Error, Debug)]
pub enum RewriteError {
    #[error("{object_type} definition not found in {}", .file.display())]
    NotFound { file: PathBuf, object_type: String },
    #[error("Attribute {field:?} not found in {}", .file.display())]
    FieldNotFound { file: PathBuf, field: String },
    #[error("New value for {field:?} contains a line break")]
    LineBreak { field: String },
    #[error("Attribute {key:?} with value {value:?} would not read back unchanged")]
    Unreadable { key: String, value: String },
    #[error("IO error on {}", .file.display())]
    Io {
        file: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One change to a single attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldEdit {
    /// Replace the attribute's line, or add one if it has none
    Set { field: String, value: String },
    /// Drop the attribute's line
    Remove { field: String },
    /// Change the key, keep the value
    Rename { field: String, new_name: String },
}

impl FieldEdit {
    pub fn set(field: impl Into<String>, value: impl Into<String>) -> Self {
        FieldEdit::Set {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn remove(field: impl Into<String>) -> Self {
        FieldEdit::Remove {
            field: field.into(),
        }
    }

    pub fn rename(field: impl Into<String>, new_name: impl Into<String>) -> Self {
        FieldEdit::Rename {
            field: field.into(),
            new_name: new_name.into(),
        }
    }

    pub fn field(&self) -> &str {
        match self {
            FieldEdit::Set { field, .. }
            | FieldEdit::Remove { field }
            | FieldEdit::Rename { field, .. } => field,
        }
    }

    /// Reject text that would break the line oriented format
    fn validate(&self) -> Result<(), RewriteError> {
        let new_text = match self {
            FieldEdit::Set { value, .. } => value,
            FieldEdit::Rename { new_name, .. } => new_name,
            FieldEdit::Remove { .. } => return Ok(()),
        };
        if new_text.contains(['\n', '\r']) {
            return Err(RewriteError::LineBreak {
                field: self.field().to_string(),
            });
        }
        Ok(())
    }

    /// Apply to the in-memory copy of a definition, keyed the way the parser keys it
    pub fn apply_to(&self, object: &mut ObjectDefinition) {
        let object_type = object.object_type().to_string();
        match self {
            FieldEdit::Set { field, value } => {
                let existing = stored_keys(object, field).pop();
                let (key, value) = stored_attribute(&object_type, field, value);
                match existing {
                    Some(existing) if existing != key => {
                        object.rename(&existing, key.clone());
                        object.set(key, value);
                    }
                    _ => object.set(key, value),
                }
            }
            FieldEdit::Remove { field } => {
                for key in stored_keys(object, field) {
                    object.remove(&key);
                }
            }
            FieldEdit::Rename { field, new_name } => {
                for key in stored_keys(object, field) {
                    let value = match object.defined_attributes.get(&key) {
                        Some(value) if key == normalize_key(&object_type, field) => value.clone(),
                        _ => split_key_value(&key).1.to_string(),
                    };
                    let (new_key, new_value) = stored_attribute(&object_type, new_name, &value);
                    object.rename(&key, new_key.clone());
                    object.set(new_key, new_value);
                }
            }
        }
    }
}

/// Key and value the parser would store for `field value`
fn stored_attribute(object_type: &str, field: &str, value: &str) -> (String, String) {
    let line = format!("{field} {value}");
    let (key, value) = attribute_of(object_type, &line);
    (key.to_string(), value.to_string())
}

/// Reject an attribute the parser would not read back as `key` and `value`
///
/// Catches values ending in `}`, unescaped `;` comments, trailing continuation
/// backslashes and keys the parser would split differently.
fn check_readable(object_type: &str, key: &str, value: &str) -> Result<(), RewriteError> {
    if key.contains(['\n', '\r']) || value.contains(['\n', '\r']) {
        return Err(RewriteError::LineBreak {
            field: key.to_string(),
        });
    }

    let text = format!("define {object_type} {{\n{}\n}}\n", format_attribute(key, value));
    let parsed = parse_str(&text, "<attribute>");
    let read_back = match parsed.objects.as_slice() {
        [object] if object.defined_attributes.len() == 1 => object.defined_attributes.get_index(0),
        _ => None,
    };
    match read_back {
        Some((read_key, read_value)) if read_key == key && read_value == value => Ok(()),
        _ => Err(RewriteError::Unreadable {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

/// Check every defined attribute of `object` before it is written out whole
fn check_object(object: &ObjectDefinition) -> Result<(), RewriteError> {
    object
        .defined_attributes
        .iter()
        .try_for_each(|(key, value)| check_readable(object.object_type(), key, value))
}

/// Whether a stored attribute key is the one an edit of `field` refers to
///
/// Timeperiod schedule lines are keyed by their whole text, they match on the first
/// token.
fn key_matches(object_type: &str, key: &str, field: &str) -> bool {
    key == normalize_key(object_type, field)
        || (object_type == "timeperiod" && split_key_value(key).0 == field)
}

/// Stored keys an edit of `field` refers to, in file order
fn stored_keys(object: &ObjectDefinition, field: &str) -> Vec<String> {
    object
        .defined_attributes
        .keys()
        .filter(|key| key_matches(object.object_type(), key, field))
        .cloned()
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Edit attributes in place, applied in order
    Fields(Vec<FieldEdit>),
    /// Replace the whole definition with literal text
    Rewrite(String),
    /// Drop the whole definition
    Delete,
}

impl Mutation {
    fn validate(&self) -> Result<(), RewriteError> {
        match self {
            Mutation::Fields(edits) => edits.iter().try_for_each(FieldEdit::validate),
            Mutation::Rewrite(_) | Mutation::Delete => Ok(()),
        }
    }
}

/// `# Edited by <tool> on <timestamp>` comment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Banner {
    pub tool: String,
    pub timestamp: String,
}

impl Banner {
    /// Banner stamped with the local time
    pub fn now(tool: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            timestamp: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }

    fn line(&self) -> String {
        format!("{BANNER_PREFIX}{} on {}", self.tool, self.timestamp)
    }
}

/// Whether two sets of defined attributes describe the same definition
///
/// Order does not matter and numbers compare as truncated integers.
pub fn attributes_equivalent(left: &ObjectDefinition, right: &ObjectDefinition) -> bool {
    left.object_type() == right.object_type()
        && left.defined_attributes.len() == right.defined_attributes.len()
        && left.defined_attributes.iter().all(|(key, value)| {
            right
                .defined_attributes
                .get(key)
                .is_some_and(|other| values_equivalent(value, other))
        })
}

/// Line span (1-based, inclusive) of `target` within `text`
pub fn locate(text: &str, file: &Path, target: &ObjectDefinition) -> Result<(usize, usize), RewriteError> {
    let parsed = parse_str(text, file);
    let candidates: Vec<&ObjectDefinition> = parsed
        .objects
        .iter()
        .filter(|candidate| attributes_equivalent(candidate, target))
        .collect();

    // identical duplicates: prefer the one at the remembered position
    let found = candidates
        .iter()
        .find(|candidate| candidate.meta.line_start == target.meta.line_start)
        .or_else(|| candidates.first());

    match found {
        Some(object) => Ok((object.meta.line_start, object.meta.line_end)),
        None => Err(RewriteError::NotFound {
            file: file.to_path_buf(),
            object_type: target.object_type().to_string(),
        }),
    }
}

/// Definition lines taken apart for editing
#[derive(Debug)]
struct Span {
    /// Text before `define` on the first line
    prefix: String,
    /// `define <type> {`
    header: String,
    /// Logical attribute lines, continuations joined
    body: Vec<String>,
    /// Indentation before the closing `}`
    closing_indent: String,
    /// Text after the closing `}`
    suffix: String,
}

impl Span {
    fn parse(lines: &[&str]) -> Span {
        let mut logical: Vec<String> = Vec::new();
        let mut joined = String::new();
        for line in lines {
            let line = line.trim_end_matches(['\n', '\r']);
            match crate::lexer::continued(line) {
                Some(head) => joined.push_str(head),
                None => {
                    joined.push_str(line);
                    logical.push(std::mem::take(&mut joined));
                }
            }
        }
        if !joined.is_empty() {
            logical.push(joined);
        }

        let first = logical.first().cloned().unwrap_or_default();
        let define_at = first.find("define").unwrap_or(0);
        let prefix = first[..define_at].to_string();
        let first = &first[define_at..];
        let (header, head_rest) = match first.find('{') {
            Some(brace) => (first[..=brace].to_string(), first[brace + 1..].to_string()),
            None => (first.to_string(), String::new()),
        };

        let mut body = Vec::new();
        let last = if logical.len() > 1 {
            if !head_rest.trim().is_empty() {
                body.push(head_rest);
            }
            body.extend(logical[1..logical.len() - 1].iter().cloned());
            logical[logical.len() - 1].clone()
        } else {
            head_rest
        };

        let (inner, closing_indent, suffix) = split_closing(&last);
        if !inner.trim().is_empty() {
            body.push(inner);
        }

        Span {
            prefix,
            header,
            body,
            closing_indent,
            suffix,
        }
    }

    fn render(&self) -> String {
        let mut text = String::new();
        text.push_str(&self.prefix);
        text.push_str(&self.header);
        text.push('\n');
        for line in &self.body {
            text.push_str(line);
            text.push('\n');
        }
        text.push_str(&self.closing_indent);
        text.push('}');
        text.push_str(&self.suffix);
        text
    }

    /// Indices of the body lines holding `field`
    ///
    /// An attribute may be written more than once, the parser keeps the last value.
    fn find(&self, object_type: &str, field: &str) -> Vec<usize> {
        let holds_field = |line: &String| {
            let content = strip_inline_comment(line).trim();
            if content.is_empty() || content.starts_with('#') || content.starts_with(';') {
                return false;
            }
            let (key, _) = attribute_of(object_type, content);
            key_matches(object_type, key, field)
        };
        (0..self.body.len())
            .filter(|index| holds_field(&self.body[*index]))
            .collect()
    }

    fn apply(&mut self, object_type: &str, edit: &FieldEdit, file: &Path) -> Result<(), RewriteError> {
        let found = self.find(object_type, edit.field());
        match edit {
            FieldEdit::Set { field, value } => {
                let (key, value) = stored_attribute(object_type, field, value);
                check_readable(object_type, &key, &value)?;
                let line = format_attribute(&key, &value);
                match found.last() {
                    Some(index) => self.body[*index] = line,
                    None => self.body.push(line),
                }
            }
            FieldEdit::Remove { .. } => {
                for index in found.into_iter().rev() {
                    self.body.remove(index);
                }
            }
            FieldEdit::Rename { field, new_name } => {
                if found.is_empty() {
                    return Err(RewriteError::FieldNotFound {
                        file: file.to_path_buf(),
                        field: field.clone(),
                    });
                }
                for index in found {
                    let content = strip_inline_comment(&self.body[index]).trim().to_string();
                    let (_, value) = split_key_value(&content);
                    let (key, value) = stored_attribute(object_type, new_name, value);
                    check_readable(object_type, &key, &value)?;
                    self.body[index] = format_attribute(&key, &value);
                }
            }
        }
        Ok(())
    }
}

/// Split the line holding the closing brace into (attribute text, indentation, rest)
fn split_closing(line: &str) -> (String, String, String) {
    let content = strip_inline_comment(line);
    let trimmed = content.trim_start();
    if trimmed.starts_with('}') {
        let indent = &line[..content.len() - trimmed.len()];
        let rest = &line[content.len() - trimmed.len() + 1..];
        return (String::new(), indent.to_string(), rest.to_string());
    }

    let trimmed = content.trim_end();
    if let Some(inner) = trimmed.strip_suffix('}') {
        return (inner.trim_end().to_string(), String::new(), line[trimmed.len()..].to_string());
    }

    (line.to_string(), String::new(), String::new())
}

/// Whether a suffix after `}` carries another definition rather than a comment
fn carries_content(suffix: &str) -> bool {
    let content = strip_inline_comment(suffix).trim();
    !content.is_empty()
}

/// Apply `mutation` to `target` within `text`, returning the new text
pub fn apply(
    text: &str,
    file: &Path,
    target: &ObjectDefinition,
    mutation: &Mutation,
    banner: Option<&Banner>,
) -> Result<String, RewriteError> {
    mutation.validate()?;
    let (line_start, line_end) = locate(text, file, target)?;

    let lines: Vec<&str> = text.split_inclusive('\n').collect();
    let before = &lines[..line_start - 1];
    let object_lines = &lines[line_start - 1..line_end.min(lines.len())];
    let after = &lines[line_end.min(lines.len())..];
    let terminated = object_lines.last().is_some_and(|line| line.ends_with('\n'));

    let mut span = Span::parse(object_lines);
    let mut replacement = match mutation {
        Mutation::Fields(edits) => {
            for edit in edits {
                span.apply(target.object_type(), edit, file)?;
            }
            span.render()
        }
        Mutation::Rewrite(new_text) => {
            let mut replacement = span.prefix.clone();
            replacement.push_str(new_text.trim_end_matches('\n'));
            if carries_content(&span.suffix) {
                replacement.push('\n');
                replacement.push_str(span.suffix.trim_start());
            }
            replacement
        }
        Mutation::Delete => {
            let mut replacement = String::new();
            if !span.prefix.trim().is_empty() {
                replacement.push_str(span.prefix.trim_end());
                replacement.push('\n');
            }
            if carries_content(&span.suffix) {
                replacement.push_str(span.suffix.trim_start());
            }
            replacement
        }
    };
    if terminated && !replacement.is_empty() {
        replacement.push('\n');
    }

    let mut before: Vec<&str> = before.to_vec();
    // an earlier banner is replaced, or dropped along with a deleted definition
    if (banner.is_some() || matches!(mutation, Mutation::Delete))
        && span.prefix.is_empty()
        && before
            .last()
            .is_some_and(|line| line.trim_start().starts_with(BANNER_PREFIX))
    {
        before.pop();
    }
    let banner_line = match (banner, mutation) {
        (Some(banner), Mutation::Fields(_) | Mutation::Rewrite(_)) if span.prefix.is_empty() => {
            Some(format!("{}\n", banner.line()))
        }
        _ => None,
    };

    let mut output = String::with_capacity(text.len() + replacement.len());
    output.extend(before);
    if let Some(banner_line) = banner_line {
        output.push_str(&banner_line);
    }
    output.push_str(&replacement);
    output.extend(after.iter().copied());
    Ok(output)
}

/// Write `contents` as the complete new content of `path`
pub fn write_file(path: &Path, contents: &str) -> std::io::Result<()> {
    let _guard = WRITE_LOCK.lock();
    tracing::info!(path=%path.display(), "writing file");

    let mut file = std::fs::File::create(path)?;
    file.write_all(contents.as_bytes())?;
    file.flush()
}

/// Read `file`, apply `mutation` to `target` and write the result back
pub fn edit_file(
    file: &Path,
    target: &ObjectDefinition,
    mutation: &Mutation,
    banner: Option<&Banner>,
) -> Result<(), RewriteError> {
    mutation.validate()?;
    let io = |source| RewriteError::Io {
        file: file.to_path_buf(),
        source,
    };

    let _guard = WRITE_LOCK.lock();
    let text = std::fs::read_to_string(file).map_err(io)?;
    let new_text = apply(&text, file, target, mutation, banner)?;
    write_file(file, &new_text).map_err(io)
}

/// Append `object` in canonical form to `file`, creating it if needed
///
/// Returns the line span the definition now occupies.
pub fn append_object(file: &Path, object: &ObjectDefinition) -> Result<(usize, usize), RewriteError> {
    check_object(object)?;
    let io = |source| RewriteError::Io {
        file: file.to_path_buf(),
        source,
    };

    let _guard = WRITE_LOCK.lock();
    let mut text = match std::fs::read_to_string(file) {
        Ok(text) => text,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(error) => return Err(io(error)),
    };
    if !text.is_empty() && !text.ends_with('\n') {
        text.push('\n');
    }
    if !text.is_empty() {
        text.push('\n');
    }

    let line_start = text.lines().count() + 1;
    let definition = object.to_string();
    let line_end = line_start + definition.lines().count() - 1;
    text.push_str(&definition);

    write_file(file, &text).map_err(io)?;
    Ok((line_start, line_end))
}
