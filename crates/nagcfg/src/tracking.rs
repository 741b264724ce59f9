//! change detection and pending edits
use crate::object::ObjectDefinition;
use crate::rewrite::FieldEdit;
use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Modification times of a set of files at one point in time
///
/// A file that cannot be inspected is recorded as `None`, so a file appearing
/// or disappearing later counts as a change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Timestamps {
    files: IndexMap<PathBuf, Option<SystemTime>>,
}

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

impl Timestamps {
    pub fn snapshot(paths: impl IntoIterator<Item = PathBuf>) -> Self {
        let files = paths
            .into_iter()
            .map(|path| {
                let time = modified(&path);
                (path, time)
            })
            .collect();
        Self { files }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn get(&self, path: &Path) -> Option<Option<SystemTime>> {
        self.files.get(path).copied()
    }

    /// Files whose modification time differs from the snapshot
    pub fn changed_files(&self) -> Vec<&Path> {
        self.files
            .iter()
            .filter(|(path, time)| modified(path) != **time)
            .map(|(path, _)| path.as_path())
            .collect()
    }

    pub fn changed(&self) -> bool {
        self.files.iter().any(|(path, time)| modified(path) != *time)
    }
}

/// Field edits of one definition, written to disk together
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Changeset {
    pub object: ObjectDefinition,
    pub edits: Vec<FieldEdit>,
}

impl Changeset {
    /// Start a changeset for `object` as it is currently stored
    pub fn new(object: &ObjectDefinition) -> Self {
        Self {
            object: object.clone(),
            edits: Vec::new(),
        }
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.edits.push(FieldEdit::set(field, value));
        self
    }

    pub fn remove(mut self, field: impl Into<String>) -> Self {
        self.edits.push(FieldEdit::remove(field));
        self
    }

    pub fn rename(mut self, field: impl Into<String>, new_name: impl Into<String>) -> Self {
        self.edits.push(FieldEdit::rename(field, new_name));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    /// Human readable summary, used as hook message
    pub fn describe(&self) -> String {
        let fields: Vec<&str> = self.edits.iter().map(FieldEdit::field).collect();
        let name = describe_object(&self.object);
        format!("{name}: changed {}", fields.join(", "))
    }
}

/// `<type> <identifying value>`, for log and hook messages
pub(crate) fn describe_object(object: &ObjectDefinition) -> String {
    let identity = crate::store::default_key(object.object_type())
        .and_then(|key| object.get(key))
        .or_else(|| object.name())
        .or_else(|| object.get("service_description"));
    match identity {
        Some(identity) => format!("{} {identity}", object.object_type()),
        None => object.object_type().to_string(),
    }
}
