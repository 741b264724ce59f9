//! problems found while parsing and resolving
//!
//! None of these stop a multi-file parse. They are collected in [Issues] and can be
//! inspected once parsing is done.
use std::path::PathBuf;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Issue {
    #[error("{}:{line}: unexpected 'define', expected '}}'", .file.display())]
    UnexpectedDefine { file: PathBuf, line: usize },

    #[error("{}:{line}: unexpected end of file inside definition", .file.display())]
    UnexpectedEof { file: PathBuf, line: usize },

    #[error("{}:{line}: unexpected '}}' outside of a definition", .file.display())]
    UnexpectedClose { file: PathBuf, line: usize },

    #[error("{}:{line}: unexpected token {token:?} outside of a definition", .file.display())]
    UnexpectedToken {
        file: PathBuf,
        line: usize,
        token: String,
    },

    #[error("{}:{line}: unknown object type {object_type:?}", .file.display())]
    UnknownObjectType {
        file: PathBuf,
        line: usize,
        object_type: String,
    },

    #[error("{}:{line_start}-{line_end}: {object_type} uses missing template {parent:?}", .file.display())]
    MissingParent {
        file: PathBuf,
        line_start: usize,
        line_end: usize,
        object_type: String,
        parent: String,
    },

    #[error("{}:{line_start}-{line_end}: {object_type} template {parent:?} is part of a use cycle", .file.display())]
    UseCycle {
        file: PathBuf,
        line_start: usize,
        line_end: usize,
        object_type: String,
        parent: String,
    },
}

/// Ordered collection of [Issue]s
#[derive(derive_new::new, Debug, Default, Clone)]
pub struct Issues {
    #[new(default)]
    issues: Vec<Issue>,
}

impl Issues {
    pub fn log(&mut self, issue: Issue) {
        tracing::trace!(?issue, "issue found");
        self.issues.push(issue);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Issue> {
        self.issues.iter()
    }

    pub fn as_slice(&self) -> &[Issue] {
        &self.issues
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }
}

impl IntoIterator for Issues {
    type Item = Issue;
    type IntoIter = std::vec::IntoIter<Issue>;

    fn into_iter(self) -> Self::IntoIter {
        self.issues.into_iter()
    }
}

impl std::error::Error for Issues {}

impl std::fmt::Display for Issues {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.issues.as_slice() {
            [] => f.write_str("no issues"),
            [issue] => issue.fmt(f),
            [issue, rest @ ..] => write!(f, "{issue} (and {} more)", rest.len()),
        }
    }
}
