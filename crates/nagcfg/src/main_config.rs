//! the main control file (`nagios.cfg`)
//!
//! A flat list of `key=value` lines. Keys repeat (`cfg_file`, `cfg_dir`) and keep their
//! order. The object files to load are discovered from `cfg_file` and `cfg_dir`.
use indexmap::IndexMap;
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};

/// Well known main config locations, in the order [guess_main_config] tries them
pub const CANDIDATE_PATHS: &[&str] = &[
    "/etc/nagios/nagios.cfg",
    "/etc/nagios3/nagios.cfg",
    "/etc/nagios4/nagios.cfg",
    "/usr/local/nagios/etc/nagios.cfg",
    "/etc/icinga/icinga.cfg",
    "/usr/local/icinga/etc/icinga.cfg",
    "/etc/naemon/naemon.cfg",
    "/opt/nagios/etc/nagios.cfg",
];

/// Keys naming files whose timestamps are tracked next to the object files
pub const TRACKED_KEYS: &[&str] = &["resource_file", "lock_file", "object_cache_file"];

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("Main configuration {} not found", .0.display())]
    NotFound(PathBuf),
    #[error("No main configuration found in any of the default locations")]
    NoneFound,
    #[error("IO error")]
    IoError(#[from] std::io::Error),
}

/// Try [CANDIDATE_PATHS] and return the first one that exists
pub fn guess_main_config() -> Result<PathBuf, LoadError> {
    CANDIDATE_PATHS
        .iter()
        .map(PathBuf::from)
        .find(|path| path.is_file())
        .ok_or(LoadError::NoneFound)
}

/// Parse `key=value` lines, skipping blanks and comments
fn parse_pairs(text: &str) -> Vec<(String, String)> {
    text.lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                return None;
            }
            let Some((key, value)) = line.split_once('=') else {
                tracing::debug!(line, "ignoring line without '='");
                return None;
            };
            Some((key.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

/// Key of a `key=value` line that is not a comment
fn line_key(line: &str) -> Option<&str> {
    let line = line.trim();
    if line.starts_with('#') || line.starts_with(';') {
        return None;
    }
    line.split_once('=').map(|(key, _)| key.trim())
}

#[derive(Debug, Clone, Default)]
pub struct MainConfig {
    path: PathBuf,
    pairs: Vec<(String, String)>,
}

impl MainConfig {
    /// Read the main config at `path`
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        if !path.is_file() {
            return Err(LoadError::NotFound(path.to_path_buf()));
        }
        let path = path.canonicalize()?;
        tracing::info!(path=%path.display(), "loading main configuration");

        let text = std::fs::read_to_string(&path)?;
        Ok(Self::parse(&text, path))
    }

    /// Build from text. Relative paths in the text resolve against `path`'s directory.
    pub fn parse(text: &str, path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            pairs: parse_pairs(text),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    /// First value of `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// All values of `key`, in file order
    pub fn get_list(&self, key: &str) -> Vec<&str> {
        self.pairs
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn base_dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    /// Absolute form of a path value, relative ones resolve against [MainConfig::base_dir]
    pub fn resolve_path(&self, value: &str) -> PathBuf {
        let path = Path::new(value);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir().join(path)
        }
    }

    /// Object files named by `cfg_file` and found under `cfg_dir`, without duplicates
    ///
    /// `cfg_file` entries are included if they exist. `cfg_dir` entries are walked
    /// breadth first for `*.cfg` files, which are included whether or not they can be
    /// read right now. Missing directories contribute nothing.
    pub fn cfg_files(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        let mut seen = HashSet::new();

        for (key, value) in &self.pairs {
            match key.as_str() {
                "cfg_file" => {
                    let path = self.resolve_path(value);
                    if !path.exists() {
                        tracing::debug!(path=%path.display(), "skipping missing cfg_file");
                        continue;
                    }
                    if seen.insert(path.clone()) {
                        files.push(path);
                    }
                }
                "cfg_dir" => {
                    for path in walk_cfg_dir(&self.resolve_path(value)) {
                        if seen.insert(path.clone()) {
                            files.push(path);
                        }
                    }
                }
                _ => {}
            }
        }

        files
    }

    /// The main config itself plus resource, lock and object cache files
    pub fn tracked_files(&self) -> Vec<PathBuf> {
        let mut files = vec![self.path.clone()];
        for key in TRACKED_KEYS {
            files.extend(self.get_list(key).into_iter().map(|v| self.resolve_path(v)));
        }
        files
    }

    /// `$USERn$` style macros from every `resource_file`
    pub fn resources(&self) -> Result<IndexMap<String, String>, LoadError> {
        let mut resources = IndexMap::new();
        for value in self.get_list("resource_file") {
            let path = self.resolve_path(value);
            let text = std::fs::read_to_string(&path)?;
            resources.extend(parse_pairs(&text));
        }
        Ok(resources)
    }

    /// Set `key=value` in the file on disk
    ///
    /// With `append` a new line is always added. Otherwise the first line setting
    /// `key` is replaced, or a line is appended if there is none. Every other line
    /// is kept as is.
    pub fn set(&mut self, key: &str, value: &str, append: bool) -> Result<(), LoadError> {
        let text = std::fs::read_to_string(&self.path)?;
        let new_line = format!("{key}={value}");

        let mut lines: Vec<String> = text.lines().map(str::to_string).collect();
        let existing = if append {
            None
        } else {
            lines.iter().position(|line| line_key(line) == Some(key))
        };

        match existing {
            Some(index) => lines[index] = new_line,
            None => lines.push(new_line),
        }

        self.write(lines)
    }

    /// Drop every line setting `key`, returns whether there was one
    pub fn remove(&mut self, key: &str) -> Result<bool, LoadError> {
        let text = std::fs::read_to_string(&self.path)?;
        let lines: Vec<String> = text
            .lines()
            .filter(|line| line_key(line) != Some(key))
            .map(str::to_string)
            .collect();

        let removed = lines.len() != text.lines().count();
        if removed {
            self.write(lines)?;
        }
        Ok(removed)
    }

    fn write(&mut self, lines: Vec<String>) -> Result<(), LoadError> {
        let mut text = lines.join("\n");
        text.push('\n');
        crate::rewrite::write_file(&self.path, &text)?;
        self.pairs = parse_pairs(&text);
        Ok(())
    }
}

/// Breadth first walk of `root` collecting `*.cfg` files
///
/// A symlink is followed one level: the link itself is resolved, but a link to a
/// link is not. Each directory is visited once.
fn walk_cfg_dir(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut visited = HashSet::new();
    let mut queue = VecDeque::from([root.to_path_buf()]);

    while let Some(dir) = queue.pop_front() {
        let identity = dir.canonicalize().unwrap_or_else(|_| dir.clone());
        if !visited.insert(identity) {
            continue;
        }

        let read_dir = match std::fs::read_dir(&dir) {
            Ok(read_dir) => read_dir,
            Err(error) => {
                tracing::debug!(dir=%dir.display(), %error, "skipping cfg_dir");
                continue;
            }
        };

        let mut entries: Vec<PathBuf> = read_dir
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .collect();
        entries.sort();

        for path in entries {
            if points_to_dir(&path) {
                queue.push_back(path);
            } else if path.extension().is_some_and(|ext| ext == "cfg") {
                files.push(path);
            }
        }
    }

    files
}

fn points_to_dir(path: &Path) -> bool {
    let Ok(metadata) = std::fs::symlink_metadata(path) else {
        return false;
    };
    if metadata.is_dir() {
        return true;
    }
    if !metadata.file_type().is_symlink() {
        return false;
    }

    let Ok(target) = std::fs::read_link(path) else {
        return false;
    };
    let target = match path.parent() {
        Some(parent) if target.is_relative() => parent.join(target),
        _ => target,
    };
    std::fs::symlink_metadata(target).is_ok_and(|metadata| metadata.is_dir())
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn pairs_and_lookup() {
        let config = MainConfig::parse(
            "# comment\n; other\n\ncfg_file=a.cfg\nlog_file = /var/log/nagios.log\ncfg_file=b.cfg\nbroken line\n",
            "/etc/nagios/nagios.cfg",
        );
        assert_eq!(config.get("cfg_file"), Some("a.cfg"));
        assert_eq!(config.get_list("cfg_file"), vec!["a.cfg", "b.cfg"]);
        assert_eq!(config.get("log_file"), Some("/var/log/nagios.log"));
        assert_eq!(config.get("missing"), None);
        assert_eq!(config.pairs().len(), 3);
        assert_eq!(
            config.resolve_path("a.cfg"),
            PathBuf::from("/etc/nagios/a.cfg")
        );
    }

    #[test]
    fn missing_cfg_dir_contributes_nothing() {
        let config = MainConfig::parse("cfg_dir=/etc/x/conf.d\n", "/etc/x/nagios.cfg");
        assert!(config.cfg_files().is_empty());
    }

    #[test]
    fn discovery() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("conf.d/nested")).unwrap();
        std::fs::write(root.join("hosts.cfg"), "").unwrap();
        std::fs::write(root.join("conf.d/a.cfg"), "").unwrap();
        std::fs::write(root.join("conf.d/readme.txt"), "").unwrap();
        std::fs::write(root.join("conf.d/nested/b.cfg"), "").unwrap();

        let config = MainConfig::parse(
            "cfg_file=hosts.cfg\ncfg_file=missing.cfg\ncfg_dir=conf.d\ncfg_file=conf.d/a.cfg\n",
            root.join("nagios.cfg"),
        );

        assert_eq!(
            config.cfg_files(),
            vec![
                root.join("hosts.cfg"),
                root.join("conf.d/a.cfg"),
                root.join("conf.d/nested/b.cfg"),
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn discovery_follows_symlinks_once() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("real")).unwrap();
        std::fs::create_dir_all(root.join("conf.d")).unwrap();
        std::fs::write(root.join("real/c.cfg"), "").unwrap();
        std::os::unix::fs::symlink(root.join("real"), root.join("conf.d/linked")).unwrap();
        std::os::unix::fs::symlink(root.join("nowhere.cfg"), root.join("conf.d/dangling.cfg"))
            .unwrap();
        // a loop back to the root must not be walked twice
        std::os::unix::fs::symlink(root.join("conf.d"), root.join("conf.d/loop")).unwrap();

        let config = MainConfig::parse("cfg_dir=conf.d\n", root.join("nagios.cfg"));
        assert_eq!(
            config.cfg_files(),
            vec![
                root.join("conf.d/dangling.cfg"),
                root.join("conf.d/linked/c.cfg"),
            ]
        );
    }

    #[test]
    fn resources_and_tracked_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("resource.cfg"),
            "# plugin path\n$USER1$=/usr/lib/nagios/plugins\n$USER2$=secret\n",
        )
        .unwrap();

        let config = MainConfig::parse(
            "resource_file=resource.cfg\nlock_file=/run/nagios.lock\n",
            dir.path().join("nagios.cfg"),
        );
        let resources = config.resources().unwrap();
        assert_eq!(resources.get("$USER1$").map(String::as_str), Some("/usr/lib/nagios/plugins"));
        assert_eq!(resources.len(), 2);

        assert_eq!(
            config.tracked_files(),
            vec![
                dir.path().join("nagios.cfg"),
                dir.path().join("resource.cfg"),
                PathBuf::from("/run/nagios.lock"),
            ]
        );
    }

    #[test]
    fn editing_keeps_other_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nagios.cfg");
        std::fs::write(&path, "# main\ncfg_file=a.cfg\n#debug_level=1\ndebug_level=0\n").unwrap();

        let mut config = MainConfig::load(&path).unwrap();
        config.set("debug_level", "2", false).unwrap();
        config.set("cfg_file", "b.cfg", true).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "# main\ncfg_file=a.cfg\n#debug_level=1\ndebug_level=2\ncfg_file=b.cfg\n"
        );
        assert_eq!(config.get_list("cfg_file"), vec!["a.cfg", "b.cfg"]);

        assert!(config.remove("cfg_file").unwrap());
        assert!(!config.remove("cfg_file").unwrap());
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "# main\n#debug_level=1\ndebug_level=2\n"
        );
    }

    #[test]
    fn load_missing_file() {
        let error = MainConfig::load(Path::new("/nonexistent/nagios.cfg")).unwrap_err();
        assert!(matches!(error, LoadError::NotFound(_)));
    }
}
