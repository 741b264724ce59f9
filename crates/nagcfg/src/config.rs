//! the configuration context
//!
//! A [Config] owns everything known about one installation: the main config, the
//! discovered object files, the resolved [ObjectStore] and the issues found on the
//! way. It is created unparsed, [Config::parse] (re)loads it and [Config::close]
//! drops the loaded state again.
//!
//! Mutations write to disk first and then update the stored definition in place.
//! They mark the context dirty, since inherited values of other definitions may
//! depend on the change. Check [Config::needs_reparse] before trusting the store.
use crate::hooks::{notify, Event, EventHook};
use crate::issue::{Issue, Issues};
use crate::main_config::{guess_main_config, LoadError, MainConfig};
use crate::object::ObjectDefinition;
use crate::parser::parse_str;
use crate::resolver::resolve;
use crate::rewrite::{self, Banner, FieldEdit, Mutation, RewriteError};
use crate::store::ObjectStore;
use crate::tracking::{describe_object, Changeset, Timestamps};
use std::path::{Path, PathBuf};

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load main configuration")]
    Load(#[from] LoadError),
    #[error("Failed to read object file {}", .file.display())]
    Read {
        file: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Strict mode: {0}")]
    Strict(Issue),
    #[error("Failed to change object file")]
    Rewrite(#[from] RewriteError),
}

#[derive(Debug)]
pub struct Config {
    main_path: PathBuf,
    main_config: Option<MainConfig>,
    cfg_files: Vec<PathBuf>,
    store: ObjectStore,
    issues: Issues,
    /// taken when the last parse started, `None` before the first parse
    timestamps: Option<Timestamps>,
    dirty: bool,
    pending: Vec<Changeset>,
    strict: bool,
    banner: Option<String>,
    hooks: Vec<Box<dyn EventHook>>,
}

impl Config {
    /// Unparsed context for the main config at `main_path`
    pub fn new(main_path: impl Into<PathBuf>) -> Self {
        Self {
            main_path: main_path.into(),
            main_config: None,
            cfg_files: Vec::new(),
            store: ObjectStore::default(),
            issues: Issues::new(),
            timestamps: None,
            dirty: false,
            pending: Vec::new(),
            strict: false,
            banner: None,
            hooks: Vec::new(),
        }
    }

    /// Unparsed context for the first main config found in a well known location
    pub fn guess() -> Result<Self, ConfigError> {
        Ok(Self::new(guess_main_config()?))
    }

    /// Fail parsing on unknown object types instead of recording them
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Put a `# Edited by <tool> on <timestamp>` comment above edited definitions
    pub fn with_banner(mut self, tool: impl Into<String>) -> Self {
        self.banner = Some(tool.into());
        self
    }

    pub fn add_hook(&mut self, hook: Box<dyn EventHook>) {
        self.hooks.push(hook);
    }

    pub fn main_path(&self) -> &Path {
        &self.main_path
    }

    pub fn main_config(&self) -> Option<&MainConfig> {
        self.main_config.as_ref()
    }

    /// (Re)load the main config and discover object files
    pub fn parse_maincfg(&mut self) -> Result<&MainConfig, ConfigError> {
        let main_config = MainConfig::load(&self.main_path)?;
        self.cfg_files = main_config.cfg_files();
        Ok(self.main_config.insert(main_config))
    }

    /// Load everything from disk, replacing what was loaded before
    pub fn parse(&mut self) -> Result<(), ConfigError> {
        self.parse_maincfg()?;
        let Some(main_config) = self.main_config.as_ref() else {
            return Ok(());
        };

        let tracked = main_config
            .tracked_files()
            .into_iter()
            .chain(self.cfg_files.iter().cloned());
        let timestamps = Timestamps::snapshot(tracked);

        let mut issues = Issues::new();
        let mut objects = Vec::new();
        for file in &self.cfg_files {
            tracing::info!(path=%file.display(), "loading file");
            let text = match std::fs::read_to_string(file) {
                Ok(text) => text,
                Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                    tracing::debug!(path=%file.display(), "skipping unreadable object file");
                    continue;
                }
                Err(source) => {
                    return Err(ConfigError::Read {
                        file: file.clone(),
                        source,
                    })
                }
            };

            let parsed = parse_str(&text, file);
            for issue in parsed.issues {
                if self.strict && matches!(issue, Issue::UnknownObjectType { .. }) {
                    return Err(ConfigError::Strict(issue));
                }
                issues.log(issue);
            }
            objects.extend(parsed.objects);
        }

        let objects = resolve(objects, &mut issues);
        tracing::info!(
            files = self.cfg_files.len(),
            objects = objects.len(),
            issues = issues.len(),
            "configuration parsed"
        );

        self.store = ObjectStore::new(objects);
        self.issues = issues;
        self.timestamps = Some(timestamps);
        self.dirty = false;
        Ok(())
    }

    /// Forget everything loaded, the next access needs a [Config::parse]
    pub fn close(&mut self) {
        self.main_config = None;
        self.cfg_files.clear();
        self.store = ObjectStore::default();
        self.issues = Issues::new();
        self.timestamps = None;
        self.dirty = false;
        self.pending.clear();
    }

    /// Whether the store may be out of date with the files on disk
    pub fn needs_reparse(&self) -> bool {
        match &self.timestamps {
            None => true,
            Some(_) if self.dirty => true,
            Some(timestamps) => {
                let changed = timestamps.changed_files();
                if !changed.is_empty() {
                    tracing::debug!(?changed, "files changed since last parse");
                }
                !changed.is_empty()
            }
        }
    }

    pub fn is_parsed(&self) -> bool {
        self.timestamps.is_some()
    }

    pub fn store(&self) -> &ObjectStore {
        &self.store
    }

    pub fn issues(&self) -> &Issues {
        &self.issues
    }

    /// Object files discovered by the last [Config::parse_maincfg]
    pub fn cfg_files(&self) -> &[PathBuf] {
        &self.cfg_files
    }

    /// Value of a resource macro such as `$USER1$`
    pub fn resource(&self, name: &str) -> Result<Option<String>, ConfigError> {
        let resources = match &self.main_config {
            Some(main_config) => main_config.resources()?,
            None => MainConfig::load(&self.main_path)?.resources()?,
        };
        Ok(resources.get(name).cloned())
    }

    pub fn item_edit_field(
        &mut self,
        object: &ObjectDefinition,
        field: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        self.edit_fields(object, vec![FieldEdit::set(field, value)])
    }

    pub fn item_remove_field(&mut self, object: &ObjectDefinition, field: &str) -> Result<(), ConfigError> {
        self.edit_fields(object, vec![FieldEdit::remove(field)])
    }

    pub fn item_rename_field(
        &mut self,
        object: &ObjectDefinition,
        field: &str,
        new_name: &str,
    ) -> Result<(), ConfigError> {
        self.edit_fields(object, vec![FieldEdit::rename(field, new_name)])
    }

    /// Replace the whole definition with `text`
    ///
    /// The stored copy is left as is, reparse to see the new definition.
    pub fn item_rewrite(&mut self, object: &ObjectDefinition, text: &str) -> Result<(), ConfigError> {
        let message = format!("{}: rewritten", describe_object(object));
        self.mutate(object, Mutation::Rewrite(text.to_string()), &message)
    }

    pub fn item_remove(&mut self, object: &ObjectDefinition) -> Result<(), ConfigError> {
        let message = format!("{}: removed", describe_object(object));
        self.mutate(object, Mutation::Delete, &message)
    }

    /// Append `object` in canonical form to `filename`
    ///
    /// The added definition is stored unresolved, reparse to see inherited values.
    pub fn item_add(&mut self, object: &ObjectDefinition, filename: &Path) -> Result<(), ConfigError> {
        let (line_start, line_end) = rewrite::append_object(filename, object)?;
        self.dirty = true;

        let mut added = object.clone();
        added.meta.source_file = filename.to_path_buf();
        added.meta.line_start = line_start;
        added.meta.line_end = line_end;
        added.meta.raw_text = object.to_string().trim_end_matches('\n').to_string();
        added.clear_inheritance();

        let message = format!("{}: added", describe_object(&added));
        self.store.insert(added);
        notify(&self.hooks, Event::Write, &absolute(filename), &message);
        Ok(())
    }

    /// Queue field edits for [Config::commit]
    ///
    /// Edits of a definition that already has staged edits join that changeset, so
    /// every definition is written once.
    pub fn stage(&mut self, changeset: Changeset) {
        if changeset.is_empty() {
            return;
        }
        match self
            .pending
            .iter_mut()
            .find(|pending| pending.object.same_origin(&changeset.object))
        {
            Some(pending) => pending.edits.extend(changeset.edits),
            None => self.pending.push(changeset),
        }
    }

    pub fn needs_commit(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Write every staged changeset, one file rewrite each
    ///
    /// Stops at the first failure, the failed changeset and everything after it stay
    /// staged. Returns how many changesets were written.
    pub fn commit(&mut self) -> Result<usize, ConfigError> {
        let mut written = 0;
        while !self.pending.is_empty() {
            let changeset = self.pending.remove(0);
            let message = changeset.describe();
            if let Err(error) = self.mutate(
                &changeset.object,
                Mutation::Fields(changeset.edits.clone()),
                &message,
            ) {
                self.pending.insert(0, changeset);
                return Err(error);
            }
            notify(
                &self.hooks,
                Event::Save,
                &absolute(changeset.object.source_file()),
                &message,
            );
            written += 1;
        }
        Ok(written)
    }

    fn edit_fields(&mut self, object: &ObjectDefinition, edits: Vec<FieldEdit>) -> Result<(), ConfigError> {
        let changeset = Changeset {
            object: object.clone(),
            edits,
        };
        self.mutate(object, Mutation::Fields(changeset.edits.clone()), &changeset.describe())
    }

    fn mutate(&mut self, object: &ObjectDefinition, mutation: Mutation, message: &str) -> Result<(), ConfigError> {
        let file = object.source_file().to_path_buf();
        let banner = self.banner.as_deref().map(Banner::now);
        rewrite::edit_file(&file, object, &mutation, banner.as_ref())?;
        self.dirty = true;

        match &mutation {
            Mutation::Fields(edits) => {
                if let Some(stored) = self.store.find_mut(object) {
                    for edit in edits {
                        edit.apply_to(stored);
                    }
                }
            }
            Mutation::Delete => {
                self.store.remove(object);
            }
            Mutation::Rewrite(_) => {}
        }

        notify(&self.hooks, Event::Write, &absolute(&file), message);
        Ok(())
    }
}

fn absolute(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::hooks::test::RecordingHook;
    use pretty_assertions::assert_eq;
    use std::time::{Duration, SystemTime};

    const HOSTS: &str = "define host {
    name                generic-host
    register            0
    check_period        24x7
}

define host {
    host_name           web01
    use                 generic-host
    alias               Web 01
}

define host {
    host_name           db01
    use                 generic-host
}
";

    const SERVICES: &str = "define service {
    host_name           web01
    description         HTTP
}
";

    struct Fixture {
        dir: tempfile::TempDir,
        config: Config,
    }

    impl Fixture {
        fn path(&self, name: &str) -> PathBuf {
            self.dir.path().join(name)
        }

        fn read(&self, name: &str) -> String {
            std::fs::read_to_string(self.path(name)).unwrap()
        }

        fn host(&self, name: &str) -> ObjectDefinition {
            self.config
                .store()
                .get("host", name, None)
                .unwrap()
                .unwrap()
                .clone()
        }
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("conf.d")).unwrap();
        std::fs::write(
            root.join("nagios.cfg"),
            "# main config\ncfg_file=hosts.cfg\ncfg_dir=conf.d\nresource_file=resource.cfg\n",
        )
        .unwrap();
        std::fs::write(root.join("hosts.cfg"), HOSTS).unwrap();
        std::fs::write(root.join("conf.d/services.cfg"), SERVICES).unwrap();
        std::fs::write(root.join("resource.cfg"), "$USER1$=/usr/lib/nagios/plugins\n").unwrap();

        let mut config = Config::new(root.join("nagios.cfg"));
        config.parse().unwrap();
        Fixture { dir, config }
    }

    fn touch(path: &Path) {
        let file = std::fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(60))
            .unwrap();
    }

    #[test]
    fn parse_loads_and_resolves() {
        let fixture = fixture();
        let config = &fixture.config;

        assert!(config.issues().is_empty());
        assert_eq!(config.cfg_files().len(), 2);
        assert_eq!(config.store().objects("host").len(), 3);
        assert_eq!(fixture.host("db01").get("check_period"), Some("24x7"));

        let http = config.store().get_service("web01", "HTTP").unwrap();
        assert_eq!(http.get("service_description"), Some("HTTP"));
        assert_eq!(
            config.resource("$USER1$").unwrap().as_deref(),
            Some("/usr/lib/nagios/plugins")
        );
        assert_eq!(config.resource("$USER9$").unwrap(), None);
    }

    #[test]
    fn reparse_tracking() {
        let mut fixture = fixture();
        assert!(!fixture.config.needs_reparse());
        fixture.config.parse().unwrap();
        assert!(!fixture.config.needs_reparse());

        touch(&fixture.path("resource.cfg"));
        assert!(fixture.config.needs_reparse());
        fixture.config.parse().unwrap();
        assert!(!fixture.config.needs_reparse());

        touch(&fixture.path("conf.d/services.cfg"));
        assert!(fixture.config.needs_reparse());

        fixture.config.close();
        assert!(!fixture.config.is_parsed());
        assert!(fixture.config.needs_reparse());
        assert!(fixture.config.store().is_empty());
    }

    #[test]
    fn never_parsed_needs_parse() {
        let config = Config::new("/nonexistent/nagios.cfg");
        assert!(config.needs_reparse());
    }

    #[test]
    fn missing_main_config() {
        let mut config = Config::new("/nonexistent/nagios.cfg");
        assert!(matches!(
            config.parse(),
            Err(ConfigError::Load(LoadError::NotFound(_)))
        ));
    }

    #[test]
    fn edit_field_changes_only_that_definition() {
        let mut fixture = fixture();
        let web01 = fixture.host("web01");

        fixture
            .config
            .item_edit_field(&web01, "alias", "Primary web")
            .unwrap();
        assert!(fixture.config.needs_reparse());
        assert_eq!(fixture.host("web01").get("alias"), Some("Primary web"));

        let text = fixture.read("hosts.cfg");
        assert_eq!(
            text,
            HOSTS.replace(
                "    alias               Web 01\n",
                "    alias                          Primary web\n"
            )
        );

        fixture.config.parse().unwrap();
        assert!(!fixture.config.needs_reparse());
        assert_eq!(fixture.host("web01").get("alias"), Some("Primary web"));
    }

    #[test]
    fn stale_objects_are_refused() {
        let mut fixture = fixture();
        let web01 = fixture.host("web01");
        fixture.config.item_edit_field(&web01, "alias", "a").unwrap();

        // the clone still carries the old alias
        let error = fixture
            .config
            .item_edit_field(&web01, "alias", "b")
            .unwrap_err();
        assert!(matches!(
            error,
            ConfigError::Rewrite(RewriteError::NotFound { .. })
        ));
    }

    #[test]
    fn line_breaks_never_reach_the_file() {
        let mut fixture = fixture();
        let web01 = fixture.host("web01");
        let error = fixture
            .config
            .item_edit_field(&web01, "alias", "one\ntwo")
            .unwrap_err();
        assert!(matches!(
            error,
            ConfigError::Rewrite(RewriteError::LineBreak { .. })
        ));
        assert_eq!(fixture.read("hosts.cfg"), HOSTS);
        assert!(!fixture.config.needs_reparse());
    }

    #[test]
    fn remove_rename_and_delete() {
        let mut fixture = fixture();
        let web01 = fixture.host("web01");
        fixture.config.item_rename_field(&web01, "alias", "display_name").unwrap();
        assert_eq!(fixture.host("web01").get("display_name"), Some("Web 01"));

        let web01 = fixture.host("web01");
        fixture.config.item_remove_field(&web01, "display_name").unwrap();
        assert!(!fixture.host("web01").contains("display_name"));

        let db01 = fixture.host("db01");
        fixture.config.item_remove(&db01).unwrap();
        assert!(fixture.config.store().get("host", "db01", None).unwrap().is_none());

        fixture.config.parse().unwrap();
        assert_eq!(fixture.config.store().objects("host").len(), 2);
        assert!(fixture.config.store().get("host", "db01", None).unwrap().is_none());
        assert!(!fixture.read("hosts.cfg").contains("db01"));
    }

    #[test]
    fn add_and_rewrite() {
        let mut fixture = fixture();
        let new_host = ObjectDefinition::new("host", "ignored.cfg")
            .with("host_name", "cache01")
            .with("use", "generic-host");
        let target = fixture.path("conf.d/new.cfg");
        fixture.config.item_add(&new_host, &target).unwrap();
        assert!(fixture.config.store().get("host", "cache01", None).unwrap().is_some());

        fixture.config.parse().unwrap();
        let cache01 = fixture.host("cache01");
        assert_eq!(cache01.source_file().to_path_buf(), target.canonicalize().unwrap());
        assert_eq!(cache01.get("check_period"), Some("24x7"));

        fixture
            .config
            .item_rewrite(&cache01, "define host {\n    host_name cache02\n}")
            .unwrap();
        fixture.config.parse().unwrap();
        assert!(fixture.config.store().get("host", "cache01", None).unwrap().is_none());
        assert!(fixture.config.store().get("host", "cache02", None).unwrap().is_some());
    }

    #[test]
    fn staged_changes_commit_with_hooks() {
        let mut fixture = fixture();
        let hook = RecordingHook::default();
        fixture.config.add_hook(Box::new(hook.clone()));

        let web01 = fixture.host("web01");
        fixture
            .config
            .stage(Changeset::new(&web01).set("alias", "Web").set("notes", "front"));
        fixture.config.stage(Changeset::new(&web01));
        assert!(fixture.config.needs_commit());

        assert_eq!(fixture.config.commit().unwrap(), 1);
        assert!(!fixture.config.needs_commit());
        assert_eq!(fixture.host("web01").get("notes"), Some("front"));

        let hosts = fixture.path("hosts.cfg").canonicalize().unwrap();
        let message = "host web01: changed alias, notes".to_string();
        assert_eq!(
            hook.events(),
            vec![
                ("write", hosts.clone(), message.clone()),
                ("write", hosts, message),
            ]
        );
    }

    #[test]
    fn changesets_of_one_definition_are_merged() {
        let mut fixture = fixture();
        let web01 = fixture.host("web01");
        let db01 = fixture.host("db01");
        fixture.config.stage(Changeset::new(&web01).set("alias", "Web"));
        fixture.config.stage(Changeset::new(&db01).set("alias", "Database"));
        fixture.config.stage(Changeset::new(&web01).set("notes", "front"));

        assert_eq!(fixture.config.commit().unwrap(), 2);
        fixture.config.parse().unwrap();
        assert_eq!(fixture.host("web01").get("alias"), Some("Web"));
        assert_eq!(fixture.host("web01").get("notes"), Some("front"));
        assert_eq!(fixture.host("db01").get("alias"), Some("Database"));
    }

    #[test]
    fn unreadable_values_never_reach_the_file() {
        let mut fixture = fixture();
        let web01 = fixture.host("web01");
        for value in ["weird}", "a ; b"] {
            let error = fixture
                .config
                .item_edit_field(&web01, "alias", value)
                .unwrap_err();
            assert!(matches!(
                error,
                ConfigError::Rewrite(RewriteError::Unreadable { .. })
            ));
        }
        assert_eq!(fixture.read("hosts.cfg"), HOSTS);
        assert!(!fixture.config.needs_reparse());
        assert_eq!(fixture.host("web01").get("alias"), Some("Web 01"));

        let broken = ObjectDefinition::new("host", "ignored.cfg").with("host_name", "cache01}");
        let target = fixture.path("conf.d/new.cfg");
        assert!(fixture.config.item_add(&broken, &target).is_err());
        assert!(!target.exists());
        assert!(fixture.config.store().get("host", "cache01}", None).unwrap().is_none());
    }

    #[test]
    fn failed_commit_stays_staged() {
        let mut fixture = fixture();
        let stale = fixture.host("web01").with("notes", "not on disk");
        fixture.config.stage(Changeset::new(&stale).set("alias", "x"));
        assert!(fixture.config.commit().is_err());
        assert!(fixture.config.needs_commit());
    }

    #[test]
    fn banner_above_edited_definition() {
        let mut fixture = fixture();
        fixture.config = Config::new(fixture.path("nagios.cfg")).with_banner("nagcfg");
        fixture.config.parse().unwrap();

        let db01 = fixture.host("db01");
        fixture.config.item_edit_field(&db01, "alias", "Database").unwrap();
        let text = fixture.read("hosts.cfg");
        let banner_line = text
            .lines()
            .position(|line| line.starts_with("# Edited by nagcfg on "))
            .unwrap();
        assert_eq!(text.lines().nth(banner_line + 1), Some("define host {"));
        assert_eq!(text.lines().nth(banner_line + 2), Some("    host_name           db01"));
    }

    #[test]
    fn issues_do_not_stop_other_files() {
        let fixture = fixture();
        std::fs::write(
            fixture.path("conf.d/broken.cfg"),
            "define host {\n host_name half\ndefine widget {\n}\n",
        )
        .unwrap();

        let mut config = Config::new(fixture.path("nagios.cfg"));
        config.parse().unwrap();
        assert_eq!(config.issues().len(), 2);
        assert!(config
            .issues()
            .iter()
            .any(|issue| matches!(issue, Issue::UnexpectedDefine { .. })));
        assert!(config.store().get("host", "web01", None).unwrap().is_some());
        assert!(config.store().get("host", "half", None).unwrap().is_some());

        let mut strict = Config::new(fixture.path("nagios.cfg")).strict(true);
        assert!(matches!(
            strict.parse(),
            Err(ConfigError::Strict(Issue::UnknownObjectType { .. }))
        ));
    }
}
