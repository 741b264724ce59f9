//! notifications after a successful change
//!
//! Hooks get the absolute file name and a readable description of the change, for
//! example to commit it to version control. A failing hook never fails the change,
//! the error is logged and the next hook runs.
use std::fmt::Debug;
use std::path::Path;

pub trait EventHook: Debug {
    /// A definition in `filename` was written
    fn write(&self, filename: &Path, message: &str) -> anyhow::Result<()>;

    /// Changes to `filename` should be persisted
    fn save(&self, filename: &Path, message: &str) -> anyhow::Result<()> {
        self.write(filename, message)
    }
}

/// Logs every event
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHook;

impl EventHook for LoggingHook {
    fn write(&self, filename: &Path, message: &str) -> anyhow::Result<()> {
        tracing::info!(file=%filename.display(), message, "object file written");
        Ok(())
    }

    fn save(&self, filename: &Path, message: &str) -> anyhow::Result<()> {
        tracing::info!(file=%filename.display(), message, "object file saved");
        Ok(())
    }
}

/// Which hook method to call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Event {
    Write,
    Save,
}

pub(crate) fn notify(hooks: &[Box<dyn EventHook>], event: Event, filename: &Path, message: &str) {
    for hook in hooks {
        let result = match event {
            Event::Write => hook.write(filename, message),
            Event::Save => hook.save(filename, message),
        };
        if let Err(error) = result {
            tracing::warn!(?hook, file=%filename.display(), "event hook failed: {error:#}");
        }
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Records every call, for tests
    #[derive(Debug, Default, Clone)]
    pub(crate) struct RecordingHook {
        pub(crate) events: Arc<Mutex<Vec<(&'static str, PathBuf, String)>>>,
        pub(crate) fail: bool,
    }

    impl RecordingHook {
        pub(crate) fn events(&self) -> Vec<(&'static str, PathBuf, String)> {
            self.events.lock().clone()
        }
    }

    impl EventHook for RecordingHook {
        fn write(&self, filename: &Path, message: &str) -> anyhow::Result<()> {
            self.events
                .lock()
                .push(("write", filename.to_path_buf(), message.to_string()));
            anyhow::ensure!(!self.fail, "recording hook told to fail");
            Ok(())
        }
    }

    #[test]
    fn save_defaults_to_write_and_failures_are_swallowed() {
        let failing = RecordingHook {
            fail: true,
            ..Default::default()
        };
        let recording = RecordingHook::default();
        let hooks: Vec<Box<dyn EventHook>> = vec![
            Box::new(failing.clone()),
            Box::new(recording.clone()),
            Box::new(LoggingHook),
        ];

        notify(&hooks, Event::Save, Path::new("/etc/nagios/hosts.cfg"), "host web01");

        let expected = vec![(
            "write",
            PathBuf::from("/etc/nagios/hosts.cfg"),
            "host web01".to_string(),
        )];
        assert_eq!(failing.events(), expected);
        assert_eq!(recording.events(), expected);
    }
}
