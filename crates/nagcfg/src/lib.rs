//! # nagcfg - nagios-style object configuration
//!
//! Parse, query and edit the object configuration of Nagios and compatible monitoring
//! daemons (Icinga 1, Naemon) without losing the layout of the files.
//!
//! ## Introduction for developers
//!
//! Read this to understand how `nagcfg` works internally.
//!
//! ### Object format terms
//!
//! - a `main config` (`nagios.cfg`) is a flat list of `key=value` lines
//! - ...some of which (`cfg_file`, `cfg_dir`) point to `object files`
//! - ...which are a list of `definitions`:
//!   - `define`, followed by the `object type`
//!   - and `attributes` enclosed in `{` and `}`, one `key value` per line
//!
//! This is a valid object file:
//! ```text
//! # full line comments start with '#'
//! ; ...or with ';'
//!
//! define host {
//!     name                generic-host   ; trailing comments start with ';'
//!     register            0
//!     check_period        24x7
//! }
//!
//! define host {
//!     use                 generic-host
//!     host_name           web01
//!     check_command       check_http \
//!                         --ssl
//! }
//! ```
//!
//! ### Loading files
//!
//! see [config::Config::parse]
//!
//! [main_config::MainConfig] reads the main config and discovers the object files:
//! every existing `cfg_file` plus every `*.cfg` file below each `cfg_dir`. Each object
//! file is split into [lexer::LogicalLines] (backslash continuations joined) and
//! [parser::DefinitionReader] turns those into [object::ObjectDefinition]s. Malformed
//! input is recorded as an [issue::Issue] and parsing carries on with the next file.
//!
//! Each definition remembers its source file and line span, so it can be found again
//! when it is edited.
//!
//! ### Templates
//!
//! see [resolver::resolve]
//!
//! A definition with a `name` is a template, another definition of the same type can
//! `use` it. Resolution fills each definition's inherited layer, its own attributes
//! stay untouched. [object::ObjectDefinition::get] looks an attribute up in the
//! defined layer first and falls back to the inherited one.
//!
//! **Example**
//!
//! ```
//! # use nagcfg::objects;
//! # use nagcfg::issue::Issues;
//! let objects = objects!(
//!     "define host {\n name base\n register 0\n check_period 24x7\n}
//! define host {\n use base\n host_name web01\n}"
//! );
//! let mut issues = Issues::new();
//! let objects = nagcfg::resolver::resolve(objects, &mut issues);
//! assert_eq!(objects[1].get("check_period"), Some("24x7"));
//! assert_eq!(objects[1].defined_attributes.get("check_period"), None);
//! ```
//!
//! ### Querying
//!
//! [store::ObjectStore] groups the resolved definitions by type (`all_host`,
//! `all_service`, ...). Lookups go by the type's naming attribute and filters take
//! [query::Predicate]s in the `attribute__suffix=value` form.
//!
//! ### Editing
//!
//! see [rewrite]
//!
//! An edit parses the definition's file again, locates the definition by its defined
//! attributes and rewrites only its lines. Everything else in the file stays byte for
//! byte the same. [config::Config] wraps this with dirty tracking, batched
//! [tracking::Changeset]s and [hooks::EventHook]s.

pub mod config;
pub mod hooks;
pub mod issue;
pub mod lexer;
pub mod main_config;
pub mod object;
pub mod parser;
pub mod query;
pub mod resolver;
pub mod rewrite;
pub mod store;
pub mod tracking;
mod util;
