//! YAML single-key editing library.
//!
//! This library manages the presence and absence of individual keys in a
//! YAML file without templating the entire file. Keys are addressed with
//! dotted notation (`some.nested.setting`), the edit is idempotent, and the
//! file is only rewritten when the document actually changes.
//!
//! # Features
//!
//! - **Minimal mutation**: only the nodes along the dotted path are touched;
//!   sibling keys are never discarded
//! - **Change detection**: current and desired values are compared with deep
//!   equality before anything is written
//! - **Atomic writes**: replacement content lands via temp-file-plus-rename,
//!   with an optional pre-change backup
//! - **Template helpers**: `dig` and `map_format` for a templating engine
//! - **Optional tracing**: detailed logging when the `tracing` feature is
//!   enabled
//!
//! # Example
//!
//! ```rust,no_run
//! use yaml_key::edit::{EditOptions, YamlEdit};
//! use std::path::PathBuf;
//!
//! let options = EditOptions {
//!   dest: PathBuf::from("/etc/foo/config.yaml"),
//!   key: "some.nested.setting".into(),
//!   value: Some(serde_yaml::Value::from(8080)),
//!   ..EditOptions::default()
//! };
//!
//! let outcome = YamlEdit::apply_with_options(options).unwrap();
//! assert!(outcome.changed);
//! ```

pub mod edit;
pub mod filters;
pub mod merge;
pub mod path;
