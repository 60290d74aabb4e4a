//! Idempotent key edits against a YAML file on disk.
//!
//! # Edit Pipeline
//!
//! 1. Load the destination; a missing or empty file decodes to an empty
//!    document (unless creation is disallowed)
//! 2. Decide whether the desired state already holds, comparing the current
//!    value at the key against the desired one
//! 3. If it does not, mutate the in-memory document: merge a single-branch
//!    patch for `state=present`, or drop the leaf for `state=absent`
//! 4. Serialize and atomically replace the destination, taking a backup
//!    first when asked to
//!
//! The destination is only ever replaced via a rename from a temp file in
//! the same directory, so a concurrent reader never observes a partial
//! write. An unchanged document is never rewritten.
//!
//! # Examples
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
//! println!("{}", outcome.message);
//! ```

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde_yaml::{Mapping, Value};
use similar::{ChangeTag, TextDiff};
use tempfile::NamedTempFile;

#[cfg(feature = "tracing")]
use tracing::{debug, info};

use crate::merge::{deep_merge, patch_tree};
use crate::path::{KeyPath, PathError};

const BACKUP_SUFFIX: &str = "bak";

/// Applies present/absent edits to single keys of a YAML file.
pub struct YamlEdit;

impl YamlEdit {
  /// Ensures the key described by `options` is present with the desired
  /// value, or absent, rewriting the destination only when needed.
  pub fn apply_with_options(options: EditOptions) -> Result<EditOutcome, EditError> {
    let EditOptions {
      dest,
      key,
      value,
      state,
      backup,
      create,
      check,
      diff,
    } = options;

    #[cfg(feature = "tracing")]
    info!(?dest, %key, ?state, "Applying edit");

    let path: KeyPath = key.as_str().try_into().map_err(EditError::Key)?;

    let raw = Self::load_raw(&dest, create)?;
    let mut document = Self::decode(&raw, &dest)?;

    let (changed, message) = match state {
      State::Present => {
        let desired = value.ok_or(EditError::MissingValue)?;
        Self::ensure_present(&mut document, &path, desired)
      }
      State::Absent => Self::ensure_absent(&mut document, &path),
    };

    #[cfg(feature = "tracing")]
    debug!(changed, %message, "Edit decided");

    // The serialized document doubles as the replacement content and the
    // diff after-snapshot, so it also reflects the would-be result when
    // nothing ends up written.
    let after = if changed || diff {
      Some(Self::encode(&document, &dest)?)
    } else {
      None
    };

    let diff_record = match (diff, &after) {
      (true, Some(after)) => Some(DiffRecord::new(&dest, &raw, after)),
      _ => None,
    };

    let mut backup_file = None;
    if changed
      && !check
      && let Some(text) = &after
    {
      if backup && dest.exists() {
        backup_file = Some(Self::backup_destination(&dest)?);
      }
      Self::replace_atomic(&dest, text)?;
    }

    Ok(EditOutcome {
      changed,
      message,
      path: dest,
      backup_file,
      diff: diff_record,
    })
  }

  /// Reads the destination's raw text, or resolves what a missing file means.
  ///
  /// A missing destination with `create` disallowed is fatal regardless of
  /// the desired state. Otherwise the parent directory is created and the
  /// content treated as empty.
  fn load_raw(dest: &Path, create: bool) -> Result<String, EditError> {
    if dest.exists() {
      return std::fs::read_to_string(dest).map_err(EditError::Read);
    }

    if !create {
      return Err(EditError::DestinationMissing(dest.to_path_buf()));
    }

    if let Some(parent) = dest.parent()
      && !parent.as_os_str().is_empty()
      && !parent.exists()
    {
      #[cfg(feature = "tracing")]
      debug!(?parent, "Creating parent directory");
      std::fs::create_dir_all(parent).map_err(EditError::CreateDir)?;
    }

    Ok(String::new())
  }

  fn decode(raw: &str, dest: &Path) -> Result<Mapping, EditError> {
    if raw.trim().is_empty() {
      return Ok(Mapping::new());
    }

    let document: Value = serde_yaml::from_str(raw).map_err(|source| EditError::Decode {
      path: dest.to_path_buf(),
      source,
    })?;

    match document {
      // An explicit `---` document with no content
      Value::Null => Ok(Mapping::new()),
      Value::Mapping(mapping) => Ok(mapping),
      _ => Err(EditError::RootNotMapping(dest.to_path_buf())),
    }
  }

  fn encode(document: &Mapping, dest: &Path) -> Result<String, EditError> {
    serde_yaml::to_string(document).map_err(|source| EditError::Encode {
      path: dest.to_path_buf(),
      source,
    })
  }

  fn ensure_present(
    document: &mut Mapping,
    path: &KeyPath,
    desired: Value,
  ) -> (bool, EditMessage) {
    let message = match path.resolve(document) {
      Some(current) if *current == desired => return (false, EditMessage::Ok),
      Some(_) => EditMessage::ValueChanged,
      None => EditMessage::KeyAdded,
    };

    let patch = patch_tree(path, desired);
    deep_merge(document, patch);

    (true, message)
  }

  fn ensure_absent(document: &mut Mapping, path: &KeyPath) -> (bool, EditMessage) {
    match path.remove(document) {
      Some(_) => (true, EditMessage::KeyRemoved),
      None => (false, EditMessage::Ok),
    }
  }

  /// Copies the destination to a timestamp-suffixed sibling path.
  fn backup_destination(dest: &Path) -> Result<PathBuf, EditError> {
    let stamp = SystemTime::now()
      .duration_since(UNIX_EPOCH)
      .map(|elapsed| elapsed.as_secs())
      .unwrap_or_default();
    let backup = PathBuf::from(format!("{}.{}.{}", dest.display(), stamp, BACKUP_SUFFIX));

    #[cfg(feature = "tracing")]
    debug!(?backup, "Backing up destination");

    std::fs::copy(dest, &backup).map_err(EditError::Backup)?;

    Ok(backup)
  }

  /// Writes `text` to a temp file next to the destination, then renames it
  /// over the destination.
  ///
  /// The temp file must live in the destination's own directory so the
  /// rename stays on one filesystem. On a failed rename the temp file is
  /// kept on disk for diagnosis.
  fn replace_atomic(dest: &Path, text: &str) -> Result<(), EditError> {
    let dir = match dest.parent() {
      Some(parent) if !parent.as_os_str().is_empty() => parent,
      _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir).map_err(EditError::TempWrite)?;
    tmp.write_all(text.as_bytes()).map_err(EditError::TempWrite)?;

    let tmp_path = tmp.path().to_path_buf();
    if let Err(error) = tmp.persist(dest) {
      let _ = error.file.into_temp_path().keep();
      return Err(EditError::AtomicMove {
        tmp: tmp_path,
        source: error.error,
      });
    }

    #[cfg(feature = "tracing")]
    info!(?dest, "Destination replaced");

    Ok(())
  }
}

/// Desired state of the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum State {
  #[default]
  Present,
  Absent,
}

/// What an edit did, phrased the way the CLI reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditMessage {
  /// The desired state already held
  Ok,
  /// The key did not exist and was added
  KeyAdded,
  /// The key existed with a different value
  ValueChanged,
  /// The key existed and was removed
  KeyRemoved,
}

impl fmt::Display for EditMessage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let message = match self {
      EditMessage::Ok => "OK",
      EditMessage::KeyAdded => "key added",
      EditMessage::ValueChanged => "value changed",
      EditMessage::KeyRemoved => "key removed",
    };
    f.write_str(message)
  }
}

/// Full-document text snapshots from either side of an edit.
///
/// Captured on request whether or not the change was persisted; an empty
/// side is represented by a single newline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffRecord {
  pub before: String,
  pub after: String,
  pub before_header: String,
  pub after_header: String,
}

impl DiffRecord {
  fn new(dest: &Path, before: &str, after: &str) -> Self {
    let header = format!("{} (content)", dest.display());

    Self {
      before: Self::snapshot(before),
      after: Self::snapshot(after),
      before_header: header.clone(),
      after_header: header,
    }
  }

  fn snapshot(text: &str) -> String {
    if text.is_empty() {
      "\n".to_string()
    } else {
      text.to_string()
    }
  }

  /// Renders the snapshots as a unified line diff.
  pub fn to_unified(&self) -> String {
    let diff = TextDiff::from_lines(self.before.as_str(), self.after.as_str());
    let mut rendered = format!("--- {}\n+++ {}\n", self.before_header, self.after_header);

    for change in diff.iter_all_changes() {
      let sign = match change.tag() {
        ChangeTag::Delete => "-",
        ChangeTag::Insert => "+",
        ChangeTag::Equal => " ",
      };
      rendered.push_str(sign);
      rendered.push_str(change.value());
      if !change.value().ends_with('\n') {
        rendered.push('\n');
      }
    }

    rendered
  }
}

/// Errors that can occur while applying an edit.
#[derive(Debug, thiserror::Error)]
pub enum EditError {
  /// The key failed to parse into a path
  #[error("Invalid key: {0}")]
  Key(PathError),
  /// state=present was requested without a value
  #[error("A value is required when the desired state is present")]
  MissingValue,
  /// The destination does not exist and creation was disallowed
  #[error("Destination {0} does not exist")]
  DestinationMissing(PathBuf),
  /// Error creating the destination's parent directory
  #[error("Failed to create parent directory: {0}")]
  CreateDir(std::io::Error),
  /// Error reading the destination
  #[error("Failed to read destination: {0}")]
  Read(std::io::Error),
  /// The destination content is not valid YAML
  #[error("Failed to parse {path}: {source}")]
  Decode {
    path: PathBuf,
    source: serde_yaml::Error,
  },
  /// The document root is something other than a mapping
  #[error("Root of {0} is not a mapping")]
  RootNotMapping(PathBuf),
  /// The mutated document failed to serialize
  #[error("Failed to serialize document for {path}: {source}")]
  Encode {
    path: PathBuf,
    source: serde_yaml::Error,
  },
  /// Error copying the destination to its backup path
  #[error("Failed to back up destination: {0}")]
  Backup(std::io::Error),
  /// Error creating or writing the temporary replacement file
  #[error("Could not create temporary file: {0}")]
  TempWrite(std::io::Error),
  /// Error renaming the temporary file over the destination
  #[error("Could not move temporary file {tmp} to destination: {source}")]
  AtomicMove {
    tmp: PathBuf,
    source: std::io::Error,
  },
}

/// Options for a single edit operation.
pub struct EditOptions {
  /// Path to the YAML file.
  pub dest: PathBuf,
  /// Dotted key to manage.
  pub key: String,
  /// Desired value; required when `state` is [`State::Present`].
  pub value: Option<Value>,
  /// Whether the key should be present or absent.
  pub state: State,
  /// Back up the destination before changing it.
  pub backup: bool,
  /// Create the destination (and parent directories) when missing.
  pub create: bool,
  /// Decide and report only; never write.
  pub check: bool,
  /// Capture before/after snapshots of the document.
  pub diff: bool,
}

impl Default for EditOptions {
  fn default() -> Self {
    Self {
      dest: PathBuf::new(),
      key: String::new(),
      value: None,
      state: State::Present,
      backup: false,
      create: true,
      check: false,
      diff: false,
    }
  }
}

/// The result of a single edit operation.
#[derive(Debug)]
pub struct EditOutcome {
  /// Whether the document needed to change
  pub changed: bool,
  /// What happened
  pub message: EditMessage,
  /// The destination path, echoed back
  pub path: PathBuf,
  /// Where the pre-change backup landed, if one was taken
  pub backup_file: Option<PathBuf>,
  /// Before/after snapshots, if requested
  pub diff: Option<DiffRecord>,
}

#[cfg(test)]
mod tests {
  use super::*;

  fn document(yaml: &str) -> Mapping {
    serde_yaml::from_str(yaml).unwrap()
  }

  #[test]
  fn test_decode_empty_and_null() {
    let dest = Path::new("test.yaml");

    assert_eq!(YamlEdit::decode("", dest).unwrap(), Mapping::new());
    assert_eq!(YamlEdit::decode("  \n", dest).unwrap(), Mapping::new());
    assert_eq!(YamlEdit::decode("---\n", dest).unwrap(), Mapping::new());
  }

  #[test]
  fn test_decode_rejects_non_mapping_root() {
    let dest = Path::new("test.yaml");

    let result = YamlEdit::decode("- a\n- b\n", dest);
    assert!(matches!(result, Err(EditError::RootNotMapping(_))));

    let result = YamlEdit::decode("just a scalar", dest);
    assert!(matches!(result, Err(EditError::RootNotMapping(_))));
  }

  #[test]
  fn test_decode_invalid_yaml() {
    let dest = Path::new("test.yaml");

    let result = YamlEdit::decode("foo: [unclosed", dest);
    assert!(matches!(result, Err(EditError::Decode { .. })));
  }

  #[test]
  fn test_ensure_present_decisions() {
    let path: KeyPath = "foo".try_into().unwrap();

    // Value already matches
    let mut doc = document("foo: 1");
    let (changed, message) = YamlEdit::ensure_present(&mut doc, &path, Value::from(1));
    assert!(!changed);
    assert_eq!(message, EditMessage::Ok);

    // Value differs
    let mut doc = document("foo: 1");
    let (changed, message) = YamlEdit::ensure_present(&mut doc, &path, Value::from(2));
    assert!(changed);
    assert_eq!(message, EditMessage::ValueChanged);
    assert_eq!(doc, document("foo: 2"));

    // Key missing
    let nested: KeyPath = "bar.baz".try_into().unwrap();
    let mut doc = document("foo: 1");
    let (changed, message) = YamlEdit::ensure_present(&mut doc, &nested, Value::from(2));
    assert!(changed);
    assert_eq!(message, EditMessage::KeyAdded);
    assert_eq!(doc, document("foo: 1\nbar:\n  baz: 2"));
  }

  #[test]
  fn test_ensure_absent_decisions() {
    let path: KeyPath = "foo".try_into().unwrap();

    let mut doc = document("foo: 1\nbar: 2");
    let (changed, message) = YamlEdit::ensure_absent(&mut doc, &path);
    assert!(changed);
    assert_eq!(message, EditMessage::KeyRemoved);
    assert_eq!(doc, document("bar: 2"));

    let (changed, message) = YamlEdit::ensure_absent(&mut doc, &path);
    assert!(!changed);
    assert_eq!(message, EditMessage::Ok);
  }

  #[test]
  fn test_diff_record_empty_sides() {
    let record = DiffRecord::new(Path::new("test.yaml"), "", "foo: 1\n");

    assert_eq!(record.before, "\n");
    assert_eq!(record.after, "foo: 1\n");
    assert_eq!(record.before_header, "test.yaml (content)");
    assert_eq!(record.after_header, "test.yaml (content)");
  }

  #[test]
  fn test_diff_unified_rendering() {
    let record = DiffRecord::new(Path::new("test.yaml"), "foo: 1\n", "foo: 1\nbar: 2\n");
    let rendered = record.to_unified();

    assert!(rendered.starts_with("--- test.yaml (content)\n+++ test.yaml (content)\n"));
    assert!(rendered.contains(" foo: 1\n"));
    assert!(rendered.contains("+bar: 2\n"));
  }

  #[test]
  fn test_message_display() {
    assert_eq!(EditMessage::Ok.to_string(), "OK");
    assert_eq!(EditMessage::KeyAdded.to_string(), "key added");
    assert_eq!(EditMessage::ValueChanged.to_string(), "value changed");
    assert_eq!(EditMessage::KeyRemoved.to_string(), "key removed");
  }
}
