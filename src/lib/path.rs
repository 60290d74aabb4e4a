use std::convert::TryFrom;

use serde_yaml::{Mapping, Value};

#[cfg(feature = "tracing")]
use tracing::trace;

const SEPARATOR: char = '.';

/// A dotted key such as `some.nested.setting`, split into segments.
///
/// Segments borrow from the input string; no segment may be empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPath<'a> {
  segments: Vec<&'a str>,
}

impl<'a> TryFrom<&'a str> for KeyPath<'a> {
  type Error = PathError;

  fn try_from(s: &'a str) -> Result<Self, Self::Error> {
    if s.is_empty() {
      return Err(PathError::Empty);
    }

    let segments: Vec<&str> = s.split(SEPARATOR).collect();
    if segments.iter().any(|segment| segment.is_empty()) {
      return Err(PathError::EmptySegment(s.to_string()));
    }

    #[cfg(feature = "tracing")]
    trace!("Parsed key {:?} into {} segments", s, segments.len());

    Ok(Self { segments })
  }
}

impl<'a> KeyPath<'a> {
  pub fn segments(&self) -> &[&'a str] {
    &self.segments
  }

  /// Looks up the value at this path, walking nested mappings from the root.
  ///
  /// Returns `None` when an intermediate segment is missing or the value
  /// there is not a mapping. Absence is an ordinary outcome, not an error.
  pub fn resolve<'v>(&self, root: &'v Mapping) -> Option<&'v Value> {
    let mut segments = self.segments.iter();
    let mut current = root.get(*segments.next()?)?;

    for segment in segments {
      current = current.as_mapping()?.get(*segment)?;
    }

    Some(current)
  }

  /// Removes the key at this path from the tree, returning the removed value.
  ///
  /// The parent mapping is resolved first; removal preserves the order of the
  /// remaining keys. Returns `None` when the parent walk fails or the final
  /// key is already absent.
  pub fn remove(&self, root: &mut Mapping) -> Option<Value> {
    let (last, parents) = self.segments.split_last()?;

    let mut current = root;
    for segment in parents {
      current = current.get_mut(*segment)?.as_mapping_mut()?;
    }

    #[cfg(feature = "tracing")]
    trace!("Removing key {:?}", last);

    current.remove(*last)
  }
}

/// Errors from parsing a dotted key.
#[derive(Debug, thiserror::Error)]
pub enum PathError {
  /// The key was the empty string
  #[error("Key must not be empty")]
  Empty,
  /// The key contained an empty segment, e.g. `a..b`
  #[error("Key contains an empty segment: {0}")]
  EmptySegment(String),
}
