use serde_yaml::{Mapping, Value};

#[cfg(feature = "tracing")]
use tracing::trace;

use crate::path::KeyPath;

/// Merges `patch` into `base` without discarding sibling keys.
///
/// Keys that hold mappings on both sides are merged recursively; for
/// everything else the patch value replaces the base value outright, so the
/// patch always wins at leaves.
pub fn deep_merge(base: &mut Mapping, patch: Mapping) {
  for (key, value) in patch {
    #[cfg(feature = "tracing")]
    trace!("Merging key {:?}", key);

    merge_value(base.entry(key).or_insert(Value::Null), value);
  }
}

fn merge_value(base: &mut Value, patch: Value) {
  match (base, patch) {
    (Value::Mapping(base_map), Value::Mapping(patch_map)) => deep_merge(base_map, patch_map),
    (slot, value) => *slot = value,
  }
}

/// Builds the single-branch mapping that carries `value` at the leaf of
/// `path`, e.g. `bar.baz` and `2` become `{bar: {baz: 2}}`.
pub fn patch_tree(path: &KeyPath, value: Value) -> Mapping {
  let mut segments = path.segments().iter().rev();

  let Some(leaf) = segments.next() else {
    return Mapping::new();
  };

  let mut node = Mapping::from_iter([(Value::from(*leaf), value)]);
  for segment in segments {
    node = Mapping::from_iter([(Value::from(*segment), Value::Mapping(node))]);
  }

  node
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::convert::TryFrom;

  fn document(yaml: &str) -> Mapping {
    serde_yaml::from_str(yaml).unwrap()
  }

  #[test]
  fn test_merge_preserves_siblings() {
    let mut base = document("a:\n  c: 2");
    let patch = document("a:\n  b: 1");

    deep_merge(&mut base, patch);

    assert_eq!(base, document("a:\n  c: 2\n  b: 1"));
  }

  #[test]
  fn test_merge_replaces_leaf() {
    let mut base = document("a:\n  b: 1");
    let patch = document("a:\n  b: 2");

    deep_merge(&mut base, patch);

    assert_eq!(base, document("a:\n  b: 2"));
  }

  #[test]
  fn test_patch_wins_over_richer_structure() {
    // A scalar patch replaces a whole subtree
    let mut base = document("a:\n  b:\n    deep: tree");
    let patch = document("a:\n  b: flat");

    deep_merge(&mut base, patch);

    assert_eq!(base, document("a:\n  b: flat"));
  }

  #[test]
  fn test_mapping_patch_replaces_scalar() {
    let mut base = document("a: 5");
    let patch = document("a:\n  b: 1");

    deep_merge(&mut base, patch);

    assert_eq!(base, document("a:\n  b: 1"));
  }

  #[test]
  fn test_merge_into_empty() {
    let mut base = Mapping::new();
    let patch = document("a:\n  b: 1");

    deep_merge(&mut base, patch);

    assert_eq!(base, document("a:\n  b: 1"));
  }

  #[test]
  fn test_patch_tree_shape() {
    let path = KeyPath::try_from("bar.baz").unwrap();
    let patch = patch_tree(&path, Value::from(2));

    assert_eq!(patch, document("bar:\n  baz: 2"));
  }

  #[test]
  fn test_patch_tree_single_segment() {
    let path = KeyPath::try_from("foo").unwrap();
    let patch = patch_tree(&path, Value::from("value"));

    assert_eq!(patch, document("foo: value"));
  }
}
