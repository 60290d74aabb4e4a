//! Helper functions for templating expressions.
//!
//! The helpers are exposed twice: as plain typed functions, and through
//! [`builtin_filters`], a name-to-function table built explicitly for a
//! templating engine to consume at initialization. There is no
//! process-global registry.

use std::collections::HashMap;

use serde_yaml::Value;

/// The uniform signature filters are registered under.
pub type Filter = fn(&[Value]) -> Result<Value, FilterError>;

/// Builds the filter table consumed by a templating engine.
///
/// Registered names: `dig` (container first, then keys; misses fall back to
/// null) and `map_format` (values first, pattern last).
pub fn builtin_filters() -> HashMap<&'static str, Filter> {
  HashMap::from([
    ("dig", dig_filter as Filter),
    ("map_format", map_format_filter as Filter),
  ])
}

/// Looks up `keys` one after another, falling back to `default` on a miss.
///
/// After a miss the remaining keys keep looking up against `default`, so a
/// missing container at any depth never raises. Mappings are indexed by key,
/// sequences by integer.
pub fn dig<'a>(container: &'a Value, keys: &[Value], default: &'a Value) -> &'a Value {
  let mut current = container;
  for key in keys {
    current = lookup(current, key).unwrap_or(default);
  }
  current
}

fn lookup<'a>(container: &'a Value, key: &Value) -> Option<&'a Value> {
  match container {
    Value::Mapping(mapping) => mapping.get(key),
    Value::Sequence(sequence) => {
      let index = usize::try_from(key.as_u64()?).ok()?;
      sequence.get(index)
    }
    _ => None,
  }
}

/// Formats `pattern` with `{}`, `{0}` and `{name}` placeholders drawn from
/// `values`.
///
/// Positional placeholders consume `values` in order (`{}`) or by index
/// (`{0}`); named placeholders resolve against mapping-typed values. `{{`
/// and `}}` produce literal braces. Nulls render as `null`.
pub fn map_format(values: &[Value], pattern: &str) -> Result<String, FilterError> {
  let mut output = String::with_capacity(pattern.len());
  let mut chars = pattern.chars().peekable();
  let mut next_positional = 0;

  while let Some(c) = chars.next() {
    match c {
      '{' if chars.peek() == Some(&'{') => {
        chars.next();
        output.push('{');
      }
      '}' if chars.peek() == Some(&'}') => {
        chars.next();
        output.push('}');
      }
      '{' => {
        let mut name = String::new();
        loop {
          match chars.next() {
            Some('}') => break,
            Some(c) => name.push(c),
            None => return Err(FilterError::UnbalancedPattern(pattern.to_string())),
          }
        }

        let value = if name.is_empty() {
          let value = values
            .get(next_positional)
            .ok_or_else(|| FilterError::UnknownPlaceholder(next_positional.to_string()))?;
          next_positional += 1;
          value
        } else if let Ok(index) = name.parse::<usize>() {
          values
            .get(index)
            .ok_or(FilterError::UnknownPlaceholder(name))?
        } else {
          values
            .iter()
            .find_map(|value| {
              value
                .as_mapping()
                .and_then(|mapping| mapping.get(name.as_str()))
            })
            .ok_or(FilterError::UnknownPlaceholder(name))?
        };

        output.push_str(&render_scalar(value)?);
      }
      '}' => return Err(FilterError::UnbalancedPattern(pattern.to_string())),
      c => output.push(c),
    }
  }

  Ok(output)
}

fn render_scalar(value: &Value) -> Result<String, FilterError> {
  match value {
    Value::Null => Ok("null".to_string()),
    Value::Bool(b) => Ok(b.to_string()),
    Value::Number(n) => Ok(n.to_string()),
    Value::String(s) => Ok(s.clone()),
    other => serde_yaml::to_string(other)
      .map(|rendered| rendered.trim_end().to_string())
      .map_err(FilterError::Render),
  }
}

fn dig_filter(args: &[Value]) -> Result<Value, FilterError> {
  let (container, keys) = args
    .split_first()
    .ok_or(FilterError::MissingArgument("container"))?;

  Ok(dig(container, keys, &Value::Null).clone())
}

fn map_format_filter(args: &[Value]) -> Result<Value, FilterError> {
  let (pattern, values) = args
    .split_last()
    .ok_or(FilterError::MissingArgument("pattern"))?;
  let pattern = pattern.as_str().ok_or(FilterError::PatternNotString)?;

  Ok(Value::from(map_format(values, pattern)?))
}

/// Errors from evaluating a template helper.
#[derive(Debug, thiserror::Error)]
pub enum FilterError {
  /// A filter was invoked without a required argument
  #[error("Missing argument: {0}")]
  MissingArgument(&'static str),
  /// The pattern argument was not a string
  #[error("Pattern must be a string")]
  PatternNotString,
  /// A `{` without its `}`, or a bare `}`
  #[error("Unbalanced braces in pattern: {0}")]
  UnbalancedPattern(String),
  /// A placeholder that matches no argument
  #[error("No value for placeholder {{{0}}}")]
  UnknownPlaceholder(String),
  /// A non-scalar value failed to render
  #[error("Failed to render value: {0}")]
  Render(serde_yaml::Error),
}

#[cfg(test)]
mod tests {
  use super::*;

  fn value(yaml: &str) -> Value {
    serde_yaml::from_str(yaml).unwrap()
  }

  #[test]
  fn test_dig_nested() {
    let container = value("a:\n  b: 5");

    let keys = [Value::from("a"), Value::from("b")];
    assert_eq!(dig(&container, &keys, &Value::Null), &Value::from(5));
  }

  #[test]
  fn test_dig_missing_returns_default() {
    let container = value("a: {}");
    let default = Value::from(0);

    let keys = [Value::from("a"), Value::from("b")];
    assert_eq!(dig(&container, &keys, &default), &default);
  }

  #[test]
  fn test_dig_keeps_digging_into_default() {
    // Once the default is returned mid-path, later keys look it up too
    let container = value("a: 1");
    let default = value("b:\n  c: fallback");

    let keys = [Value::from("x"), Value::from("b"), Value::from("c")];
    assert_eq!(dig(&container, &keys, &default), &Value::from("fallback"));
  }

  #[test]
  fn test_dig_sequence_index() {
    let container = value("items:\n  - zero\n  - one");

    let keys = [Value::from("items"), Value::from(1)];
    assert_eq!(dig(&container, &keys, &Value::Null), &Value::from("one"));
  }

  #[test]
  fn test_map_format_positional() {
    let values = [Value::from("db"), Value::from(5432)];

    assert_eq!(map_format(&values, "{}:{}").unwrap(), "db:5432");
    assert_eq!(map_format(&values, "{1}/{0}").unwrap(), "5432/db");
  }

  #[test]
  fn test_map_format_named() {
    let values = [value("host: db\nport: 5432")];

    assert_eq!(
      map_format(&values, "{host}:{port}").unwrap(),
      "db:5432"
    );
  }

  #[test]
  fn test_map_format_escapes() {
    assert_eq!(map_format(&[], "{{}}").unwrap(), "{}");
    assert_eq!(
      map_format(&[Value::from(1)], "{{{}}}").unwrap(),
      "{1}"
    );
  }

  #[test]
  fn test_map_format_errors() {
    assert!(matches!(
      map_format(&[], "{missing}"),
      Err(FilterError::UnknownPlaceholder(_))
    ));
    assert!(matches!(
      map_format(&[], "{unclosed"),
      Err(FilterError::UnbalancedPattern(_))
    ));
    assert!(matches!(
      map_format(&[], "stray}"),
      Err(FilterError::UnbalancedPattern(_))
    ));
  }

  #[test]
  fn test_registry_dispatch() {
    let filters = builtin_filters();

    let dig = filters["dig"];
    let args = [value("a:\n  b: 5"), Value::from("a"), Value::from("b")];
    assert_eq!(dig(&args).unwrap(), Value::from(5));

    // A miss comes back as null
    let args = [value("a: {}"), Value::from("a"), Value::from("b")];
    assert_eq!(dig(&args).unwrap(), Value::Null);

    let map_format = filters["map_format"];
    let args = [Value::from("x"), Value::from("{}!")];
    assert_eq!(map_format(&args).unwrap(), Value::from("x!"));
  }
}
