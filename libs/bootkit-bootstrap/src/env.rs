use regex::{Captures, Regex};
use serde_yaml::{Mapping, Value};
use std::borrow::Cow;
use std::path::Path;
use std::sync::OnceLock;

fn env_token() -> &'static Regex {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    TOKEN.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("env token pattern is valid")
    })
}

/// Expands `${VARNAME}` tokens from the process environment.
///
/// Unset (or non-UTF-8) variables expand to an empty string. Required fields
/// are validated when the document is decoded, not here.
pub fn expand_env(input: &str) -> Cow<'_, str> {
    expand_env_with(input, |name| std::env::var(name).ok())
}

/// Same as [`expand_env`] with an explicit variable lookup.
pub fn expand_env_with<F>(input: &str, lookup: F) -> Cow<'_, str>
where
    F: Fn(&str) -> Option<String>,
{
    env_token().replace_all(input, |caps: &Captures<'_>| {
        let name = &caps[1];
        lookup(name).unwrap_or_else(|| {
            tracing::debug!(var = name, "environment variable not set; expanding to empty");
            String::new()
        })
    })
}

/// Expands every string scalar of a YAML tree in place. Mapping keys are left alone.
pub fn expand_yaml_env(value: &mut Value) {
    expand_yaml_env_with(value, &|name| std::env::var(name).ok());
}

pub(crate) fn expand_yaml_env_with(value: &mut Value, lookup: &dyn Fn(&str) -> Option<String>) {
    match value {
        Value::String(s) => {
            let expanded = match expand_env_with(s, lookup) {
                Cow::Owned(v) => Some(v),
                Cow::Borrowed(_) => None,
            };
            if let Some(v) = expanded {
                *s = v;
            }
        }
        Value::Sequence(items) => {
            for item in items {
                expand_yaml_env_with(item, lookup);
            }
        }
        Value::Mapping(map) => {
            for (_, v) in map.iter_mut() {
                expand_yaml_env_with(v, lookup);
            }
        }
        Value::Tagged(tagged) => expand_yaml_env_with(&mut tagged.value, lookup),
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}

/// Collects `<prefix>A__B=value` variables into a nested mapping `{a: {b: "value"}}`.
///
/// The prefix match ignores ASCII case and keys are lowercased. Values stay
/// strings; numbers and booleans are interpreted when a section is decoded.
pub fn env_overrides(prefix: &str) -> Value {
    env_overrides_from(
        prefix,
        std::env::vars_os().map(|(k, v)| {
            (
                k.to_string_lossy().into_owned(),
                v.to_string_lossy().into_owned(),
            )
        }),
    )
}

pub(crate) fn env_overrides_from<I>(prefix: &str, vars: I) -> Value
where
    I: IntoIterator<Item = (String, String)>,
{
    // Sorted so `A__B` always lands after (and replaces) a scalar `A`.
    let mut vars: Vec<(String, String)> = vars.into_iter().collect();
    vars.sort();

    let mut root = Mapping::new();
    for (name, value) in vars {
        let Some(rest) = strip_prefix_ignore_case(&name, prefix) else {
            continue;
        };
        let path: Vec<String> = rest
            .split("__")
            .map(|seg| seg.trim().to_ascii_lowercase())
            .collect();
        if path.iter().any(String::is_empty) {
            continue;
        }
        insert_path(&mut root, &path, value);
    }
    Value::Mapping(root)
}

fn strip_prefix_ignore_case<'a>(name: &'a str, prefix: &str) -> Option<&'a str> {
    let head = name.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        name.get(prefix.len()..)
    } else {
        None
    }
}

fn insert_path(map: &mut Mapping, path: &[String], value: String) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };
    let mut node = map;
    for seg in parents {
        let key = Value::String(seg.clone());
        let child = node
            .entry(key)
            .or_insert_with(|| Value::Mapping(Mapping::new()));
        if !child.is_mapping() {
            *child = Value::Mapping(Mapping::new());
        }
        let Value::Mapping(next) = child else {
            return;
        };
        node = next;
    }
    node.insert(Value::String(last.clone()), Value::String(value));
}

/// Loads `KEY=value` pairs into the process environment.
///
/// With `None` the usual `.env` lookup (current dir and parents) is used.
/// A missing file is fine; a malformed one is an error. Variables already set
/// in the environment win over the file.
pub fn load_dotenv(path: Option<&Path>) -> anyhow::Result<()> {
    let result = match path {
        Some(p) => dotenvy::from_path(p).map(|_| p.to_path_buf()),
        None => dotenvy::dotenv(),
    };

    match result {
        Ok(loaded) => {
            tracing::debug!(path = %loaded.display(), "loaded environment file");
            Ok(())
        }
        Err(e) if e.not_found() => Ok(()),
        Err(e) => Err(anyhow::Error::new(e).context("failed to load environment file")),
    }
}
