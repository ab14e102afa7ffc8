//! Job parameters and bind-parameter rewriting.

use crate::db::{DatabaseBackend, Value};
use super::expand::param_token;
use regex::Captures;
use std::collections::HashMap;
use tracing::info;

const PARAM_PREFIX: &str = "--param-";

/// True for `--param-NAME=VALUE` style arguments.
pub fn is_param_arg(arg: &str) -> bool {
    arg.starts_with(PARAM_PREFIX)
}

/// Collects `--param-NAME=VALUE` arguments; everything else is ignored.
pub fn read_param_args<I, S>(args: I) -> HashMap<String, String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let variables: HashMap<String, String> = args
        .into_iter()
        .filter_map(|arg| {
            let (name, value) = arg.as_ref().strip_prefix(PARAM_PREFIX)?.split_once('=')?;
            Some((name.to_string(), value.to_string()))
        })
        .collect();

    if !variables.is_empty() {
        info!("Using variables {variables:?}");
    }
    variables
}

/// A statement rewritten for positional binding.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundStatement {
    pub sql: String,
    pub values: Vec<Value>,
}

/// Rewrites `{NAME}` tokens naming an entry of `using` to backend placeholders.
///
/// PostgreSQL reuses `$n` for repeated names; SQLite gets one `?` (and one
/// bound value) per occurrence. Braces that do not name a bound value are
/// left alone.
pub fn bind_named(
    sql: &str,
    using: &HashMap<String, Value>,
    backend: DatabaseBackend,
) -> BoundStatement {
    let mut values: Vec<Value> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    let rewritten = param_token().replace_all(sql, |caps: &Captures| {
        let name = &caps[1];
        let Some(value) = using.get(name) else {
            return caps[0].to_string();
        };

        if backend.reuses_placeholders() {
            if let Some(index) = positions.get(name) {
                return backend.placeholder(*index);
            }
        }

        values.push(value.clone());
        let index = values.len();
        positions.insert(name.to_string(), index);
        backend.placeholder(index)
    });

    BoundStatement {
        sql: rewritten.into_owned(),
        values,
    }
}

/// Builds a `using` map from name/value pairs.
pub fn using<I, K, V>(pairs: I) -> HashMap<String, Value>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}
