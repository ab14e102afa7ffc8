//! Variable substitution in statement text.
//!
//! Two namespaces are supported:
//!
//! - `$NAME`, `${NAME}` and `&NAME` resolve against the job variables first,
//!   then the process environment.
//! - `{NAME}` resolves against the job variables only.
//!
//! Unresolved tokens are left exactly as written, so literal braces in query
//! text (object constants, `CASE` expressions in generated SQL) survive.

use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::OnceLock;

fn variable_token() -> &'static Regex {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    TOKEN.get_or_init(|| Regex::new(r"(\$|&)(\w+|\{([^}]*)\})").expect("valid variable regex"))
}

pub(crate) fn param_token() -> &'static Regex {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    TOKEN.get_or_init(|| Regex::new(r"\{([^}]*)\}").expect("valid parameter regex"))
}

/// Returns true when the text may contain `$`/`&` variable tokens.
pub fn has_variable_markers(text: &str) -> bool {
    text.contains('$') || text.contains('&')
}

/// Returns true when the text may contain `{NAME}` parameter tokens.
pub fn has_param_markers(text: &str) -> bool {
    text.contains('{')
}

/// Expanded text plus the names that could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expansion {
    pub text: String,
    pub unresolved: Vec<String>,
}

impl Expansion {
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }
}

type EnvLookup<'a> = Box<dyn Fn(&str) -> Option<String> + 'a>;

/// Resolves variable tokens against job variables and the environment.
pub struct VariableExpander<'a> {
    params: &'a HashMap<String, String>,
    env: EnvLookup<'a>,
}

impl<'a> VariableExpander<'a> {
    /// Expander over `params` and the real process environment.
    pub fn new(params: &'a HashMap<String, String>) -> Self {
        Self {
            params,
            env: Box::new(|name| std::env::var(name).ok()),
        }
    }

    /// Replaces the environment lookup.
    pub fn with_env<F>(mut self, env: F) -> Self
    where
        F: Fn(&str) -> Option<String> + 'a,
    {
        self.env = Box::new(env);
        self
    }

    /// Expands `$NAME`, `${NAME}` and `&NAME` tokens.
    pub fn expand_vars(&self, text: &str) -> Expansion {
        let mut unresolved = Vec::new();
        let expanded = variable_token().replace_all(text, |caps: &Captures| {
            let name = caps
                .get(3)
                .or_else(|| caps.get(2))
                .map_or("", |m| m.as_str());
            match self.params.get(name).cloned().or_else(|| (self.env)(name)) {
                Some(value) => value,
                None => {
                    push_unique(&mut unresolved, name);
                    caps[0].to_string()
                }
            }
        });

        Expansion {
            text: expanded.into_owned(),
            unresolved,
        }
    }

    /// Expands `{NAME}` tokens from the job variables.
    pub fn expand_params(&self, text: &str) -> Expansion {
        let mut unresolved = Vec::new();
        let expanded = param_token().replace_all(text, |caps: &Captures| {
            let name = &caps[1];
            match self.params.get(name) {
                Some(value) => value.clone(),
                None => {
                    push_unique(&mut unresolved, name);
                    caps[0].to_string()
                }
            }
        });

        Expansion {
            text: expanded.into_owned(),
            unresolved,
        }
    }

    /// Runs both passes: variables first, then parameters.
    pub fn expand(&self, text: &str) -> Expansion {
        let vars = self.expand_vars(text);
        let params = self.expand_params(&vars.text);

        let mut unresolved = vars.unresolved;
        for name in params.unresolved {
            push_unique(&mut unresolved, &name);
        }

        Expansion {
            text: params.text,
            unresolved,
        }
    }
}

fn push_unique(names: &mut Vec<String>, name: &str) {
    if !names.iter().any(|n| n == name) {
        names.push(name.to_string());
    }
}

/// Expands environment variables in a file path.
pub fn expand_path(path: &str) -> String {
    let no_params = HashMap::new();
    let expanded = VariableExpander::new(&no_params).expand_vars(path);
    expanded.text
}
