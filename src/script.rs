//! SQL script files: reading, splitting, and running through a job.

use std::fs::{self, File};
use std::path::Path;

use tracing::info;

use crate::error::{BatchError, Result};
use crate::job::Job;
use crate::query::ExecuteOptions;
use crate::runtime::expand::expand_path;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Lexer {
    Code,
    SingleQuote,
    DoubleQuote,
    LineComment,
    BlockComment,
}

/// Splits script text into statements on `;`.
///
/// Semicolons inside quoted strings, quoted identifiers, `--` comments and
/// `/* */` comments do not split. Statements that hold nothing but
/// whitespace and comments are dropped.
pub fn split_statements(text: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut has_code = false;
    let mut state = Lexer::Code;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match state {
            Lexer::Code => match c {
                ';' => {
                    if has_code {
                        statements.push(current.trim().to_string());
                    }
                    current.clear();
                    has_code = false;
                    continue;
                }
                '\'' => state = Lexer::SingleQuote,
                '"' => state = Lexer::DoubleQuote,
                '-' if chars.peek() == Some(&'-') => state = Lexer::LineComment,
                '/' if chars.peek() == Some(&'*') => {
                    current.push(c);
                    current.extend(chars.next());
                    state = Lexer::BlockComment;
                    continue;
                }
                _ => {}
            },
            Lexer::SingleQuote if c == '\'' => state = Lexer::Code,
            Lexer::DoubleQuote if c == '"' => state = Lexer::Code,
            Lexer::LineComment if c == '\n' => state = Lexer::Code,
            Lexer::BlockComment if c == '*' && chars.peek() == Some(&'/') => {
                current.push(c);
                current.extend(chars.next());
                state = Lexer::Code;
                continue;
            }
            _ => {}
        }

        if matches!(state, Lexer::Code | Lexer::SingleQuote | Lexer::DoubleQuote)
            && !c.is_whitespace()
        {
            has_code = true;
        }
        current.push(c);
    }

    if has_code {
        statements.push(current.trim().to_string());
    }
    statements
}

/// Lines of the file at `path` (environment variables expanded), skipping
/// the first `skip`. A missing file reads as no lines.
pub fn readrun(path: &str, skip: usize) -> Result<Vec<String>> {
    let expanded = expand_path(path);
    if !Path::new(&expanded).is_file() {
        return Ok(Vec::new());
    }
    let text = fs::read_to_string(&expanded)
        .map_err(|e| BatchError::io(format!("Cannot read {expanded}: {e}")))?;
    Ok(text.lines().skip(skip).map(String::from).collect())
}

pub fn file_exists_and_readable(path: &str) -> bool {
    File::open(expand_path(path)).is_ok()
}

/// Runs every statement of a script file, in order.
///
/// Stops at the first `Err`; with `exit_on_error` off, failed statements are
/// recorded and the script goes on.
pub async fn run_script(job: &mut Job, path: &Path, options: &ExecuteOptions) -> Result<()> {
    let text = fs::read_to_string(path)
        .map_err(|e| BatchError::io(format!("Cannot read script {}: {e}", path.display())))?;
    let statements = split_statements(&text);
    info!("Running {} statement(s) from {}", statements.len(), path.display());

    for sql in &statements {
        job.execute_with(sql, options).await?;
    }
    Ok(())
}
