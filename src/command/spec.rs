//! Immutable command specifications.
//!
//! A [`CommandSpec`] fully describes a child process before it is launched:
//! executable, argument vector, working directory, and additive environment
//! overrides. Specs are built once (directly, from a full command-line string,
//! or by the pattern resolver) and then owned by the worker that consumes them.

use std::borrow::Cow;
use std::path::{Path, PathBuf};

/// Error type for command-line parsing.
#[derive(thiserror::Error, Debug)]
pub enum CommandLineError {
    /// The command line contained no tokens.
    #[error("Command line is empty")]
    Empty,
    /// A quoted section was never closed.
    #[error("Unbalanced quote in command line")]
    UnbalancedQuote,
    /// The command line ended in the middle of an escape sequence.
    #[error("Trailing escape character in command line")]
    TrailingEscape,
}

/// Immutable description of a command to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    executable: PathBuf,
    arguments: Vec<String>,
    working_dir: Option<PathBuf>,
    env: Vec<(String, String)>,
    quote_arguments_if_needed: bool,
}

impl CommandSpec {
    /// Path of the executable to launch.
    #[must_use]
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Ordered argument vector (not including the executable).
    #[must_use]
    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    /// Working directory for the child, if one was set.
    #[must_use]
    pub fn working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }

    /// Environment overrides, applied additively over the inherited
    /// environment. Keys are unique; insertion order is preserved.
    #[must_use]
    pub fn env(&self) -> &[(String, String)] {
        &self.env
    }

    /// Whether arguments should be quoted when the command is rendered as a
    /// single display string.
    #[must_use]
    pub fn quote_arguments_if_needed(&self) -> bool {
        self.quote_arguments_if_needed
    }

    /// Render the command as one display string.
    ///
    /// This string is for reporting and logging; spawning always uses the
    /// argument vector directly and never re-parses this rendering.
    #[must_use]
    pub fn command_line(&self) -> String {
        let mut parts = Vec::with_capacity(self.arguments.len() + 1);
        parts.push(self.executable.display().to_string());
        for arg in &self.arguments {
            if self.quote_arguments_if_needed {
                parts.push(shell_escape::escape(Cow::from(arg.as_str())).into_owned());
            } else {
                parts.push(arg.clone());
            }
        }
        parts.join(" ")
    }
}

/// Builder for [`CommandSpec`].
#[derive(Debug, Clone, Default)]
pub struct CommandSpecBuilder {
    executable: PathBuf,
    arguments: Vec<String>,
    working_dir: Option<PathBuf>,
    env: Vec<(String, String)>,
    quote_arguments_if_needed: bool,
}

impl CommandSpecBuilder {
    /// Create a builder for the given executable.
    #[must_use]
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            ..Default::default()
        }
    }

    /// Create a builder by splitting a full command-line string.
    ///
    /// The first token becomes the executable, the rest the argument vector.
    /// Single and double quotes group tokens; backslash escapes the next
    /// character outside single quotes.
    ///
    /// # Errors
    ///
    /// Returns `CommandLineError` if the line is empty or malformed.
    pub fn from_command_line(line: &str) -> Result<Self, CommandLineError> {
        let mut tokens = split_command_line(line)?;
        let executable = PathBuf::from(tokens.remove(0));
        Ok(Self {
            executable,
            arguments: tokens,
            ..Default::default()
        })
    }

    /// Append a single argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.arguments.push(arg.into());
        self
    }

    /// Append several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.arguments.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the working directory for the child.
    #[must_use]
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Add an environment override. Setting the same name twice keeps the
    /// last value; names stay unique.
    #[must_use]
    pub fn env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        if let Some(entry) = self.env.iter_mut().find(|(n, _)| *n == name) {
            entry.1 = value;
        } else {
            self.env.push((name, value));
        }
        self
    }

    /// Control quoting of arguments in the rendered display command line.
    #[must_use]
    pub fn quote_arguments_if_needed(mut self, quote: bool) -> Self {
        self.quote_arguments_if_needed = quote;
        self
    }

    /// Finish building the spec.
    #[must_use]
    pub fn build(self) -> CommandSpec {
        CommandSpec {
            executable: self.executable,
            arguments: self.arguments,
            working_dir: self.working_dir,
            env: self.env,
            quote_arguments_if_needed: self.quote_arguments_if_needed,
        }
    }
}

/// Split a full command line into tokens, honoring quotes and escapes.
///
/// # Errors
///
/// Returns `CommandLineError` if the line is empty, a quote is unbalanced, or
/// the line ends mid-escape.
pub fn split_command_line(line: &str) -> Result<Vec<String>, CommandLineError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;

    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                } else if c == '\\' && q == '"' {
                    let escaped = chars.next().ok_or(CommandLineError::TrailingEscape)?;
                    current.push(escaped);
                } else {
                    current.push(c);
                }
            }
            None => {
                if c.is_whitespace() {
                    if in_token {
                        tokens.push(std::mem::take(&mut current));
                        in_token = false;
                    }
                } else if c == '"' || c == '\'' {
                    quote = Some(c);
                    in_token = true;
                } else if c == '\\' {
                    let escaped = chars.next().ok_or(CommandLineError::TrailingEscape)?;
                    current.push(escaped);
                    in_token = true;
                } else {
                    current.push(c);
                    in_token = true;
                }
            }
        }
    }

    if quote.is_some() {
        return Err(CommandLineError::UnbalancedQuote);
    }
    if in_token {
        tokens.push(current);
    }
    if tokens.is_empty() {
        return Err(CommandLineError::Empty);
    }
    Ok(tokens)
}
