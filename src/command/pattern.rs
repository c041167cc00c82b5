//! Pattern resolver: expands argument templates into finished, quoted
//! argument vectors.
//!
//! Two template forms are supported. The positional form scans each fragment
//! left to right and consumes typed parameters for `{s}` (string), `{f}`
//! (file or folder path) and `{[f]}` (array of paths, each becoming its own
//! argument). The named form replaces every `{attribute}` occurrence with the
//! quoted value of that attribute. Both forms understand `{{` as a literal
//! `{` escape and the repository-root tokens `{r}` / `{R}`.

use std::path::{Path, PathBuf};

/// Error type for pattern resolution.
#[derive(thiserror::Error, Debug)]
pub enum PatternError {
    /// A placeholder was malformed: unknown letter, or the fragment ended
    /// before the closing `}`.
    #[error("Malformed placeholder in \"{fragment}\" at offset {offset}")]
    Syntax { fragment: String, offset: usize },
    /// The pattern consumed more positional parameters than were supplied.
    #[error("Pattern references parameter {index} but only {supplied} were supplied")]
    MissingParameter { index: usize, supplied: usize },
    /// A parameter had the wrong type for its placeholder.
    #[error("Parameter {index} has the wrong type, expected {expected}")]
    ParameterType { index: usize, expected: &'static str },
    /// The pattern referenced `{r}` or `{R}` but no repository root is known.
    #[error("Pattern references the repository root but none is configured")]
    UnresolvedRoot,
}

/// Typed value consumed by the resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternValue {
    /// A plain string.
    Str(String),
    /// A file or folder path.
    Path(PathBuf),
    /// An array of strings or paths; each element resolves to its own
    /// output argument.
    List(Vec<PatternValue>),
}

impl PatternValue {
    /// Convenience constructor for a string value.
    #[must_use]
    pub fn str(value: impl Into<String>) -> Self {
        Self::Str(value.into())
    }

    /// Convenience constructor for a path value.
    #[must_use]
    pub fn path(value: impl Into<PathBuf>) -> Self {
        Self::Path(value.into())
    }
}

/// Precomputed repository location spliced in by `{r}` and `{R}`.
#[derive(Debug, Clone)]
pub struct RepoContext {
    root: PathBuf,
}

impl RepoContext {
    /// Create a context rooted at the given directory.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The repository work-tree root (`{r}`).
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The repository metadata directory (`{R}`), i.e. the root joined with
    /// `.git`.
    #[must_use]
    pub fn git_dir(&self) -> PathBuf {
        self.root.join(".git")
    }
}

/// Default quote character for the target platform's shell convention.
#[must_use]
pub fn default_quote() -> char {
    if cfg!(windows) {
        '"'
    } else {
        '\''
    }
}

fn quoted(value: &str, quote: char) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push(quote);
    out.push_str(value);
    out.push(quote);
    out
}

/// Render a path absolute and platform-native, without touching the
/// filesystem.
fn native_path(path: &Path) -> String {
    std::path::absolute(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .display()
        .to_string()
}

fn path_of(value: &PatternValue, index: usize) -> Result<String, PatternError> {
    match value {
        PatternValue::Str(s) => Ok(native_path(Path::new(s))),
        PatternValue::Path(p) => Ok(native_path(p)),
        PatternValue::List(_) => Err(PatternError::ParameterType {
            index,
            expected: "file or folder path",
        }),
    }
}

fn take_param<'a>(
    params: &'a [PatternValue],
    at: &mut usize,
) -> Result<&'a PatternValue, PatternError> {
    let value = params.get(*at).ok_or(PatternError::MissingParameter {
        index: *at,
        supplied: params.len(),
    })?;
    *at += 1;
    Ok(value)
}

fn root_of(repo: Option<&RepoContext>, capital: bool) -> Result<String, PatternError> {
    let repo = repo.ok_or(PatternError::UnresolvedRoot)?;
    if capital {
        Ok(native_path(&repo.git_dir()))
    } else {
        Ok(native_path(repo.root()))
    }
}

/// Resolve a positional pattern into an argument vector.
///
/// Each fragment yields one output argument, except that every element of a
/// `{[f]}` array becomes a separate argument of its own.
///
/// # Errors
///
/// Returns `PatternError` on malformed placeholders, exhausted or mistyped
/// parameters, or an unresolved `{r}`/`{R}` token.
pub fn resolve_positional(
    fragments: &[String],
    params: &[PatternValue],
    quote: char,
    repo: Option<&RepoContext>,
) -> Result<Vec<String>, PatternError> {
    let mut out = Vec::new();
    let mut next_param = 0usize;

    for fragment in fragments {
        let chars: Vec<char> = fragment.chars().collect();
        let mut current = String::new();
        let mut split_by_list = false;
        let mut i = 0usize;

        let syntax = |offset: usize| PatternError::Syntax {
            fragment: fragment.clone(),
            offset,
        };
        let expect = |pos: usize, want: char| -> Result<(), PatternError> {
            match chars.get(pos) {
                Some(c) if *c == want => Ok(()),
                _ => Err(syntax(pos.min(chars.len()))),
            }
        };
        while i < chars.len() {
            if chars[i] != '{' {
                current.push(chars[i]);
                i += 1;
                continue;
            }

            let open = i;
            let letter = *chars.get(i + 1).ok_or_else(|| syntax(open))?;
            match letter {
                '{' => {
                    current.push('{');
                    i += 2;
                }
                's' => {
                    expect(i + 2, '}')?;
                    i += 3;
                    let index = next_param;
                    match take_param(params, &mut next_param)? {
                        PatternValue::Str(s) => current.push_str(&quoted(s, quote)),
                        _ => {
                            return Err(PatternError::ParameterType {
                                index,
                                expected: "string",
                            })
                        }
                    }
                }
                'f' => {
                    expect(i + 2, '}')?;
                    i += 3;
                    let index = next_param;
                    let value = take_param(params, &mut next_param)?;
                    current.push_str(&quoted(&path_of(value, index)?, quote));
                }
                '[' => {
                    expect(i + 2, 'f')?;
                    expect(i + 3, ']')?;
                    expect(i + 4, '}')?;
                    i += 5;
                    let index = next_param;
                    let value = take_param(params, &mut next_param)?;
                    let PatternValue::List(elements) = value else {
                        return Err(PatternError::ParameterType {
                            index,
                            expected: "array of paths",
                        });
                    };
                    if !current.is_empty() {
                        out.push(std::mem::take(&mut current));
                    }
                    for element in elements {
                        out.push(quoted(&path_of(element, index)?, quote));
                    }
                    split_by_list = true;
                }
                'r' | 'R' => {
                    expect(i + 2, '}')?;
                    i += 3;
                    current.push_str(&quoted(&root_of(repo, letter == 'R')?, quote));
                }
                _ => return Err(syntax(open + 1)),
            }
        }

        if !split_by_list || !current.is_empty() {
            out.push(current);
        }
    }

    Ok(out)
}

/// Resolve a named pattern into an argument vector.
///
/// `{r}`/`{R}` are substituted first; then every `{name}` occurrence is
/// replaced by the quoted value of that attribute. An array-valued attribute
/// replaces the whole fragment with one output argument per element.
/// Attributes not referenced by any fragment are ignored.
///
/// # Errors
///
/// Returns `PatternError::UnresolvedRoot` if `{r}`/`{R}` is referenced
/// without a repository context.
pub fn resolve_named(
    fragments: &[String],
    attributes: &[(String, PatternValue)],
    quote: char,
    repo: Option<&RepoContext>,
) -> Result<Vec<String>, PatternError> {
    let mut out = Vec::new();

    for fragment in fragments {
        let mut text = fragment.clone();
        if text.contains("{r}") {
            text = text.replace("{r}", &quoted(&root_of(repo, false)?, quote));
        }
        if text.contains("{R}") {
            text = text.replace("{R}", &quoted(&root_of(repo, true)?, quote));
        }

        let mut replaced_by_list = false;
        for (index, (name, value)) in attributes.iter().enumerate() {
            let placeholder = format!("{{{name}}}");
            if !text.contains(&placeholder) {
                continue;
            }
            match value {
                PatternValue::Str(s) => {
                    text = text.replace(&placeholder, &quoted(s, quote));
                }
                PatternValue::Path(p) => {
                    text = text.replace(&placeholder, &quoted(&native_path(p), quote));
                }
                PatternValue::List(elements) => {
                    for element in elements {
                        let rendered = match element {
                            PatternValue::Str(s) => quoted(s, quote),
                            PatternValue::Path(p) => quoted(&native_path(p), quote),
                            PatternValue::List(_) => {
                                return Err(PatternError::ParameterType {
                                    index,
                                    expected: "string or path",
                                })
                            }
                        };
                        out.push(rendered);
                    }
                    replaced_by_list = true;
                }
            }
        }

        if !replaced_by_list {
            out.push(text);
        }
    }

    Ok(out)
}
