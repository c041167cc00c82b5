//! Pattern resolver tests over real filesystem paths.

use std::path::Path;

use syswork::command::{
    resolve_named, resolve_positional, CommandSpecBuilder, PatternError, PatternValue, RepoContext,
};

fn fragments(parts: &[&str]) -> Vec<String> {
    parts.iter().map(ToString::to_string).collect()
}

#[test]
fn positional_template_builds_an_argument_vector() {
    let args = resolve_positional(
        &fragments(&["-m", "{s}"]),
        &[PatternValue::str("hello world")],
        '\'',
        None,
    )
    .unwrap();
    assert_eq!(args, vec!["-m", "'hello world'"]);
}

#[test]
fn file_parameters_come_back_absolute_and_quoted() {
    let args = resolve_positional(
        &fragments(&["{f}"]),
        &[PatternValue::path("notes.txt")],
        '\'',
        None,
    )
    .unwrap();

    let arg = &args[0];
    assert!(arg.starts_with('\'') && arg.ends_with('\''));
    let inner = Path::new(arg.trim_matches('\''));
    assert!(inner.is_absolute());
    assert!(inner.ends_with("notes.txt"));
}

#[test]
fn list_elements_become_separate_arguments() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.txt");
    let b = dir.path().join("b.txt");
    let list = PatternValue::List(vec![
        PatternValue::path(&a),
        PatternValue::path(&b),
    ]);

    let args = resolve_positional(&fragments(&["{[f]}"]), &[list], '\'', None).unwrap();
    assert_eq!(args.len(), 2);
    assert!(args[0].contains("a.txt"));
    assert!(args[1].contains("b.txt"));
}

#[test]
fn named_attributes_replace_their_placeholders() {
    let args = resolve_named(
        &fragments(&["--author={author}", "status"]),
        &[("author".to_string(), PatternValue::str("Jo"))],
        '\'',
        None,
    )
    .unwrap();
    assert_eq!(args, vec!["--author='Jo'", "status"]);
}

#[test]
fn repo_root_tokens_expand_against_the_context() {
    let dir = tempfile::tempdir().unwrap();
    let repo = RepoContext::new(dir.path());

    let args = resolve_positional(&fragments(&["{r}", "{R}"]), &[], '\'', Some(&repo)).unwrap();
    assert!(args[0].contains(&dir.path().to_string_lossy().to_string()));
    assert!(args[1].contains(".git"));
}

#[test]
fn root_tokens_without_a_context_fail() {
    let err = resolve_positional(&fragments(&["{r}"]), &[], '\'', None).unwrap_err();
    assert!(matches!(err, PatternError::UnresolvedRoot));
}

#[test]
fn resolved_arguments_feed_a_command_spec() {
    let args = resolve_named(
        &fragments(&["blame", "{file}"]),
        &[(
            "file".to_string(),
            PatternValue::path("/repo/src/lib.rs"),
        )],
        '\'',
        None,
    )
    .unwrap();

    let spec = CommandSpecBuilder::new("git").args(args).build();
    assert_eq!(spec.arguments()[0], "blame");
    assert!(spec.command_line().starts_with("git blame"));
}
