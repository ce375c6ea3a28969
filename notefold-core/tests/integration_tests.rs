//! Integration tests for notefold-core
//!
//! These tests run whole merge and split operations against a vault on disk,
//! covering footnotes, backlinks, front matter and heading merges together.

use notefold_core::{
    ComposeOutcome, ComposeReport, Composer, Config, DocumentStore, FrontmatterStrategy, FsVault,
    Phase, Replacement, Selection, TargetChoice,
};
use notefold_core::config::ComposeConfig;
use notefold_core::links::LinkFormat;
use serde_yaml::Value;
use std::fs;
use tempfile::TempDir;

/// Helper to create a vault holding `files`
/// Returns (TempDir, FsVault) - keep the directory alive for the duration of the test
fn create_vault(files: &[(&str, &str)]) -> (TempDir, FsVault) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    for (path, text) in files {
        let abs = dir.path().join(path);
        if let Some(parent) = abs.parent() {
            fs::create_dir_all(parent).expect("Failed to create folder");
        }
        fs::write(abs, text).expect("Failed to write test content");
    }
    let vault = FsVault::open(dir.path()).expect("Failed to open vault");
    (dir, vault)
}

fn config_with(edit: impl FnOnce(&mut ComposeConfig)) -> Config {
    let mut config = Config::default();
    edit(&mut config.compose);
    config
}

fn into_file(path: &str) -> Option<TargetChoice> {
    Some(TargetChoice::File { path: path.into() })
}

fn new_file(title: &str) -> Option<TargetChoice> {
    Some(TargetChoice::NewFile { title: title.into() })
}

fn done(outcome: ComposeOutcome) -> ComposeReport {
    match outcome {
        ComposeOutcome::Done(report) => report,
        other => panic!("expected a finished operation, got {other:?}"),
    }
}

fn read(vault: &FsVault, path: &str) -> String {
    vault.read(path).expect("Failed to read document")
}

#[test]
fn integration_merge_appends_and_deletes_source() {
    let (_dir, vault) = create_vault(&[
        ("A.md", "body text"),
        ("B.md", "---\ntitle: B\n---\n# B\nexisting"),
    ]);
    let config = Config::default();
    let composer = Composer::new(&vault, &config).expect("valid config");

    let report = done(composer.merge("A.md", &mut into_file("B.md")).expect("merge"));

    assert_eq!(read(&vault, "B.md"), "---\ntitle: B\n---\n# B\nexisting\nbody text");
    assert!(!vault.exists("A.md"));
    assert!(!report.created_target);
    assert_eq!(
        report.phases,
        vec![
            Phase::SelectingTarget,
            Phase::ExtractingContent,
            Phase::Reconciling,
            Phase::Writing,
            Phase::FixingBacklinks,
            Phase::Done,
        ]
    );
}

#[test]
fn integration_merge_prepends_when_asked() {
    let (_dir, vault) = create_vault(&[("A.md", "new"), ("B.md", "old\n")]);
    let config = config_with(|c| c.insert_mode = notefold_core::InsertMode::Prepend);
    let composer = Composer::new(&vault, &config).expect("valid config");

    done(composer.merge("A.md", &mut into_file("B.md")).expect("merge"));

    assert_eq!(read(&vault, "B.md"), "new\nold\n");
}

#[test]
fn integration_merge_repoints_backlinks() {
    let (_dir, vault) = create_vault(&[
        ("A.md", "# Topic\nmoved"),
        ("B.md", "target"),
        ("C.md", "see [[A]], [[A#Topic]] and [[A|A]]"),
        ("D.md", "unrelated [[B]]"),
    ]);
    let config = Config::default();
    let composer = Composer::new(&vault, &config).expect("valid config");

    let report = done(composer.merge("A.md", &mut into_file("B.md")).expect("merge"));

    assert_eq!(read(&vault, "C.md"), "see [[B]], [[B#Topic]] and [[B|B]]");
    assert_eq!(read(&vault, "D.md"), "unrelated [[B]]");
    assert_eq!(report.files_updated, 1);
    assert_eq!(report.links_updated, 3);
    assert!(report.notices.is_empty());
}

#[test]
fn integration_merge_with_heading_merge() {
    let (_dir, vault) = create_vault(&[
        ("A.md", "# Tasks\n- two\n"),
        ("B.md", "# Tasks\n- one\n# Notes\nn\n"),
    ]);
    let config = config_with(|c| c.heading_merge = true);
    let composer = Composer::new(&vault, &config).expect("valid config");

    done(composer.merge("A.md", &mut into_file("B.md")).expect("merge"));

    assert_eq!(read(&vault, "B.md"), "# Tasks\n- one\n- two\n# Notes\nn\n");
}

#[test]
fn integration_merge_preserve_both_front_matter() {
    let (_dir, vault) = create_vault(&[
        ("A.md", "---\ntitle: A\ntags: [x]\n---\nbody"),
        ("B.md", "---\ntitle: B\n---\nold"),
    ]);
    let config = config_with(|c| c.frontmatter_strategy = FrontmatterStrategy::PreserveBoth);
    let composer = Composer::new(&vault, &config).expect("valid config");

    done(composer.merge("A.md", &mut into_file("B.md")).expect("merge"));

    let text = read(&vault, "B.md");
    let (fm, body) = notefold_core::front_matter::split(&text).expect("front matter parses");
    let fm = fm.expect("front matter present");
    assert_eq!(body, "old\nbody");
    assert_eq!(fm.get("title").and_then(Value::as_str), Some("B"));
    let merged = fm
        .get("__merged")
        .and_then(Value::as_mapping)
        .expect("merged block");
    assert_eq!(merged.get("__from").and_then(Value::as_str), Some("A.md"));
    assert!(merged.get("__mergeDate").and_then(Value::as_str).is_some());
    assert_eq!(
        merged.get("tags"),
        Some(&Value::Sequence(vec![Value::from("x")]))
    );
}

#[test]
fn integration_split_copies_referenced_footnote() {
    let source = "see [^1]\n[^1]: note";
    let (_dir, vault) = create_vault(&[("A.md", source)]);
    let config = Config::default();
    let composer = Composer::new(&vault, &config).expect("valid config");

    let selection = Selection::new([(0, 8)]);
    let report = done(
        composer
            .split("A.md", Some(selection), &mut new_file("Idea"))
            .expect("split"),
    );

    assert!(report.created_target);
    assert_eq!(report.target, "Idea.md");
    assert_eq!(read(&vault, "Idea.md"), "see [^1]\n[^1]: note");
    assert_eq!(read(&vault, "A.md"), "[[Idea]]\n[^1]: note");
    assert!(report.footnotes_renamed.is_empty());
}

#[test]
fn integration_split_renames_colliding_footnote() {
    let (_dir, vault) = create_vault(&[
        ("A.md", "see [^1]\n[^1]: note"),
        ("B.md", "intro[^1]\n\n[^1]: existing\n"),
    ]);
    let config = Config::default();
    let composer = Composer::new(&vault, &config).expect("valid config");

    let report = done(
        composer
            .split("A.md", Some(Selection::new([(0, 8)])), &mut into_file("B.md"))
            .expect("split"),
    );

    let target = read(&vault, "B.md");
    assert!(target.starts_with("intro[^1]\n\n[^1]: existing\n"));
    assert!(target.contains("see [^1-1]"));
    assert!(target.ends_with("[^1-1]: note"));
    assert_eq!(report.footnotes_renamed.get("1").map(String::as_str), Some("1-1"));
}

#[test]
fn integration_split_restores_definition_still_referenced() {
    let source = "para [^a]\n\nmoved [^a]\n[^a]: def\n";
    let (_dir, vault) = create_vault(&[("A.md", source)]);
    let config = Config::default();
    let composer = Composer::new(&vault, &config).expect("valid config");

    let selection = Selection::new([(11, source.len())]);
    let report = done(
        composer
            .split("A.md", Some(selection), &mut new_file("Moved"))
            .expect("split"),
    );

    assert_eq!(read(&vault, "Moved.md"), "moved [^a]\n[^a]: def\n");
    assert_eq!(read(&vault, "A.md"), "para [^a]\n\n[[Moved]]\n[^a]: def");
    assert_eq!(report.notices.len(), 1);
}

#[test]
fn integration_split_replacement_modes() {
    for (mode, expected) in [
        (Replacement::Link, "keep\n[[Part]]"),
        (Replacement::Embed, "keep\n![[Part]]"),
        (Replacement::None, "keep\n"),
    ] {
        let (_dir, vault) = create_vault(&[("A.md", "keep\nmove me")]);
        let config = config_with(|c| c.replacement = mode);
        let composer = Composer::new(&vault, &config).expect("valid config");

        done(
            composer
                .split("A.md", Some(Selection::new([(5, 12)])), &mut new_file("Part"))
                .expect("split"),
        );

        assert_eq!(read(&vault, "A.md"), expected, "replacement {mode}");
        assert_eq!(read(&vault, "Part.md"), "move me");
    }
}

#[test]
fn integration_split_markdown_replacement_link() {
    let (_dir, vault) = create_vault(&[("notes/A.md", "keep\nmove me")]);
    let config = config_with(|c| c.link_format = LinkFormat::Markdown);
    let composer = Composer::new(&vault, &config).expect("valid config");

    let report = done(
        composer
            .split("notes/A.md", Some(Selection::new([(5, 12)])), &mut new_file("Part"))
            .expect("split"),
    );

    assert_eq!(report.target, "notes/Part.md");
    assert_eq!(read(&vault, "notes/A.md"), "keep\n[Part](Part.md)");
}

#[test]
fn integration_split_section_repairs_backlinks() {
    let source = "see [[#Move]]\n# Move\ny";
    let (_dir, vault) = create_vault(&[
        ("S.md", source),
        ("R.md", "[[S#Move]] and [[S#Other]]"),
    ]);
    let config = Config::default();
    let composer = Composer::new(&vault, &config).expect("valid config");

    let report = done(
        composer
            .split("S.md", Some(Selection::new([(14, source.len())])), &mut new_file("T"))
            .expect("split"),
    );

    assert_eq!(read(&vault, "T.md"), "# Move\ny");
    assert_eq!(read(&vault, "S.md"), "see [[T#Move]]\n[[T]]");
    assert_eq!(read(&vault, "R.md"), "[[T#Move]] and [[S#Other]]");
    assert_eq!(report.files_updated, 2);
    assert_eq!(report.links_updated, 2);
}

#[test]
fn integration_split_whole_document_by_default() {
    let (_dir, vault) = create_vault(&[("A.md", "all of it")]);
    let config = Config::default();
    let composer = Composer::new(&vault, &config).expect("valid config");

    done(composer.split("A.md", None, &mut new_file("Everything")).expect("split"));

    assert_eq!(read(&vault, "Everything.md"), "all of it");
    assert_eq!(read(&vault, "A.md"), "[[Everything]]");
}

#[test]
fn integration_split_empty_selection_fails() {
    let (_dir, vault) = create_vault(&[("A.md", "text"), ("B.md", "b")]);
    let config = Config::default();
    let composer = Composer::new(&vault, &config).expect("valid config");

    let result = composer.split("A.md", Some(Selection::new([(2, 2)])), &mut into_file("B.md"));

    assert!(result.is_err());
    assert_eq!(read(&vault, "A.md"), "text");
    assert_eq!(read(&vault, "B.md"), "b");
}

#[test]
fn integration_split_template_wraps_content() {
    let (_dir, vault) = create_vault(&[("A.md", "keep\nmove me")]);
    let config = config_with(|c| c.split_template = "from {{fromTitle}}:\n{{content}}".into());
    let composer = Composer::new(&vault, &config).expect("valid config");

    done(
        composer
            .split("A.md", Some(Selection::new([(5, 12)])), &mut new_file("Part"))
            .expect("split"),
    );

    assert_eq!(read(&vault, "Part.md"), "from A:\nmove me");
}

#[test]
fn integration_split_multiple_ranges() {
    let (_dir, vault) = create_vault(&[("A.md", "one\ntwo\nthree\nfour")]);
    let config = Config::default();
    let composer = Composer::new(&vault, &config).expect("valid config");

    done(
        composer
            .split("A.md", Some(Selection::new([(8, 13), (0, 3)])), &mut new_file("Part"))
            .expect("split"),
    );

    assert_eq!(read(&vault, "Part.md"), "one\nthree");
    assert_eq!(read(&vault, "A.md"), "[[Part]]\ntwo\n\nfour");
}

#[test]
fn integration_split_keeps_thematic_breaks() {
    let (_dir, vault) = create_vault(&[("A.md", "intro\n---\nA quoted aside\n---\nend")]);
    let config = Config::default();
    let composer = Composer::new(&vault, &config).expect("valid config");

    done(
        composer
            .split("A.md", Some(Selection::new([(6, 29)])), &mut new_file("Part"))
            .expect("split"),
    );

    assert_eq!(read(&vault, "Part.md"), "---\nA quoted aside\n---\n");
    assert_eq!(read(&vault, "A.md"), "intro\n[[Part]]end");
}

#[test]
fn integration_split_from_middle_never_takes_front_matter() {
    let (_dir, vault) = create_vault(&[
        ("A.md", "intro\n---\nkey: value\n---\nend"),
        ("B.md", "---\ntitle: B\n---\nold"),
    ]);
    let config = Config::default();
    let composer = Composer::new(&vault, &config).expect("valid config");

    done(
        composer
            .split("A.md", Some(Selection::new([(6, 25)])), &mut into_file("B.md"))
            .expect("split"),
    );

    assert_eq!(
        read(&vault, "B.md"),
        "---\ntitle: B\n---\nold\n---\nkey: value\n---\n"
    );
    assert_eq!(read(&vault, "A.md"), "intro\n[[B]]end");
}

#[test]
fn integration_heading_merge_applies_template_per_section() {
    let (_dir, vault) = create_vault(&[
        ("S.md", "# A\nnew\n# B\nb\n"),
        ("T.md", "# A\nold\n"),
    ]);
    let config = config_with(|c| {
        c.heading_merge = true;
        c.merge_template = "from {{fromTitle}}:\n{{content}}".into();
    });
    let composer = Composer::new(&vault, &config).expect("valid config");

    done(composer.merge("S.md", &mut into_file("T.md")).expect("merge"));

    assert_eq!(
        read(&vault, "T.md"),
        "# A\nold\nfrom S:\nnew\n# B\nfrom S:\nb\n"
    );
}
