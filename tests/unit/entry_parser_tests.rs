//! Unit tests for entry-file parsing and suite loading.
//!
//! Covers:
//! - `TEST(name);` registration with and without directive blocks
//! - directive accumulation across consecutive comment blocks
//! - copyright block discarding
//! - malformed entry files and unknown directives
//! - merge semantics across files and C table rendering

use std::fs;
use std::path::PathBuf;

use roost::entries::{
    discover_entry_files, load_suite, parse_entries, render_entry_table, Suite, TestEntry,
};
use roost::protocol::Message;
use roost::HarnessError;

// ── Parsing a single file ────────────────────────────────────────────────────

/// A lone registration line produces an entry with no directives.
#[test]
fn single_test_without_directives() {
    let entries = parse_entries("TEST(alpha);\n").expect("parse must succeed");

    assert_eq!(
        entries,
        vec![TestEntry {
            name: "alpha".to_owned(),
            messages: Vec::new(),
        }]
    );
}

/// Directives in the preceding comment block attach to the test, in order.
#[test]
fn directives_attach_to_next_test() {
    let text = "\
/*
$fixture prepare_card
$shutdown
*/
TEST(sd_write);
";
    let entries = parse_entries(text).expect("parse must succeed");

    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, "sd_write");
    assert_eq!(
        entries[0].messages,
        vec![
            Message::with_body("fixture", "prepare_card"),
            Message::new("shutdown"),
        ]
    );
}

/// Messages from consecutive blocks accumulate until a `TEST` line claims
/// them.
#[test]
fn directives_accumulate_across_blocks() {
    let text = "\
/*
$fixture prepare_card
*/

/*
$check verify_card
*/
TEST(sd_write);

TEST(sd_read);
";
    let entries = parse_entries(text).expect("parse must succeed");

    assert_eq!(entries.len(), 2);
    assert_eq!(
        entries[0].messages,
        vec![
            Message::with_body("fixture", "prepare_card"),
            Message::with_body("check", "verify_card"),
        ]
    );
    assert!(
        entries[1].messages.is_empty(),
        "claimed directives must not leak into the next test"
    );
}

/// A block containing a line starting with `copyright` (any case, any line)
/// is dropped wholesale.
#[test]
fn copyright_block_is_discarded() {
    let text = "\
/*
Redistribution notice.
Copyright 2026 Roost Maintainers
*/

/*
$shutdown
*/
TEST(boot);
";
    let entries = parse_entries(text).expect("parse must succeed");

    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].messages, vec![Message::new("shutdown")]);
}

/// A `:stdin` signature directive carries a multi-line payload.
#[test]
fn stdin_signature_directive_parses() {
    let text = "\
/*
:stdin ---
hello
world
---
*/
TEST(echo_lines);
";
    let entries = parse_entries(text).expect("parse must succeed");

    assert_eq!(
        entries[0].messages,
        vec![Message::with_body("stdin", "hello\nworld")]
    );
}

/// Anything that is not a registration, comment delimiter, or blank line is
/// rejected.
#[test]
fn unexpected_line_is_rejected() {
    let result = parse_entries("int main(void) { return 0; }\n");

    match result {
        Err(HarnessError::Entries(msg)) => assert!(
            msg.contains("unexpected line"),
            "error must mention the unexpected line, got: {msg}"
        ),
        other => panic!("expected Err(HarnessError::Entries), got: {other:?}"),
    }
}

/// A registration line with a name outside `[A-Za-z0-9_]` is not a
/// registration at all.
#[test]
fn test_name_with_invalid_characters_is_rejected() {
    let result = parse_entries("TEST(sd-write);\n");

    assert!(
        matches!(result, Err(HarnessError::Entries(_))),
        "hyphenated name must be rejected, got: {result:?}"
    );
}

/// Directive text the framer cannot fully consume is rejected.
#[test]
fn unterminated_directive_is_rejected() {
    let text = "\
/*
:stdin ---
never terminated
*/
TEST(alpha);
";
    let result = parse_entries(text);

    match result {
        Err(HarnessError::Entries(msg)) => assert!(
            msg.contains("unparsed directive text"),
            "error must mention unparsed text, got: {msg}"
        ),
        other => panic!("expected Err(HarnessError::Entries), got: {other:?}"),
    }
}

/// A comment block left open at end of file is silently ignored.
#[test]
fn dangling_comment_is_ignored() {
    let text = "\
TEST(alpha);
/*
$fixture prepare_card
";
    let entries = parse_entries(text).expect("parse must succeed");

    assert_eq!(entries.len(), 1, "only the closed portion counts");
    assert!(entries[0].messages.is_empty());
}

// ── Suite loading ────────────────────────────────────────────────────────────

/// Files are discovered recursively and alphabetically.
#[test]
fn discovery_is_recursive_and_ordered() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::create_dir(dir.path().join("nested")).expect("mkdir");
    fs::write(dir.path().join("b.t"), "TEST(beta);\n").expect("write b.t");
    fs::write(dir.path().join("a.t"), "TEST(alpha);\n").expect("write a.t");
    fs::write(dir.path().join("nested/c.t"), "TEST(gamma);\n").expect("write c.t");
    fs::write(dir.path().join("ignored.c"), "int x;\n").expect("write ignored.c");

    let files = discover_entry_files(dir.path()).expect("discover");
    let names: Vec<String> = files
        .iter()
        .map(|p| {
            p.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        })
        .collect();

    assert_eq!(names, vec!["a.t", "b.t", "c.t"]);
}

/// A later file redefining a test keeps the first definition's position but
/// takes the new directives.
#[test]
fn redefinition_keeps_position_and_replaces_messages() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(
        dir.path().join("a.t"),
        "/*\n$shutdown\n*/\nTEST(alpha);\n\nTEST(beta);\n",
    )
    .expect("write a.t");
    fs::write(
        dir.path().join("b.t"),
        "/*\n$fixture prepare_card\n*/\nTEST(alpha);\n",
    )
    .expect("write b.t");

    let suite = load_suite(dir.path()).expect("load");

    assert_eq!(suite.entries.len(), 2);
    assert_eq!(suite.entries[0].name, "alpha");
    assert_eq!(
        suite.entries[0].messages,
        vec![Message::with_body("fixture", "prepare_card")],
        "the redefinition's directives must win"
    );
    assert_eq!(suite.entries[1].name, "beta");
}

/// Unknown directive names fail validation with the offending test named.
#[test]
fn unknown_directive_fails_validation() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(
        dir.path().join("a.t"),
        "/*\n$explode now\n*/\nTEST(alpha);\n",
    )
    .expect("write a.t");

    let result = load_suite(dir.path());

    match result {
        Err(HarnessError::Entries(msg)) => {
            assert!(msg.contains("TEST(alpha)"), "must name the test: {msg}");
            assert!(msg.contains("explode"), "must list the directive: {msg}");
        }
        other => panic!("expected Err(HarnessError::Entries), got: {other:?}"),
    }
}

/// An empty source tree is a valid, empty suite.
#[test]
fn empty_tree_is_an_empty_suite() {
    let dir = tempfile::tempdir().expect("tempdir");

    let suite = load_suite(dir.path()).expect("load");

    assert!(suite.files.is_empty());
    assert!(suite.entries.is_empty());
}

// ── Table rendering ──────────────────────────────────────────────────────────

/// The rendered table lists one include per file and one row per entry,
/// closed by the null sentinel.
#[test]
fn entry_table_renders_includes_and_rows() {
    let suite = Suite {
        files: vec![PathBuf::from("tests/a.t"), PathBuf::from("tests/b.t")],
        entries: vec![
            TestEntry {
                name: "alpha".to_owned(),
                messages: Vec::new(),
            },
            TestEntry {
                name: "beta".to_owned(),
                messages: vec![Message::new("shutdown")],
            },
        ],
    };

    let table = render_entry_table(&suite);

    assert_eq!(
        table,
        "#include \"tests/a.t\"\n\
         #include \"tests/b.t\"\n\
         \n\
         struct test_entry test_entries[] = {\n\
         \x20 TEST_ENTRY(alpha),\n\
         \x20 TEST_ENTRY(beta),\n\
         \x20 TEST_ENTRY_NULL,\n\
         };\n"
    );
}
