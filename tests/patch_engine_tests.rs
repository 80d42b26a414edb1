use fuzzpatch::{
    apply_hunk, apply_unified_diff, delete_lines, insert_at_line, parse_unified_diff,
    replace_all_exact, replace_block, split_lines, EditError, ErrorKind, FuzzyMatcher, Hunk,
    HunkOp, MatchOptions, PatchError, Workspace,
};
use indoc::indoc;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

// --- Test Helpers ---

/// Creates a file with the given content inside a directory, creating
/// parent directories as needed.
fn create_file(dir: &Path, name: &str, content: &str) {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

/// Reads a file's content back for assertions.
fn read_file(dir: &Path, name: &str) -> String {
    fs::read_to_string(dir.join(name)).unwrap()
}

// --- Fuzzy Matcher Tests ---

#[test]
fn find_exact_match_returns_precise_span() {
    let matcher = FuzzyMatcher::default();
    let span = matcher.find("hello world", "world", 0).unwrap();
    assert_eq!(span.start, 6);
    assert_eq!(span.end, 11);
    assert_eq!(&"hello world"[span.start..span.end], "world");
}

#[test]
fn find_empty_pattern_returns_none() {
    let matcher = FuzzyMatcher::default();
    assert!(matcher.find("hello world", "", 0).is_none());
}

#[test]
fn find_in_empty_text_returns_none() {
    let matcher = FuzzyMatcher::default();
    assert!(matcher.find("", "needle", 0).is_none());
}

#[test]
fn find_tolerates_whitespace_drift() {
    let matcher = FuzzyMatcher::default();
    let content = "fn greet() {\n    println!(\"Hello,   World!\");\n}\n";
    let span = matcher
        .find(content, "println!(\"Hello, World!\");", 0)
        .unwrap();
    assert_eq!(&content[span.start..span.end], "println!(\"Hello,   World!\");");
}

#[test]
fn exact_match_wins_over_closer_fuzzy_candidate() {
    // A near-miss sits right at the expected offset; the exact occurrence
    // is much farther away but must still be preferred.
    let matcher = FuzzyMatcher::default();
    let text = "the needie is here, but much later comes the needle at last";
    let span = matcher.find(text, "needle", 0).unwrap();
    assert_eq!(&text[span.start..span.end], "needle");
    assert_eq!(span.start, text.find("needle").unwrap());
}

#[test]
fn find_rejects_wildly_different_pattern() {
    let matcher = FuzzyMatcher::default();
    assert!(matcher
        .find("alpha beta gamma", "completely unrelated text", 0)
        .is_none());
}

#[test]
fn zero_threshold_disables_fuzzy_matching() {
    let options = MatchOptions::builder().threshold(0.0).build();
    let matcher = FuzzyMatcher::new(options);
    // Exact still works.
    assert!(matcher.find("hello world", "world", 0).is_some());
    // Fuzzy does not.
    assert!(matcher.find("hello world", "wrold", 0).is_none());
}

#[test]
fn find_long_pattern_uses_window_scan() {
    // Over 64 characters, so the Bitap path cannot handle it.
    let original = "The quick brown fox jumps over the lazy dog while the band plays on and on.";
    assert!(original.len() > 64);
    let content = format!("// preamble\n{}\n// postamble\n", original);
    let perturbed = original.replace("lazy dog", "sleepy dog");
    let matcher = FuzzyMatcher::default();
    let span = matcher.find(&content, &perturbed, 0).unwrap();
    let matched = &content[span.start..span.end];
    assert!(matched.contains("quick brown fox"));
    assert!(matched.contains("band plays on"));
}

#[test]
fn find_long_pattern_with_moderate_drift_at_hint() {
    // A long pattern whose middle has been paraphrased, searched for right
    // at the hint. The edit cost is well inside the default budget, so the
    // window scan must accept it even with no proximity slack used.
    let original = "The quick brown fox jumps over the lazy dog while the band \
                    plays waltzes on the riverboat deck all night long.";
    assert!(original.len() > 64);
    let content = format!("{}\n{}\n{}\n", "x".repeat(40), original, "y".repeat(40));
    let perturbed = original.replace("while the band plays", "as the quartet plays");
    let hint = content.find(original).unwrap();
    let matcher = FuzzyMatcher::default();
    let span = matcher.find(&content, &perturbed, hint).unwrap();
    let matched = &content[span.start..span.end];
    assert!(matched.contains("quick brown fox"));
    assert!(matched.contains("riverboat deck"));
}

#[test]
fn find_long_pattern_far_from_hint_within_distance_budget() {
    // One edited character, but the match sits a few hundred characters
    // past the hint. Cost is roughly 1/len plus 250/1000 of proximity,
    // still under the 0.4 default threshold.
    let original = "The quick brown fox jumps over the lazy dog while the band \
                    plays waltzes on the riverboat deck all night long.";
    let filler = "// filler line with nothing of interest\n".repeat(7);
    let content = format!("{}{}\n", filler, original);
    assert!(content.find(original).unwrap() >= 250);
    let perturbed = original.replace("jumps", "jumbs");
    let matcher = FuzzyMatcher::default();
    let span = matcher.find(&content, &perturbed, 0).unwrap();
    let matched = &content[span.start..span.end];
    assert!(matched.contains("quick brown fox"));
    assert!(matched.contains("all night long"));
}

#[test]
fn replace_block_splices_fuzzy_match() {
    let matcher = FuzzyMatcher::default();
    let content = "fn greet() {\n    println!(\"Hello,   World!\");\n}\n";
    let (new_content, found) = matcher.replace_block(
        content,
        "println!(\"Hello, World!\");",
        "println!(\"Goodbye!\");",
        0,
    );
    assert!(found);
    assert_eq!(new_content, "fn greet() {\n    println!(\"Goodbye!\");\n}\n");
}

#[test]
fn replace_block_miss_returns_input_unchanged() {
    let matcher = FuzzyMatcher::default();
    let (new_content, found) = matcher.replace_block("abc", "zzzzzzzzzz", "x", 0);
    assert!(!found);
    assert_eq!(new_content, "abc");
}

#[test]
fn replace_block_error_wrapper_truncates_preview() {
    let search = "x".repeat(150);
    let err = replace_block("short content", &search, "y", 0, &MatchOptions::default())
        .unwrap_err();
    match err {
        PatchError::PatternNotFound { preview } => {
            assert_eq!(preview.chars().count(), 103);
            assert!(preview.ends_with("..."));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

// --- Exact Replace-All Tests ---

#[test]
fn replace_all_replaces_every_occurrence() {
    let (new_text, count) = replace_all_exact("cat dog cat dog cat", "cat", "dog");
    assert_eq!(new_text, "dog dog dog dog dog");
    assert_eq!(count, 3);
}

#[test]
fn replace_all_is_idempotent_when_replacement_lacks_search() {
    let (once, count) = replace_all_exact("cat dog cat", "cat", "bird");
    assert_eq!(count, 2);
    let (twice, count_again) = replace_all_exact(&once, "cat", "bird");
    assert_eq!(count_again, 0);
    assert_eq!(once, twice);
}

#[test]
fn replace_all_zero_matches_is_a_noop() {
    let (new_text, count) = replace_all_exact("hello", "absent", "x");
    assert_eq!(new_text, "hello");
    assert_eq!(count, 0);
}

#[test]
fn replace_all_empty_search_is_a_noop() {
    let (new_text, count) = replace_all_exact("hello", "", "x");
    assert_eq!(new_text, "hello");
    assert_eq!(count, 0);
}

// --- Diff Parser Tests ---

#[test]
fn parse_simple_hunk() {
    let diff = indoc! {"
        --- a/file.txt
        +++ b/file.txt
        @@ -2,2 +2,3 @@
         context line
        -old line
        +new line
        +another new line
    "};
    let hunks = parse_unified_diff(diff);
    assert_eq!(hunks.len(), 1);
    let hunk = &hunks[0];
    assert_eq!(hunk.old_start, 2);
    assert_eq!(hunk.old_count, 2);
    assert_eq!(hunk.new_start, 2);
    assert_eq!(hunk.new_count, 3);
    assert_eq!(hunk.ops.len(), 4);
    assert_eq!(hunk.ops[0], HunkOp::Context("context line\n".to_string()));
    assert_eq!(hunk.ops[1], HunkOp::Delete("old line\n".to_string()));
    assert_eq!(hunk.ops[2], HunkOp::Add("new line\n".to_string()));
}

#[test]
fn parse_header_counts_default_to_one() {
    let hunks = parse_unified_diff("@@ -5 +7 @@\n-a\n+b\n");
    assert_eq!(hunks.len(), 1);
    assert_eq!(hunks[0].old_start, 5);
    assert_eq!(hunks[0].old_count, 1);
    assert_eq!(hunks[0].new_start, 7);
    assert_eq!(hunks[0].new_count, 1);
}

#[test]
fn parse_skips_file_headers_between_hunks() {
    let diff = indoc! {"
        diff --git a/f.txt b/f.txt
        index 123..456 100644
        --- a/f.txt
        +++ b/f.txt
        @@ -1,1 +1,1 @@
        -one
        +uno
        --- a/f.txt
        +++ b/f.txt
        @@ -5,1 +5,1 @@
        -five
        +cinco
    "};
    let hunks = parse_unified_diff(diff);
    assert_eq!(hunks.len(), 2);
    assert_eq!(hunks[0].old_start, 1);
    assert_eq!(hunks[1].old_start, 5);
    // The `---` header between hunks must not leak into hunk bodies.
    assert_eq!(hunks[0].ops.len(), 2);
    assert_eq!(hunks[1].ops.len(), 2);
}

#[test]
fn parse_blank_line_in_hunk_is_context() {
    let diff = "@@ -1,3 +1,3 @@\n line 1\n\n-line 3\n+LINE 3\n";
    let hunks = parse_unified_diff(diff);
    assert_eq!(hunks.len(), 1);
    assert_eq!(hunks[0].ops[1], HunkOp::Context("\n".to_string()));
}

#[test]
fn parse_skips_unrecognized_noise_lines() {
    let diff = "@@ -1,1 +1,1 @@\n-old\n+new\n\\ No newline at end of file\n";
    let hunks = parse_unified_diff(diff);
    assert_eq!(hunks.len(), 1);
    assert_eq!(hunks[0].ops.len(), 2);
}

#[test]
fn parse_non_diff_text_yields_no_hunks() {
    assert!(parse_unified_diff("this is not a diff").is_empty());
    assert!(parse_unified_diff("").is_empty());
}

#[test]
fn hunk_old_extent_counts_context_and_deletes() {
    let hunks = parse_unified_diff("@@ -1,3 +1,3 @@\n a\n-b\n+B\n c\n");
    assert_eq!(hunks[0].old_extent(), 3);
    assert!(hunks[0].has_changes());
}

// --- Hunk Application Tests ---

#[test]
fn apply_hunk_replaces_line() {
    let lines = split_lines("line 1\nline 2\nline 3\n");
    let hunk = Hunk {
        old_start: 2,
        old_count: 1,
        new_start: 2,
        new_count: 1,
        ops: vec![
            HunkOp::Delete("line 2\n".to_string()),
            HunkOp::Add("modified line 2\n".to_string()),
        ],
    };
    let result = apply_hunk(&lines, &hunk);
    assert_eq!(result.concat(), "line 1\nmodified line 2\nline 3\n");
}

#[test]
fn apply_hunk_context_copies_current_file_line() {
    // The hunk's recorded context has drifted from the file; the file's
    // actual line survives.
    let lines = split_lines("actual line\ntarget\n");
    let hunk = Hunk {
        old_start: 1,
        old_count: 2,
        new_start: 1,
        new_count: 2,
        ops: vec![
            HunkOp::Context("stale recorded line\n".to_string()),
            HunkOp::Delete("target\n".to_string()),
            HunkOp::Add("replaced\n".to_string()),
        ],
    };
    let result = apply_hunk(&lines, &hunk);
    assert_eq!(result.concat(), "actual line\nreplaced\n");
}

#[test]
fn apply_hunk_add_normalizes_missing_terminator() {
    let lines = split_lines("a\nb\n");
    let hunk = Hunk {
        old_start: 2,
        old_count: 0,
        new_start: 2,
        new_count: 1,
        ops: vec![HunkOp::Add("inserted".to_string())],
    };
    let result = apply_hunk(&lines, &hunk);
    assert_eq!(result.concat(), "a\ninserted\nb\n");
}

#[test]
fn apply_hunk_appends_at_eof() {
    let lines = split_lines("a\nb\n");
    let hunk = Hunk {
        old_start: 3,
        old_count: 0,
        new_start: 3,
        new_count: 1,
        ops: vec![HunkOp::Add("c\n".to_string())],
    };
    let result = apply_hunk(&lines, &hunk);
    assert_eq!(result.concat(), "a\nb\nc\n");
}

// --- Full Diff Application Tests ---

#[test]
fn apply_diff_single_hunk() {
    let content = "line 1\nline 2\nline 3\nline 4\n";
    let diff = indoc! {"
        --- a/f.txt
        +++ b/f.txt
        @@ -2,1 +2,1 @@
        -line 2
        +modified line 2
    "};
    let (new_content, hunks) = apply_unified_diff(content, diff).unwrap();
    assert_eq!(new_content, "line 1\nmodified line 2\nline 3\nline 4\n");
    assert_eq!(hunks, 1);
}

#[test]
fn apply_diff_multiple_hunks_in_file_order() {
    // The first hunk grows the file by one line. Were hunks applied
    // top-down, the second hunk's coordinates would be stale.
    let content = "a\nb\nc\nd\ne\nf\n";
    let diff = indoc! {"
        @@ -2,1 +2,2 @@
        -b
        +b1
        +b2
        @@ -5,1 +6,1 @@
        -e
        +E
    "};
    let (new_content, hunks) = apply_unified_diff(content, diff).unwrap();
    assert_eq!(new_content, "a\nb1\nb2\nc\nd\nE\nf\n");
    assert_eq!(hunks, 2);
}

#[test]
fn apply_diff_hunks_listed_out_of_order_still_apply() {
    let content = "a\nb\nc\nd\ne\nf\n";
    let diff = indoc! {"
        @@ -5,1 +5,1 @@
        -e
        +E
        @@ -2,1 +2,1 @@
        -b
        +B
    "};
    let (new_content, hunks) = apply_unified_diff(content, diff).unwrap();
    assert_eq!(new_content, "a\nB\nc\nd\nE\nf\n");
    assert_eq!(hunks, 2);
}

#[test]
fn apply_diff_rejects_non_diff_input() {
    let err = apply_unified_diff("content\n", "this is not a diff").unwrap_err();
    assert_eq!(err, PatchError::NoHunks);
    assert_eq!(err.kind(), ErrorKind::MalformedInput);
}

#[test]
fn apply_diff_rejects_hunk_beyond_eof() {
    let content = "a\nb\n";
    let diff = "@@ -10,1 +10,1 @@\n-x\n+y\n";
    let err = apply_unified_diff(content, diff).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StructuralApplyFailure);
    match err {
        PatchError::HunkOutOfBounds {
            index,
            old_start,
            len,
        } => {
            assert_eq!(index, 1);
            assert_eq!(old_start, 10);
            assert_eq!(len, 2);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn apply_diff_allows_append_hunk_at_eof() {
    let content = "a\nb\n";
    let diff = "@@ -3,0 +3,1 @@\n+c\n";
    let (new_content, _) = apply_unified_diff(content, diff).unwrap();
    assert_eq!(new_content, "a\nb\nc\n");
}

#[test]
fn apply_diff_rejects_overlapping_hunks() {
    let content = "a\nb\nc\nd\n";
    let diff = indoc! {"
        @@ -1,2 +1,2 @@
         a
        -b
        +B
        @@ -2,2 +2,2 @@
        -b
        +BB
         c
    "};
    let err = apply_unified_diff(content, diff).unwrap_err();
    assert_eq!(
        err,
        PatchError::OverlappingHunks {
            first: 1,
            second: 2
        }
    );
    assert_eq!(err.kind(), ErrorKind::MalformedInput);
}

#[test]
fn apply_diff_error_before_any_application() {
    // One good hunk plus one out-of-bounds hunk: nothing may apply.
    let content = "a\nb\n";
    let diff = indoc! {"
        @@ -1,1 +1,1 @@
        -a
        +A
        @@ -50,1 +50,1 @@
        -x
        +y
    "};
    assert!(apply_unified_diff(content, diff).is_err());
}

// --- Line Primitive Tests ---

#[test]
fn insert_at_line_zero_prepends() {
    let (new_content, count) = insert_at_line("line 1\nline 2\n", 0, "HEADER\n");
    assert_eq!(new_content, "HEADER\nline 1\nline 2\n");
    assert_eq!(count, 1);
}

#[test]
fn insert_in_the_middle() {
    let (new_content, count) = insert_at_line("a\nb\nc\n", 2, "x\ny\n");
    assert_eq!(new_content, "a\nx\ny\nb\nc\n");
    assert_eq!(count, 2);
}

#[test]
fn insert_past_eof_appends_and_fixes_terminator() {
    let (new_content, count) = insert_at_line("line 1\nline 2", 10, "APPENDED\n");
    assert_eq!(new_content, "line 1\nline 2\nAPPENDED\n");
    assert_eq!(count, 1);
}

#[test]
fn insert_normalizes_missing_trailing_newline() {
    let (new_content, count) = insert_at_line("a\nb\n", 2, "no newline");
    assert_eq!(new_content, "a\nno newline\nb\n");
    assert_eq!(count, 1);
}

#[test]
fn insert_into_empty_content() {
    let (new_content, count) = insert_at_line("", 0, "first\n");
    assert_eq!(new_content, "first\n");
    assert_eq!(count, 1);
}

#[test]
fn delete_inclusive_range() {
    let (new_content, count) = delete_lines("line 1\nline 2\nline 3\n", 2, 3).unwrap();
    assert_eq!(new_content, "line 1\n");
    assert_eq!(count, 2);
}

#[test]
fn delete_single_line() {
    let (new_content, count) = delete_lines("a\nb\nc\n", 2, 2).unwrap();
    assert_eq!(new_content, "a\nc\n");
    assert_eq!(count, 1);
}

#[test]
fn delete_whole_file() {
    let (new_content, count) = delete_lines("a\nb\n", 1, 2).unwrap();
    assert_eq!(new_content, "");
    assert_eq!(count, 2);
}

#[test]
fn delete_end_clamped_to_file_length() {
    let (new_content, count) = delete_lines("a\nb\nc\n", 2, 99).unwrap();
    assert_eq!(new_content, "a\n");
    assert_eq!(count, 2);
}

#[test]
fn delete_rejects_zero_start() {
    let err = delete_lines("a\nb\n", 0, 1).unwrap_err();
    assert_eq!(err, PatchError::InvalidLineRange { start: 0, end: 1 });
    assert_eq!(err.kind(), ErrorKind::MalformedInput);
}

#[test]
fn delete_rejects_inverted_range() {
    let err = delete_lines("a\nb\nc\n", 3, 2).unwrap_err();
    assert_eq!(err, PatchError::InvalidLineRange { start: 3, end: 2 });
}

#[test]
fn delete_rejects_start_beyond_eof() {
    let err = delete_lines("a\nb\n", 5, 6).unwrap_err();
    assert_eq!(err, PatchError::LineOutOfBounds { line: 5, len: 2 });
}

#[test]
fn insert_then_delete_round_trips() {
    let original = "a\nb\nc\nd\n";
    let (inserted, count) = insert_at_line(original, 3, "x\ny\n");
    assert_eq!(count, 2);
    let (restored, deleted) = delete_lines(&inserted, 3, 4).unwrap();
    assert_eq!(deleted, 2);
    assert_eq!(restored, original);
}

// --- Workspace Tests ---

#[test]
fn workspace_search_replace_persists_to_disk() {
    let dir = tempdir().unwrap();
    create_file(dir.path(), "src/app.rs", "fn main() {\n    old_call();\n}\n");
    let ws = Workspace::new(dir.path()).unwrap();
    let report = ws
        .search_replace("src/app.rs", "old_call();", "new_call();")
        .unwrap();
    assert!(report.diff.is_none());
    assert_eq!(
        read_file(dir.path(), "src/app.rs"),
        "fn main() {\n    new_call();\n}\n"
    );
}

#[test]
fn workspace_search_replace_all_counts_occurrences() {
    let dir = tempdir().unwrap();
    create_file(dir.path(), "notes.txt", "cat dog cat dog cat");
    let ws = Workspace::new(dir.path()).unwrap();
    let report = ws.search_replace_all("notes.txt", "cat", "dog").unwrap();
    assert_eq!(report.to_string().split(" in ").next().unwrap(), "Replaced 3 occurrence(s)");
    assert_eq!(read_file(dir.path(), "notes.txt"), "dog dog dog dog dog");
}

#[test]
fn workspace_search_replace_all_miss_is_not_found() {
    let dir = tempdir().unwrap();
    create_file(dir.path(), "notes.txt", "hello");
    let ws = Workspace::new(dir.path()).unwrap();
    let err = ws.search_replace_all("notes.txt", "absent", "x").unwrap_err();
    match err {
        EditError::Patch(p) => assert_eq!(p.kind(), ErrorKind::NotFound),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn workspace_apply_diff_on_disk() {
    let dir = tempdir().unwrap();
    create_file(dir.path(), "f.txt", "line 1\nline 2\nline 3\n");
    let ws = Workspace::new(dir.path()).unwrap();
    let diff = "@@ -2,1 +2,1 @@\n-line 2\n+LINE 2\n";
    ws.apply_diff("f.txt", diff).unwrap();
    assert_eq!(read_file(dir.path(), "f.txt"), "line 1\nLINE 2\nline 3\n");
}

#[test]
fn workspace_insert_and_delete_on_disk() {
    let dir = tempdir().unwrap();
    create_file(dir.path(), "f.txt", "a\nb\n");
    let ws = Workspace::new(dir.path()).unwrap();
    ws.insert_at_line("f.txt", 2, "x\n").unwrap();
    assert_eq!(read_file(dir.path(), "f.txt"), "a\nx\nb\n");
    ws.delete_lines("f.txt", 2, 2).unwrap();
    assert_eq!(read_file(dir.path(), "f.txt"), "a\nb\n");
}

#[test]
fn workspace_rejects_path_traversal() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("project");
    fs::create_dir(&root).unwrap();
    create_file(dir.path(), "secret.txt", "do not touch\n");
    let ws = Workspace::new(&root).unwrap();
    let err = ws
        .search_replace("../secret.txt", "do not touch", "gotcha")
        .unwrap_err();
    assert!(matches!(err, EditError::PathTraversal(_)));
    assert_eq!(read_file(dir.path(), "secret.txt"), "do not touch\n");
}

#[test]
fn workspace_missing_file_is_reported() {
    let dir = tempdir().unwrap();
    let ws = Workspace::new(dir.path()).unwrap();
    let err = ws.apply_diff("absent.txt", "@@ -1 +1 @@\n-a\n+b\n").unwrap_err();
    assert!(matches!(err, EditError::FileNotFound(_)));
}

#[test]
fn workspace_rejects_directory_target() {
    let dir = tempdir().unwrap();
    fs::create_dir(dir.path().join("subdir")).unwrap();
    let ws = Workspace::new(dir.path()).unwrap();
    let err = ws.delete_lines("subdir", 1, 1).unwrap_err();
    assert!(matches!(err, EditError::TargetIsDirectory { .. }));
}

#[test]
fn workspace_dry_run_reports_diff_without_writing() {
    let dir = tempdir().unwrap();
    create_file(dir.path(), "f.txt", "line 1\nline 2\n");
    let ws = Workspace::new(dir.path()).unwrap().with_dry_run(true);
    let report = ws.search_replace("f.txt", "line 2", "changed line").unwrap();
    let diff = report.diff.expect("dry run must produce a diff");
    assert!(diff.contains("-line 2"));
    assert!(diff.contains("+changed line"));
    // Nothing written.
    assert_eq!(read_file(dir.path(), "f.txt"), "line 1\nline 2\n");
}

#[test]
fn workspace_honors_custom_match_options() {
    let dir = tempdir().unwrap();
    create_file(dir.path(), "f.txt", "exact text only\n");
    let options = MatchOptions::builder().threshold(0.0).build();
    let ws = Workspace::new(dir.path()).unwrap().with_options(options);
    // Fuzzy variant must fail with fuzzy matching disabled.
    let err = ws.search_replace("f.txt", "exakt text only", "x").unwrap_err();
    match err {
        EditError::Patch(p) => assert_eq!(p.kind(), ErrorKind::NotFound),
        other => panic!("unexpected error: {other:?}"),
    }
}
