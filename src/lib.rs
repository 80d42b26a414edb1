//! A fuzzy text-patch engine for AI coding agents.
//!
//! `fuzzpatch` locates and rewrites blocks of text in source files even when
//! the proposed "search" text does not match the file byte-for-byte. Agents
//! routinely produce edits with drifted whitespace, minor paraphrases, or
//! stale line numbers; this crate absorbs that drift instead of failing.
//!
//! The engine is a set of pure text-in/text-out operations:
//!
//! - **Fuzzy block replace** ([`FuzzyMatcher`], [`replace_block`]): find the
//!   best-matching contiguous span for a search block, within an edit-cost
//!   budget, and splice in a replacement. An exact substring match always
//!   wins over a fuzzy one.
//! - **Exact replace-all** ([`replace_all_exact`]): literal substring
//!   replacement of every occurrence, for renames that must change all sites
//!   identically.
//! - **Unified diff application** ([`parse_unified_diff`], [`apply_hunk`],
//!   [`apply_unified_diff`]): parse `@@ -a,b +c,d @@` hunks and apply them
//!   from the highest line number down, so earlier hunks' coordinates stay
//!   valid against the mutating buffer.
//! - **Line primitives** ([`insert_at_line`], [`delete_lines`]).
//!
//! File I/O and path sandboxing live in a thin layer on top: a [`Workspace`]
//! resolves paths against a project root, rejects escapes, and runs the
//! read-modify-write cycle for each operation.
//!
//! ## Getting Started
//!
//! ```rust
//! use fuzzpatch::{FuzzyMatcher, apply_unified_diff};
//!
//! // Fuzzy replace: the search text has different internal whitespace than
//! // the file, but still matches within the default threshold.
//! let matcher = FuzzyMatcher::default();
//! let content = "fn greet() {\n    println!(\"Hello,   World!\");\n}\n";
//! let (new_content, found) = matcher.replace_block(
//!     content,
//!     "println!(\"Hello, World!\");",
//!     "println!(\"Hi!\");",
//!     0,
//! );
//! assert!(found);
//! assert!(new_content.contains("Hi!"));
//!
//! // Unified diff application.
//! let content = "line 1\nline 2\nline 3\n";
//! let diff = "@@ -2,1 +2,1 @@\n-line 2\n+modified line 2\n";
//! let (patched, hunks) = apply_unified_diff(content, diff).unwrap();
//! assert_eq!(patched, "line 1\nmodified line 2\nline 3\n");
//! assert_eq!(hunks, 1);
//! ```
//!
//! ## Matching model
//!
//! [`FuzzyMatcher::find`] scores candidate locations with an edit-cost rate
//! (edits divided by pattern length) plus a proximity penalty (distance from
//! the caller's `expected_offset`, divided by
//! [`MatchOptions::max_distance`]). A candidate is accepted while the total
//! stays at or below [`MatchOptions::threshold`]: `0.0` demands an exact
//! match, `1.0` accepts almost anything. Short patterns are located with a
//! Bitap scan; long patterns fall back to a windowed similarity scan that is
//! parallelized with `rayon` when the default `parallel` feature is on.
//!
//! ## Error model
//!
//! Every failure is a typed [`PatchError`] with a coarse [`ErrorKind`]
//! (`NotFound`, `MalformedInput`, `StructuralApplyFailure`) so callers can
//! branch on the kind programmatically instead of string-matching messages.
//! The engine never returns partially applied content: an operation either
//! fully applies or reports a specific failure.

use log::{debug, trace, warn};
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use similar::{capture_diff_slices, Algorithm, DiffTag};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

// --- Error Types ---

/// Coarse classification of a [`PatchError`], for programmatic branching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The search text could not be located in the document.
    NotFound,
    /// The request itself was invalid: an unparseable diff, or an
    /// out-of-range line specification.
    MalformedInput,
    /// A hunk's recorded coordinates no longer correspond to a valid
    /// position in the target line sequence.
    StructuralApplyFailure,
}

/// Errors produced by the in-memory patch engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatchError {
    /// Neither an exact nor a fuzzy match was found for the search text.
    /// Carries a truncated preview of the pattern so the caller can show
    /// an actionable message.
    #[error("Could not find matching text. Search text begins with: {preview:?}")]
    PatternNotFound {
        /// The first ~100 characters of the unmatched search text.
        preview: String,
    },
    /// The diff input contained no parseable `@@ ... @@` hunks.
    #[error("No valid hunks found in diff")]
    NoHunks,
    /// Two hunks in one diff address overlapping line ranges. Reverse-order
    /// application is only sound for disjoint hunks, so this is rejected
    /// before anything is applied.
    #[error("Hunks {first} and {second} overlap")]
    OverlappingHunks { first: usize, second: usize },
    /// `start_line < 1` or `end_line < start_line`.
    #[error("Invalid line range: {start}-{end}")]
    InvalidLineRange { start: usize, end: usize },
    /// A 1-indexed line number pointed past the end of the file.
    #[error("Line {line} is beyond end of file ({len} lines)")]
    LineOutOfBounds { line: usize, len: usize },
    /// A hunk's `old_start` pointed past the end of the file.
    #[error("Hunk {index} starts at line {old_start}, beyond end of file ({len} lines)")]
    HunkOutOfBounds {
        /// 1-based index of the offending hunk, in parse order.
        index: usize,
        old_start: usize,
        len: usize,
    },
}

impl PatchError {
    /// Returns the coarse classification of this error.
    ///
    /// ```
    /// # use fuzzpatch::{PatchError, ErrorKind};
    /// let err = PatchError::NoHunks;
    /// assert_eq!(err.kind(), ErrorKind::MalformedInput);
    /// ```
    pub fn kind(&self) -> ErrorKind {
        match self {
            PatchError::PatternNotFound { .. } => ErrorKind::NotFound,
            PatchError::NoHunks
            | PatchError::OverlappingHunks { .. }
            | PatchError::InvalidLineRange { .. }
            | PatchError::LineOutOfBounds { .. } => ErrorKind::MalformedInput,
            PatchError::HunkOutOfBounds { .. } => ErrorKind::StructuralApplyFailure,
        }
    }
}

/// Errors produced by the file-level layer ([`Workspace`]).
#[derive(Error, Debug)]
pub enum EditError {
    /// The path resolves outside the workspace root. This is a security
    /// measure against edits escaping the sandbox (e.g. `../../etc/passwd`).
    #[error("Path '{0}' resolves outside the workspace root. Aborting for security.")]
    PathTraversal(PathBuf),
    /// The target file does not exist.
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),
    /// The target path exists but is a directory, not a file.
    #[error("Target path is a directory, not a file: {path:?}")]
    TargetIsDirectory { path: PathBuf },
    /// The user does not have permission to read or write the path.
    #[error("Permission denied for path: {path:?}")]
    PermissionDenied { path: PathBuf },
    /// Any other I/O error while reading or writing a file.
    #[error("I/O error while processing {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The in-memory engine rejected the edit.
    #[error(transparent)]
    Patch(#[from] PatchError),
}

/// Converts a `std::io::Error` into a more specific `EditError`.
fn map_io_error(path: PathBuf, e: std::io::Error) -> EditError {
    match e.kind() {
        std::io::ErrorKind::NotFound => EditError::FileNotFound(path),
        std::io::ErrorKind::PermissionDenied => EditError::PermissionDenied { path },
        std::io::ErrorKind::IsADirectory => EditError::TargetIsDirectory { path },
        _ => EditError::Io { path, source: e },
    }
}

// --- Options ---

/// Default matching threshold: 0.0 requires an exact match, 1.0 accepts
/// almost anything. Lower values require closer matches.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.4;

/// Default maximum distance (in characters) from the expected location to
/// search for a match.
pub const DEFAULT_MATCH_DISTANCE: usize = 1000;

/// Patterns up to this many characters are located with the Bitap scan;
/// longer patterns use the windowed similarity scan.
const MAX_BITAP_BITS: usize = 64;

/// How many characters of an unmatched pattern to include in error messages.
const PATTERN_PREVIEW_LEN: usize = 100;

/// Options controlling how strictly the fuzzy matcher scores candidates.
#[derive(Debug, Clone, Copy)]
pub struct MatchOptions {
    /// Maximum allowed normalized edit cost for an approximate match to be
    /// accepted (0.0 = exact only, 1.0 = match almost anything).
    pub threshold: f32,
    /// Maximum distance in characters from the expected offset to search.
    /// Candidates farther from the hint pay a proportional score penalty.
    pub max_distance: usize,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_MATCH_THRESHOLD,
            max_distance: DEFAULT_MATCH_DISTANCE,
        }
    }
}

impl MatchOptions {
    /// Creates a new builder for `MatchOptions`.
    ///
    /// # Example
    ///
    /// ```
    /// # use fuzzpatch::MatchOptions;
    /// let options = MatchOptions::builder()
    ///     .threshold(0.2)
    ///     .max_distance(500)
    ///     .build();
    ///
    /// assert_eq!(options.threshold, 0.2);
    /// assert_eq!(options.max_distance, 500);
    /// ```
    pub fn builder() -> MatchOptionsBuilder {
        MatchOptionsBuilder::default()
    }
}

/// A builder for creating [`MatchOptions`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchOptionsBuilder {
    threshold: Option<f32>,
    max_distance: Option<usize>,
}

impl MatchOptionsBuilder {
    /// Sets the matching threshold (0.0 = exact only, 1.0 = loose).
    pub fn threshold(mut self, threshold: f32) -> Self {
        self.threshold = Some(threshold);
        self
    }

    /// Sets the maximum search distance in characters.
    pub fn max_distance(mut self, max_distance: usize) -> Self {
        self.max_distance = Some(max_distance);
        self
    }

    /// Builds the `MatchOptions`.
    pub fn build(self) -> MatchOptions {
        let default = MatchOptions::default();
        MatchOptions {
            threshold: self.threshold.unwrap_or(default.threshold),
            max_distance: self.max_distance.unwrap_or(default.max_distance),
        }
    }
}

// --- Data Structures ---

/// A half-open `[start, end)` byte-offset pair denoting where a pattern was
/// located in a document. Both offsets fall on `char` boundaries, so the
/// span can be used directly for string slicing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchSpan {
    /// Byte offset of the first matched character.
    pub start: usize,
    /// Byte offset one past the last matched character.
    pub end: usize,
}

impl MatchSpan {
    /// Length of the matched region in bytes.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Whether the matched region is empty.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

impl std::fmt::Display for MatchSpan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// One operation within a hunk, classified by the line's leading character
/// in the unified diff. The carried text keeps its trailing line
/// terminator where the diff had one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HunkOp {
    /// An unchanged line (leading ` ` or a bare newline).
    Context(String),
    /// A line removed from the old file (leading `-`).
    Delete(String),
    /// A line added in the new file (leading `+`).
    Add(String),
}

/// A single contiguous change region parsed from a `@@ ... @@` header.
///
/// `old_start` and `new_start` are the 1-indexed line numbers from the diff
/// header; omitted counts default to 1. Hunks are kept in file order as
/// parsed, and [`apply_unified_diff`] applies them in *descending*
/// `old_start` order so earlier hunks' line numbers stay valid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    pub old_start: usize,
    pub old_count: usize,
    pub new_start: usize,
    pub new_count: usize,
    /// The ordered context/delete/add operations of the hunk body.
    pub ops: Vec<HunkOp>,
}

impl Hunk {
    /// Number of old-file lines this hunk actually consumes (context plus
    /// deletions), derived from the body rather than the header counts,
    /// which agent-produced diffs frequently get wrong.
    pub fn old_extent(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, HunkOp::Context(_) | HunkOp::Delete(_)))
            .count()
    }

    /// Whether the hunk contains any additions or deletions. A hunk with
    /// only context lines is a no-op.
    pub fn has_changes(&self) -> bool {
        self.ops
            .iter()
            .any(|op| matches!(op, HunkOp::Delete(_) | HunkOp::Add(_)))
    }
}

// --- Approximate Matching ---

/// Fuzzy text matcher with an edit-cost budget and a location bias.
///
/// The matcher first attempts an exact substring search; an exact hit is
/// returned as-is, so there is never false fuzziness when the pattern is
/// present verbatim. Otherwise it searches near `expected_offset` for the
/// candidate with the lowest combined edit-cost and distance score, and
/// rejects the result if the score exceeds the configured threshold.
///
/// The matcher is a pure function of its inputs and options; it holds no
/// document state between calls.
#[derive(Debug, Clone, Copy, Default)]
pub struct FuzzyMatcher {
    options: MatchOptions,
}

impl FuzzyMatcher {
    /// Creates a matcher with the given options.
    pub fn new(options: MatchOptions) -> Self {
        Self { options }
    }

    /// Returns the configured options.
    pub fn options(&self) -> &MatchOptions {
        &self.options
    }

    /// Finds the best match for `pattern` in `text`, biased toward
    /// `expected_offset` (a byte offset hint; pass 0 when unknown).
    ///
    /// Returns `None` for an empty pattern or when no candidate clears the
    /// threshold. Never panics or errors.
    ///
    /// The returned span's end is determined by aligning a character-level
    /// diff of the pattern against the matched region, so the span covers
    /// exactly the text that corresponds to the pattern even when the match
    /// is longer or shorter than the pattern itself.
    ///
    /// # Example
    ///
    /// ```
    /// # use fuzzpatch::FuzzyMatcher;
    /// let matcher = FuzzyMatcher::default();
    ///
    /// // Exact occurrence: returned verbatim.
    /// let span = matcher.find("hello world", "world", 0).unwrap();
    /// assert_eq!(span.start, 6);
    /// assert_eq!(span.end, 11);
    ///
    /// // Whitespace drift: still located.
    /// assert!(matcher.find("Hello,   World!", "Hello, World!", 0).is_some());
    /// ```
    pub fn find(&self, text: &str, pattern: &str, expected_offset: usize) -> Option<MatchSpan> {
        if pattern.is_empty() {
            return None;
        }

        // Exact match always takes precedence, regardless of threshold.
        if let Some(start) = text.find(pattern) {
            trace!("exact match for pattern at byte {}", start);
            return Some(MatchSpan {
                start,
                end: start + pattern.len(),
            });
        }

        if self.options.threshold <= 0.0 {
            trace!("no exact match and fuzzy matching disabled");
            return None;
        }

        // Fuzzy search operates in character coordinates; byte offsets are
        // translated at the boundary.
        let chars: Vec<char> = text.chars().collect();
        if chars.is_empty() {
            return None;
        }
        let byte_starts: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
        let pattern_chars: Vec<char> = pattern.chars().collect();
        let loc = byte_starts
            .partition_point(|&b| b < expected_offset)
            .min(chars.len());

        let start_char = if pattern_chars.len() <= MAX_BITAP_BITS {
            self.bitap(&chars, &pattern_chars, loc)
        } else {
            self.best_window(&chars, &pattern_chars, loc)
        }?;
        let end_char = align_match_end(&chars, &pattern_chars, start_char);

        let to_byte = |ci: usize| {
            if ci < byte_starts.len() {
                byte_starts[ci]
            } else {
                text.len()
            }
        };
        let span = MatchSpan {
            start: to_byte(start_char),
            end: to_byte(end_char),
        };
        debug!("fuzzy match for pattern at {}", span);
        Some(span)
    }

    /// Replaces the first (fuzzy) occurrence of `search` with `replace`.
    ///
    /// Returns the new document and whether a match was found. When no
    /// match is found the document is returned unchanged with `false`;
    /// callers wanting a typed error use [`replace_block`].
    ///
    /// Only the first match is replaced, for targeted single-block edits.
    /// Callers needing every occurrence changed use [`replace_all_exact`].
    pub fn replace_block(
        &self,
        text: &str,
        search: &str,
        replace: &str,
        expected_offset: usize,
    ) -> (String, bool) {
        match self.find(text, search, expected_offset) {
            Some(span) => {
                let mut new_text = String::with_capacity(text.len() - span.len() + replace.len());
                new_text.push_str(&text[..span.start]);
                new_text.push_str(replace);
                new_text.push_str(&text[span.end..]);
                (new_text, true)
            }
            None => (text.to_owned(), false),
        }
    }

    /// Bitap scan for patterns of up to [`MAX_BITAP_BITS`] characters.
    ///
    /// Classic shift-or approximate matching: candidates are scored with
    /// `errors / pattern_len + |candidate - loc| / max_distance` and the
    /// best-scoring start position at or below the threshold wins. The
    /// error budget is explored level by level, and the binary search over
    /// `bin_mid` bounds how far from `loc` each level may look, which keeps
    /// the scan terminating within the configured distance.
    fn bitap(&self, text: &[char], pattern: &[char], loc: usize) -> Option<usize> {
        let m = pattern.len();
        let mut alphabet: HashMap<char, u64> = HashMap::new();
        for (i, &c) in pattern.iter().enumerate() {
            *alphabet.entry(c).or_insert(0) |= 1u64 << (m - i - 1);
        }

        let max_distance = self.options.max_distance;
        let score = |errors: usize, pos: usize| -> f64 {
            let accuracy = errors as f64 / m as f64;
            let proximity = pos.abs_diff(loc);
            if max_distance == 0 {
                // A zero distance means only the exact expected location
                // is acceptable.
                if proximity == 0 {
                    accuracy
                } else {
                    1.0
                }
            } else {
                accuracy + proximity as f64 / max_distance as f64
            }
        };

        let mut score_threshold = f64::from(self.options.threshold);
        let match_mask = 1u64 << (m - 1);
        let mut best: Option<usize> = None;
        let mut bin_max = m + text.len();
        let mut last_rd: Vec<u64> = Vec::new();

        for d in 0..m {
            // Find the widest window around loc that could still beat the
            // current score threshold at this error level.
            let mut bin_min = 0;
            let mut bin_mid = bin_max;
            while bin_min < bin_mid {
                if score(d, loc + bin_mid) <= score_threshold {
                    bin_min = bin_mid;
                } else {
                    bin_max = bin_mid;
                }
                bin_mid = (bin_max - bin_min) / 2 + bin_min;
            }
            bin_max = bin_mid;
            let mut start = (loc + 1).saturating_sub(bin_mid).max(1);
            let finish = (loc + bin_mid).min(text.len()) + m;

            let mut rd = vec![0u64; finish + 2];
            rd[finish + 1] = (1u64 << d) - 1;
            let lrd = |v: &[u64], j: usize| v.get(j).copied().unwrap_or(0);

            let mut j = finish;
            while j >= start {
                let char_match = if j <= text.len() {
                    alphabet.get(&text[j - 1]).copied().unwrap_or(0)
                } else {
                    // Past the end of the text nothing matches.
                    0
                };
                rd[j] = if d == 0 {
                    ((rd[j + 1] << 1) | 1) & char_match
                } else {
                    (((rd[j + 1] << 1) | 1) & char_match)
                        | (((lrd(&last_rd, j + 1) | lrd(&last_rd, j)) << 1) | 1)
                        | lrd(&last_rd, j + 1)
                };
                if rd[j] & match_mask != 0 {
                    let candidate = j - 1;
                    let s = score(d, candidate);
                    if s <= score_threshold {
                        score_threshold = s;
                        best = Some(candidate);
                        if candidate > loc {
                            // The match sits ahead of loc; an equal score is
                            // still possible the same distance behind it, so
                            // pull the scan window in rather than stopping.
                            start = (2 * loc).saturating_sub(candidate).max(1);
                        } else {
                            // Already passed loc; scores only get worse.
                            break;
                        }
                    }
                }
                j -= 1;
            }
            // One more error level cannot beat the current best even at
            // the expected location itself.
            if score(d + 1, loc) > score_threshold {
                break;
            }
            last_rd = rd;
        }

        trace!(
            "bitap scan finished: best={:?}, score_threshold={:.3}",
            best,
            score_threshold
        );
        best
    }

    /// Windowed similarity scan for patterns too long for Bitap.
    ///
    /// Slides a pattern-length window over candidate start positions within
    /// reach of `loc` and scores each by the fraction of pattern characters
    /// a diff against the window leaves unmatched, plus the same proximity
    /// penalty the Bitap path uses. A pattern-length window keeps the start
    /// sharp: a candidate one character off the true start pays for the
    /// character it pushes out of the window. Matches running longer than
    /// the window are recovered by [`align_match_end`], which looks at a
    /// wider region. With the `parallel` feature the candidate scoring is
    /// distributed with rayon.
    fn best_window(&self, text: &[char], pattern: &[char], loc: usize) -> Option<usize> {
        let n = text.len();
        let m = pattern.len();
        let threshold = f64::from(self.options.threshold);
        let max_distance = self.options.max_distance;

        // Beyond this radius the proximity penalty alone exceeds the
        // threshold, so there is no point scoring farther candidates.
        let radius = if max_distance == 0 {
            0
        } else {
            (threshold * max_distance as f64) as usize
        };
        let lo = loc.saturating_sub(radius);
        let hi = (loc + radius).min(n.saturating_sub(1));
        if lo > hi {
            return None;
        }
        trace!(
            "window scan: {} candidates ({}..={}), pattern {} chars",
            hi - lo + 1,
            lo,
            hi,
            m
        );

        let score_one = |start: usize| -> (f64, usize) {
            let window = &text[start..(start + m).min(n)];
            // Cost is edits normalized by pattern length: every pattern
            // character the diff could not pair with the window counts as
            // one edit. Unpaired window characters cost nothing.
            let matched: usize = capture_diff_slices(Algorithm::Myers, pattern, window)
                .iter()
                .filter(|op| op.tag() == DiffTag::Equal)
                .map(|op| op.old_range().len())
                .sum();
            let cost = (m - matched) as f64 / m as f64;
            let proximity = if max_distance == 0 {
                0.0
            } else {
                start.abs_diff(loc) as f64 / max_distance as f64
            };
            (cost + proximity, start)
        };

        #[cfg(feature = "parallel")]
        let scored: Vec<(f64, usize)> = (lo..=hi).into_par_iter().map(score_one).collect();
        #[cfg(not(feature = "parallel"))]
        let scored: Vec<(f64, usize)> = (lo..=hi).map(score_one).collect();

        // Sequential reduction keeps tie-breaking deterministic: prefer the
        // lower score, then the candidate closer to the expected location.
        let mut best: Option<(f64, usize)> = None;
        for (score, start) in scored {
            let better = match best {
                None => true,
                Some((best_score, best_start)) => {
                    score < best_score
                        || (score == best_score && start.abs_diff(loc) < best_start.abs_diff(loc))
                }
            };
            if better {
                best = Some((score, start));
            }
        }

        match best {
            Some((score, start)) if score <= threshold => {
                debug!(
                    "window scan best candidate at char {} (score {:.3})",
                    start, score
                );
                Some(start)
            }
            Some((score, _)) => {
                debug!(
                    "window scan best score {:.3} exceeds threshold {:.3}",
                    score, threshold
                );
                None
            }
            None => None,
        }
    }
}

/// Determines where a fuzzy match ends in the target text.
///
/// Diffs the pattern against the region following the match start (bounded
/// at twice the pattern length) and walks the ops: equal and deleted runs
/// consume pattern characters, equal and inserted runs extend the end in
/// the target. The walk stops once the whole pattern is consumed, so
/// trailing unrelated text is never swallowed into the span.
fn align_match_end(text: &[char], pattern: &[char], start: usize) -> usize {
    let region_end = (start + 2 * pattern.len()).min(text.len());
    let region = &text[start..region_end];
    let ops = capture_diff_slices(Algorithm::Myers, pattern, region);

    let mut end = start;
    let mut pattern_consumed = 0;
    for op in &ops {
        if pattern_consumed >= pattern.len() {
            break;
        }
        match op.tag() {
            DiffTag::Equal => {
                end += op.new_range().len();
                pattern_consumed += op.old_range().len();
            }
            DiffTag::Insert => {
                end += op.new_range().len();
            }
            DiffTag::Delete => {
                pattern_consumed += op.old_range().len();
            }
            DiffTag::Replace => {
                end += op.new_range().len();
                pattern_consumed += op.old_range().len();
            }
        }
    }
    end
}

// --- Exact Replacement ---

/// Replaces every literal, case-sensitive occurrence of `search` in `text`.
///
/// Returns the new document and the occurrence count. A count of zero
/// signals a no-op; whether that is an error is the caller's decision.
///
/// ```
/// # use fuzzpatch::replace_all_exact;
/// let (new_text, count) = replace_all_exact("cat dog cat dog cat", "cat", "dog");
/// assert_eq!(new_text, "dog dog dog dog dog");
/// assert_eq!(count, 3);
/// ```
pub fn replace_all_exact(text: &str, search: &str, replace: &str) -> (String, usize) {
    if search.is_empty() {
        return (text.to_owned(), 0);
    }
    let count = text.matches(search).count();
    if count == 0 {
        return (text.to_owned(), 0);
    }
    (text.replace(search, replace), count)
}

// --- Diff Parsing ---

/// Parses unified-diff text into ordered hunks.
///
/// Recognizes headers of the form `@@ -<old>[,<count>] +<new>[,<count>] @@`
/// (omitted counts default to 1). File headers (`---`, `+++`) and `diff `/
/// `index ` lines are ignored wherever they appear. Inside a hunk body,
/// lines are classified by their leading character; unrecognized lines are
/// skipped rather than aborting the parse, to tolerate minor diff noise.
///
/// A diff with no recognizable hunk headers yields an empty vector. That is
/// not an error at this layer; [`apply_unified_diff`] treats it as one.
pub fn parse_unified_diff(diff: &str) -> Vec<Hunk> {
    let mut hunks: Vec<Hunk> = Vec::new();
    let mut current: Option<Hunk> = None;

    for line in diff.split_inclusive('\n') {
        if let Some((old_start, old_count, new_start, new_count)) = parse_hunk_header(line) {
            if let Some(hunk) = current.take() {
                hunks.push(hunk);
            }
            current = Some(Hunk {
                old_start,
                old_count,
                new_start,
                new_count,
                ops: Vec::new(),
            });
            continue;
        }

        // File and metadata headers may appear anywhere in agent output,
        // not only before the first hunk.
        if line.starts_with("---")
            || line.starts_with("+++")
            || line.starts_with("diff ")
            || line.starts_with("index ")
        {
            continue;
        }

        if let Some(hunk) = current.as_mut() {
            if let Some(rest) = line.strip_prefix('-') {
                hunk.ops.push(HunkOp::Delete(rest.to_string()));
            } else if let Some(rest) = line.strip_prefix('+') {
                hunk.ops.push(HunkOp::Add(rest.to_string()));
            } else if let Some(rest) = line.strip_prefix(' ') {
                hunk.ops.push(HunkOp::Context(rest.to_string()));
            } else if line == "\n" || line == "\r\n" {
                // A completely blank line inside a hunk is context whose
                // leading space was stripped somewhere along the way.
                hunk.ops.push(HunkOp::Context(line.to_string()));
            } else {
                trace!("skipping unrecognized line in hunk body: {:?}", line);
            }
        }
    }

    if let Some(hunk) = current.take() {
        hunks.push(hunk);
    }
    hunks
}

/// Parses a hunk header line, e.g. `@@ -21,8 +21,9 @@`.
///
/// Returns `(old_start, old_count, new_start, new_count)`, with omitted
/// counts defaulting to 1, or `None` if the line is not a hunk header.
fn parse_hunk_header(line: &str) -> Option<(usize, usize, usize, usize)> {
    let rest = line.strip_prefix("@@ ")?;
    let mut parts = rest.split_whitespace();
    let old_part = parts.next()?.strip_prefix('-')?;
    let new_part = parts.next()?.strip_prefix('+')?;
    if parts.next() != Some("@@") {
        return None;
    }

    let parse_range = |part: &str| -> Option<(usize, usize)> {
        match part.split_once(',') {
            Some((start, count)) => Some((start.parse().ok()?, count.parse().ok()?)),
            None => Some((part.parse().ok()?, 1)),
        }
    };
    let (old_start, old_count) = parse_range(old_part)?;
    let (new_start, new_count) = parse_range(new_part)?;
    Some((old_start, old_count, new_start, new_count))
}

// --- Hunk Application ---

/// Splits content into lines, each retaining its trailing terminator, so
/// concatenating the result reproduces the input exactly.
pub fn split_lines(content: &str) -> Vec<String> {
    content.split_inclusive('\n').map(String::from).collect()
}

/// Applies a single hunk to a line sequence, returning the new sequence.
///
/// The read cursor starts at `old_start - 1` (0-indexed). Context ops copy
/// the *file's* current line rather than the hunk's recorded text, so
/// drifted context is tolerated in line with the rest of the engine's
/// fuzzy philosophy; deletions skip a line; additions emit their text
/// (normalized to end with a terminator) without advancing the cursor.
///
/// Correct results require `old_start` to index into the *current* state
/// of `lines`, which is why [`apply_unified_diff`] applies multiple hunks
/// from the highest line number down.
pub fn apply_hunk(lines: &[String], hunk: &Hunk) -> Vec<String> {
    let mut result: Vec<String> = Vec::with_capacity(lines.len() + hunk.ops.len());
    let mut cursor = hunk.old_start.saturating_sub(1).min(lines.len());
    result.extend_from_slice(&lines[..cursor]);

    for op in &hunk.ops {
        match op {
            HunkOp::Context(text) => {
                if cursor < lines.len() {
                    result.push(lines[cursor].clone());
                    cursor += 1;
                } else {
                    // Past EOF the file has nothing to copy; fall back to
                    // the hunk's recorded context.
                    result.push(text.clone());
                }
            }
            HunkOp::Delete(_) => {
                cursor += 1;
            }
            HunkOp::Add(text) => {
                let mut line = text.clone();
                if !line.ends_with('\n') {
                    line.push('\n');
                }
                result.push(line);
            }
        }
    }

    result.extend_from_slice(&lines[cursor.min(lines.len())..]);
    result
}

// --- Patch Engine ---

/// Applies a whole unified diff to `content`, returning the new content and
/// the number of hunks applied.
///
/// Hunks are applied in descending `old_start` order against a single
/// mutating line buffer, which keeps earlier hunks' line numbers valid.
/// The operation is atomic: on any error the input is untouched and no
/// partially patched content escapes.
///
/// # Errors
///
/// - [`PatchError::NoHunks`] if the diff contains no parseable hunks.
/// - [`PatchError::OverlappingHunks`] if two hunks address overlapping
///   line ranges.
/// - [`PatchError::HunkOutOfBounds`] if a hunk's `old_start` lies beyond
///   the end of the file. Clamping here could silently corrupt a patch, so
///   the engine errors loudly instead.
///
/// # Example
///
/// ```
/// # use fuzzpatch::apply_unified_diff;
/// let content = "line 1\nline 2\nline 3\nline 4\n";
/// let diff = "--- a/f.txt\n+++ b/f.txt\n@@ -2,1 +2,1 @@\n-line 2\n+modified line 2\n";
/// let (new_content, hunks) = apply_unified_diff(content, diff).unwrap();
/// assert_eq!(new_content, "line 1\nmodified line 2\nline 3\nline 4\n");
/// assert_eq!(hunks, 1);
/// ```
pub fn apply_unified_diff(content: &str, diff: &str) -> Result<(String, usize), PatchError> {
    let hunks = parse_unified_diff(diff);
    if hunks.is_empty() {
        return Err(PatchError::NoHunks);
    }

    // Order hunks by old_start while remembering their parse positions for
    // error reporting.
    let mut order: Vec<usize> = (0..hunks.len()).collect();
    order.sort_by_key(|&i| hunks[i].old_start);

    // Reverse-order application is only sound for disjoint hunks.
    for pair in order.windows(2) {
        let (a, b) = (&hunks[pair[0]], &hunks[pair[1]]);
        if a.old_start + a.old_extent() > b.old_start {
            return Err(PatchError::OverlappingHunks {
                first: pair[0] + 1,
                second: pair[1] + 1,
            });
        }
    }

    let mut lines = split_lines(content);
    let mut applied = 0;
    for &i in order.iter().rev() {
        let hunk = &hunks[i];
        // old_start == len + 1 appends at EOF; anything past that has no
        // anchor in the file.
        if hunk.old_start.saturating_sub(1) > lines.len() {
            return Err(PatchError::HunkOutOfBounds {
                index: i + 1,
                old_start: hunk.old_start,
                len: lines.len(),
            });
        }
        lines = apply_hunk(&lines, hunk);
        applied += 1;
        debug!("applied hunk {}/{}", applied, hunks.len());
    }

    Ok((lines.concat(), hunks.len()))
}

/// Inserts `text` before the given 1-indexed line, returning the new
/// content and the number of lines inserted.
///
/// `line_number == 0` prepends. A line number beyond the end of the file
/// appends, adding a terminator to the previous last line first if it
/// lacked one. The inserted text is normalized to end with a terminator.
///
/// ```
/// # use fuzzpatch::insert_at_line;
/// // Appending past EOF terminates the old last line first.
/// let (new_content, inserted) = insert_at_line("line 1\nline 2", 10, "APPENDED\n");
/// assert_eq!(new_content, "line 1\nline 2\nAPPENDED\n");
/// assert_eq!(inserted, 1);
/// ```
pub fn insert_at_line(content: &str, line_number: usize, text: &str) -> (String, usize) {
    let mut lines = split_lines(content);

    let mut text = text.to_string();
    if !text.is_empty() && !text.ends_with('\n') {
        text.push('\n');
    }
    let inserted = split_lines(&text);
    let count = inserted.len();

    if line_number == 0 {
        let mut new_lines = inserted;
        new_lines.extend(lines);
        return (new_lines.concat(), count);
    }
    if line_number > lines.len() {
        if let Some(last) = lines.last_mut() {
            if !last.ends_with('\n') {
                last.push('\n');
            }
        }
        lines.extend(inserted);
        return (lines.concat(), count);
    }

    let idx = line_number - 1;
    let tail = lines.split_off(idx);
    lines.extend(inserted);
    lines.extend(tail);
    (lines.concat(), count)
}

/// Deletes the 1-indexed inclusive line range `[start_line, end_line]`,
/// returning the new content and the number of lines deleted.
///
/// `end_line` is clamped to the file length; deleting through the end of
/// the file is not an error.
///
/// # Errors
///
/// - [`PatchError::InvalidLineRange`] if `start_line < 1` or
///   `end_line < start_line`.
/// - [`PatchError::LineOutOfBounds`] if `start_line` is beyond the end of
///   the file.
pub fn delete_lines(
    content: &str,
    start_line: usize,
    end_line: usize,
) -> Result<(String, usize), PatchError> {
    if start_line < 1 || end_line < start_line {
        return Err(PatchError::InvalidLineRange {
            start: start_line,
            end: end_line,
        });
    }
    let mut lines = split_lines(content);
    if start_line > lines.len() {
        return Err(PatchError::LineOutOfBounds {
            line: start_line,
            len: lines.len(),
        });
    }
    let end_line = end_line.min(lines.len());
    lines.drain(start_line - 1..end_line);
    Ok((lines.concat(), end_line - start_line + 1))
}

/// Replaces the first fuzzy occurrence of `search` with `replace`,
/// converting a miss into a typed [`PatchError::PatternNotFound`] carrying
/// a truncated preview of the pattern.
///
/// This is the engine-level wrapper over [`FuzzyMatcher::replace_block`]
/// for callers that want an error rather than a found-flag.
pub fn replace_block(
    content: &str,
    search: &str,
    replace: &str,
    expected_offset: usize,
    options: &MatchOptions,
) -> Result<String, PatchError> {
    let matcher = FuzzyMatcher::new(*options);
    let (new_content, found) = matcher.replace_block(content, search, replace, expected_offset);
    if !found {
        return Err(PatchError::PatternNotFound {
            preview: pattern_preview(search),
        });
    }
    Ok(new_content)
}

/// Truncates a pattern to its first [`PATTERN_PREVIEW_LEN`] characters for
/// error messages, appending an ellipsis when shortened.
fn pattern_preview(pattern: &str) -> String {
    if pattern.chars().count() <= PATTERN_PREVIEW_LEN {
        return pattern.to_string();
    }
    let mut preview: String = pattern.chars().take(PATTERN_PREVIEW_LEN).collect();
    preview.push_str("...");
    preview
}

// --- File-Level Operations ---

/// A summary of what a file-level edit changed.
///
/// The `Display` impl produces the human-readable messages agents relay to
/// their users; tools branch on the variants instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditSummary {
    /// One block was replaced via fuzzy matching.
    Replaced {
        lines_removed: usize,
        lines_added: usize,
    },
    /// Every exact occurrence was replaced.
    ReplacedAll { occurrences: usize },
    /// A unified diff was applied.
    DiffApplied { hunks: usize },
    /// Lines were inserted at a position.
    Inserted { lines: usize, at_line: usize },
    /// A line range was deleted.
    Deleted { lines: usize },
}

impl std::fmt::Display for EditSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EditSummary::Replaced {
                lines_removed,
                lines_added,
            } => write!(
                f,
                "Changed {} line(s) to {} line(s)",
                lines_removed, lines_added
            ),
            EditSummary::ReplacedAll { occurrences } => {
                write!(f, "Replaced {} occurrence(s)", occurrences)
            }
            EditSummary::DiffApplied { hunks } => write!(f, "Applied {} hunk(s)", hunks),
            EditSummary::Inserted { lines, at_line } => {
                write!(f, "Inserted {} line(s) at line {}", lines, at_line)
            }
            EditSummary::Deleted { lines } => write!(f, "Deleted {} line(s)", lines),
        }
    }
}

/// The outcome of one file-level edit.
#[derive(Debug, Clone)]
pub struct EditReport {
    /// The resolved path of the edited file.
    pub path: PathBuf,
    /// What changed.
    pub summary: EditSummary,
    /// A unified diff of the proposed changes. Only populated in dry-run
    /// mode, where nothing is written to disk.
    pub diff: Option<String>,
}

impl std::fmt::Display for EditReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} in {}", self.summary, self.path.display())
    }
}

/// A caller-owned handle to a sandboxed project directory.
///
/// The workspace owns the project root and matcher options and performs the
/// read-modify-write cycle for every file-level operation. There is no
/// hidden module-level state: construct one per project root, pass it where
/// edits happen, and drop it when done.
///
/// Relative paths resolve against the root; absolute paths are accepted but
/// must still land inside the root after canonicalization, otherwise the
/// operation is rejected with [`EditError::PathTraversal`].
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    options: MatchOptions,
    dry_run: bool,
}

impl Workspace {
    /// Creates a workspace rooted at `root`, which must exist.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, EditError> {
        let root = root.into();
        let root = fs::canonicalize(&root).map_err(|e| map_io_error(root.clone(), e))?;
        Ok(Self {
            root,
            options: MatchOptions::default(),
            dry_run: false,
        })
    }

    /// Overrides the matcher options used by fuzzy operations.
    pub fn with_options(mut self, options: MatchOptions) -> Self {
        self.options = options;
        self
    }

    /// Enables dry-run mode: operations compute and report their changes
    /// (including a unified diff in the [`EditReport`]) but write nothing.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// The canonicalized project root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a user-supplied path to a canonical absolute path inside
    /// the workspace root, or rejects it.
    pub fn resolve(&self, path: impl AsRef<Path>) -> Result<PathBuf, EditError> {
        let path = path.as_ref();
        let joined = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };
        let resolved = fs::canonicalize(&joined).map_err(|e| map_io_error(joined.clone(), e))?;
        if !resolved.starts_with(&self.root) {
            warn!("rejected path escaping workspace root: {}", path.display());
            return Err(EditError::PathTraversal(path.to_path_buf()));
        }
        Ok(resolved)
    }

    /// Replaces one block in a file using fuzzy matching.
    ///
    /// More robust than exact string matching: minor differences in
    /// whitespace or formatting between `search` and the file are tolerated
    /// within the workspace's match threshold.
    pub fn search_replace(
        &self,
        path: impl AsRef<Path>,
        search: &str,
        replace: &str,
    ) -> Result<EditReport, EditError> {
        self.search_replace_near(path, search, replace, 0)
    }

    /// Like [`search_replace`](Self::search_replace), with a byte-offset
    /// hint for where the match is expected. Candidates farther from the
    /// hint pay a proportional score penalty.
    pub fn search_replace_near(
        &self,
        path: impl AsRef<Path>,
        search: &str,
        replace: &str,
        expected_offset: usize,
    ) -> Result<EditReport, EditError> {
        let (resolved, content) = self.read(path.as_ref())?;
        let new_content = replace_block(&content, search, replace, expected_offset, &self.options)?;
        let summary = EditSummary::Replaced {
            lines_removed: search.matches('\n').count() + 1,
            lines_added: replace.matches('\n').count() + 1,
        };
        self.finish(resolved, &content, new_content, summary)
    }

    /// Replaces all exact occurrences of `search` in a file.
    ///
    /// Unlike [`search_replace`](Self::search_replace), which fuzzily
    /// replaces only the first match, this requires exact matches so that
    /// every occurrence changes identically.
    pub fn search_replace_all(
        &self,
        path: impl AsRef<Path>,
        search: &str,
        replace: &str,
    ) -> Result<EditReport, EditError> {
        let (resolved, content) = self.read(path.as_ref())?;
        let (new_content, occurrences) = replace_all_exact(&content, search, replace);
        if occurrences == 0 {
            return Err(PatchError::PatternNotFound {
                preview: pattern_preview(search),
            }
            .into());
        }
        self.finish(
            resolved,
            &content,
            new_content,
            EditSummary::ReplacedAll { occurrences },
        )
    }

    /// Applies a unified diff to a file.
    pub fn apply_diff(&self, path: impl AsRef<Path>, diff: &str) -> Result<EditReport, EditError> {
        let (resolved, content) = self.read(path.as_ref())?;
        let (new_content, hunks) = apply_unified_diff(&content, diff)?;
        self.finish(
            resolved,
            &content,
            new_content,
            EditSummary::DiffApplied { hunks },
        )
    }

    /// Inserts text at a 1-indexed line in a file (0 prepends).
    pub fn insert_at_line(
        &self,
        path: impl AsRef<Path>,
        line_number: usize,
        text: &str,
    ) -> Result<EditReport, EditError> {
        let (resolved, content) = self.read(path.as_ref())?;
        let (new_content, lines) = insert_at_line(&content, line_number, text);
        self.finish(
            resolved,
            &content,
            new_content,
            EditSummary::Inserted {
                lines,
                at_line: line_number,
            },
        )
    }

    /// Deletes a 1-indexed inclusive line range from a file.
    pub fn delete_lines(
        &self,
        path: impl AsRef<Path>,
        start_line: usize,
        end_line: usize,
    ) -> Result<EditReport, EditError> {
        let (resolved, content) = self.read(path.as_ref())?;
        let (new_content, lines) = delete_lines(&content, start_line, end_line)?;
        self.finish(
            resolved,
            &content,
            new_content,
            EditSummary::Deleted { lines },
        )
    }

    fn read(&self, path: &Path) -> Result<(PathBuf, String), EditError> {
        let resolved = self.resolve(path)?;
        if resolved.is_dir() {
            return Err(EditError::TargetIsDirectory { path: resolved });
        }
        trace!("reading {}", resolved.display());
        let content =
            fs::read_to_string(&resolved).map_err(|e| map_io_error(resolved.clone(), e))?;
        Ok((resolved, content))
    }

    fn finish(
        &self,
        path: PathBuf,
        old_content: &str,
        new_content: String,
        summary: EditSummary,
    ) -> Result<EditReport, EditError> {
        let diff = if self.dry_run {
            debug!("dry run: not writing {}", path.display());
            let diff_text = similar::udiff::unified_diff(
                similar::Algorithm::default(),
                old_content,
                &new_content,
                3,
                Some(("a", "b")),
            );
            Some(diff_text.to_string())
        } else {
            fs::write(&path, &new_content).map_err(|e| map_io_error(path.clone(), e))?;
            None
        };
        Ok(EditReport {
            path,
            summary,
            diff,
        })
    }
}
