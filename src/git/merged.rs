//! Heuristic detection of branches whose work already landed on a base branch.
//!
//! Squash merges destroy direct ancestry, so "is this branch merged?" cannot
//! be answered exactly. The heuristic applies an ordered list of independent
//! signals, each returning a tri-state verdict; the first `Merged` wins and
//! everything else falls through to "not merged". False negatives are safe
//! (a workspace survives that could have been cleaned up); false positives
//! risk deleting unmerged work, so every ambiguity resolves conservatively
//! and no internal failure ever escapes as an error.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use super::{is_ancestor, ref_exists, remote_branch_exists, run_git_stdout};

/// How many recent base-branch commits the textual signals inspect.
const RECENCY_WINDOW: usize = 200;

/// Window for the stricter PR-convention correlation.
const PR_WINDOW: usize = 50;

/// Branch-name first segments that name a change category in PR-based flows.
const KNOWN_CATEGORIES: &[&str] = &[
    "feature", "feat", "fix", "bugfix", "hotfix", "chore", "misc", "refactor", "docs", "test",
];

/// Ignore textual matches on terms shorter than this; they fire on noise.
const MIN_CORRELATION_LEN: usize = 3;

/// Verdict of one merge-detection signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Merged,
    NotMerged,
    /// The signal could not tell, including any internal git failure.
    Inconclusive,
}

/// Decide whether a branch's work is already incorporated into `base_branch`.
///
/// Best-effort: never errors. Signals are consulted in order of strength and
/// the first positive one wins; with no positive signal the answer is
/// `false`.
pub fn is_branch_merged(store: &Path, branch: &str, base_branch: &str) -> bool {
    let signals = [
        direct_ancestry,
        squash_text_correlation,
        pr_convention_correlation,
        remote_absence_inference,
    ];

    for signal in signals {
        if signal(store, branch, base_branch) == Signal::Merged {
            return true;
        }
    }
    false
}

/// Signal 1: the branch tip is literally an ancestor of the base tip
/// (fast-forward or non-squash merge).
pub(crate) fn direct_ancestry(store: &Path, branch: &str, base_branch: &str) -> Signal {
    let Some(branch_ref) = best_ref(store, branch) else {
        return Signal::Inconclusive;
    };
    let Some(base_ref) = best_ref(store, base_branch) else {
        return Signal::Inconclusive;
    };

    match is_ancestor(store, &branch_ref, &base_ref) {
        Ok(true) => Signal::Merged,
        Ok(false) => Signal::NotMerged,
        Err(_) => Signal::Inconclusive,
    }
}

/// Signal 2: recent base-branch commit messages mention the branch, the
/// footprint a squash merge leaves behind.
pub(crate) fn squash_text_correlation(store: &Path, branch: &str, base_branch: &str) -> Signal {
    match recent_subjects(store, base_branch, RECENCY_WINDOW) {
        Some(subjects) => correlate(&subjects, branch),
        None => Signal::Inconclusive,
    }
}

/// Signal 3: PR-convention correlation. When the base history carries
/// pull-request markers like `(#123)` and the branch follows a
/// `<category>/<topic>` naming convention, a marked commit mentioning the
/// topic within a tight recency window is treated as the squashed PR.
pub(crate) fn pr_convention_correlation(store: &Path, branch: &str, base_branch: &str) -> Signal {
    let Some((category, topic)) = branch.split_once('/') else {
        return Signal::NotMerged;
    };
    if !KNOWN_CATEGORIES.contains(&category) || topic.len() < MIN_CORRELATION_LEN {
        return Signal::NotMerged;
    }

    let Some(subjects) = recent_subjects(store, base_branch, PR_WINDOW) else {
        return Signal::Inconclusive;
    };

    let marker = pr_marker_regex();
    let hit = subjects
        .iter()
        .any(|subject| marker.is_match(subject) && subject.contains(topic));
    if hit { Signal::Merged } else { Signal::NotMerged }
}

/// Signal 4: the branch is gone from the remote.
///
/// Absence alone proves nothing: a branch that was never pushed is
/// local-only work whose deletion would be unrecoverable, so the inference
/// requires reflog evidence that a remote copy once existed, and then still
/// demands a textual correlation against recent base history.
pub(crate) fn remote_absence_inference(store: &Path, branch: &str, base_branch: &str) -> Signal {
    if remote_branch_exists(store, branch) {
        // Still on the remote: nothing to infer from absence.
        return Signal::NotMerged;
    }

    if !was_ever_pushed(store, branch) {
        return Signal::NotMerged;
    }

    match recent_subjects(store, base_branch, RECENCY_WINDOW) {
        Some(subjects) => match correlate(&subjects, branch) {
            Signal::Merged => Signal::Merged,
            _ => Signal::Inconclusive,
        },
        None => Signal::Inconclusive,
    }
}

/// The strongest available ref for a branch: remote-tracking first, local
/// second.
fn best_ref(store: &Path, branch: &str) -> Option<String> {
    let remote_ref = format!("refs/remotes/origin/{}", branch);
    if ref_exists(store, &remote_ref) {
        return Some(remote_ref);
    }
    let local_ref = format!("refs/heads/{}", branch);
    if ref_exists(store, &local_ref) {
        return Some(local_ref);
    }
    None
}

/// Recent commit subjects on a branch, newest first.
fn recent_subjects(store: &Path, branch: &str, window: usize) -> Option<Vec<String>> {
    let branch_ref = best_ref(store, branch)?;
    let count = format!("--max-count={}", window);
    let output = run_git_stdout(store, &["log", &count, "--format=%s", &branch_ref]).ok()?;
    Some(output.lines().map(str::to_string).collect())
}

/// Whether a remote-tracking copy of the branch ever existed, judged from
/// the store's reflog. The logfile survives deletion of the ref itself.
fn was_ever_pushed(store: &Path, branch: &str) -> bool {
    run_git_stdout(
        store,
        &["reflog", "show", &format!("refs/remotes/origin/{}", branch)],
    )
    .map(|out| !out.is_empty())
    .unwrap_or(false)
}

/// Textual correlation of a branch name against commit subjects: the full
/// name, its last path segment, or the slash-escaped variant.
fn correlate(subjects: &[String], branch: &str) -> Signal {
    let last_segment = branch.rsplit('/').next().unwrap_or(branch);
    let escaped = branch.replace('/', "-");

    let mut candidates = vec![branch];
    if last_segment != branch {
        candidates.push(last_segment);
    }
    if escaped != branch {
        candidates.push(&escaped);
    }

    let hit = subjects.iter().any(|subject| {
        candidates
            .iter()
            .any(|c| c.len() >= MIN_CORRELATION_LEN && subject.contains(*c))
    });
    if hit { Signal::Merged } else { Signal::NotMerged }
}

fn pr_marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\(#\d+\)").expect("valid regex"))
}
