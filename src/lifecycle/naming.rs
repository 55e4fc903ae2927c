//! Workspace naming: branch-name sanitization and the pool naming rule.
//!
//! Pool workspaces are named `{tracking-}wksp-N`, where the tracking-branch
//! prefix appears only for claims against a non-default branch; the bare
//! `wksp-N` form is the older scheme and stays accepted. The next `N` is one
//! greater than the largest suffix among the project's pool-style names
//! regardless of mode: a name is reserved once ever used, which tolerates
//! gaps left by removals and avoids colliding with a workspace later renamed
//! away from the pattern.

use crate::config::NamingStrategy;

/// The fixed stem of pool-workspace names.
pub const POOL_STEM: &str = "wksp";

/// Build a pool-workspace name.
///
/// `prefix` is the (already sanitized) tracking-branch prefix, or `None` for
/// the bare form.
pub fn pool_name(prefix: Option<&str>, index: u32) -> String {
    match prefix {
        Some(prefix) if !prefix.is_empty() => format!("{}-{}-{}", prefix, POOL_STEM, index),
        _ => format!("{}-{}", POOL_STEM, index),
    }
}

/// Parse the numeric suffix of a pool-style name.
///
/// Accepts `wksp-N` and `{prefix-}wksp-N`; anything else is not pool-style.
pub fn pool_suffix(name: &str) -> Option<u32> {
    let idx = name.rfind(&format!("{}-", POOL_STEM))?;
    // The stem must be the whole name or sit on a dash boundary.
    if idx > 0 && name.as_bytes().get(idx - 1) != Some(&b'-') {
        return None;
    }
    let digits = &name[idx + POOL_STEM.len() + 1..];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// The next pool index for a project: max suffix ever seen plus one.
pub fn next_pool_index<'a>(names: impl IntoIterator<Item = &'a str>) -> u32 {
    names
        .into_iter()
        .filter_map(pool_suffix)
        .max()
        .map(|max| max + 1)
        .unwrap_or(1)
}

/// Sanitize a tracking branch into a pool-name prefix.
pub fn pool_prefix(strategy: NamingStrategy, tracking_branch: &str) -> String {
    strategy.apply(tracking_branch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn pool_name_forms() {
        assert_eq!(pool_name(None, 1), "wksp-1");
        assert_eq!(pool_name(Some("release-2.0"), 3), "release-2.0-wksp-3");
    }

    #[test]
    fn pool_suffix_accepts_both_schemes() {
        assert_eq!(pool_suffix("wksp-1"), Some(1));
        assert_eq!(pool_suffix("wksp-42"), Some(42));
        assert_eq!(pool_suffix("main-wksp-7"), Some(7));
        assert_eq!(pool_suffix("release-2.0-wksp-12"), Some(12));
    }

    #[test]
    fn pool_suffix_rejects_non_pool_names() {
        assert_eq!(pool_suffix("feature-x"), None);
        assert_eq!(pool_suffix("wksp-"), None);
        assert_eq!(pool_suffix("wksp-abc"), None);
        assert_eq!(pool_suffix("mywksp-3"), None);
        assert_eq!(pool_suffix("wksp-3-extra"), None);
    }

    #[test]
    fn next_index_skips_gaps() {
        // Removals left a gap: 1 and 5 exist, so the next is 6, never 2.
        let names = ["wksp-1", "wksp-5", "feature-x"];
        assert_eq!(next_pool_index(names), 6);
    }

    #[test]
    fn next_index_starts_at_one() {
        assert_eq!(next_pool_index(["feature-x"]), 1);
        assert_eq!(next_pool_index([]), 1);
    }

    #[test]
    fn next_index_spans_prefixed_and_bare_names() {
        let names = ["wksp-2", "main-wksp-9"];
        assert_eq!(next_pool_index(names), 10);
    }

    proptest! {
        /// The allocated suffix is strictly greater than every suffix ever
        /// seen, for any mix of pool-style and unrelated names.
        #[test]
        fn allocation_is_monotonic(
            suffixes in prop::collection::vec(1u32..10_000, 0..20),
            noise in prop::collection::vec("[a-z][a-z0-9-]{0,12}", 0..10),
        ) {
            let mut names: Vec<String> =
                suffixes.iter().map(|n| pool_name(None, *n)).collect();
            names.extend(noise);

            let next = next_pool_index(names.iter().map(String::as_str));
            for suffix in &suffixes {
                prop_assert!(next > *suffix);
            }
        }

        /// pool_name and pool_suffix are inverses for sane prefixes.
        #[test]
        fn suffix_round_trips(
            index in 1u32..100_000,
            prefix in prop::option::of("[a-z][a-z0-9.-]{0,10}[a-z0-9]"),
        ) {
            let name = pool_name(prefix.as_deref(), index);
            prop_assert_eq!(pool_suffix(&name), Some(index));
        }
    }
}
