//! Per-project configuration consumed by the lifecycle engine.
//!
//! Loading and merging these values from configuration files is the command
//! layer's job; the engine treats them as opaque inputs to the naming and
//! pool-overflow steps.

use regex::Regex;

/// How a branch name becomes a workspace (directory) name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NamingStrategy {
    /// Conservative character filter: anything outside `[A-Za-z0-9._-]`
    /// becomes a dash.
    #[default]
    Sanitized,
    /// Lowercased, dash-separated.
    KebabCase,
    /// Lowercased, underscore-separated.
    SnakeCase,
}

impl NamingStrategy {
    /// Apply the strategy to a branch name, yielding a filesystem-safe
    /// workspace name.
    pub fn apply(&self, branch: &str) -> String {
        match self {
            NamingStrategy::Sanitized => map_chars(branch, false, '-'),
            NamingStrategy::KebabCase => map_chars(branch, true, '-'),
            NamingStrategy::SnakeCase => map_chars(branch, true, '_'),
        }
    }
}

fn map_chars(input: &str, lowercase: bool, separator: char) -> String {
    let mut out = String::with_capacity(input.len());
    let mut last_was_sep = true; // suppress a leading separator

    for c in input.chars() {
        let keep = if lowercase {
            c.is_ascii_alphanumeric()
        } else {
            c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')
        };

        if keep {
            out.push(if lowercase { c.to_ascii_lowercase() } else { c });
            last_was_sep = false;
        } else if !last_was_sep {
            out.push(separator);
            last_was_sep = true;
        }
    }

    out.trim_end_matches(separator).to_string()
}

/// A branch-inference rule: input matching `pattern` produces a branch name
/// from `template`, with `$1`-style capture substitution.
#[derive(Debug, Clone)]
pub struct BranchPattern {
    pub pattern: Regex,
    pub template: String,
}

impl BranchPattern {
    /// Apply the rule, returning the expanded branch name on a match.
    pub fn expand(&self, input: &str) -> Option<String> {
        let captures = self.pattern.captures(input)?;
        let mut out = String::new();
        captures.expand(&self.template, &mut out);
        Some(out)
    }
}

/// Infer a branch name from free-form input using the first matching rule.
pub fn infer_branch(patterns: &[BranchPattern], input: &str) -> Option<String> {
    patterns.iter().find_map(|p| p.expand(input))
}

/// Pool sizing and aging policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolPolicy {
    /// Pooled workspaces beyond this count are evicted oldest-first on release.
    pub max_size: usize,

    /// Pooled workspaces idle longer than this are cleanup candidates.
    pub max_age_days: i64,
}

impl Default for PoolPolicy {
    fn default() -> Self {
        PoolPolicy {
            max_size: 5,
            max_age_days: 30,
        }
    }
}

/// Everything the configuration provider supplies for one project.
#[derive(Debug, Clone, Default)]
pub struct ProjectConfig {
    pub naming: NamingStrategy,

    /// Overrides the project's default branch as the base for new workspaces.
    pub default_base_branch: Option<String>,

    pub branch_patterns: Vec<BranchPattern>,

    pub pool: PoolPolicy,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitized_preserves_case_and_dots() {
        assert_eq!(NamingStrategy::Sanitized.apply("feature/Login.v2"), "feature-Login.v2");
    }

    #[test]
    fn kebab_lowercases_and_collapses() {
        assert_eq!(NamingStrategy::KebabCase.apply("feature/Big__Login"), "feature-big-login");
    }

    #[test]
    fn snake_uses_underscores() {
        assert_eq!(NamingStrategy::SnakeCase.apply("fix/rate-limit"), "fix_rate_limit");
    }

    #[test]
    fn no_trailing_or_leading_separator() {
        assert_eq!(NamingStrategy::KebabCase.apply("/weird/"), "weird");
    }

    #[test]
    fn branch_pattern_expands_captures() {
        let patterns = vec![BranchPattern {
            pattern: Regex::new(r"^([A-Z]+-\d+)").unwrap(),
            template: "ticket/$1".to_string(),
        }];
        assert_eq!(
            infer_branch(&patterns, "PROJ-123 fix the thing"),
            Some("ticket/PROJ-123".to_string())
        );
        assert_eq!(infer_branch(&patterns, "no ticket here"), None);
    }

    #[test]
    fn pool_policy_defaults() {
        let policy = PoolPolicy::default();
        assert_eq!(policy.max_size, 5);
        assert_eq!(policy.max_age_days, 30);
    }
}
