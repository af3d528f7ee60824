//! Suppressions broken by a Schematron update.
//!
//! When a staged package removes rule ids from a Schematron file, every
//! rule-id suppression that matched one of them stops doing anything. Each
//! such pair is reported, with a suggested replacement when the same file
//! gained a similarly named id.

use std::path::Path;

use regex::Regex;
use rulebook_diff::{is_schematron_path, RuleIdDiff};
use rulebook_store::resolve_relative;
use rulebook_types::{FileChangeStatus, FileDiffSummary, SuppressionWarning};
use tracing::debug;

use crate::error::ProfileResult;
use crate::model::{MatchMode, ProfileDocument, SuppressionRule};

/// Compare the Schematron files among `files` between `old_root` and
/// `new_root` and report suppressions targeting removed rule ids.
///
/// Only rule-id suppressions are considered: each profile's own and the
/// global ones. Profiles are not resolved, so an inherited suppression is
/// reported once, against the profile that declares it.
pub fn analyze_impact(
    document: &ProfileDocument,
    old_root: &Path,
    new_root: &Path,
    files: &[FileDiffSummary],
) -> ProfileResult<Vec<SuppressionWarning>> {
    let targets = rule_id_suppressions(document);
    if targets.is_empty() {
        return Ok(Vec::new());
    }

    let mut warnings = Vec::new();
    for file in files.iter().filter(|f| {
        matches!(f.status, FileChangeStatus::Modified | FileChangeStatus::Removed) && is_schematron_path(&f.path)
    }) {
        let (Some(old), Some(new)) = (
            resolve_relative(old_root, &file.path),
            resolve_relative(new_root, &file.path),
        ) else {
            continue;
        };
        let diff = RuleIdDiff::between_files(&old, &new)?;
        if diff.removed.is_empty() {
            continue;
        }
        debug!(file = %file.path, removed = diff.removed.len(), added = diff.added.len(), "rule ids changed");

        for removed in &diff.removed {
            for target in targets.iter().filter(|t| t.matches(removed)) {
                let warning = match closest(removed, diff.added.iter().map(String::as_str)) {
                    Some(suggested) => SuppressionWarning::possibly_renamed(
                        removed,
                        target.profile,
                        &target.rule.pattern,
                        &file.path,
                        suggested,
                    ),
                    None => SuppressionWarning::removed(removed, target.profile, &target.rule.pattern, &file.path),
                };
                warnings.push(warning);
            }
        }
    }
    Ok(warnings)
}

/// A rule-id suppression and who owns it.
struct Target<'a> {
    profile: Option<&'a str>,
    rule: &'a SuppressionRule,
    regex: Option<Regex>,
}

impl Target<'_> {
    /// Regex rules match in full; a pattern that is not a valid regex is
    /// compared literally.
    fn matches(&self, rule_id: &str) -> bool {
        let pattern = self.rule.pattern.trim();
        match &self.regex {
            Some(re) => re.is_match(rule_id),
            None => pattern == rule_id,
        }
    }
}

fn rule_id_suppressions(document: &ProfileDocument) -> Vec<Target<'_>> {
    let global = document.suppressions.iter().map(|r| (None, r));
    let owned = document
        .profiles
        .iter()
        .flat_map(|(name, p)| p.suppressions.iter().map(move |r| (Some(name.as_str()), r)));

    global
        .chain(owned)
        .filter(|(_, r)| r.match_mode.targets_rule_id() && !r.pattern.trim().is_empty())
        .map(|(profile, rule)| Target {
            profile,
            rule,
            regex: match rule.match_mode {
                MatchMode::RuleId => Regex::new(&format!("^(?:{})$", rule.pattern.trim())).ok(),
                _ => None,
            },
        })
        .collect()
}

/// The candidate closest to `id` by case-insensitive edit distance, if any
/// is within `max(3, len / 3)`.
fn closest<'a>(id: &str, candidates: impl Iterator<Item = &'a str>) -> Option<&'a str> {
    let id_lower = id.to_lowercase();
    let threshold = (id.chars().count() / 3).max(3);
    candidates
        .map(|c| (levenshtein(&id_lower, &c.to_lowercase()), c))
        .filter(|(d, _)| *d <= threshold)
        .min_by_key(|(d, _)| *d)
        .map(|(_, c)| c)
}

fn levenshtein(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut row: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.chars().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let above = row[j + 1];
            row[j + 1] = if ca == *cb {
                diagonal
            } else {
                1 + diagonal.min(above).min(row[j])
            };
            diagonal = above;
        }
    }
    row[b.len()]
}
