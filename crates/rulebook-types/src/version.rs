use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::diff::{FileDiffSummary, FilesSummary};
use crate::package::{PackageId, VersionId};

/// Immutable history record created by approving a staged package.
///
/// The record points at a snapshot of the live tree as it was immediately
/// before the approval replaced it, and carries the diff from that tree to
/// the approved one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetVersion {
    pub id: VersionId,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
    /// Location of the pre-approval tree, relative to the history root.
    pub snapshot: String,
    pub summary: FilesSummary,
    pub files: Vec<FileDiffSummary>,
}

impl AssetVersion {
    pub fn package(&self) -> &PackageId {
        self.id.package()
    }
}

/// What approving the currently staged tree of a package would change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncPreview {
    pub package: PackageId,
    pub display_name: String,
    /// The version an approval would create.
    pub target_version: VersionId,
    pub staged_at: DateTime<Utc>,
    pub summary: FilesSummary,
    pub files: Vec<FileDiffSummary>,
    /// Warnings reported by the fetcher while producing the tree.
    pub fetch_warnings: Vec<String>,
    /// Suppression rules that refer to rule ids the staged tree drops.
    pub suppression_warnings: Vec<SuppressionWarning>,
}

impl SyncPreview {
    pub fn has_changes(&self) -> bool {
        self.summary.changed() > 0
    }
}

// ---------------------------------------------------------------------------
// SuppressionWarning
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarningSeverity {
    Info,
    Warning,
    Critical,
}

impl fmt::Display for WarningSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Critical => "CRITICAL",
        };
        f.write_str(label)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImpactKind {
    /// The rule id no longer exists in the staged rule set.
    Removed,
    /// The rule id disappeared but a similarly named one was added.
    PossiblyRenamed,
}

/// A suppression rule whose target rule id is affected by a staged change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuppressionWarning {
    pub severity: WarningSeverity,
    pub kind: ImpactKind,
    /// The rule id that disappeared.
    pub rule_id: String,
    /// Profile owning the suppression; `None` for global suppressions.
    pub profile: Option<String>,
    pub pattern: String,
    /// Closest newly added rule id, for `PossiblyRenamed`.
    pub suggested_rule_id: Option<String>,
    /// Schematron file the rule id was removed from.
    pub file: String,
    pub message: String,
}

impl SuppressionWarning {
    pub fn removed(rule_id: &str, profile: Option<&str>, pattern: &str, file: &str) -> Self {
        Self {
            severity: WarningSeverity::Critical,
            kind: ImpactKind::Removed,
            rule_id: rule_id.to_string(),
            profile: profile.map(str::to_string),
            pattern: pattern.to_string(),
            suggested_rule_id: None,
            file: file.to_string(),
            message: format!(
                "rule '{rule_id}' was removed; suppression '{pattern}' in {} no longer matches anything",
                owner(profile)
            ),
        }
    }

    pub fn possibly_renamed(
        rule_id: &str,
        profile: Option<&str>,
        pattern: &str,
        file: &str,
        suggested: &str,
    ) -> Self {
        Self {
            severity: WarningSeverity::Warning,
            kind: ImpactKind::PossiblyRenamed,
            rule_id: rule_id.to_string(),
            profile: profile.map(str::to_string),
            pattern: pattern.to_string(),
            suggested_rule_id: Some(suggested.to_string()),
            file: file.to_string(),
            message: format!(
                "rule '{rule_id}' was removed, possibly renamed to '{suggested}'; review suppression '{pattern}' in {}",
                owner(profile)
            ),
        }
    }
}

fn owner(profile: Option<&str>) -> String {
    match profile {
        Some(name) => format!("profile '{name}'"),
        None => "global suppressions".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warning_constructors_set_severity() {
        let removed = SuppressionWarning::removed("BR-01", Some("base"), "BR-.*", "main.sch");
        assert_eq!(removed.severity, WarningSeverity::Critical);
        assert_eq!(removed.kind, ImpactKind::Removed);
        assert!(removed.message.contains("profile 'base'"));

        let renamed =
            SuppressionWarning::possibly_renamed("BR-01", None, "BR-01", "main.sch", "BR-001");
        assert_eq!(renamed.severity, WarningSeverity::Warning);
        assert_eq!(renamed.suggested_rule_id.as_deref(), Some("BR-001"));
        assert!(renamed.message.contains("global suppressions"));
    }

    #[test]
    fn severity_orders_by_urgency() {
        assert!(WarningSeverity::Critical > WarningSeverity::Warning);
        assert!(WarningSeverity::Warning > WarningSeverity::Info);
    }
}
