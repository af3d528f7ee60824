//! Compiled suppression rules and their application to findings.

use std::collections::BTreeSet;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::model::{MatchMode, Scope, SuppressionRule};

/// One Schematron finding.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchematronError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test: Option<String>,
    pub message: String,
}

impl SchematronError {
    pub fn new(rule_id: Option<&str>, test: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            rule_id: rule_id.map(str::to_string),
            test: test.map(str::to_string),
            message: message.into(),
        }
    }
}

/// Findings split by whether a rule suppressed them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuppressionResult {
    pub active: Vec<SchematronError>,
    pub suppressed: Vec<SchematronError>,
    pub profile: Option<String>,
    pub suppressed_count: usize,
}

// ---------------------------------------------------------------------------
// CompiledRule
// ---------------------------------------------------------------------------

/// A suppression rule with its pattern compiled.
#[derive(Clone, Debug)]
pub struct CompiledRule {
    mode: MatchMode,
    pattern: String,
    /// Whole-value match; equals modes are escaped literals.
    full: Regex,
    /// Unanchored form, kept for text rules only.
    partial: Option<Regex>,
    scope: Scope,
}

impl CompiledRule {
    /// Compile `rule`. Blank patterns yield `Ok(None)`.
    pub fn compile(rule: &SuppressionRule) -> Result<Option<Self>, regex::Error> {
        Self::build(rule.match_mode, rule.pattern.trim(), rule.scope.clone())
    }

    /// Parse a caller-supplied ad-hoc suppression.
    ///
    /// `test:<expr>` matches the test expression literally, `text:<regex>`
    /// matches the message, and anything else is a literal rule id. Ad-hoc
    /// rules are unconditional. Invalid regexes are logged and dropped.
    pub fn ad_hoc(entry: &str) -> Option<Self> {
        let entry = entry.trim();
        let (mode, pattern) = if let Some(rest) = entry.strip_prefix("test:") {
            (MatchMode::TestEquals, rest)
        } else if let Some(rest) = entry.strip_prefix("text:") {
            (MatchMode::Text, rest)
        } else {
            (MatchMode::RuleIdEquals, entry)
        };
        match Self::build(mode, pattern.trim(), Scope::Unconditional) {
            Ok(rule) => rule,
            Err(e) => {
                warn!(entry, error = %e, "ignoring invalid ad-hoc suppression");
                None
            }
        }
    }

    fn build(mode: MatchMode, pattern: &str, scope: Scope) -> Result<Option<Self>, regex::Error> {
        if pattern.is_empty() {
            return Ok(None);
        }
        let body = if mode.is_literal() {
            regex::escape(pattern)
        } else {
            pattern.to_string()
        };
        let full = Regex::new(&format!("^(?:{body})$"))?;
        let partial = match mode {
            MatchMode::Text => Some(Regex::new(&body)?),
            _ => None,
        };
        Ok(Some(Self {
            mode,
            pattern: pattern.to_string(),
            full,
            partial,
            scope,
        }))
    }

    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Whether this rule is in effect for the given active type tags.
    pub fn applies_to(&self, active: &BTreeSet<String>) -> bool {
        self.scope.applies_to(active)
    }

    /// Whether the finding's targeted field matches in full. A finding that
    /// lacks the targeted field never matches.
    pub fn matches(&self, error: &SchematronError) -> bool {
        let target = match self.mode {
            MatchMode::RuleId | MatchMode::RuleIdEquals => error.rule_id.as_deref(),
            MatchMode::Test | MatchMode::TestEquals => error.test.as_deref(),
            MatchMode::Text => Some(error.message.as_str()),
        };
        target.is_some_and(|t| self.full.is_match(t))
    }

    /// Whether a raw XSD message matches. Only text rules apply, as a full
    /// match or anywhere within the message.
    pub fn matches_text(&self, message: &str) -> bool {
        self.partial.as_ref().is_some_and(|re| re.is_match(message))
    }
}

/// Compile every usable rule, logging and skipping invalid patterns.
pub fn compile_rules(owner: &str, rules: &[SuppressionRule]) -> Vec<CompiledRule> {
    rules
        .iter()
        .filter_map(|rule| match CompiledRule::compile(rule) {
            Ok(compiled) => compiled,
            Err(e) => {
                warn!(
                    owner,
                    mode = %rule.match_mode,
                    pattern = %rule.pattern,
                    error = %e,
                    "skipping suppression with invalid pattern"
                );
                None
            }
        })
        .collect()
}

/// Split `errors` into active and suppressed, preserving order.
pub fn partition(
    errors: Vec<SchematronError>,
    rules: &[&CompiledRule],
    profile: Option<&str>,
) -> SuppressionResult {
    let (suppressed, active): (Vec<_>, Vec<_>) = errors
        .into_iter()
        .partition(|e| rules.iter().any(|r| r.matches(e)));
    SuppressionResult {
        suppressed_count: suppressed.len(),
        active,
        suppressed,
        profile: profile.map(str::to_string),
    }
}

/// Keep the raw XSD messages no text rule matches.
pub fn filter_xsd(messages: Vec<String>, rules: &[&CompiledRule]) -> Vec<String> {
    messages
        .into_iter()
        .filter(|m| !rules.iter().any(|r| r.matches_text(m)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compiled(mode: MatchMode, pattern: &str) -> CompiledRule {
        CompiledRule::compile(&SuppressionRule::new(mode, pattern)).unwrap().unwrap()
    }

    fn finding(rule_id: &str, test: &str, message: &str) -> SchematronError {
        SchematronError::new(Some(rule_id), Some(test), message)
    }

    #[test]
    fn rule_id_regex_is_full_match() {
        let rule = compiled(MatchMode::RuleId, "TR-\\d+");
        assert!(rule.matches(&finding("TR-12", "t", "m")));
        assert!(!rule.matches(&finding("TR-12a", "t", "m")));
        assert!(!rule.matches(&finding("XTR-12", "t", "m")));
    }

    #[test]
    fn alternation_is_anchored_as_a_whole() {
        let rule = compiled(MatchMode::RuleId, "A|B");
        assert!(rule.matches(&finding("A", "t", "m")));
        assert!(!rule.matches(&finding("AX", "t", "m")));
        assert!(!rule.matches(&finding("XB", "t", "m")));
    }

    #[test]
    fn equals_modes_are_literal() {
        let rule = compiled(MatchMode::TestEquals, "count(cac:Signature) = 1");
        assert!(rule.matches(&finding("R", "count(cac:Signature) = 1", "m")));
        assert!(!rule.matches(&finding("R", "count(cac:Signature) = 11", "m")));

        let rule = compiled(MatchMode::RuleIdEquals, "TR.1");
        assert!(rule.matches(&finding("TR.1", "t", "m")));
        assert!(!rule.matches(&finding("TRX1", "t", "m")));
    }

    #[test]
    fn missing_target_field_never_matches() {
        let rule = compiled(MatchMode::RuleId, ".*");
        assert!(!rule.matches(&SchematronError::new(None, Some("t"), "m")));
        let rule = compiled(MatchMode::Test, ".*");
        assert!(!rule.matches(&SchematronError::new(Some("R"), None, "m")));
    }

    #[test]
    fn blank_and_invalid_patterns_are_skipped() {
        let rules = compile_rules(
            "test",
            &[
                SuppressionRule::new(MatchMode::RuleId, "  "),
                SuppressionRule::new(MatchMode::RuleId, "(unclosed"),
                SuppressionRule::new(MatchMode::Text, ".*Signature.*"),
            ],
        );
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].mode(), MatchMode::Text);
    }

    #[test]
    fn ad_hoc_prefixes() {
        let by_test = CompiledRule::ad_hoc("test:a = b").unwrap();
        assert_eq!(by_test.mode(), MatchMode::TestEquals);
        assert!(by_test.matches(&finding("R", "a = b", "m")));

        let by_text = CompiledRule::ad_hoc("text:.*Signature.*").unwrap();
        assert_eq!(by_text.mode(), MatchMode::Text);
        assert!(by_text.matches(&finding("R", "t", "Missing Signature element")));

        let by_id = CompiledRule::ad_hoc("TR.1").unwrap();
        assert_eq!(by_id.mode(), MatchMode::RuleIdEquals);
        assert!(by_id.matches(&finding("TR.1", "t", "m")));
        assert!(!by_id.matches(&finding("TRX1", "t", "m")));
        assert!(by_id.scope().is_unconditional());

        assert!(CompiledRule::ad_hoc("text:(").is_none());
        assert!(CompiledRule::ad_hoc("  ").is_none());
    }

    #[test]
    fn xsd_matching_uses_text_rules_only() {
        let text = compiled(MatchMode::Text, "cvc-complex-type.2.4.a");
        let by_id = compiled(MatchMode::RuleId, ".*");
        let message = "cvc-complex-type.2.4.a: Invalid content was found starting with element 'cac:Note'";

        assert!(text.matches_text(message));
        assert!(!by_id.matches_text(message));

        let kept = filter_xsd(
            vec![message.to_string(), "cvc-datatype-valid.1.2.1".to_string()],
            &[&text, &by_id],
        );
        assert_eq!(kept, vec!["cvc-datatype-valid.1.2.1"]);
    }

    #[test]
    fn partition_preserves_order() {
        let rule = compiled(MatchMode::RuleId, "DROP-.*");
        let result = partition(
            vec![
                finding("KEEP-1", "t", "a"),
                finding("DROP-1", "t", "b"),
                finding("KEEP-2", "t", "c"),
                finding("DROP-2", "t", "d"),
            ],
            &[&rule],
            Some("unsigned"),
        );
        let ids = |v: &[SchematronError]| -> Vec<String> {
            v.iter().filter_map(|e| e.rule_id.clone()).collect()
        };
        assert_eq!(ids(&result.active), vec!["KEEP-1", "KEEP-2"]);
        assert_eq!(ids(&result.suppressed), vec!["DROP-1", "DROP-2"]);
        assert_eq!(result.suppressed_count, 2);
        assert_eq!(result.profile.as_deref(), Some("unsigned"));
    }
}
