//! The persisted profile document.
//!
//! ```yaml
//! schematron-rules:          # global custom assertions, per Schematron type
//!   UBL_TR_MAIN:
//!     - context: "cac:Invoice"
//!       test: "cbc:ProfileID != ''"
//!       message: "ProfileID is required"
//! suppressions:              # global suppressions, applied with every profile
//!   - match: ruleId
//!     pattern: "TR-LEGACY-.*"
//! profiles:
//!   unsigned:
//!     description: "Unsigned drafts"
//!     extends: base
//!     suppressions:
//!       - match: text
//!         pattern: ".*Signature.*"
//!         scope: [INVOICE, CREDIT_NOTE]
//!     xsd-overrides:
//!       INVOICE:
//!         - element: "cac:Signature"
//!           minOccurs: 0
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{ProfileError, ProfileResult};

/// Custom Schematron assertions keyed by Schematron type.
pub type SchematronRules = BTreeMap<String, Vec<SchematronCustomAssertion>>;

/// XSD cardinality overrides keyed by schema type.
pub type XsdOverrides = BTreeMap<String, Vec<XsdOverride>>;

// ---------------------------------------------------------------------------
// ProfileDocument
// ---------------------------------------------------------------------------

/// Everything stored in the profiles file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProfileDocument {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub schematron_rules: SchematronRules,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suppressions: Vec<SuppressionRule>,

    #[serde(default)]
    pub profiles: BTreeMap<String, ValidationProfile>,
}

impl ProfileDocument {
    /// Parse and normalize a YAML document. An empty string is an empty document.
    pub fn from_yaml(text: &str) -> ProfileResult<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let mut document: Self =
            serde_yaml_ng::from_str(text).map_err(|e| ProfileError::Document(e.to_string()))?;
        document.normalize();
        Ok(document)
    }

    pub fn to_yaml(&self) -> ProfileResult<String> {
        serde_yaml_ng::to_string(self).map_err(|e| ProfileError::Document(e.to_string()))
    }

    /// Drop incomplete custom assertions and types left without any.
    pub fn normalize(&mut self) {
        normalize_rules(&mut self.schematron_rules);
        for profile in self.profiles.values_mut() {
            normalize_rules(&mut profile.schematron_rules);
        }
    }
}

fn normalize_rules(rules: &mut SchematronRules) {
    for assertions in rules.values_mut() {
        assertions.retain(SchematronCustomAssertion::is_complete);
    }
    rules.retain(|_, assertions| !assertions.is_empty());
}

// ---------------------------------------------------------------------------
// ValidationProfile
// ---------------------------------------------------------------------------

/// One profile as written, before inheritance is applied.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ValidationProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extends: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suppressions: Vec<SuppressionRule>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub xsd_overrides: XsdOverrides,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub schematron_rules: SchematronRules,
}

impl ValidationProfile {
    /// The parent profile name, if `extends` is set and non-blank.
    pub fn parent(&self) -> Option<&str> {
        self.extends.as_deref().map(str::trim).filter(|p| !p.is_empty())
    }
}

// ---------------------------------------------------------------------------
// SuppressionRule
// ---------------------------------------------------------------------------

/// Which field of a finding a suppression pattern is matched against, and how.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MatchMode {
    /// Rule id, full regex match.
    #[default]
    RuleId,
    /// Rule id, literal equality.
    RuleIdEquals,
    /// Assertion test expression, full regex match.
    Test,
    /// Assertion test expression, literal equality.
    TestEquals,
    /// Message text, regex.
    #[serde(alias = "message")]
    Text,
}

impl MatchMode {
    /// True for the modes that compare literally.
    pub fn is_literal(self) -> bool {
        matches!(self, MatchMode::RuleIdEquals | MatchMode::TestEquals)
    }

    /// True for the modes that look at the rule id.
    pub fn targets_rule_id(self) -> bool {
        matches!(self, MatchMode::RuleId | MatchMode::RuleIdEquals)
    }
}

impl fmt::Display for MatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MatchMode::RuleId => "ruleId",
            MatchMode::RuleIdEquals => "ruleIdEquals",
            MatchMode::Test => "test",
            MatchMode::TestEquals => "testEquals",
            MatchMode::Text => "text",
        };
        f.write_str(s)
    }
}

/// A declarative "hide findings matching this" rule.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuppressionRule {
    #[serde(rename = "match", default)]
    pub match_mode: MatchMode,

    pub pattern: String,

    #[serde(default, skip_serializing_if = "Scope::is_unconditional")]
    pub scope: Scope,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl SuppressionRule {
    pub fn new(match_mode: MatchMode, pattern: impl Into<String>) -> Self {
        Self {
            match_mode,
            pattern: pattern.into(),
            scope: Scope::Unconditional,
            description: None,
        }
    }

    pub fn scoped<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scope = Scope::restricted_to(tags);
        self
    }
}

// ---------------------------------------------------------------------------
// Scope
// ---------------------------------------------------------------------------

/// The document types a suppression applies to.
///
/// Written in YAML as a single tag, a list of tags, or omitted. An omitted or
/// empty scope is unconditional.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<ScopeRepr>", into = "Vec<String>")]
pub enum Scope {
    #[default]
    Unconditional,
    RestrictedTo(BTreeSet<String>),
}

impl Scope {
    /// Scope to the given tags; blank tags are ignored and no tags at all
    /// means unconditional.
    pub fn restricted_to<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tags: BTreeSet<String> = tags
            .into_iter()
            .map(|t| t.into().trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        if tags.is_empty() {
            Scope::Unconditional
        } else {
            Scope::RestrictedTo(tags)
        }
    }

    pub fn is_unconditional(&self) -> bool {
        matches!(self, Scope::Unconditional)
    }

    /// Whether a rule with this scope applies while validating a document
    /// carrying `active` type tags. A restricted scope never applies when no
    /// tags are active.
    pub fn applies_to(&self, active: &BTreeSet<String>) -> bool {
        match self {
            Scope::Unconditional => true,
            Scope::RestrictedTo(tags) => tags.iter().any(|t| active.contains(t)),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ScopeRepr {
    One(String),
    Many(Vec<String>),
}

impl From<Option<ScopeRepr>> for Scope {
    fn from(repr: Option<ScopeRepr>) -> Self {
        match repr {
            None => Scope::Unconditional,
            Some(ScopeRepr::One(tag)) => Scope::restricted_to([tag]),
            Some(ScopeRepr::Many(tags)) => Scope::restricted_to(tags),
        }
    }
}

impl From<Scope> for Vec<String> {
    fn from(scope: Scope) -> Self {
        match scope {
            Scope::Unconditional => Vec::new(),
            Scope::RestrictedTo(tags) => tags.into_iter().collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// XsdOverride / SchematronCustomAssertion
// ---------------------------------------------------------------------------

/// Relaxed or tightened cardinality for one element of a schema type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XsdOverride {
    pub element: String,

    #[serde(default, deserialize_with = "occurs", skip_serializing_if = "Option::is_none")]
    pub min_occurs: Option<String>,

    #[serde(default, deserialize_with = "occurs", skip_serializing_if = "Option::is_none")]
    pub max_occurs: Option<String>,
}

impl XsdOverride {
    pub fn new(element: impl Into<String>) -> Self {
        Self {
            element: element.into(),
            min_occurs: None,
            max_occurs: None,
        }
    }

    pub fn min(mut self, occurs: impl Into<String>) -> Self {
        self.min_occurs = Some(occurs.into());
        self
    }

    pub fn max(mut self, occurs: impl Into<String>) -> Self {
        self.max_occurs = Some(occurs.into());
        self
    }
}

/// Accepts `0`, `"0"` and `unbounded` alike.
fn occurs<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Occurs {
        Number(u64),
        Text(String),
    }

    Ok(Option::<Occurs>::deserialize(deserializer)?.map(|o| match o {
        Occurs::Number(n) => n.to_string(),
        Occurs::Text(s) => s.trim().to_string(),
    }))
}

/// An extra Schematron assertion run alongside the packaged rules.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchematronCustomAssertion {
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub test: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl SchematronCustomAssertion {
    /// Context, test and message are all required.
    pub fn is_complete(&self) -> bool {
        !self.context.trim().is_empty() && !self.test.trim().is_empty() && !self.message.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOCUMENT: &str = r#"
schematron-rules:
  UBL_TR_MAIN:
    - context: "cac:Invoice"
      test: "cbc:ProfileID != ''"
      message: "ProfileID is required"
      id: CUSTOM-1
    - context: "cac:Invoice"
      test: ""
      message: "dropped"
suppressions:
  - pattern: "TR-LEGACY-.*"
profiles:
  base:
    description: Base rules
    suppressions:
      - match: message
        pattern: ".*Signature.*"
        scope: INVOICE
      - match: testEquals
        pattern: "count(cac:Signature) = 1"
        scope: [INVOICE, " ", CREDIT_NOTE]
    xsd-overrides:
      INVOICE:
        - element: "cac:Signature"
          minOccurs: 0
          maxOccurs: unbounded
  unsigned:
    extends: base
"#;

    #[test]
    fn parses_full_document() {
        let doc = ProfileDocument::from_yaml(DOCUMENT).unwrap();

        assert_eq!(doc.schematron_rules["UBL_TR_MAIN"].len(), 1);
        assert_eq!(doc.schematron_rules["UBL_TR_MAIN"][0].id.as_deref(), Some("CUSTOM-1"));

        assert_eq!(doc.suppressions.len(), 1);
        assert_eq!(doc.suppressions[0].match_mode, MatchMode::RuleId);
        assert!(doc.suppressions[0].scope.is_unconditional());

        let base = &doc.profiles["base"];
        assert_eq!(base.description.as_deref(), Some("Base rules"));
        assert_eq!(base.suppressions[0].match_mode, MatchMode::Text);
        assert_eq!(base.suppressions[0].scope, Scope::restricted_to(["INVOICE"]));
        assert_eq!(base.suppressions[1].match_mode, MatchMode::TestEquals);
        assert_eq!(base.suppressions[1].scope, Scope::restricted_to(["CREDIT_NOTE", "INVOICE"]));

        let signature = &base.xsd_overrides["INVOICE"][0];
        assert_eq!(signature.min_occurs.as_deref(), Some("0"));
        assert_eq!(signature.max_occurs.as_deref(), Some("unbounded"));

        assert_eq!(doc.profiles["unsigned"].parent(), Some("base"));
        assert_eq!(base.parent(), None);
    }

    #[test]
    fn empty_text_is_empty_document() {
        assert_eq!(ProfileDocument::from_yaml("  \n").unwrap(), ProfileDocument::default());
    }

    #[test]
    fn yaml_round_trip_preserves_document() {
        let doc = ProfileDocument::from_yaml(DOCUMENT).unwrap();
        let again = ProfileDocument::from_yaml(&doc.to_yaml().unwrap()).unwrap();
        assert_eq!(doc, again);
    }

    #[test]
    fn scope_applicability() {
        let active: BTreeSet<String> = ["INVOICE".to_string()].into();
        let none = BTreeSet::new();

        assert!(Scope::Unconditional.applies_to(&active));
        assert!(Scope::Unconditional.applies_to(&none));
        assert!(Scope::restricted_to(["INVOICE", "CREDIT_NOTE"]).applies_to(&active));
        assert!(!Scope::restricted_to(["CREDIT_NOTE"]).applies_to(&active));
        assert!(!Scope::restricted_to(["INVOICE"]).applies_to(&none));
        assert!(Scope::restricted_to(Vec::<String>::new()).is_unconditional());
    }

    #[test]
    fn blank_extends_has_no_parent() {
        let profile = ValidationProfile {
            extends: Some("  ".into()),
            ..Default::default()
        };
        assert_eq!(profile.parent(), None);
    }

    #[test]
    fn rejects_unknown_match_mode() {
        let err = ProfileDocument::from_yaml("suppressions:\n  - match: fuzzy\n    pattern: x\n").unwrap_err();
        assert!(matches!(err, ProfileError::Document(_)));
    }
}
