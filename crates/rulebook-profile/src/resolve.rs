//! Inheritance resolution.
//!
//! Nothing here caches: every call walks the `extends` chain of the document
//! it is given, so a resolved view always reflects the document as it is.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;

use crate::error::{ProfileError, ProfileResult};
use crate::model::{
    SchematronCustomAssertion, SchematronRules, SuppressionRule, ValidationProfile, XsdOverride,
    XsdOverrides,
};

/// The profiles from the root ancestor down to `name`, inclusive.
///
/// Returns `Ok(None)` when `name` itself is unknown.
///
/// # Errors
///
/// [`ProfileError::Cycle`] when the chain revisits a profile and
/// [`ProfileError::MissingParent`] when an ancestor does not exist.
pub fn inheritance_chain<'a>(
    profiles: &'a BTreeMap<String, ValidationProfile>,
    name: &str,
) -> ProfileResult<Option<Vec<(&'a str, &'a ValidationProfile)>>> {
    let Some((first, profile)) = profiles.get_key_value(name) else {
        return Ok(None);
    };

    let mut chain = vec![(first.as_str(), profile)];
    let mut visited: HashSet<&str> = HashSet::from([first.as_str()]);

    while let Some(parent) = chain[chain.len() - 1].1.parent() {
        let child = chain[chain.len() - 1].0;
        if visited.contains(parent) {
            let mut names: Vec<String> = chain.iter().map(|(n, _)| n.to_string()).collect();
            names.push(parent.to_string());
            return Err(ProfileError::Cycle {
                profile: name.to_string(),
                chain: names,
            });
        }
        let Some((key, profile)) = profiles.get_key_value(parent) else {
            return Err(ProfileError::MissingParent {
                profile: child.to_string(),
                parent: parent.to_string(),
            });
        };
        visited.insert(key.as_str());
        chain.push((key.as_str(), profile));
    }

    chain.reverse();
    Ok(Some(chain))
}

/// A profile with its ancestors' contributions applied.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ResolvedProfile {
    pub name: String,
    pub description: Option<String>,
    pub extends: Option<String>,
    /// Root ancestor first, this profile last.
    pub chain: Vec<String>,
    /// Suppressions of the whole chain, ancestors first.
    pub suppressions: Vec<SuppressionRule>,
    pub xsd_overrides: XsdOverrides,
    pub schematron_rules: SchematronRules,
}

/// Resolve `name` against `profiles`; `Ok(None)` when it does not exist.
pub fn resolve_profile(
    profiles: &BTreeMap<String, ValidationProfile>,
    name: &str,
) -> ProfileResult<Option<ResolvedProfile>> {
    let Some(chain) = inheritance_chain(profiles, name)? else {
        return Ok(None);
    };

    let mut suppressions = Vec::new();
    let mut xsd_overrides = XsdOverrides::new();
    let mut schematron_rules = SchematronRules::new();

    for (_, profile) in &chain {
        suppressions.extend(profile.suppressions.iter().cloned());
        for (schema_type, overrides) in &profile.xsd_overrides {
            merge_overrides(xsd_overrides.entry(schema_type.clone()).or_default(), overrides);
        }
        for (schematron_type, assertions) in &profile.schematron_rules {
            schematron_rules
                .entry(schematron_type.clone())
                .or_default()
                .extend(assertions.iter().cloned());
        }
    }

    let own = chain[chain.len() - 1].1;
    Ok(Some(ResolvedProfile {
        name: name.to_string(),
        description: own.description.clone(),
        extends: own.parent().map(str::to_string),
        chain: chain.iter().map(|(n, _)| n.to_string()).collect(),
        suppressions,
        xsd_overrides,
        schematron_rules,
    }))
}

/// Effective XSD overrides of `name` for one schema type.
///
/// A descendant's override of an element replaces its ancestor's. Unknown
/// profiles and types resolve to nothing.
pub fn resolve_xsd_overrides(
    profiles: &BTreeMap<String, ValidationProfile>,
    name: &str,
    schema_type: &str,
) -> ProfileResult<Vec<XsdOverride>> {
    let mut merged = Vec::new();
    for (_, profile) in inheritance_chain(profiles, name)?.unwrap_or_default() {
        if let Some(overrides) = profile.xsd_overrides.get(schema_type) {
            merge_overrides(&mut merged, overrides);
        }
    }
    Ok(merged)
}

/// Custom assertions of `name` for one Schematron type, ancestors first.
pub fn resolve_schematron_rules(
    profiles: &BTreeMap<String, ValidationProfile>,
    name: &str,
    schematron_type: &str,
) -> ProfileResult<Vec<SchematronCustomAssertion>> {
    let mut rules = Vec::new();
    for (_, profile) in inheritance_chain(profiles, name)?.unwrap_or_default() {
        if let Some(assertions) = profile.schematron_rules.get(schematron_type) {
            rules.extend(assertions.iter().cloned());
        }
    }
    Ok(rules)
}

/// Overlay `overrides` on `merged`, keyed by element. A replaced element
/// keeps its original position.
fn merge_overrides(merged: &mut Vec<XsdOverride>, overrides: &[XsdOverride]) {
    for o in overrides {
        match merged.iter_mut().find(|m| m.element == o.element) {
            Some(existing) => *existing = o.clone(),
            None => merged.push(o.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MatchMode, ProfileDocument};

    fn profiles(yaml: &str) -> BTreeMap<String, ValidationProfile> {
        ProfileDocument::from_yaml(yaml).unwrap().profiles
    }

    const CHAIN: &str = r#"
profiles:
  base:
    suppressions:
      - pattern: BASE-1
    xsd-overrides:
      INVOICE:
        - element: "cac:Signature"
          minOccurs: 1
        - element: "cac:Delivery"
          maxOccurs: 1
    schematron-rules:
      UBL_TR_MAIN:
        - context: Invoice
          test: "base"
          message: from base
  middle:
    extends: base
    suppressions:
      - match: text
        pattern: ".*middle.*"
  leaf:
    extends: middle
    suppressions:
      - pattern: LEAF-1
    xsd-overrides:
      INVOICE:
        - element: "cac:Signature"
          minOccurs: 0
        - element: "cac:Note"
          maxOccurs: unbounded
    schematron-rules:
      UBL_TR_MAIN:
        - context: Invoice
          test: "leaf"
          message: from leaf
"#;

    #[test]
    fn chain_runs_root_first() {
        let profiles = profiles(CHAIN);
        let chain = inheritance_chain(&profiles, "leaf").unwrap().unwrap();
        let names: Vec<&str> = chain.iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["base", "middle", "leaf"]);
        assert!(inheritance_chain(&profiles, "ghost").unwrap().is_none());
    }

    #[test]
    fn descendant_override_wins_per_element() {
        let profiles = profiles(CHAIN);
        let overrides = resolve_xsd_overrides(&profiles, "leaf", "INVOICE").unwrap();

        assert_eq!(
            overrides,
            vec![
                XsdOverride::new("cac:Signature").min("0"),
                XsdOverride::new("cac:Delivery").max("1"),
                XsdOverride::new("cac:Note").max("unbounded"),
            ]
        );

        let base = resolve_xsd_overrides(&profiles, "base", "INVOICE").unwrap();
        assert_eq!(base[0].min_occurs.as_deref(), Some("1"));
        assert!(resolve_xsd_overrides(&profiles, "leaf", "CREDIT_NOTE").unwrap().is_empty());
        assert!(resolve_xsd_overrides(&profiles, "ghost", "INVOICE").unwrap().is_empty());
    }

    #[test]
    fn schematron_rules_accumulate_ancestors_first() {
        let profiles = profiles(CHAIN);
        let rules = resolve_schematron_rules(&profiles, "leaf", "UBL_TR_MAIN").unwrap();
        let tests: Vec<&str> = rules.iter().map(|r| r.test.as_str()).collect();
        assert_eq!(tests, vec!["base", "leaf"]);
    }

    #[test]
    fn resolved_profile_combines_chain() {
        let profiles = profiles(CHAIN);
        let resolved = resolve_profile(&profiles, "leaf").unwrap().unwrap();

        assert_eq!(resolved.chain, vec!["base", "middle", "leaf"]);
        assert_eq!(resolved.extends.as_deref(), Some("middle"));
        let patterns: Vec<&str> = resolved.suppressions.iter().map(|s| s.pattern.as_str()).collect();
        assert_eq!(patterns, vec!["BASE-1", ".*middle.*", "LEAF-1"]);
        assert_eq!(resolved.suppressions[1].match_mode, MatchMode::Text);
        assert_eq!(resolved.xsd_overrides["INVOICE"].len(), 3);
        assert_eq!(resolved.schematron_rules["UBL_TR_MAIN"].len(), 2);
    }

    #[test]
    fn cycle_is_reported() {
        let profiles = profiles(
            "profiles:\n  a:\n    extends: b\n  b:\n    extends: c\n  c:\n    extends: a\n",
        );
        let err = resolve_xsd_overrides(&profiles, "a", "INVOICE").unwrap_err();
        match err {
            ProfileError::Cycle { profile, chain } => {
                assert_eq!(profile, "a");
                assert_eq!(chain, vec!["a", "b", "c", "a"]);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn self_extension_is_a_cycle() {
        let profiles = profiles("profiles:\n  loop:\n    extends: loop\n");
        assert!(matches!(
            resolve_profile(&profiles, "loop"),
            Err(ProfileError::Cycle { .. })
        ));
    }

    #[test]
    fn missing_parent_is_reported() {
        let profiles = profiles("profiles:\n  child:\n    extends: nowhere\n");
        match resolve_schematron_rules(&profiles, "child", "X").unwrap_err() {
            ProfileError::MissingParent { profile, parent } => {
                assert_eq!(profile, "child");
                assert_eq!(parent, "nowhere");
            }
            other => panic!("expected missing parent, got {other:?}"),
        }
    }
}
