//! Schematron rule-id comparison.
//!
//! Suppression rules usually target Schematron rule ids. When a new rule set
//! drops or renames ids, the suppressions that pointed at them silently stop
//! working; comparing the id sets of the old and new file exposes that.

use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{DiffError, DiffResult};

/// `id` attributes of `pattern`, `rule`, `assert` and `report` elements,
/// with or without a namespace prefix.
fn rule_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r#"<(?:[A-Za-z_][\w.-]*:)?(?:pattern|rule|assert|report)\b[^>]*?\sid\s*=\s*(?:"([^"]*)"|'([^']*)')"#,
        )
        .expect("rule id pattern is valid")
    })
}

/// Whether `path` names a file that may contain Schematron rules.
pub fn is_schematron_path(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    lower.ends_with(".sch") || lower.ends_with(".xml")
}

/// Collect the rule ids declared in a Schematron document.
pub fn extract_rule_ids(content: &str) -> BTreeSet<String> {
    rule_id_pattern()
        .captures_iter(content)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
        .map(|m| m.as_str().trim().to_string())
        .filter(|id| !id.is_empty())
        .collect()
}

/// Rule ids removed, added and retained between two versions of a file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RuleIdDiff {
    pub removed: BTreeSet<String>,
    pub added: BTreeSet<String>,
    pub retained: BTreeSet<String>,
}

impl RuleIdDiff {
    /// Compare two id sets.
    pub fn between(old: &BTreeSet<String>, new: &BTreeSet<String>) -> Self {
        Self {
            removed: old.difference(new).cloned().collect(),
            added: new.difference(old).cloned().collect(),
            retained: old.intersection(new).cloned().collect(),
        }
    }

    /// Compare the ids declared in two files. A missing file has no ids.
    pub fn between_files(old: &Path, new: &Path) -> DiffResult<Self> {
        Ok(Self::between(&read_ids(old)?, &read_ids(new)?))
    }

    /// Returns `true` if any id was removed or added.
    pub fn has_changes(&self) -> bool {
        !self.removed.is_empty() || !self.added.is_empty()
    }
}

fn read_ids(path: &Path) -> DiffResult<BTreeSet<String>> {
    match fs::read(path) {
        Ok(bytes) => Ok(extract_rule_ids(&String::from_utf8_lossy(&bytes))),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(BTreeSet::new()),
        Err(source) => Err(DiffError::Io {
            path: path.display().to_string(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &str = r#"<?xml version="1.0"?>
<sch:schema xmlns:sch="http://purl.oclc.org/dsdl/schematron">
  <sch:pattern id="UBL-TR-MAIN">
    <sch:rule context="/Invoice" id="InvoiceRule">
      <sch:assert test="cbc:ID" id='BR-TR-01'>Fatura numarası zorunludur</sch:assert>
      <sch:report test="false()" id="BR-TR-99">never</sch:report>
      <sch:assert test="cbc:UUID">no id here</sch:assert>
    </sch:rule>
  </sch:pattern>
  <let name="x" value="1" id="NOT-A-RULE"/>
</sch:schema>"#;

    fn ids(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn extracts_ids_from_rule_elements_only() {
        assert_eq!(
            extract_rule_ids(SCHEMA),
            ids(&["BR-TR-01", "BR-TR-99", "InvoiceRule", "UBL-TR-MAIN"])
        );
    }

    #[test]
    fn unprefixed_elements_are_recognized() {
        let doc = r#"<schema><rule id="R1" context="/"><assert id="A1" test="1"/></rule></schema>"#;
        assert_eq!(extract_rule_ids(doc), ids(&["A1", "R1"]));
    }

    #[test]
    fn attribute_suffixed_with_id_is_ignored() {
        let doc = r#"<assert rule-id="X" test="1"/>"#;
        assert!(extract_rule_ids(doc).is_empty());
    }

    #[test]
    fn between_partitions_ids() {
        let diff = RuleIdDiff::between(&ids(&["A", "B", "C"]), &ids(&["B", "C", "D"]));
        assert_eq!(diff.removed, ids(&["A"]));
        assert_eq!(diff.added, ids(&["D"]));
        assert_eq!(diff.retained, ids(&["B", "C"]));
        assert!(diff.has_changes());
        assert!(!RuleIdDiff::between(&ids(&["A"]), &ids(&["A"])).has_changes());
    }

    #[test]
    fn between_files_treats_missing_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("old.sch");
        fs::write(&old, SCHEMA).unwrap();

        let diff = RuleIdDiff::between_files(&old, &dir.path().join("gone.sch")).unwrap();
        assert_eq!(diff.removed.len(), 4);
        assert!(diff.added.is_empty());
    }

    #[test]
    fn schematron_paths() {
        assert!(is_schematron_path("sch/UBL-TR_Main.SCH"));
        assert!(is_schematron_path("rules/codelist.xml"));
        assert!(!is_schematron_path("xsd/ubl.xsd"));
    }
}
