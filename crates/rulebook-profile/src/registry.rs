//! The reloadable profile registry.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use rulebook_reload::{ReloadResult, Reloadable, SwapCell};
use rulebook_types::{FileDiffSummary, SuppressionWarning};
use tracing::{debug, info, warn};

use crate::error::{ProfileError, ProfileResult};
use crate::impact::analyze_impact;
use crate::model::{
    ProfileDocument, SchematronCustomAssertion, SchematronRules, ValidationProfile, XsdOverride,
};
use crate::resolve::{self, inheritance_chain, ResolvedProfile};
use crate::source::ProfileSource;
use crate::suppress::{self, compile_rules, CompiledRule, SchematronError, SuppressionResult};

/// Component name reported to the reload coordinator.
pub const COMPONENT_NAME: &str = "Validation Profiles";

/// One published generation of the registry.
#[derive(Debug, Default)]
struct RegistryState {
    document: ProfileDocument,
    /// Each profile's own rules, compiled. Inheritance is applied at use.
    compiled: BTreeMap<String, Vec<CompiledRule>>,
    global: Vec<CompiledRule>,
    /// Profiles whose chain does not resolve, with the reason.
    invalid: BTreeMap<String, String>,
}

impl RegistryState {
    fn build(document: ProfileDocument) -> Self {
        let mut invalid = BTreeMap::new();
        for name in document.profiles.keys() {
            if let Err(e) = inheritance_chain(&document.profiles, name) {
                invalid.insert(name.clone(), e.to_string());
            }
        }
        let compiled = document
            .profiles
            .iter()
            .map(|(name, profile)| (name.clone(), compile_rules(name, &profile.suppressions)))
            .collect();
        let global = compile_rules("global", &document.suppressions);
        Self {
            document,
            compiled,
            global,
            invalid,
        }
    }

    /// Global rules plus the rules along `profile`'s chain, ancestors first,
    /// restricted to those in scope for `active`.
    fn rules_for<'a>(
        &'a self,
        profile: Option<&str>,
        active: &BTreeSet<String>,
    ) -> ProfileResult<Vec<&'a CompiledRule>> {
        let mut rules: Vec<&CompiledRule> = self.global.iter().collect();
        if let Some(name) = profile {
            match inheritance_chain(&self.document.profiles, name)? {
                Some(chain) => {
                    for (member, _) in chain {
                        rules.extend(self.compiled.get(member).into_iter().flatten());
                    }
                }
                None => warn!(profile = name, "unknown profile; applying only global and ad-hoc suppressions"),
            }
        }
        rules.retain(|r| r.applies_to(active));
        Ok(rules)
    }
}

// ---------------------------------------------------------------------------
// ProfileRegistry
// ---------------------------------------------------------------------------

/// Serves validation profiles and applies their suppressions.
///
/// Reads go against the last published generation. Administrative writes
/// go to the [`ProfileSource`] and are followed by a reload of this registry
/// alone, so they are visible to the next read.
pub struct ProfileRegistry {
    source: Arc<dyn ProfileSource>,
    state: SwapCell<RegistryState>,
    writes: Mutex<()>,
}

impl ProfileRegistry {
    /// A registry over `source`. Nothing is loaded until the first reload.
    pub fn new(source: Arc<dyn ProfileSource>) -> Self {
        Self {
            source,
            state: SwapCell::default(),
            writes: Mutex::new(()),
        }
    }

    // -- reads --------------------------------------------------------------

    /// The resolved view of one profile.
    pub fn get_profile(&self, name: &str) -> ProfileResult<ResolvedProfile> {
        let state = self.state.load();
        resolve::resolve_profile(&state.document.profiles, name)?
            .ok_or_else(|| ProfileError::NotFound(name.to_string()))
    }

    /// One profile exactly as written.
    pub fn raw_profile(&self, name: &str) -> Option<ValidationProfile> {
        self.state.load().document.profiles.get(name).cloned()
    }

    /// Every profile whose chain resolves, by name.
    pub fn list_profiles(&self) -> Vec<ResolvedProfile> {
        let state = self.state.load();
        state
            .document
            .profiles
            .keys()
            .filter_map(|name| resolve::resolve_profile(&state.document.profiles, name).ok().flatten())
            .collect()
    }

    /// Profiles that failed to resolve at the last reload, with the reason.
    pub fn invalid_profiles(&self) -> BTreeMap<String, String> {
        self.state.load().invalid.clone()
    }

    pub fn resolve_xsd_overrides(&self, profile: &str, schema_type: &str) -> ProfileResult<Vec<XsdOverride>> {
        resolve::resolve_xsd_overrides(&self.state.load().document.profiles, profile, schema_type)
    }

    pub fn resolve_schematron_rules(
        &self,
        profile: &str,
        schematron_type: &str,
    ) -> ProfileResult<Vec<SchematronCustomAssertion>> {
        resolve::resolve_schematron_rules(&self.state.load().document.profiles, profile, schematron_type)
    }

    /// Custom assertions that apply regardless of profile.
    pub fn get_global_schematron_rules(&self) -> SchematronRules {
        self.state.load().document.schematron_rules.clone()
    }

    /// The document as last loaded.
    pub fn document(&self) -> ProfileDocument {
        self.state.load().document.clone()
    }

    // -- suppression --------------------------------------------------------

    /// Split Schematron findings into active and suppressed.
    ///
    /// Applies global suppressions, the suppressions of `profile` and its
    /// ancestors, and the ad-hoc `additional` entries. Rules scoped to types
    /// apply only when one of them is in `active_types`. An unknown profile
    /// contributes nothing.
    pub fn apply_schematron_suppressions(
        &self,
        errors: Vec<SchematronError>,
        profile: Option<&str>,
        additional: &[String],
        active_types: &BTreeSet<String>,
    ) -> ProfileResult<SuppressionResult> {
        let state = self.state.load();
        let ad_hoc: Vec<CompiledRule> = additional.iter().filter_map(|a| CompiledRule::ad_hoc(a)).collect();
        let mut rules = state.rules_for(profile, active_types)?;
        rules.extend(ad_hoc.iter());

        let total = errors.len();
        let result = suppress::partition(errors, &rules, profile);
        debug!(
            profile = profile.unwrap_or("-"),
            rules = rules.len(),
            total,
            suppressed = result.suppressed_count,
            "applied schematron suppressions"
        );
        Ok(result)
    }

    /// Drop raw XSD messages matched by a text suppression.
    pub fn apply_xsd_suppressions(
        &self,
        messages: Vec<String>,
        profile: Option<&str>,
        additional: &[String],
        active_types: &BTreeSet<String>,
    ) -> ProfileResult<Vec<String>> {
        let state = self.state.load();
        let ad_hoc: Vec<CompiledRule> = additional.iter().filter_map(|a| CompiledRule::ad_hoc(a)).collect();
        let mut rules = state.rules_for(profile, active_types)?;
        rules.extend(ad_hoc.iter());
        Ok(suppress::filter_xsd(messages, &rules))
    }

    /// Suppressions that a staged Schematron change would break.
    pub fn analyze_impact(
        &self,
        old_root: &Path,
        new_root: &Path,
        files: &[FileDiffSummary],
    ) -> ProfileResult<Vec<SuppressionWarning>> {
        analyze_impact(&self.state.load().document, old_root, new_root, files)
    }

    // -- administration -----------------------------------------------------

    /// Create or replace a profile, then reload.
    ///
    /// # Errors
    ///
    /// Rejects blank names, and a profile whose chain would be cyclic or
    /// reach a missing parent. Nothing is written in that case.
    pub fn save_profile(&self, name: &str, profile: ValidationProfile) -> ProfileResult<ReloadResult> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ProfileError::InvalidName(name.to_string()));
        }
        let reload = self.mutate(|document| {
            document.profiles.insert(name.to_string(), profile);
            document.normalize();
            inheritance_chain(&document.profiles, name)?;
            info!(profile = name, "saving profile");
            Ok(true)
        })?;
        Ok(reload.unwrap_or_else(|| self.reload()))
    }

    /// Delete a profile. Returns `false` if it did not exist.
    ///
    /// Profiles extending the deleted one become unresolvable and are
    /// reported by the reload.
    pub fn delete_profile(&self, name: &str) -> ProfileResult<bool> {
        self.mutate(|document| {
            let removed = document.profiles.remove(name).is_some();
            if removed {
                info!(profile = name, "deleting profile");
            }
            Ok(removed)
        })
        .map(|reload| reload.is_some())
    }

    /// Replace the global custom assertions, then reload.
    pub fn save_global_schematron_rules(&self, rules: SchematronRules) -> ProfileResult<ReloadResult> {
        let reload = self.mutate(|document| {
            document.schematron_rules = rules;
            document.normalize();
            info!(types = document.schematron_rules.len(), "saving global schematron rules");
            Ok(true)
        })?;
        Ok(reload.unwrap_or_else(|| self.reload()))
    }

    /// Load, edit, and store the document under the write lock, then reload.
    ///
    /// The closure returns whether anything changed. An unchanged document
    /// is neither written nor reloaded, and `None` is returned.
    fn mutate<F>(&self, edit: F) -> ProfileResult<Option<ReloadResult>>
    where
        F: FnOnce(&mut ProfileDocument) -> ProfileResult<bool>,
    {
        let _writes = self.writes.lock().expect("profile write lock poisoned");
        let mut document = self.source.load()?;
        if !edit(&mut document)? {
            debug!(source = %self.source.describe(), "profile document unchanged");
            return Ok(None);
        }
        self.source.store(&document)?;
        Ok(Some(self.reload()))
    }
}

impl Reloadable for ProfileRegistry {
    fn name(&self) -> &str {
        COMPONENT_NAME
    }

    fn reload(&self) -> ReloadResult {
        let start = Instant::now();
        let document = match self.source.load() {
            Ok(document) => document,
            Err(e) => {
                warn!(source = %self.source.describe(), error = %e, "profile document unreadable; keeping previous profiles");
                return ReloadResult::failed(COMPONENT_NAME, start.elapsed(), e.to_string());
            }
        };

        let state = RegistryState::build(document);
        let loaded = state.document.profiles.len() - state.invalid.len();
        let errors: Vec<String> = state
            .invalid
            .iter()
            .map(|(name, reason)| format!("{name}: {reason}"))
            .collect();
        self.state.store(state);

        info!(source = %self.source.describe(), loaded, invalid = errors.len(), "profiles reloaded");
        ReloadResult::from_errors(COMPONENT_NAME, loaded, start.elapsed(), errors)
    }
}
