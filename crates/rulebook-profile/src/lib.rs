//! Validation profiles for rulebook.
//!
//! A profile tailors validation of one kind of business document: which
//! Schematron findings to suppress, which XSD cardinalities to relax, and
//! which extra Schematron assertions to run. Profiles form single-parent
//! inheritance chains through `extends`; the chain is walked at read time,
//! never stored merged.
//!
//! # Key Types
//!
//! - [`ProfileDocument`] / [`ValidationProfile`] -- The persisted YAML model
//! - [`SuppressionRule`] / [`MatchMode`] / [`Scope`] -- Field-match predicates with optional type scope
//! - [`ProfileRegistry`] -- Reloadable resolver, suppression engine, and profile administration
//! - [`ProfileSource`] -- Where the document is read from and written to
//! - [`analyze_impact`] -- Suppressions broken by a staged Schematron change

pub mod error;
pub mod impact;
pub mod model;
pub mod registry;
pub mod resolve;
pub mod source;
pub mod suppress;

pub use error::{ProfileError, ProfileResult};
pub use impact::analyze_impact;
pub use model::{
    MatchMode, ProfileDocument, SchematronCustomAssertion, SchematronRules, Scope,
    SuppressionRule, ValidationProfile, XsdOverride, XsdOverrides,
};
pub use registry::ProfileRegistry;
pub use resolve::{inheritance_chain, resolve_profile, ResolvedProfile};
pub use source::{FileProfileSource, InMemoryProfileSource, ProfileSource};
pub use suppress::{CompiledRule, SchematronError, SuppressionResult};
