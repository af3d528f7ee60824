use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Identifier of an externally published asset package.
///
/// Package ids double as directory names in the staging and history areas,
/// so they are restricted to a single non-empty path component.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PackageId(String);

impl PackageId {
    /// Validate and wrap a package name.
    pub fn new(id: impl Into<String>) -> Result<Self, TypeError> {
        let id = id.into();
        let valid = !id.is_empty()
            && id != "."
            && id != ".."
            && !id.starts_with('.')
            && !id.contains(['/', '\\', '\0'])
            && !id.chars().any(char::is_whitespace);
        if valid {
            Ok(Self(id))
        } else {
            Err(TypeError::InvalidPackageId(id))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PackageId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for PackageId {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PackageId> for String {
    fn from(id: PackageId) -> Self {
        id.0
    }
}

impl AsRef<str> for PackageId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// VersionId
// ---------------------------------------------------------------------------

/// Package-scoped version identifier, rendered as `<package>/v<number>`.
///
/// Numbers start at 1 and increase by one per approval of that package. They
/// are never reused.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VersionId {
    package: PackageId,
    number: u64,
}

impl VersionId {
    pub fn new(package: PackageId, number: u64) -> Self {
        Self { package, number }
    }

    /// The first version a package receives.
    pub fn first(package: PackageId) -> Self {
        Self::new(package, 1)
    }

    pub fn package(&self) -> &PackageId {
        &self.package
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    /// The version that follows this one for the same package.
    pub fn next(&self) -> Self {
        Self::new(self.package.clone(), self.number + 1)
    }

    /// Directory label used in history storage (`v3`).
    pub fn label(&self) -> String {
        format!("v{}", self.number)
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/v{}", self.package, self.number)
    }
}

impl FromStr for VersionId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TypeError::InvalidVersionId(s.to_string());
        let (package, label) = s.rsplit_once('/').ok_or_else(invalid)?;
        let number = label
            .strip_prefix('v')
            .and_then(|n| n.parse::<u64>().ok())
            .filter(|n| *n > 0)
            .ok_or_else(invalid)?;
        let package = PackageId::new(package).map_err(|_| invalid())?;
        Ok(Self::new(package, number))
    }
}

impl TryFrom<String> for VersionId {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<VersionId> for String {
    fn from(id: VersionId) -> Self {
        id.to_string()
    }
}
