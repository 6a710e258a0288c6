//! Package model and the reconciliation primitives built on it
//!
//! # Modules
//!
//! - [`matcher`]: Glob matching of binary names to source identities
//! - [`version`]: Version/release extraction from descriptor text and precedence rules
//! - [`hash`]: Commit hash recovery from version strings
//! - [`metadata`]: Structured package lists shipped inside installer images

pub mod hash;
pub mod matcher;
pub mod metadata;
pub mod version;

use serde::{Deserialize, Serialize};

/// Architecture recorded for packages read from source descriptors
pub const SOURCE_ARCH: &str = "src";

/// A package as reported by one source
///
/// Duplicates across sources are expected; they are grouped, never merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub release: String,
    #[serde(default, alias = "architecture")]
    pub arch: String,
}

impl Package {
    pub fn new(name: &str, version: &str, release: &str, arch: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            release: release.to_string(),
            arch: arch.to_string(),
        }
    }
}
