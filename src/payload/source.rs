// src/payload/source.rs

//! Installation sources
//!
//! A source is an opaque handle owned by the payload backend. The
//! orchestration layer only ever looks at its type tag.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};
use thiserror::Error;

/// Kind of installation medium behind a source
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceType {
    /// Red Hat CDN, available after registration
    Cdn,
    Cdrom,
    Hdd,
    Nfs,
    Url,
    /// Hardware Management Console (s390x)
    Hmc,
    /// Mirrors from the distribution's repo files
    ClosestMirror,
    RpmOstree,
    Flatpak,
}

/// Source types that a successful registration replaces with the CDN
pub const OVERRIDE_SOURCE_TYPES: [SourceType; 4] = [
    SourceType::Cdrom,
    SourceType::Hdd,
    SourceType::Nfs,
    SourceType::ClosestMirror,
];

impl SourceType {
    /// Whether registration may swap this source for the CDN
    pub fn is_overridable(self) -> bool {
        OVERRIDE_SOURCE_TYPES.contains(&self)
    }

    /// Whether the source can only be reached over the network
    pub fn requires_network(self) -> bool {
        matches!(
            self,
            Self::Cdn | Self::Url | Self::Nfs | Self::ClosestMirror | Self::Flatpak
        )
    }

    /// Derive the source type from an `inst.repo` value
    ///
    /// Accepts `cdrom[:device]`, `hd:<device>:<path>`, `nfs:[options:]<server>:<path>`,
    /// `http://`, `https://`, `ftp://`, `file://` and `hmc`.
    pub fn from_repo_spec(spec: &str) -> Option<Self> {
        let spec = spec.trim();
        let scheme = spec
            .split_once(':')
            .map(|(scheme, _)| scheme)
            .unwrap_or(spec)
            .to_ascii_lowercase();

        match scheme.as_str() {
            "cdrom" => Some(Self::Cdrom),
            "hd" => Some(Self::Hdd),
            "nfs" | "nfsiso" => Some(Self::Nfs),
            "hmc" => Some(Self::Hmc),
            "http" | "https" | "ftp" | "file" if spec.contains("://") => Some(Self::Url),
            _ => None,
        }
    }
}

/// Opaque reference to a source object owned by the payload backend
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceHandle {
    path: String,
    source_type: SourceType,
}

impl SourceHandle {
    /// Create a handle for the backend object at `path`
    pub fn new(path: impl Into<String>, source_type: SourceType) -> Self {
        Self {
            path: path.into(),
            source_type,
        }
    }

    /// Backend object path
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Type tag of the source
    pub fn source_type(&self) -> SourceType {
        self.source_type
    }
}

impl std::fmt::Display for SourceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.source_type, self.path)
    }
}

/// Failure to create, attach, set up or tear down installation sources
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceSetupError {
    #[error("Failed to set up installation source: {0}")]
    SetUp(String),

    #[error("Failed to tear down installation source: {0}")]
    TearDown(String),

    #[error("Source type {0} is not supported by this payload")]
    Unsupported(SourceType),
}
