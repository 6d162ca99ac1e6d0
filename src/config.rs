// src/config.rs

//! Installer configuration
//!
//! Loaded from a TOML file (default [`DEFAULT_CONFIG_PATH`]); a missing file
//! means built-in defaults. Boot arguments are overlaid afterwards with
//! [`InstallerConfig::apply_boot_args`] and always take precedence.
//!
//! ```toml
//! [log]
//! filter = "anaconda=debug"
//!
//! [payload]
//! checkmount = true
//! only_on_change = false
//! repo = "cdrom"
//!
//! [[payload.additional_repos]]
//! name = "updates"
//! url = "http://mirror.example/updates"
//!
//! [network]
//! wait_for_network_secs = 60
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::cmdline::{AddRepo, BootArgs, DisplayMode, NoSave};
use crate::payload::{PayloadKind, RestartOptions, SourceType};
use crate::subscription::{HttpProxy, SubscriptionRequest};

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "/etc/anaconda/orchestrator.toml";

/// Errors from loading or validating the configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid proxy '{proxy}': {source}")]
    InvalidProxy {
        proxy: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Invalid additional repository: {0}")]
    InvalidRepo(String),
}

/// Complete installer configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallerConfig {
    pub log: LogConfig,
    pub payload: PayloadConfig,
    pub network: NetworkConfig,
    pub security: SecurityConfig,
    pub ui: UiConfig,
    pub storage: StorageConfig,
    pub nosave: NoSaveConfig,
}

/// `[log]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `tracing` filter directive used when `RUST_LOG` is unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

/// `[payload]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PayloadConfig {
    /// Fall back to the default repositories when the configured ones fail
    pub fallback: bool,
    /// Look for mounted installation media
    pub checkmount: bool,
    /// Skip the metadata download when the repositories did not change
    pub only_on_change: bool,
    pub verify_ssl: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
    /// Installation source spec, as in `inst.repo`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
    pub images: Vec<String>,
    pub additional_repos: Vec<AddRepo>,
}

impl Default for PayloadConfig {
    fn default() -> Self {
        let restart = RestartOptions::default();
        Self {
            fallback: restart.fallback,
            checkmount: restart.checkmount,
            only_on_change: restart.only_on_change,
            verify_ssl: true,
            proxy: None,
            repo: None,
            images: Vec::new(),
            additional_repos: Vec::new(),
        }
    }
}

/// `[network]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait_for_network_secs: Option<u64>,
}

/// `[security]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// `None` keeps the system default
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selinux: Option<bool>,
}

/// `[ui]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<DisplayMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rdp_username: Option<String>,
}

/// `[storage]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Install into this directory instead of onto disks
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dirinstall: Option<PathBuf>,
}

/// `[nosave]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoSaveConfig {
    pub items: BTreeSet<NoSave>,
}

impl InstallerConfig {
    /// Load from `path`, or from [`DEFAULT_CONFIG_PATH`]
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH));
        if !path.exists() {
            debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(proxy) = &self.payload.proxy {
            HttpProxy::from_url(proxy).map_err(|source| ConfigError::InvalidProxy {
                proxy: proxy.clone(),
                source,
            })?;
        }

        for repo in &self.payload.additional_repos {
            if repo.name.is_empty() || repo.url.is_empty() {
                return Err(ConfigError::InvalidRepo(format!("{},{}", repo.name, repo.url)));
            }
        }

        Ok(())
    }

    /// Overlay boot arguments; whatever the command line sets wins
    pub fn apply_boot_args(&mut self, args: &BootArgs) {
        if let Some(repo) = &args.repo {
            self.payload.repo = Some(repo.clone());
        }
        if let Some(proxy) = &args.proxy {
            self.payload.proxy = Some(proxy.clone());
        }
        if args.noverifyssl {
            self.payload.verify_ssl = false;
        }
        for repo in &args.addrepos {
            self.payload.additional_repos.retain(|r| r.name != repo.name);
            self.payload.additional_repos.push(repo.clone());
        }
        self.payload.images.extend(args.images.iter().cloned());

        if let Some(seconds) = args.waitfornet {
            self.network.wait_for_network_secs = Some(seconds);
        }
        if let Some(selinux) = args.selinux {
            self.security.selinux = Some(selinux);
        }
        if let Some(mode) = args.display_mode {
            self.ui.mode = Some(mode);
        }
        if let Some(username) = &args.rdp_username {
            self.ui.rdp_username = Some(username.clone());
        }
        if let Some(dir) = &args.dirinstall {
            self.storage.dirinstall = Some(dir.clone());
        }
        self.nosave.items.extend(args.nosave.iter().copied());
    }

    /// Route subscription traffic through the installer proxy unless the
    /// request names its own
    pub fn apply_subscription_proxy(
        &self,
        request: &mut SubscriptionRequest,
    ) -> Result<(), ConfigError> {
        let Some(proxy) = &self.payload.proxy else {
            return Ok(());
        };
        if request.proxy.is_configured() {
            debug!("Keeping the subscription proxy {}", request.proxy.hostname);
            return Ok(());
        }
        request
            .set_proxy_from_url(proxy)
            .map_err(|source| ConfigError::InvalidProxy {
                proxy: proxy.clone(),
                source,
            })
    }

    /// Filter directive for the log subscriber, if configured
    pub fn log_filter(&self) -> Option<&str> {
        self.log.filter.as_deref()
    }

    /// Options for payload restarts
    pub fn restart_options(&self) -> RestartOptions {
        RestartOptions {
            fallback: self.payload.fallback,
            checkmount: self.payload.checkmount,
            only_on_change: self.payload.only_on_change,
        }
    }

    /// Source a payload of `kind` should start from
    ///
    /// Package payloads honor `repo` and default to the closest mirror.
    pub fn initial_source_type(&self, kind: PayloadKind) -> Option<SourceType> {
        match kind {
            PayloadKind::Dnf => Some(
                self.payload
                    .repo
                    .as_deref()
                    .and_then(SourceType::from_repo_spec)
                    .unwrap_or(SourceType::ClosestMirror),
            ),
            PayloadKind::RpmOstree => Some(SourceType::RpmOstree),
            PayloadKind::LiveImage => Some(SourceType::Url),
            PayloadKind::LiveOs => None,
        }
    }
}
