// src/cmdline/mod.rs

//! Boot arguments
//!
//! Parses the kernel command line into [`BootArgs`]. Options are looked up
//! in the declarative [`SCHEMA`]; anything not in it belongs to the kernel
//! or to dracut and is skipped.
//!
//! Both `inst.repo=...` and the historical `repo=...` are understood. Under
//! [`PrefixPolicy::Lenient`] the unprefixed form is accepted with a
//! deprecation warning; under [`PrefixPolicy::Strict`] only the `inst.` form
//! counts. Options marked `requires_prefix` never accept the bare form,
//! since the bare name means something else to another component.

mod schema;

pub use schema::{OptionKind, OptionSpec, SCHEMA, lookup};

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use strum_macros::{Display, EnumString};
use thiserror::Error;
use tracing::{debug, warn};

use crate::payload::SourceType;
use crate::subscription::SecretData;

/// Prefix that marks an option as the installer's
pub const PREFIX: &str = "inst.";

/// Where the running kernel exposes its command line
pub const PROC_CMDLINE: &str = "/proc/cmdline";

/// Target root used by `inst.dirinstall` without a path
pub const DEFAULT_DIRINSTALL: &str = "/mnt/sysimage";

/// Whether bare (unprefixed) option names are accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrefixPolicy {
    #[default]
    Lenient,
    Strict,
}

/// Errors from boot argument parsing
#[derive(Error, Debug)]
pub enum CmdlineError {
    #[error("Boot option {0} requires a value")]
    MissingValue(String),

    #[error("Boot option {option} does not take a value (got '{value}')")]
    UnexpectedValue { option: String, value: String },

    #[error("Invalid value '{value}' for boot option {option}: {reason}")]
    InvalidValue {
        option: String,
        value: String,
        reason: String,
    },

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// User interface requested on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DisplayMode {
    Graphical,
    Text,
    Cmdline,
}

/// What `inst.nosave` keeps off the installed system
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NoSave {
    All,
    AllKs,
    InputKs,
    OutputKs,
    Logs,
}

/// One `inst.addrepo=<name>,<url>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddRepo {
    pub name: String,
    pub url: String,
}

/// Boot arguments relevant to the orchestration layer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BootArgs {
    pub stage2: Option<String>,
    pub kickstart: Option<String>,
    pub repo: Option<String>,
    pub addrepos: Vec<AddRepo>,
    pub proxy: Option<String>,
    pub selinux: Option<bool>,
    pub display_mode: Option<DisplayMode>,
    pub rdp: bool,
    pub rdp_username: Option<String>,
    #[serde(skip)]
    pub rdp_password: SecretData,
    pub noverifyssl: bool,
    pub dirinstall: Option<PathBuf>,
    pub images: Vec<String>,
    pub nosave: BTreeSet<NoSave>,
    pub waitfornet: Option<u64>,
}

impl BootArgs {
    /// Installation source named by `inst.repo`, if it names a known kind
    pub fn repo_source_type(&self) -> Option<SourceType> {
        self.repo.as_deref().and_then(SourceType::from_repo_spec)
    }
}

/// Parse a command line string
pub fn parse(cmdline: &str, policy: PrefixPolicy) -> Result<BootArgs, CmdlineError> {
    let mut args = BootArgs::default();

    for token in tokenize(cmdline) {
        let (key, value) = match token.split_once('=') {
            Some((key, value)) => (key, Some(value)),
            None => (token.as_str(), None),
        };
        let (name, prefixed) = match key.strip_prefix(PREFIX) {
            Some(name) => (name, true),
            None => (key, false),
        };

        let Some(spec) = lookup(name) else {
            continue;
        };

        if !prefixed {
            if spec.requires_prefix {
                continue;
            }
            if policy == PrefixPolicy::Strict {
                debug!("Ignoring boot option {} without the {} prefix", key, PREFIX);
                continue;
            }
            warn!("Boot option {} is deprecated, use {}{}", key, PREFIX, name);
        }

        apply(&mut args, spec, key, value)?;
    }

    Ok(args)
}

/// Read and parse a command line file such as `/proc/cmdline`
pub fn read_cmdline(path: impl AsRef<Path>, policy: PrefixPolicy) -> Result<BootArgs, CmdlineError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| CmdlineError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse(content.trim(), policy)
}

fn apply(
    args: &mut BootArgs,
    spec: &OptionSpec,
    key: &str,
    value: Option<&str>,
) -> Result<(), CmdlineError> {
    let invalid = |value: &str, reason: String| CmdlineError::InvalidValue {
        option: key.to_string(),
        value: value.to_string(),
        reason,
    };

    match (spec.kind, value) {
        (OptionKind::Flag(apply), None) => {
            apply(args);
            Ok(())
        }
        (OptionKind::Flag(_), Some(value)) => Err(CmdlineError::UnexpectedValue {
            option: key.to_string(),
            value: value.to_string(),
        }),
        (OptionKind::Value(apply) | OptionKind::List(apply), Some(value)) => {
            apply(args, value).map_err(|reason| invalid(value, reason))
        }
        (OptionKind::Value(_) | OptionKind::List(_), None) => {
            Err(CmdlineError::MissingValue(key.to_string()))
        }
        (OptionKind::OptionalValue(apply), value) => {
            apply(args, value).map_err(|reason| invalid(value.unwrap_or_default(), reason))
        }
    }
}

/// Split on whitespace; double quotes group and are dropped
fn tokenize(cmdline: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quoted = false;

    for c in cmdline.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                in_token = true;
            }
            c if c.is_whitespace() && !quoted => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            c => {
                current.push(c);
                in_token = true;
            }
        }
    }
    if in_token {
        tokens.push(current);
    }

    tokens
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_tokenize_quotes() {
        assert_eq!(
            tokenize(r#"quiet inst.addrepo="extra,http://example.com/my repo"  ro"#),
            vec!["quiet", "inst.addrepo=extra,http://example.com/my repo", "ro"]
        );
        assert_eq!(tokenize(r#"a="" b"#), vec!["a=", "b"]);
        assert!(tokenize("   ").is_empty());
    }

    #[test]
    fn test_parse_typical_cmdline() {
        let args = parse(
            "BOOT_IMAGE=/images/pxeboot/vmlinuz inst.stage2=hd:LABEL=Fedora \
             inst.repo=cdrom inst.text rd.live.check quiet",
            PrefixPolicy::Lenient,
        )
        .unwrap();

        assert_eq!(args.stage2.as_deref(), Some("hd:LABEL=Fedora"));
        assert_eq!(args.repo.as_deref(), Some("cdrom"));
        assert_eq!(args.display_mode, Some(DisplayMode::Text));
        assert_eq!(args.repo_source_type(), Some(SourceType::Cdrom));
    }

    #[test]
    fn test_unprefixed_forms() {
        let lenient = parse("repo=nfs:server:/path text", PrefixPolicy::Lenient).unwrap();
        assert_eq!(lenient.repo.as_deref(), Some("nfs:server:/path"));
        assert_eq!(lenient.display_mode, Some(DisplayMode::Text));

        let strict = parse("repo=nfs:server:/path text", PrefixPolicy::Strict).unwrap();
        assert_eq!(strict, BootArgs::default());
    }

    #[test]
    fn test_prefix_required_options_ignore_bare_form() {
        let args = parse("rdp nosave=all image=foo.img", PrefixPolicy::Lenient).unwrap();
        assert!(!args.rdp);
        assert!(args.nosave.is_empty());
        assert!(args.images.is_empty());
    }

    #[test]
    fn test_addrepo_repeatable_and_strict() {
        let args = parse(
            "inst.addrepo=a,http://a.example inst.addrepo=b,nfs:srv:/b",
            PrefixPolicy::Strict,
        )
        .unwrap();
        assert_eq!(
            args.addrepos,
            vec![
                AddRepo {
                    name: "a".into(),
                    url: "http://a.example".into()
                },
                AddRepo {
                    name: "b".into(),
                    url: "nfs:srv:/b".into()
                },
            ]
        );

        for bad in ["inst.addrepo=onlyname", "inst.addrepo=a,b,c", "inst.addrepo=,http://x"] {
            let err = parse(bad, PrefixPolicy::Lenient).unwrap_err();
            assert!(matches!(err, CmdlineError::InvalidValue { .. }), "{}", bad);
        }
    }

    #[test]
    fn test_selinux() {
        assert_eq!(parse("inst.selinux=1", PrefixPolicy::Lenient).unwrap().selinux, Some(true));
        assert_eq!(parse("selinux=0", PrefixPolicy::Lenient).unwrap().selinux, Some(false));
        assert_eq!(
            parse("inst.selinux=1 inst.noselinux", PrefixPolicy::Lenient).unwrap().selinux,
            Some(false)
        );
        assert!(matches!(
            parse("inst.selinux=yes", PrefixPolicy::Lenient),
            Err(CmdlineError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_display_mode_last_wins() {
        let args = parse("inst.text inst.graphical", PrefixPolicy::Lenient).unwrap();
        assert_eq!(args.display_mode, Some(DisplayMode::Graphical));

        let args = parse("inst.rdp inst.cmdline", PrefixPolicy::Lenient).unwrap();
        assert!(args.rdp);
        assert_eq!(args.display_mode, Some(DisplayMode::Cmdline));
    }

    #[test]
    fn test_rdp_password_not_serialized() {
        let args = parse(
            "inst.rdp inst.rdp.username=admin inst.rdp.password=hunter2",
            PrefixPolicy::Lenient,
        )
        .unwrap();
        assert_eq!(args.rdp_password.value(), Some("hunter2"));

        let json = serde_json::to_string(&args).unwrap();
        assert!(json.contains("admin"));
        assert!(!json.contains("hunter2"));
        assert!(!format!("{:?}", args).contains("hunter2"));
    }

    #[test]
    fn test_dirinstall() {
        let args = parse("inst.dirinstall", PrefixPolicy::Lenient).unwrap();
        assert_eq!(args.dirinstall, Some(PathBuf::from(DEFAULT_DIRINSTALL)));

        let args = parse("inst.dirinstall=/mnt/target", PrefixPolicy::Lenient).unwrap();
        assert_eq!(args.dirinstall, Some(PathBuf::from("/mnt/target")));

        assert!(parse("inst.dirinstall=relative", PrefixPolicy::Lenient).is_err());
    }

    #[test]
    fn test_nosave_list() {
        let args = parse("inst.nosave=input_ks,logs inst.nosave=all_ks", PrefixPolicy::Lenient).unwrap();
        assert_eq!(
            args.nosave.into_iter().collect::<Vec<_>>(),
            vec![NoSave::AllKs, NoSave::InputKs, NoSave::Logs]
        );

        assert!(parse("inst.nosave=everything", PrefixPolicy::Lenient).is_err());
    }

    #[test]
    fn test_value_presence() {
        assert!(matches!(
            parse("inst.repo", PrefixPolicy::Lenient),
            Err(CmdlineError::MissingValue(option)) if option == "inst.repo"
        ));
        assert!(matches!(
            parse("inst.noverifyssl=1", PrefixPolicy::Lenient),
            Err(CmdlineError::UnexpectedValue { .. })
        ));
    }

    #[test]
    fn test_proxy_and_waitfornet() {
        let args = parse(
            "inst.proxy=http://user:pw@proxy.example:3128 inst.waitfornet=30",
            PrefixPolicy::Lenient,
        )
        .unwrap();
        assert_eq!(args.proxy.as_deref(), Some("http://user:pw@proxy.example:3128"));
        assert_eq!(args.waitfornet, Some(30));

        assert!(parse("inst.waitfornet=soon", PrefixPolicy::Lenient).is_err());
        assert!(parse("inst.proxy=http://", PrefixPolicy::Lenient).is_err());
    }

    #[test]
    fn test_unknown_options_ignored() {
        let args = parse("inst.unknown=1 rd.break console=ttyS0", PrefixPolicy::Strict).unwrap();
        assert_eq!(args, BootArgs::default());
    }

    #[test]
    fn test_read_cmdline_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "inst.repo=http://mirror.example/os inst.ks=nfs:srv:/ks.cfg").unwrap();

        let args = read_cmdline(file.path(), PrefixPolicy::Lenient).unwrap();
        assert_eq!(args.repo_source_type(), Some(SourceType::Url));
        assert_eq!(args.kickstart.as_deref(), Some("nfs:srv:/ks.cfg"));

        let missing = read_cmdline("/nonexistent/cmdline", PrefixPolicy::Lenient);
        assert!(matches!(missing, Err(CmdlineError::Read { .. })));
    }
}
