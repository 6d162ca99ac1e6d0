// src/cmdline/schema.rs

//! Table of recognized boot options
//!
//! Each entry names the option without its `inst.` prefix, says whether the
//! unprefixed form belongs to someone else (kernel, dracut) and must be
//! ignored, and carries the function that folds the value into [`BootArgs`].
//! Value presence is checked by the parser before the function runs.

use std::path::PathBuf;
use std::str::FromStr;

use super::{AddRepo, BootArgs, DisplayMode, NoSave};
use crate::subscription::{HttpProxy, SecretData};

/// Rejection reason handed back to the parser
type Reason = String;

/// How an option takes its value, with the function that applies it
#[derive(Clone, Copy)]
pub enum OptionKind {
    /// `inst.name`; giving a value is an error
    Flag(fn(&mut BootArgs)),
    /// `inst.name=value`; the last occurrence wins
    Value(fn(&mut BootArgs, &str) -> Result<(), Reason>),
    /// `inst.name` or `inst.name=value`
    OptionalValue(fn(&mut BootArgs, Option<&str>) -> Result<(), Reason>),
    /// `inst.name=value`, repeatable; every occurrence is kept
    List(fn(&mut BootArgs, &str) -> Result<(), Reason>),
}

/// One recognized boot option
#[derive(Clone, Copy)]
pub struct OptionSpec {
    /// Name without the `inst.` prefix
    pub name: &'static str,
    /// Only the `inst.` form is ours
    pub requires_prefix: bool,
    pub kind: OptionKind,
}

impl std::fmt::Debug for OptionSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.kind {
            OptionKind::Flag(_) => "flag",
            OptionKind::Value(_) => "value",
            OptionKind::OptionalValue(_) => "optional value",
            OptionKind::List(_) => "list",
        };
        f.debug_struct("OptionSpec")
            .field("name", &self.name)
            .field("requires_prefix", &self.requires_prefix)
            .field("kind", &kind)
            .finish()
    }
}

/// Every option the orchestration layer looks at
pub static SCHEMA: &[OptionSpec] = &[
    // Installation source
    spec("stage2", false, OptionKind::Value(|args, v| set(&mut args.stage2, v))),
    spec("ks", false, OptionKind::Value(|args, v| set(&mut args.kickstart, v))),
    spec("repo", false, OptionKind::Value(|args, v| set(&mut args.repo, v))),
    spec("addrepo", true, OptionKind::List(add_repo)),
    spec("proxy", false, OptionKind::Value(proxy)),
    spec("noverifyssl", true, OptionKind::Flag(|args| args.noverifyssl = true)),
    spec("image", true, OptionKind::List(|args, v| push_nonempty(&mut args.images, v))),
    spec("dirinstall", true, OptionKind::OptionalValue(dirinstall)),

    // Security
    spec("selinux", false, OptionKind::Value(selinux)),
    spec("noselinux", false, OptionKind::Flag(|args| args.selinux = Some(false))),

    // User interface
    spec("text", false, OptionKind::Flag(|args| args.display_mode = Some(DisplayMode::Text))),
    spec("cmdline", false, OptionKind::Flag(|args| args.display_mode = Some(DisplayMode::Cmdline))),
    spec("graphical", true, OptionKind::Flag(|args| args.display_mode = Some(DisplayMode::Graphical))),
    spec("rdp", true, OptionKind::Flag(rdp)),
    spec("rdp.username", true, OptionKind::Value(|args, v| set(&mut args.rdp_username, v))),
    spec("rdp.password", true, OptionKind::Value(rdp_password)),

    // Misc
    spec("nosave", true, OptionKind::List(nosave)),
    spec("waitfornet", true, OptionKind::Value(waitfornet)),
];

const fn spec(name: &'static str, requires_prefix: bool, kind: OptionKind) -> OptionSpec {
    OptionSpec {
        name,
        requires_prefix,
        kind,
    }
}

/// Find the entry for an option name given without prefix
pub fn lookup(name: &str) -> Option<&'static OptionSpec> {
    SCHEMA.iter().find(|spec| spec.name == name)
}

fn set(field: &mut Option<String>, value: &str) -> Result<(), Reason> {
    if value.is_empty() {
        return Err("value must not be empty".to_string());
    }
    *field = Some(value.to_string());
    Ok(())
}

fn push_nonempty(list: &mut Vec<String>, value: &str) -> Result<(), Reason> {
    if value.is_empty() {
        return Err("value must not be empty".to_string());
    }
    list.push(value.to_string());
    Ok(())
}

fn add_repo(args: &mut BootArgs, value: &str) -> Result<(), Reason> {
    match value.split(',').collect::<Vec<_>>().as_slice() {
        [name, url] if !name.is_empty() && !url.is_empty() => {
            args.addrepos.push(AddRepo {
                name: name.to_string(),
                url: url.to_string(),
            });
            Ok(())
        }
        _ => Err("expected <name>,<url>".to_string()),
    }
}

fn proxy(args: &mut BootArgs, value: &str) -> Result<(), Reason> {
    HttpProxy::from_url(value).map_err(|e| e.to_string())?;
    args.proxy = Some(value.to_string());
    Ok(())
}

fn dirinstall(args: &mut BootArgs, value: Option<&str>) -> Result<(), Reason> {
    let path = match value {
        None | Some("") => PathBuf::from(super::DEFAULT_DIRINSTALL),
        Some(path) if path.starts_with('/') => PathBuf::from(path),
        Some(_) => return Err("path must be absolute".to_string()),
    };
    args.dirinstall = Some(path);
    Ok(())
}

fn selinux(args: &mut BootArgs, value: &str) -> Result<(), Reason> {
    args.selinux = match value {
        "0" => Some(false),
        "1" => Some(true),
        _ => return Err("expected 0 or 1".to_string()),
    };
    Ok(())
}

fn rdp(args: &mut BootArgs) {
    args.rdp = true;
    args.display_mode = Some(DisplayMode::Graphical);
}

fn rdp_password(args: &mut BootArgs, value: &str) -> Result<(), Reason> {
    args.rdp_password = SecretData::text(value);
    Ok(())
}

fn nosave(args: &mut BootArgs, value: &str) -> Result<(), Reason> {
    for item in value.split(',').filter(|item| !item.is_empty()) {
        let parsed = NoSave::from_str(item).map_err(|_| format!("unknown item '{}'", item))?;
        args.nosave.insert(parsed);
    }
    Ok(())
}

fn waitfornet(args: &mut BootArgs, value: &str) -> Result<(), Reason> {
    let seconds = value
        .parse::<u64>()
        .map_err(|e| format!("expected seconds: {}", e))?;
    args.waitfornet = Some(seconds);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_names_are_unique() {
        let names: HashSet<_> = SCHEMA.iter().map(|spec| spec.name).collect();
        assert_eq!(names.len(), SCHEMA.len());
    }

    #[test]
    fn test_lookup() {
        assert!(lookup("repo").is_some());
        assert!(lookup("inst.repo").is_none());
        assert!(lookup("rdp.username").unwrap().requires_prefix);
        assert!(!lookup("selinux").unwrap().requires_prefix);
    }
}
