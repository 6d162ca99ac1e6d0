// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Common argument: configuration file
fn config_arg() -> Arg {
    Arg::new("config")
        .short('c')
        .long("config")
        .value_name("PATH")
        .default_value("/etc/anaconda/orchestrator.toml")
        .global(true)
        .help("Configuration file")
}

fn flag(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name).long(name).action(ArgAction::SetTrue).help(help)
}

fn build_cli() -> Command {
    Command::new("anaconda")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Anaconda Developers")
        .about("Installer payload and subscription orchestration")
        .subcommand_required(true)
        .arg(config_arg())
        .subcommand(
            Command::new("cmdline")
                .about("Parse boot arguments and print them as JSON")
                .arg(
                    Arg::new("file")
                        .short('f')
                        .long("file")
                        .value_name("PATH")
                        .default_value("/proc/cmdline")
                        .help("Read the command line from this file"),
                )
                .arg(
                    Arg::new("args")
                        .short('a')
                        .long("args")
                        .value_name("STRING")
                        .conflicts_with("file")
                        .help("Parse this string instead of a file"),
                )
                .arg(flag("strict", "Only accept options with the inst. prefix")),
        )
        .subcommand(
            Command::new("config")
                .about("Print the effective configuration as TOML")
                .arg(
                    Arg::new("cmdline")
                        .long("cmdline")
                        .value_name("STRING")
                        .help("Boot arguments to overlay on the file"),
                ),
        )
        .subcommand(
            Command::new("simulate")
                .about("Run payload preparation against in-memory backends")
                .arg(
                    Arg::new("kind")
                        .short('k')
                        .long("kind")
                        .default_value("dnf")
                        .value_parser(["dnf", "live-image", "rpm-ostree"])
                        .help("Payload type"),
                )
                .arg(
                    Arg::new("source")
                        .short('s')
                        .long("source")
                        .value_name("TYPE")
                        .help("Initial installation source (e.g. CDROM, NFS, URL)"),
                )
                .arg(flag("fail-setup", "Make payload setup fail"))
                .arg(flag("fail-metadata", "Make the metadata download fail"))
                .arg(flag(
                    "only-on-change",
                    "Skip the metadata download when repositories are unchanged",
                ))
                .arg(flag("register", "Register with the subscription service first")),
        )
}

/// Write `<name>.1` for `cmd` into `dir`
fn write_page(cmd: Command, name: &str, dir: &Path) -> io::Result<()> {
    let mut page = Vec::new();
    Man::new(cmd).render(&mut page)?;
    fs::write(dir.join(format!("{}.1", name)), page)
}

/// One page for the binary and one per subcommand (`anaconda-simulate.1`)
fn write_pages(dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir)?;
    let cli = build_cli();
    for sub in cli.get_subcommands() {
        write_page(sub.clone(), &format!("anaconda-{}", sub.get_name()), dir)?;
    }
    write_page(cli, "anaconda", dir)
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let Some(out_dir) = env::var_os("OUT_DIR") else {
        return;
    };
    let man_dir = PathBuf::from(out_dir).join("man");
    if let Err(e) = write_pages(&man_dir) {
        println!("cargo:warning=man pages not generated in {}: {}", man_dir.display(), e);
    }
}
