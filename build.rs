// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn flag(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name)
        .long(name)
        .action(ArgAction::SetTrue)
        .global(true)
        .help(help)
}

fn build_cli() -> Command {
    Command::new("syn-syu")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Syn-Syu Contributors")
        .about("Manifest-driven update orchestration for Arch-based systems")
        .subcommand_required(false)
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("PATH")
                .global(true)
                .help("Configuration file (default: ~/.config/syn-syu/config.toml)"),
        )
        .arg(
            Arg::new("manifest")
                .long("manifest")
                .value_name("PATH")
                .global(true)
                .help("Manifest path (default: /tmp/syn-syu_manifest.json)"),
        )
        .arg(flag("rebuild", "Regenerate the manifest before reading it"))
        .arg(flag("dry-run", "Report what would be done without invoking any manager"))
        .arg(
            Arg::new("batch")
                .long("batch")
                .value_name("N")
                .global(true)
                .help("Repository packages per pacman invocation"),
        )
        .arg(
            Arg::new("include")
                .long("include")
                .value_name("REGEX")
                .action(ArgAction::Append)
                .global(true)
                .help("Only consider packages matching this regex (repeatable)"),
        )
        .arg(
            Arg::new("exclude")
                .long("exclude")
                .value_name("REGEX")
                .action(ArgAction::Append)
                .global(true)
                .help("Skip packages matching this regex (repeatable)"),
        )
        .arg(
            Arg::new("helper")
                .long("helper")
                .value_name("NAME")
                .global(true)
                .help("Force a specific AUR helper"),
        )
        .arg(
            Arg::new("min-free-gb")
                .long("min-free-gb")
                .value_name("GB")
                .global(true)
                .help("Free space to keep in reserve, in GiB"),
        )
        .arg(
            Arg::new("space-policy")
                .long("space-policy")
                .value_name("POLICY")
                .value_parser(["warn", "enforce"])
                .global(true)
                .help("What to do when the disk check fails"),
        )
        .arg(flag("no-aur", "Skip AUR packages"))
        .arg(flag("no-repo", "Skip repository packages"))
        .arg(flag("with-flatpak", "Include Flatpak updates"))
        .arg(flag("no-flatpak", "Exclude Flatpak updates"))
        .arg(flag("with-fwupd", "Include firmware updates"))
        .arg(flag("no-fwupd", "Exclude firmware updates"))
        .arg(flag("confirm", "Ask before starting and let the managers prompt"))
        .arg(flag("strict", "Exit with status 1 when any package failed"))
        .arg(flag("verbose", "Echo every log event to the console").short('v'))
        .arg(flag("quiet", "Suppress progress and summary output").short('q'))
        .arg(flag("json", "Machine-readable output"))
        .subcommand(
            Command::new("sync")
                .about("Upgrade every eligible package, then enabled application sources"),
        )
        .subcommand(Command::new("aur").about("Upgrade AUR packages only"))
        .subcommand(Command::new("repo").about("Upgrade repository packages only"))
        .subcommand(
            Command::new("update")
                .about("Upgrade the named packages")
                .arg(
                    Arg::new("packages")
                        .value_name("PKG")
                        .num_args(1..)
                        .required(true)
                        .help("Package names"),
                ),
        )
        .subcommand(Command::new("flatpak").about("Apply pending Flatpak updates"))
        .subcommand(Command::new("fwupd").about("Apply pending firmware updates"))
        .subcommand(Command::new("apps").about("Apply Flatpak and firmware updates"))
        .subcommand(Command::new("check").about("Summarize the manifest"))
        .subcommand(
            Command::new("inspect")
                .about("Show the manifest entry of one package")
                .arg(Arg::new("package").value_name("PKG").required(true).help("Package name")),
        )
        .subcommand(
            Command::new("export")
                .about("Write the list of updatable packages")
                .arg(
                    Arg::new("repo-only")
                        .long("repo-only")
                        .action(ArgAction::SetTrue)
                        .help("Repository packages only"),
                )
                .arg(
                    Arg::new("aur-only")
                        .long("aur-only")
                        .action(ArgAction::SetTrue)
                        .help("AUR packages only"),
                )
                .arg(
                    Arg::new("all")
                        .long("all")
                        .action(ArgAction::SetTrue)
                        .help("Include packages without a pending update"),
                )
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .value_name("PATH")
                        .help("Output file (default: stdout)"),
                ),
        )
        .subcommand(
            Command::new("log")
                .about("List recent session logs")
                .arg(
                    Arg::new("verify")
                        .long("verify")
                        .action(ArgAction::SetTrue)
                        .help("Check every log against its digest"),
                )
                .arg(
                    Arg::new("limit")
                        .short('n')
                        .long("limit")
                        .default_value("10")
                        .help("Number of sessions to show"),
                ),
        )
        .subcommand(
            Command::new("clean")
                .about("Prune session logs, clean the package cache and remove orphans"),
        )
        .subcommand(
            Command::new("completions")
                .about("Generate shell completion scripts")
                .arg(
                    Arg::new("shell")
                        .required(true)
                        .value_parser(["bash", "elvish", "fish", "powershell", "zsh"])
                        .help("Shell to generate completions for"),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Create man directory
    let out_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir).expect("Failed to create man directory");

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();
    man.render(&mut buffer).expect("Failed to render man page");

    let man_path = man_dir.join("syn-syu.1");
    fs::write(&man_path, buffer).expect("Failed to write man page");
}
