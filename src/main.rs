use anyhow::Result;
use clap::Parser;
use log::warn;
use std::path::PathBuf;
use vmpm::cancel::CancelFlag;
use vmpm::commands::{self, PackageArgs};
use vmpm::config::Config;
use vmpm::manager::PackageManager;
use vmpm::runtime::RealRuntime;

/// vmpm - VM plugin package manager
///
/// Installs VM plugin binaries into a versioned package store and keeps
/// `<base>/current/<vmid>` pointing at the active binary for each VM.
///
/// Examples:
///   vmpm install ./build/evm --org luxfi --name evm --version v1.0.0 --vm-name "Lux EVM"
///   vmpm activate luxfi/evm@v1.0.0
///   vmpm vmid "Lux EVM"
#[derive(Parser, Debug)]
#[command(author, version = env!("VMPM_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Plugin base directory (overrides defaults; also via LUX_PLUGIN_DIR)
    #[arg(
        long = "base-dir",
        short = 'd',
        env = "LUX_PLUGIN_DIR",
        value_name = "PATH",
        global = true
    )]
    pub base_dir: Option<PathBuf>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Copy a plugin binary into the store and activate it
    Install(InstallArgs),

    /// Symlink a plugin binary in place (for development builds) and activate it
    Link(InstallArgs),

    /// Make an installed version the active binary for its VMID
    Activate(PackageRefArgs),

    /// Remove an installed version
    #[command(alias = "remove")]
    Uninstall(UninstallArgs),

    /// List installed versions
    List,

    /// List active VMIDs
    Active,

    /// Import plugins from a legacy flat directory of <vmid> symlinks
    Migrate(MigrateArgs),

    /// Print the VMID for a VM name (or the well-known VMIDs)
    Vmid(VmidArgs),

    /// Check the active binary for a VMID
    Verify(VerifyArgs),

    /// Print the plugin directories
    Paths,
}

#[derive(clap::Args, Debug)]
pub struct InstallArgs {
    /// Path to the plugin binary
    #[arg(value_name = "BINARY")]
    pub binary: PathBuf,

    #[command(flatten)]
    pub package: PackageArgs,
}

#[derive(clap::Args, Debug)]
pub struct PackageRefArgs {
    /// Package version in the format "org/name@version"
    #[arg(value_name = "ORG/NAME@VERSION")]
    pub package: String,
}

#[derive(clap::Args, Debug)]
pub struct UninstallArgs {
    /// Package version in the format "org/name@version"
    #[arg(value_name = "ORG/NAME@VERSION")]
    pub package: String,

    /// Skip confirmation prompt
    #[arg(short = 'y', long)]
    pub yes: bool,
}

#[derive(clap::Args, Debug)]
pub struct MigrateArgs {
    /// Legacy plugin directory
    #[arg(value_name = "DIR")]
    pub legacy_dir: PathBuf,
}

#[derive(clap::Args, Debug)]
pub struct VmidArgs {
    /// VM name (e.g., "Lux EVM")
    #[arg(value_name = "NAME")]
    pub name: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct VerifyArgs {
    #[arg(value_name = "VMID")]
    pub vmid: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let cancel = CancelFlag::new();
    let ctrl_c_handler = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\nInterrupted, cleaning up...");
                warn!("Cancellation requested");
                cancel.cancel();
            }
        })
    };

    let result = tokio::task::spawn_blocking(move || run(cli, &cancel)).await;
    ctrl_c_handler.abort();
    result?
}

fn run(cli: Cli, cancel: &CancelFlag) -> Result<()> {
    let runtime = RealRuntime;

    // Commands that need no package store
    match &cli.command {
        Commands::Vmid(args) => return commands::vmid(args.name.as_deref()),
        Commands::Paths => return commands::paths(&Config::resolve(&runtime, cli.base_dir)?),
        _ => {}
    }

    let config = Config::resolve(&runtime, cli.base_dir)?;
    let mut manager = PackageManager::new(RealRuntime, config)?;

    match cli.command {
        Commands::Install(args) => commands::install(&mut manager, &args.binary, args.package, cancel),
        Commands::Link(args) => commands::link(&mut manager, &args.binary, args.package),
        Commands::Activate(args) => commands::activate(&mut manager, &args.package),
        Commands::Uninstall(args) => commands::uninstall(&runtime, &mut manager, &args.package, args.yes),
        Commands::List => commands::list(&manager),
        Commands::Active => commands::active(&manager),
        Commands::Migrate(args) => commands::migrate(&mut manager, &args.legacy_dir, cancel),
        Commands::Verify(args) => commands::verify(&manager, &args.vmid),
        Commands::Vmid(_) | Commands::Paths => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_cli_install_parsing() {
        let cli = Cli::try_parse_from([
            "vmpm",
            "install",
            "./build/evm",
            "--org",
            "luxfi",
            "--name",
            "evm",
            "--version",
            "v1.0.0",
            "--vm-name",
            "Lux EVM",
            "--alias",
            "evm",
            "--alias",
            "subnet-evm",
        ])
        .unwrap();
        match cli.command {
            Commands::Install(args) => {
                assert_eq!(args.binary, PathBuf::from("./build/evm"));
                assert_eq!(args.package.org, "luxfi");
                assert_eq!(args.package.version, "v1.0.0");
                assert_eq!(args.package.vm_name.as_deref(), Some("Lux EVM"));
                assert_eq!(args.package.aliases, vec!["evm", "subnet-evm"]);
            }
            _ => panic!("Expected Install command"),
        }
    }

    #[test]
    fn test_cli_vm_name_conflicts_with_vmid() {
        let result = Cli::try_parse_from([
            "vmpm", "link", "evm", "--org", "luxfi", "--name", "evm", "--version", "dev",
            "--vm-name", "Lux EVM", "--vmid", "abc",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_global_base_dir_parsing() {
        let cli = Cli::try_parse_from(["vmpm", "--base-dir", "/tmp/plugins", "list"]).unwrap();
        assert_eq!(cli.base_dir, Some(PathBuf::from("/tmp/plugins")));

        let cli = Cli::try_parse_from(["vmpm", "active", "-d", "/srv/plugins"]).unwrap();
        assert_eq!(cli.base_dir, Some(PathBuf::from("/srv/plugins")));
    }

    #[test]
    fn test_cli_uninstall_parsing() {
        let cli = Cli::try_parse_from(["vmpm", "uninstall", "luxfi/evm@v1.0.0", "-y"]).unwrap();
        match cli.command {
            Commands::Uninstall(args) => {
                assert_eq!(args.package, "luxfi/evm@v1.0.0");
                assert!(args.yes);
            }
            _ => panic!("Expected Uninstall command"),
        }

        let cli = Cli::try_parse_from(["vmpm", "remove", "luxfi/evm@v1.0.0"]).unwrap();
        assert!(matches!(cli.command, Commands::Uninstall(ref a) if !a.yes));
    }

    #[test]
    fn test_cli_vmid_name_optional() {
        let cli = Cli::try_parse_from(["vmpm", "vmid"]).unwrap();
        assert!(matches!(cli.command, Commands::Vmid(ref a) if a.name.is_none()));
    }

    #[test]
    fn test_cli_no_subcommand_fails() {
        assert!(Cli::try_parse_from(["vmpm"]).is_err());
    }
}
