mod commands;

use clap::{ArgAction, Parser, Subcommand};
use clap_complete::Shell;
use commands::build::BuildArgs;
use commands::CommandError;
use quickpkg_schema::Defaults;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "quickpkg",
    version,
    about = "Build macOS installer packages from applications, disk images and archives"
)]
struct Cli {
    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Read defaults from this file instead of ~/.config/quickpkg/config.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Build an installer package from an application or a container holding one.
    Build(BuildArgs),
    /// Check that the system tools quickpkg drives are present.
    Doctor,
    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
    /// Generate man pages.
    ManPages {
        /// Output directory for man pages.
        #[arg(default_value = "man")]
        dir: PathBuf,
    },
}

fn log_level(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

fn load_defaults(explicit: Option<&PathBuf>) -> Result<Defaults, CommandError> {
    let loaded = match explicit {
        Some(path) => Defaults::load(path),
        None => Defaults::load_default(),
    };
    loaded.map_err(|e| CommandError::usage(format!("invalid config: {e}")))
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("QUICKPKG_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level(cli.verbose))),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    let json_output = cli.json;

    let result = match cli.command {
        Commands::Build(ref args) => load_defaults(cli.config.as_ref())
            .and_then(|defaults| commands::build::run(args, &defaults, json_output)),
        Commands::Doctor => {
            commands::doctor::run(cli.config.as_deref(), json_output).map_err(CommandError::from)
        }
        Commands::Completions { shell } => {
            commands::completions::run::<Cli>(shell).map_err(CommandError::from)
        }
        Commands::ManPages { ref dir } => {
            commands::man_pages::run::<Cli>(dir).map_err(CommandError::from)
        }
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(e.code)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use commands::EXIT_USAGE_ERROR;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn verbosity_maps_to_levels() {
        assert_eq!(log_level(0), "warn");
        assert_eq!(log_level(1), "info");
        assert_eq!(log_level(2), "debug");
        assert_eq!(log_level(7), "trace");
    }

    #[test]
    fn build_aliases_parse() {
        let cli = Cli::try_parse_from([
            "quickpkg", "build", "Foo.dmg", "--pre", "pre.sh", "--out", "x.pkg", "--no-clean",
        ])
        .unwrap();
        let Commands::Build(args) = cli.command else {
            panic!("expected build");
        };
        assert_eq!(args.preinstall.as_deref(), Some("pre.sh"));
        assert_eq!(args.output.as_deref(), Some("x.pkg"));
        assert!(args.no_clean);
    }

    #[test]
    fn component_conflicts_with_distribution() {
        let err = Cli::try_parse_from([
            "quickpkg",
            "build",
            "Foo.app",
            "--component",
            "--distribution",
        ])
        .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn bad_config_is_a_usage_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "package_type = \"bundle\"\n").unwrap();
        let err = load_defaults(Some(&path)).unwrap_err();
        assert_eq!(err.code, EXIT_USAGE_ERROR);
    }
}
