use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[clap(version, about)]
pub struct Cli {
    #[clap(short, long, global = true, help = "Log debug output")]
    pub verbose: bool,

    #[clap(
        long,
        global = true,
        help = "Use this directory as the user data root instead of the OS default"
    )]
    pub user_data: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    #[clap(about = "List versions available from the package source")]
    Versions {
        #[clap(long, help = "Print JSON instead of a table")]
        json: bool,
    },

    #[clap(about = "Download and install a version")]
    Install {
        #[clap(help = "Version number or package id")]
        version: String,

        #[clap(short, long, help = "Make the version active once installed")]
        activate: bool,
    },

    #[clap(about = "List installed versions")]
    Installed {
        #[clap(long, help = "Print JSON instead of a table")]
        json: bool,
    },

    #[clap(about = "Remove an installed version")]
    Uninstall {
        #[clap(help = "Installed version id")]
        id: String,
    },

    #[clap(about = "Make an installed version active")]
    Use {
        #[clap(help = "Installed version id")]
        id: String,
    },

    #[clap(about = "Show the active version")]
    Active,

    #[clap(about = "Clear the active version")]
    ClearActive,

    #[clap(about = "Point an installed version at a data directory")]
    SetDataDir {
        #[clap(help = "Installed version id")]
        id: String,

        #[clap(help = "Data directory, made absolute if relative")]
        dir: PathBuf,
    },

    #[clap(about = "Check that the package source is reachable and well formed")]
    ValidateSource,

    #[clap(about = "Print installed and active version state as JSON")]
    ExportState,

    #[clap(about = "Print the application directory layout")]
    Paths,

    #[clap(about = "Show or change the package source")]
    Source {
        #[clap(subcommand)]
        action: Option<SourceAction>,
    },
}

#[derive(Subcommand)]
pub enum SourceAction {
    #[clap(about = "Show the configured package source")]
    Show,

    #[clap(about = "Install from zip packages in a local folder")]
    Local {
        #[clap(help = "Folder containing hagicode-<version>-<platform>.zip packages")]
        path: PathBuf,
    },

    #[clap(about = "Install from GitHub release assets")]
    Github {
        owner: String,
        repo: String,

        #[clap(long, help = "Token for private repositories")]
        token: Option<String>,
    },

    #[clap(about = "Install from a static index.json")]
    Index {
        #[clap(help = "URL of the index document")]
        url: String,
    },

    #[clap(about = "Set the source from a JSON configuration object")]
    Json {
        #[clap(help = r#"e.g. {"type":"local-folder","path":"/opt/packages"}"#)]
        value: String,
    },
}

impl Command {
    /// Commands that write state take the single-instance lock.
    pub fn mutates_state(&self) -> bool {
        match self {
            Self::Install { .. }
            | Self::Uninstall { .. }
            | Self::Use { .. }
            | Self::ClearActive
            | Self::SetDataDir { .. } => true,
            Self::Source { action } => !matches!(action, None | Some(SourceAction::Show)),
            Self::Versions { .. }
            | Self::Installed { .. }
            | Self::Active
            | Self::ValidateSource
            | Self::ExportState
            | Self::Paths => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Cli, Command, SourceAction};

    #[test]
    fn parses_install_with_global_flags() {
        let cli = Cli::try_parse_from([
            "hagicode",
            "install",
            "1.2.3",
            "--activate",
            "--verbose",
            "--user-data",
            "/tmp/hagicode",
        ])
        .expect("arguments parse");

        assert!(cli.verbose);
        assert_eq!(
            cli.user_data.as_deref(),
            Some(std::path::Path::new("/tmp/hagicode"))
        );
        assert!(matches!(
            cli.command,
            Command::Install { ref version, activate: true } if version == "1.2.3"
        ));
        assert!(cli.command.mutates_state());
    }

    #[test]
    fn source_without_action_is_read_only() {
        let cli = Cli::try_parse_from(["hagicode", "source"]).expect("arguments parse");

        assert!(matches!(cli.command, Command::Source { action: None }));
        assert!(!cli.command.mutates_state());
    }

    #[test]
    fn source_github_accepts_token() {
        let cli = Cli::try_parse_from([
            "hagicode", "source", "github", "HagiCode-org", "releases", "--token", "abc",
        ])
        .expect("arguments parse");

        assert!(matches!(
            cli.command,
            Command::Source {
                action: Some(SourceAction::Github { ref token, .. })
            } if token.as_deref() == Some("abc")
        ));
        assert!(cli.command.mutates_state());
    }

    #[test]
    fn kebab_case_subcommands_parse() {
        for args in [
            ["hagicode", "clear-active"].as_slice(),
            ["hagicode", "validate-source"].as_slice(),
            ["hagicode", "export-state"].as_slice(),
            ["hagicode", "set-data-dir", "id", "/data"].as_slice(),
        ] {
            assert!(Cli::try_parse_from(args).is_ok(), "{args:?} should parse");
        }
    }
}
