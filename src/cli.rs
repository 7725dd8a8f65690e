use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::DEFAULT_CONFIG_FILE;
use crate::types::Stage;

#[derive(Parser)]
#[command(name = "kuba")]
#[command(about = "Pick a Kubernetes debug target and attach once the live-reload deploy is ready")]
pub struct Cli {
    /// Settings file
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Where the selected target is remembered between runs
    #[arg(long, default_value = ".kuba/selection.yaml")]
    pub state: PathBuf,

    /// Use a plain numbered prompt instead of the full-screen picker
    #[arg(long)]
    pub no_tui: bool,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// How cluster queries are made
    #[arg(long, value_enum, default_value_t = Backend::Kubectl)]
    pub backend: Backend,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// Shell out to kubectl
    Kubectl,
    /// Talk to the API server directly
    Api,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Resolve the target and emit the debugger launch configuration
    Attach {
        /// Write the configuration to this file instead of stdout
        #[arg(long)]
        launch_file: Option<PathBuf>,

        /// Skip starting the deploy task even if upBeforeAttach is set
        #[arg(long)]
        no_up: bool,
    },
    /// Run the selection wizard
    Pick {
        /// First stage to ask for
        #[arg(long, value_enum, default_value_t = Stage::Context)]
        from: Stage,
    },
    /// Print the remembered selection
    Show,
    /// Forget the remembered selection
    Reset,
    /// Start the deploy task and keep it running
    Up {
        /// Wait for the deploy to report ready
        #[arg(long)]
        wait: bool,
    },
    /// Run the build task to completion
    Build,
    /// Print the debugger launch configuration template
    LaunchConfig,
}
