//! Command-line interface definition.
use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Top-level CLI entry point for the template provisioning engine.
#[derive(Parser, Debug)]
#[command(
    name = "provisioner",
    about = "Apply portable templates to targets and extract them back",
    version
)]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Options shared by every subcommand.
    #[command(flatten)]
    pub global: GlobalOpts,
}

/// Options shared across all subcommands.
#[derive(Parser, Debug, Clone)]
pub struct GlobalOpts {
    /// Run configuration file
    #[arg(short, long, global = true, default_value = "provisioner.toml")]
    pub config: PathBuf,

    /// Run only these categories
    #[arg(long, global = true, value_delimiter = ',')]
    pub only: Vec<String>,

    /// Skip these categories
    #[arg(long, global = true, value_delimiter = ',')]
    pub skip: Vec<String>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Apply a template to a target
    Apply(ApplyOpts),
    /// Extract a template from a target
    Extract(ExtractOpts),
    /// Dry-run a template and report tokens that would stay unresolved
    Validate(ValidateOpts),
    /// Print version information
    Version,
}

impl Command {
    /// Subcommand name, used for the log file.
    #[must_use]
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::Apply(_) => "apply",
            Self::Extract(_) => "extract",
            Self::Validate(_) => "validate",
            Self::Version => "version",
        }
    }
}

/// Options for the `apply` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct ApplyOpts {
    /// Template to apply
    #[arg(short, long)]
    pub template: PathBuf,

    /// Target document; created when missing
    #[arg(short = 's', long)]
    pub target: PathBuf,

    /// URL of a newly created target
    #[arg(long, default_value = "https://localhost/sites/provisioned")]
    pub url: String,

    /// Title of a newly created target
    #[arg(long, default_value = "Provisioned")]
    pub title: String,
}

/// Options for the `extract` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct ExtractOpts {
    /// Target document to read
    #[arg(short = 's', long)]
    pub target: PathBuf,

    /// Where to write the extracted template
    #[arg(short, long)]
    pub out: PathBuf,

    /// Drop entries already present in this template
    #[arg(short, long)]
    pub base: Option<PathBuf>,
}

/// Options for the `validate` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct ValidateOpts {
    /// Template to check
    #[arg(short, long)]
    pub template: PathBuf,

    /// Target document to simulate against (left untouched)
    #[arg(short = 's', long)]
    pub target: Option<PathBuf>,
}
