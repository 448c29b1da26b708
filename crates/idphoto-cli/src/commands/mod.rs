//! CLI command definitions and handlers.

pub mod check;
pub mod formats;

use clap::{Parser, Subcommand};

/// idphoto - Identity photo compliance checks
#[derive(Parser)]
#[command(name = "idphoto")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Shared check arguments (paths, standard, flags).
    #[command(flatten)]
    pub check: check::CheckArgs,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Validate photos against a photo standard
    Check(check::CheckArgs),
    /// List supported photo standards
    Formats(formats::FormatsArgs),
}

/// Process exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    /// Every photo passed.
    Success = 0,
    /// At least one photo failed or needs manual review.
    IssuesFound = 1,
    /// The run itself failed.
    Error = 2,
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        Self::from(code as u8)
    }
}
