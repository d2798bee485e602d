use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

use crate::commands::{
    changelog::ChangelogArgs, graph::GraphArgs, init::InitArgs, tag::TagArgs, version::VersionArgs,
};

/// monover: semantic and calendar versioning for monorepos
///
/// Computes per-project versions from git history, conventional commits and
/// a declarative monover.yaml configuration.
#[derive(Parser, Debug)]
#[command(name = "monover", version, about, long_about = None)]
pub struct Cli {
    /// Increase output verbosity (show debug info)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Repository root (defaults to the current directory)
    #[arg(long, global = true, default_value = ".")]
    pub repo: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

/// Verbosity level resolved from --verbose / --quiet flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    /// --quiet: only errors and essential output
    Quiet,
    /// default: normal output
    Normal,
    /// --verbose: extra debug info
    Verbose,
}

impl Cli {
    /// Resolve the verbosity level from CLI flags
    pub fn verbosity(&self) -> Verbosity {
        match (self.quiet, self.verbose) {
            (true, _) => Verbosity::Quiet,
            (_, true) => Verbosity::Verbose,
            _ => Verbosity::Normal,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compute versions for the projects in the repository
    Version(VersionArgs),

    /// Render the changelog for changed projects
    Changelog(ChangelogArgs),

    /// Create release tags for changed projects
    Tag(TagArgs),

    /// Show the project dependency graph
    Graph(GraphArgs),

    /// Write a starter monover.yaml
    Init(InitArgs),

    /// Generate shell completion scripts
    Completion(CompletionArgs),
}

#[derive(clap::Args, Debug)]
pub struct CompletionArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}
