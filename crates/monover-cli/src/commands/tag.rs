use std::path::Path;

use anyhow::{Result, bail};
use clap::Args;
use colored::Colorize;
use monover_core::Engine;

use super::{load_parts, request_for};
use crate::cli::Verbosity;

/// Arguments for the `tag` command
#[derive(Args, Debug)]
pub struct TagArgs {
    /// Show what would be tagged without writing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Approve major bumps for this run (satisfies the majorApproval constraint)
    #[arg(long)]
    pub major_approved: bool,
}

pub fn run(repo: &Path, args: &TagArgs, verbosity: Verbosity) -> Result<()> {
    let (vcs, graph, mut config) = load_parts(repo)?;
    if args.major_approved {
        config.major_approved = Some(true);
    }
    let engine = Engine::new(&vcs, &graph, config);

    let mut request = request_for(repo);
    request.create_tags = !args.dry_run;

    let outcome = engine.run(&request, &|| false)?;

    if args.dry_run {
        for (name, result) in &outcome.results {
            if result.changed {
                println!("would tag {} at {}", name.bold(), result.version);
            }
        }
    } else if outcome.created_tags.is_empty() {
        if verbosity != Verbosity::Quiet {
            println!("{}", "No new tags; everything is already tagged.".yellow());
        }
    } else {
        for tag in &outcome.created_tags {
            println!("{} {}", "tagged".cyan(), tag);
        }
    }

    if !outcome.failures.is_empty() {
        for failure in &outcome.failures {
            eprintln!(
                "{} {}: {}",
                "ERROR".red().bold(),
                failure.project,
                failure.error
            );
        }
        bail!("{} project(s) failed validation", outcome.failures.len());
    }

    Ok(())
}
