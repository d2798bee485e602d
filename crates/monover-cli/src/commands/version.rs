use std::path::Path;

use anyhow::{Result, bail};
use clap::Args;
use colored::Colorize;
use monover_core::Engine;
use monover_core::calculator::PrereleaseType;

use super::{load_parts, request_for, resolve_project};
use crate::cli::Verbosity;

/// Arguments for the `version` command
#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Compute only this project (name or directory path)
    #[arg(long)]
    pub project: Option<String>,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,

    /// Also create release tags for changed projects
    #[arg(long)]
    pub tag: bool,

    /// Override the configured prerelease channel (alpha, beta, rc, none, or custom)
    #[arg(long)]
    pub prerelease: Option<String>,

    /// Approve major bumps for this run (satisfies the majorApproval constraint)
    #[arg(long)]
    pub major_approved: bool,
}

fn parse_prerelease(raw: &str) -> PrereleaseType {
    match raw.to_ascii_lowercase().as_str() {
        "none" => PrereleaseType::None,
        "alpha" => PrereleaseType::Alpha,
        "beta" => PrereleaseType::Beta,
        "rc" => PrereleaseType::Rc,
        other => PrereleaseType::Custom(other.to_string()),
    }
}

pub fn run(repo: &Path, args: &VersionArgs, verbosity: Verbosity) -> Result<()> {
    let (vcs, graph, mut config) = load_parts(repo)?;

    if let Some(raw) = &args.prerelease {
        config.prerelease_type = Some(parse_prerelease(raw));
    }
    if args.major_approved {
        config.major_approved = Some(true);
    }

    let only_project = match &args.project {
        Some(selector) => Some(resolve_project(repo, &graph, selector)?),
        None => None,
    };

    let engine = Engine::new(&vcs, &graph, config);
    let mut request = request_for(repo);
    request.only_project = only_project.clone();
    request.create_tags = args.tag;

    let outcome = engine.run(&request, &|| false)?;

    for warning in &outcome.warnings {
        eprintln!("{} {}", "WARNING:".yellow().bold(), warning);
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else if only_project.is_some() {
        // Single-project contract: one parsable line.
        if let Some(result) = outcome.results.values().next() {
            println!("Version: {}", result.version);
            if verbosity == Verbosity::Verbose {
                println!("{} {}", "reason:".dimmed(), result.reason);
            }
        }
    } else {
        for (name, result) in &outcome.results {
            let marker = if result.changed {
                "*".green().bold().to_string()
            } else {
                " ".to_string()
            };
            println!(
                "{} {} {} {}",
                marker,
                name.bold(),
                result.version,
                format!("({})", result.reason).dimmed()
            );
        }
    }

    for tag in &outcome.created_tags {
        if verbosity != Verbosity::Quiet {
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
