use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use monover_core::Engine;
use monover_core::changelog::render_markdown;

use super::{load_parts, request_for, resolve_project};
use crate::cli::Verbosity;

/// Arguments for the `changelog` command
#[derive(Args, Debug)]
pub struct ChangelogArgs {
    /// Changelog for only this project (name or directory path)
    #[arg(long)]
    pub project: Option<String>,

    /// Write markdown to a file instead of stdout
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Emit the structured changelog as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn run(repo: &Path, args: &ChangelogArgs, verbosity: Verbosity) -> Result<()> {
    let (vcs, graph, config) = load_parts(repo)?;

    let only_project = match &args.project {
        Some(selector) => Some(resolve_project(repo, &graph, selector)?),
        None => None,
    };

    let engine = Engine::new(&vcs, &graph, config);
    let mut request = request_for(repo);
    request.only_project = only_project;
    request.assemble_changelogs = true;

    let outcome = engine.run(&request, &|| false)?;

    if outcome.changelogs.is_empty() {
        if verbosity != Verbosity::Quiet {
            println!("{}", "No changed projects; nothing to log.".yellow());
        }
        return Ok(());
    }

    let rendered = if args.json {
        serde_json::to_string_pretty(&outcome.changelogs)?
    } else {
        outcome
            .changelogs
            .values()
            .map(render_markdown)
            .collect::<Vec<_>>()
            .join("\n")
    };

    match &args.output {
        Some(path) => {
            std::fs::write(path, rendered)
                .with_context(|| format!("failed to write {}", path.display()))?;
            if verbosity != Verbosity::Quiet {
                println!("{} {}", "wrote".cyan(), path.display());
            }
        }
        None => println!("{}", rendered),
    }

    Ok(())
}
