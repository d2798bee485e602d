use std::path::Path;

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use monover_core::project::load_projects;

use super::load_parts;

/// Arguments for the `graph` command
#[derive(Args, Debug)]
pub struct GraphArgs {
    /// Output the graph as JSON
    #[arg(long)]
    pub json: bool,

    /// Include the transitive closure, not just direct dependencies
    #[arg(long)]
    pub transitive: bool,
}

pub fn run(repo: &Path, args: &GraphArgs) -> Result<()> {
    let (_vcs, graph, _config) = load_parts(repo)?;
    let projects = load_projects(&graph, repo, None)?;

    if projects.is_empty() {
        println!("{}", "No projects found.".yellow());
        return Ok(());
    }

    if args.json {
        let entries: Vec<serde_json::Value> = projects
            .iter()
            .map(|p| {
                serde_json::json!({
                    "name": p.name,
                    "manifest": p.manifest_path.display().to_string(),
                    "isTest": p.is_test,
                    "isPackable": p.is_packable,
                    "directDependencies": p.direct_deps,
                    "allDependencies": p.all_deps,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    for project in &projects {
        let deps = if args.transitive {
            &project.all_deps
        } else {
            &project.direct_deps
        };
        if deps.is_empty() {
            println!("{}", project.name.bold());
        } else {
            let list: Vec<&str> = deps.iter().map(|s| s.as_str()).collect();
            println!("{} -> {}", project.name.bold(), list.join(", "));
        }
    }

    Ok(())
}
