use std::path::Path;

use anyhow::{Result, bail};
use clap::Args;
use colored::Colorize;
use monover_core::config::CONFIG_FILE;

/// Arguments for the `init` command
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite an existing configuration file
    #[arg(long)]
    pub force: bool,
}

const STARTER_CONFIG: &str = r#"# monover configuration
# Glob patterns locating project manifests (project.yaml files).
manifestPatterns:
  - "**"

tagPrefix: v

conventionalCommits:
  enabled: true
  minorPatterns:
    - feat
  patchPatterns:
    - fix
    - perf

changeDetection:
  ignorePatterns:
    - "**/*.md"
    - "docs/**"

versionPolicy:
  policy: independent
"#;

pub fn run(repo: &Path, args: &InitArgs) -> Result<()> {
    let path = repo.join(CONFIG_FILE);
    if path.exists() && !args.force {
        bail!(
            "{} already exists; pass --force to overwrite",
            path.display()
        );
    }

    std::fs::write(&path, STARTER_CONFIG)?;
    println!("{} {}", "created".cyan(), path.display());
    Ok(())
}
