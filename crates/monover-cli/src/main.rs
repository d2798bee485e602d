mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands, Verbosity};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = Cli::parse();
    let verbosity = cli.verbosity();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    // `init` and `completion` don't require a repository — handle them early
    if let Commands::Init(args) = &cli.command {
        return match commands::init::run(&cli.repo, args) {
            Ok(()) => {
                if verbosity != Verbosity::Quiet {
                    println!("\n{}", "SUCCESS".green().bold());
                }
                Ok(())
            }
            Err(e) => {
                eprintln!("\n{} {}", "FAILED".red().bold(), e);
                std::process::exit(1);
            }
        };
    }

    if let Commands::Completion(args) = &cli.command {
        clap_complete::generate(
            args.shell,
            &mut <Cli as clap::CommandFactory>::command(),
            "monover",
            &mut std::io::stdout(),
        );
        return Ok(());
    }

    let result = match &cli.command {
        Commands::Version(args) => commands::version::run(&cli.repo, args, verbosity),
        Commands::Changelog(args) => commands::changelog::run(&cli.repo, args, verbosity),
        Commands::Tag(args) => commands::tag::run(&cli.repo, args, verbosity),
        Commands::Graph(args) => commands::graph::run(&cli.repo, args),
        Commands::Init(_) | Commands::Completion(_) => unreachable!("handled above"),
    };

    match result {
        Ok(()) => {
            if verbosity != Verbosity::Quiet {
                println!("\n{}", "SUCCESS".green().bold());
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("\n{} {}", "FAILED".red().bold(), e);
            std::process::exit(1);
        }
    }
}
