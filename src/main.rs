use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::Parser;
use owo_colors::OwoColorize;
use std::fs;
use std::path::PathBuf;
use std::process;
use std::time::Instant;

use twinsync::{sync_pair, SyncStats};

#[derive(Parser)]
#[command(
    name = "twin",
    version,
    about = "Bidirectional directory sync with a per-file history trail"
)]
struct Cli {
    /// First directory of the pair
    dir1: PathBuf,

    /// Second directory of the pair
    dir2: PathBuf,

    /// Quiet mode (no summary)
    #[arg(short, long)]
    quiet: bool,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("{} {e:#}", "Error:".red());
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            e.exit()
        },
        Err(_) => {
            println!("Please provide a valid input");
            process::exit(1);
        },
    };

    // One missing directory is created empty; two is a dead end.
    match (cli.dir1.exists(), cli.dir2.exists()) {
        (false, false) => {
            println!("Please make sure at least one directory exists");
            process::exit(1);
        },
        (false, true) => fs::create_dir_all(&cli.dir1)
            .with_context(|| format!("Failed to create {}", cli.dir1.display()))?,
        (true, false) => fs::create_dir_all(&cli.dir2)
            .with_context(|| format!("Failed to create {}", cli.dir2.display()))?,
        (true, true) => {},
    }

    let start = Instant::now();
    let stats = sync_pair(&cli.dir1, &cli.dir2)?;

    if !cli.quiet {
        print_summary(&stats, start.elapsed().as_secs_f64());
    }

    Ok(())
}

fn print_summary(stats: &SyncStats, elapsed: f64) {
    if stats.is_noop() {
        if stats.warnings > 0 {
            println!("In sync ({} warnings)", stats.warnings.to_string().yellow());
        } else {
            println!("In sync");
        }
        return;
    }

    let mut parts = Vec::new();
    if stats.copied > 0 {
        parts.push(format!("{} copied", stats.copied).green().to_string());
    }
    if stats.deleted > 0 {
        parts.push(format!("{} deleted", stats.deleted).red().to_string());
    }
    if stats.aligned > 0 {
        parts.push(format!("{} timestamps aligned", stats.aligned).cyan().to_string());
    }
    if stats.conflicts > 0 {
        parts.push(format!("{} conflicts resolved", stats.conflicts).yellow().to_string());
    }
    if stats.revived > 0 {
        parts.push(format!("{} revived", stats.revived).cyan().to_string());
    }
    if stats.warnings > 0 {
        parts.push(format!("{} warnings", stats.warnings).yellow().to_string());
    }

    println!("{}", parts.join(", "));
    println!("{} in {elapsed:.2}s", "Done.".green().bold());
}
