mod config;

use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use clap_complete::Shell;
use colored::Colorize;

use season_sort::episode::{Pipeline, SeasonIndex, TransferMode};
use season_sort::{print_bold, print_error, print_yellow};

use crate::config::Config;

#[derive(Parser)]
#[command(
    author,
    version,
    name = env!("CARGO_BIN_NAME"),
    about = "Collect episode files and sort them into season folders"
)]
struct SeasonSortArgs {
    /// Optional root directory containing the source directories
    #[arg(value_hint = clap::ValueHint::DirPath)]
    path: Option<PathBuf>,

    /// Zip archive to extract into the root before collecting
    #[arg(short, long, name = "ARCHIVE")]
    archive: Option<String>,

    /// Season config JSON file
    #[arg(short, long, name = "FILE", value_hint = clap::ValueHint::FilePath)]
    config: Option<String>,

    /// Print debug information
    #[arg(short = 'D', long)]
    debug: bool,

    /// Media file extensions, comma separated
    #[arg(short, long = "ext", num_args = 1, action = clap::ArgAction::Append, name = "EXT")]
    extensions: Vec<String>,

    /// How files are transferred
    #[arg(short, long, value_enum)]
    mode: Option<TransferMode>,

    /// Name prefix of the directories to collect from
    #[arg(short = 'x', long, name = "PREFIX")]
    prefix: Option<String>,

    /// Only print changes without touching files
    #[arg(short, long)]
    print: bool,

    /// Root directory of the show
    #[arg(short = 'r', long, name = "DIR", value_hint = clap::ValueHint::DirPath)]
    show_root: Option<String>,

    /// Directory the episode files are collected into
    #[arg(short, long, name = "STAGING", value_hint = clap::ValueHint::DirPath)]
    staging: Option<String>,

    /// Generate shell completion
    #[arg(short = 'l', long, name = "SHELL")]
    completion: Option<Shell>,

    /// Print verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = SeasonSortArgs::parse();
    if let Some(ref shell) = args.completion {
        return season_sort::generate_shell_completion(
            *shell,
            SeasonSortArgs::command(),
            true,
            env!("CARGO_BIN_NAME"),
        );
    }

    ctrlc::set_handler(|| {
        println!("\n{}", "Interrupted".yellow().bold());
        process::exit(1);
    })
    .context("Failed to set Ctrl+C handler")?;

    let root = season_sort::resolve_input_path(args.path.as_deref())?;
    let config = Config::from_args(&args);
    if config.debug {
        config.print(&root);
    }

    let season_config = config.season_config_path(&root);
    if !season_config.is_file() {
        print_error!("Season config not found: {}", season_config.display());
        process::exit(2);
    }
    let seasons = match SeasonIndex::load(&season_config) {
        Ok(seasons) => seasons,
        Err(e) => {
            print_error!("{e:#}");
            process::exit(2);
        }
    };

    let options = config.pipeline_options(&root, &seasons);
    print_bold!(
        "{}: {} season(s), mode {}",
        seasons.show_name(),
        seasons.season_count(),
        config.mode
    );
    if config.dryrun {
        print_yellow!("Dryrun: no files will be changed");
    }

    let stats = Pipeline::new(options, seasons).run()?;
    stats.print_summary(config.dryrun);
    Ok(())
}
