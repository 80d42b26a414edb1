use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use env_logger::Builder;
use fuzzpatch::{
    MatchOptions, Workspace, DEFAULT_MATCH_DISTANCE, DEFAULT_MATCH_THRESHOLD,
};
use log::{info, Level, LevelFilter};
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

// --- Main Application Entry Point ---

fn main() {
    let args = Args::parse();
    if let Err(e) = run(args) {
        // Using {:?} ensures the full error chain from `anyhow` is printed.
        eprintln!("{} {:?}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}

/// Contains the primary logic of the application.
fn run(args: Args) -> Result<()> {
    setup_logging(args.verbose);

    // --- Argument Validation ---
    if !args.root.is_dir() {
        return Err(anyhow!(
            "Workspace root '{}' not found or is not a directory.",
            args.root.display()
        ));
    }
    if !(0.0..=1.0).contains(&args.threshold) {
        return Err(anyhow!("Threshold must be between 0.0 and 1.0."));
    }

    let options = MatchOptions::builder()
        .threshold(args.threshold)
        .max_distance(args.max_distance)
        .build();
    let workspace = Workspace::new(&args.root)
        .with_context(|| format!("Failed to open workspace root '{}'", args.root.display()))?
        .with_options(options)
        .with_dry_run(args.dry_run);

    let report = match &args.command {
        Command::Replace {
            file,
            search,
            search_file,
            replace,
            replace_file,
            all,
            near,
        } => {
            let search = text_arg("search", search.as_deref(), search_file.as_deref())?;
            let replace = text_arg("replace", replace.as_deref(), replace_file.as_deref())?;
            if *all {
                if near.is_some() {
                    return Err(anyhow!("--near has no effect with --all (exact matching)."));
                }
                workspace.search_replace_all(file, &search, &replace)?
            } else {
                let expected_offset = near.unwrap_or(0);
                workspace.search_replace_near(file, &search, &replace, expected_offset)?
            }
        }
        Command::Apply { file, diff_file } => {
            let diff = read_text_or_stdin(diff_file)?;
            workspace.apply_diff(file, &diff)?
        }
        Command::Insert {
            file,
            line,
            text_file,
        } => {
            let text = read_text_or_stdin(text_file)?;
            workspace.insert_at_line(file, *line, &text)?
        }
        Command::Delete { file, start, end } => workspace.delete_lines(file, *start, *end)?,
    };

    if let Some(diff) = &report.diff {
        println!("----- Proposed Changes for {} -----", report.path.display());
        print!("{}", diff);
        println!("------------------------------------");
        info!("DRY RUN completed. No files were modified.");
    } else {
        println!("{}", report);
    }

    Ok(())
}

/// Resolves a text argument given either inline or as a file path.
fn text_arg(name: &str, inline: Option<&str>, file: Option<&Path>) -> Result<String> {
    match (inline, file) {
        (Some(text), None) => Ok(text.to_string()),
        (None, Some(path)) => read_text_or_stdin(path),
        (None, None) => Err(anyhow!("Provide --{name} or --{name}-file.")),
        (Some(_), Some(_)) => Err(anyhow!("--{name} and --{name}-file are mutually exclusive.")),
    }
}

/// Reads a text argument from a file, or from stdin when the path is `-`.
fn read_text_or_stdin(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read from stdin")?;
        Ok(buf)
    } else {
        fs::read_to_string(path)
            .with_context(|| format!("Failed to read file '{}'", path.display()))
    }
}

/// Sets up the global logger with colored level prefixes.
fn setup_logging(verbose: u8) {
    let log_level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    Builder::new()
        .filter_level(log_level)
        .format(|buf, record| match record.level() {
            Level::Error => writeln!(buf, "{} {}", "error:".red().bold(), record.args()),
            Level::Warn => writeln!(buf, "{} {}", "warning:".yellow().bold(), record.args()),
            Level::Info => writeln!(buf, "{}", record.args()),
            Level::Debug => writeln!(buf, "{} {}", "debug:".blue().bold(), record.args()),
            Level::Trace => writeln!(buf, "{} {}", "trace:".cyan().bold(), record.args()),
        })
        .init();
}

/// Defines the command-line arguments for the application.
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Fuzzy search/replace and unified-diff application for files in a workspace.",
    long_about = "Locates search blocks with fuzzy matching when exact context fails, applies \
                  unified diffs from the highest line number down, and provides line-based \
                  insert/delete primitives. All paths are sandboxed to the workspace root."
)]
struct Args {
    #[command(subcommand)]
    command: Command,
    /// Workspace root directory. Edited files must resolve inside it.
    #[arg(short, long, default_value = ".", global = true)]
    root: PathBuf,
    /// Matching threshold for fuzzy operations (0.0 = exact only, 1.0 = loose).
    #[arg(short, long, default_value_t = DEFAULT_MATCH_THRESHOLD, global = true)]
    threshold: f32,
    /// Maximum distance in characters from the expected location to search.
    #[arg(long, default_value_t = DEFAULT_MATCH_DISTANCE, global = true)]
    max_distance: usize,
    /// Show what would be done as a unified diff, but don't modify files.
    #[arg(short = 'n', long, global = true)]
    dry_run: bool,
    /// Increase logging verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replace a block of text in a file, fuzzily by default.
    Replace {
        /// File to edit, relative to the workspace root.
        file: PathBuf,
        /// Inline text to search for.
        #[arg(short, long, conflicts_with = "search_file")]
        search: Option<String>,
        /// File containing the text to search for, or `-` for stdin.
        #[arg(long)]
        search_file: Option<PathBuf>,
        /// Inline replacement text.
        #[arg(long, conflicts_with = "replace_file")]
        replace: Option<String>,
        /// File containing the replacement text, or `-` for stdin.
        #[arg(long)]
        replace_file: Option<PathBuf>,
        /// Replace every exact occurrence instead of the first fuzzy match.
        #[arg(long)]
        all: bool,
        /// Byte offset hint for where the match is expected.
        #[arg(long)]
        near: Option<usize>,
    },
    /// Apply a unified diff to a file.
    Apply {
        /// File to edit, relative to the workspace root.
        file: PathBuf,
        /// File containing the unified diff, or `-` for stdin.
        diff_file: PathBuf,
    },
    /// Insert text before a 1-indexed line (0 prepends, past-EOF appends).
    Insert {
        /// File to edit, relative to the workspace root.
        file: PathBuf,
        /// 1-indexed line number to insert before.
        line: usize,
        /// File containing the text to insert, or `-` for stdin.
        text_file: PathBuf,
    },
    /// Delete a 1-indexed inclusive range of lines.
    Delete {
        /// File to edit, relative to the workspace root.
        file: PathBuf,
        /// First line to delete (1-indexed).
        start: usize,
        /// Last line to delete (inclusive, clamped to end of file).
        end: usize,
    },
}
