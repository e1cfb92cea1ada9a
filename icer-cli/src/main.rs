//! icer CLI - Command-line tool for inspecting icer archives
//!
//! This binary provides command-line interfaces for:
//! - ls: list entries and the side files they own
//! - cat: print the stored text of one entry
//! - meta: print the archive metadata
//! - show: restore entries with the built-in handlers and print them as JSON
//! - rm: remove entries and their side files

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use icer_format::constants::META_KEY;
use icer_io::{
    deice, open_archive_with, read_meta_json, register_builtin, Archive, ArchiveOptions,
    BuiltinModes, Compression, OpenMode,
};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, Level};

#[derive(Parser)]
#[command(name = "icer")]
#[command(about = "Inspect and edit icer archives")]
#[command(version)]
struct Cli {
    /// TOML configuration file (handler modes, staging directory, compression)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List entries and their side-file counts
    ///
    /// Examples:
    ///   icer ls results.ice
    ///   icer ls results.ice.zip --format json --all
    Ls {
        /// Archive directory or zip file
        archive: PathBuf,
        /// Output format (table, json)
        #[arg(long, value_enum, default_value_t = LsFormat::Table)]
        format: LsFormat,
        /// Include the metadata entry
        #[arg(long)]
        all: bool,
    },
    /// Print the stored text of one entry
    Cat {
        /// Archive directory or zip file
        archive: PathBuf,
        /// Entry name
        key: String,
    },
    /// Print the archive metadata
    Meta {
        /// Archive directory or zip file
        archive: PathBuf,
    },
    /// Restore entries and print them as plain JSON
    ///
    /// Examples:
    ///   icer show results.ice
    ///   icer show results.ice weights bias
    Show {
        /// Archive directory or zip file
        archive: PathBuf,
        /// Entries to show (default: all)
        keys: Vec<String>,
    },
    /// Remove entries and the side files they own
    Rm {
        /// Archive directory or zip file
        archive: PathBuf,
        /// Entries to remove
        #[arg(required = true)]
        keys: Vec<String>,
    },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum LsFormat {
    Table,
    Json,
}

/// Settings read from `--config`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct CliConfig {
    /// Parent directory for zip staging
    working_dir: Option<PathBuf>,
    /// Compression of rewritten zip archives
    compression: Compression,
    /// Built-in handler modes
    handlers: BuiltinModes,
}

impl CliConfig {
    fn load(path: Option<&Path>) -> Result<Self, Box<dyn Error>> {
        match path {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .map_err(|e| format!("Failed to read config {}: {}", path.display(), e))?;
                let config: CliConfig = toml::from_str(&text)
                    .map_err(|e| format!("Invalid config {}: {}", path.display(), e))?;
                debug!(config = ?config, "loaded configuration");
                Ok(config)
            }
            None => Ok(Self::default()),
        }
    }

    fn archive_options(&self) -> ArchiveOptions {
        ArchiveOptions {
            working_dir: self.working_dir.clone(),
            compression: self.compression,
            ..ArchiveOptions::default()
        }
    }

    fn open(&self, path: &Path, mode: OpenMode) -> Result<Box<dyn Archive>, Box<dyn Error>> {
        let mut archive = open_archive_with(path, mode, self.archive_options())?;
        register_builtin(archive.handlers_mut(), &self.handlers);
        Ok(archive)
    }
}

#[derive(Debug, Serialize)]
struct EntrySummary {
    name: String,
    side_files: usize,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let config = CliConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Ls {
            archive,
            format,
            all,
        } => handle_ls(&config, &archive, format, all),
        Commands::Cat { archive, key } => handle_cat(&config, &archive, &key),
        Commands::Meta { archive } => handle_meta(&config, &archive),
        Commands::Show { archive, keys } => handle_show(&config, &archive, &keys),
        Commands::Rm { archive, keys } => handle_rm(&config, &archive, &keys),
    }
}

fn handle_ls(
    config: &CliConfig,
    path: &Path,
    format: LsFormat,
    all: bool,
) -> Result<(), Box<dyn Error>> {
    let archive = config.open(path, OpenMode::Read)?;
    let mut entries = Vec::new();
    for name in archive.keys()? {
        if name == META_KEY && !all {
            continue;
        }
        let side_files = archive.container().owned_side_files(&name)?.len();
        entries.push(EntrySummary { name, side_files });
    }
    let kind = archive.kind();
    archive.close()?;

    let mut stdout = std::io::stdout().lock();
    match format {
        LsFormat::Table => print_ls_table(&mut stdout, &entries)?,
        LsFormat::Json => {
            let root = serde_json::json!({
                "archive": path.display().to_string(),
                "kind": kind.as_str(),
                "entries": entries,
            });
            serde_json::to_writer_pretty(&mut stdout, &root)?;
            writeln!(stdout)?;
        }
    }
    Ok(())
}

fn print_ls_table(writer: &mut dyn Write, entries: &[EntrySummary]) -> Result<(), Box<dyn Error>> {
    let width = entries
        .iter()
        .map(|e| e.name.len())
        .max()
        .unwrap_or(0)
        .max("NAME".len());
    writeln!(writer, "{:<width$}  SIDE FILES", "NAME", width = width)?;
    for entry in entries {
        writeln!(
            writer,
            "{:<width$}  {}",
            entry.name,
            entry.side_files,
            width = width
        )?;
    }
    Ok(())
}

fn handle_cat(config: &CliConfig, path: &Path, key: &str) -> Result<(), Box<dyn Error>> {
    let archive = config.open(path, OpenMode::Read)?;
    let text = archive.read(key)?;
    archive.close()?;

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(text.as_bytes())?;
    if !text.ends_with('\n') {
        writeln!(stdout)?;
    }
    Ok(())
}

fn handle_meta(config: &CliConfig, path: &Path) -> Result<(), Box<dyn Error>> {
    let archive = config.open(path, OpenMode::Read)?;
    let meta = read_meta_json(&*archive)?;
    archive.close()?;

    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, &meta)?;
    writeln!(stdout)?;
    Ok(())
}

fn handle_show(config: &CliConfig, path: &Path, keys: &[String]) -> Result<(), Box<dyn Error>> {
    let archive = config.open(path, OpenMode::Read)?;
    let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
    let values = deice(&*archive, Some(&keys), None)?;
    archive.close()?;

    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, &values)?;
    writeln!(stdout)?;
    Ok(())
}

fn handle_rm(config: &CliConfig, path: &Path, keys: &[String]) -> Result<(), Box<dyn Error>> {
    let archive = config.open(path, OpenMode::Append)?;
    for key in keys {
        archive.remove(key)?;
        info!(entry = %key, "removed");
    }
    archive.close()?;
    eprintln!("Removed {} entr{}", keys.len(), if keys.len() == 1 { "y" } else { "ies" });
    Ok(())
}
