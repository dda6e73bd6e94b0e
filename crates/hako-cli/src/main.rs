//! hako - inspect and convert archives through the in-memory file tree.
//!
//! Every command loads the archive into a fresh workspace first, so listing,
//! checksumming and conversion all go through the same import path the
//! engine uses for real workspaces.
//!
//! ## Usage
//!
//! ```bash
//! hako ls project.zip
//! hako md5 project.tar --strip 1
//! hako convert project.zip project.tar
//! RUST_LOG=hako_vfs=debug hako --config hako.toml ls project.zip
//! ```

use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::{Path as FsPath, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use hako_vfs::{ArchiveFormat, Path, VfsConfig, Workspace};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Folder every archive is unpacked into.
const STAGING: &str = "/archive";

#[derive(Parser, Debug)]
#[command(name = "hako")]
#[command(about = "Inspect and convert zip/tar archives through the hako file tree")]
struct Cli {
    /// Workspace configuration (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the entries of an archive
    Ls {
        archive: PathBuf,
        #[command(flatten)]
        load: LoadArgs,
    },
    /// Print an md5 line for every file in an archive
    Md5 {
        archive: PathBuf,
        #[command(flatten)]
        load: LoadArgs,
    },
    /// Rewrite an archive in the format of the output's extension
    Convert {
        input: PathBuf,
        output: PathBuf,
        #[command(flatten)]
        load: LoadArgs,
    },
}

#[derive(Args, Debug, Clone, Copy, Default)]
struct LoadArgs {
    /// Drop this many leading path segments from every entry
    #[arg(long, default_value_t = 0)]
    strip: usize,
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();
    match run(cli, &mut io::stdout().lock()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli, out: &mut dyn Write) -> Result<()> {
    let config = match &cli.config {
        Some(path) => VfsConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => VfsConfig::default(),
    };

    match cli.command {
        Command::Ls { archive, load } => {
            let ws = load_archive(&config, &archive, load)?;
            list(&ws, out)
        }
        Command::Md5 { archive, load } => {
            let ws = load_archive(&config, &archive, load)?;
            md5(&ws, out)
        }
        Command::Convert { input, output, load } => {
            let ws = load_archive(&config, &input, load)?;
            convert(&ws, &output)
        }
    }
}

fn format_of(path: &FsPath) -> Result<ArchiveFormat> {
    match ArchiveFormat::from_extension(path) {
        Some(format) => Ok(format),
        None => bail!(
            "cannot tell the archive format of {} (expected .zip or .tar)",
            path.display()
        ),
    }
}

fn staging() -> Result<Path> {
    Ok(Path::of(STAGING)?)
}

/// Fresh workspace with `archive` unpacked under the staging folder.
fn load_archive(config: &VfsConfig, archive: &FsPath, load: LoadArgs) -> Result<Workspace> {
    let format = format_of(archive)?;
    let file =
        File::open(archive).with_context(|| format!("opening {}", archive.display()))?;

    let ws = Workspace::from_config(config)?;
    let staging = staging()?;
    ws.with_mount(|m| {
        let root = m.root();
        m.create_folder(root, &STAGING[1..])
    })?;
    ws.import(&staging, format, BufReader::new(file), false, load.strip)
        .with_context(|| format!("unpacking {}", archive.display()))?;

    let count = ws.with_mount(|m| -> Result<usize> {
        let folder = m.get_by_path(&staging)?;
        Ok(m.walk(folder)?.count() - 1)
    })?;
    tracing::info!(archive = %archive.display(), %format, entries = count, "loaded archive");
    Ok(ws)
}

/// One line per entry: size and relative path, folders with a trailing `/`.
fn list(ws: &Workspace, out: &mut dyn Write) -> Result<()> {
    let staging = staging()?;
    ws.with_mount(|m| -> Result<()> {
        let folder = m.get_by_path(&staging)?;
        for node in m.walk(folder)?.skip(1) {
            let path = m.path_of(node.id())?;
            let relative = path.relative_to(&staging).unwrap_or(path);
            if node.is_folder() {
                writeln!(out, "{:>10}  {relative}/", "-")?;
            } else {
                writeln!(out, "{:>10}  {relative}", node.length())?;
            }
        }
        Ok(())
    })
}

/// `md5sum`-style output.
fn md5(ws: &Workspace, out: &mut dyn Write) -> Result<()> {
    let staging = staging()?;
    let sums = ws.with_mount(|m| m.count_md5_sums(m.get_by_path(&staging)?))?;
    for (digest, relative) in sums {
        writeln!(out, "{digest}  {relative}")?;
    }
    Ok(())
}

fn convert(ws: &Workspace, output: &FsPath) -> Result<()> {
    let format = format_of(output)?;
    let bytes = ws.export(&staging()?, format)?;
    std::fs::write(output, &bytes).with_context(|| format!("writing {}", output.display()))?;
    tracing::info!(output = %output.display(), %format, bytes = bytes.len(), "wrote archive");
    Ok(())
}
