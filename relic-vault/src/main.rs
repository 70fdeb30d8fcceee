mod cli;

use clap::Parser;
use cli::{Cli, Command};
use relic_vault::container::hex_digest;
use relic_vault::{
    ArchiveContainer, Config, ConsoleProgress, Container, DiscImage, Kind, Registry,
    SilentProgress, open_container,
};
use snafu::{ResultExt, Snafu};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Top-level application errors for relic.
#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("failed to open '{}'", path.display()))]
    Open {
        path: PathBuf,
        source: relic_vault::OpenError,
    },

    #[snafu(display("failed to open disc image '{}'", path.display()))]
    OpenDisc {
        path: PathBuf,
        source: relic_vault::OpenDiscError,
    },

    #[snafu(display("failed to open archive '{}'", path.display()))]
    OpenArchive {
        path: PathBuf,
        source: relic_vault::OpenArchiveError,
    },

    #[snafu(display("failed to read '{path}'"))]
    Lookup {
        path: String,
        source: relic_vault::LookupError,
    },

    #[snafu(display("verification failed"))]
    Verify { source: relic_vault::VerifyError },

    #[snafu(display("failed to load configuration"))]
    LoadConfig { source: relic_vault::ConfigError },

    #[snafu(display("failed to write to stdout"))]
    WriteStdout { source: std::io::Error },
}

type Result<T, E = Error> = std::result::Result<T, E>;

#[snafu::report]
fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Info { target, kind } => cmd_info(&target, resolve_kind(&target, kind)),
        Command::List { target, kind } => cmd_list(&target, resolve_kind(&target, kind)),
        Command::Cat { target, path, kind } => {
            cmd_cat(&target, resolve_kind(&target, kind), &path)
        }
        Command::Verify {
            target,
            kind,
            quiet,
        } => cmd_verify(&target, resolve_kind(&target, kind), quiet),
        Command::Mounts { config } => cmd_mounts(&config),
    }
}

fn resolve_kind(target: &Path, kind: Option<Kind>) -> Kind {
    kind.unwrap_or(if target.is_dir() {
        Kind::Iso
    } else {
        Kind::Swfkit
    })
}

fn open(path: &Path, kind: Kind) -> Result<Box<dyn Container>> {
    open_container(kind, path).context(OpenSnafu { path })
}

fn cmd_info(path: &Path, kind: Kind) -> Result<()> {
    match kind {
        Kind::Iso => {
            let disc = DiscImage::open(path).context(OpenDiscSnafu { path })?;

            println!("Disc: {}", disc.image_path().display());
            println!();
            println!("Volume ID:      {}", disc.volume_id());
            println!("Facade:         {}", disc.facade());
            println!("Files:          {}", disc.len());
            println!("Defect ranges:  {}", disc.defects().len());

            for range in disc.defects() {
                println!("  {range}");
            }

            println!("Errored paths:  {}", disc.errored_paths().len());

            for path in disc.errored_paths() {
                println!("  {path}");
            }
        }
        Kind::Swfkit => {
            let archive = ArchiveContainer::open(path).context(OpenArchiveSnafu { path })?;

            println!("Archive: {}", archive.exe_path().display());
            println!();
            println!("Trailer Offset: 0x{:X}", archive.exe_eof());
            println!("Entry Count:    {}", archive.len());
        }
    }

    Ok(())
}

fn cmd_list(path: &Path, kind: Kind) -> Result<()> {
    let container = open(path, kind)?;

    println!("Files in {}:", path.display());
    println!("{:>10}  {:<64}  Path", "Size", "SHA-256");
    println!("{:-<10}  {:-<64}  {:-<30}", "", "", "");

    for file in container.paths() {
        let size = container.size(file).context(LookupSnafu { path: file })?;
        let digest = container
            .checksum(file)
            .context(LookupSnafu { path: file })?
            .map(|d| hex_digest(&d))
            .unwrap_or_else(|| "-".to_owned());

        println!("{size:>10}  {digest:<64}  {file}");
    }

    Ok(())
}

fn cmd_cat(path: &Path, kind: Kind, file: &str) -> Result<()> {
    let container = open(path, kind)?;
    let chunks = container.stream(file).context(LookupSnafu { path: file })?;
    let mut stdout = std::io::stdout().lock();

    for chunk in chunks {
        stdout.write_all(&chunk).context(WriteStdoutSnafu)?;
    }

    stdout.flush().context(WriteStdoutSnafu)
}

fn cmd_verify(path: &Path, kind: Kind, quiet: bool) -> Result<()> {
    let container = open(path, kind)?;
    let start = std::time::Instant::now();

    let verified = if quiet {
        relic_vault::verify(&*container, &SilentProgress)
    } else {
        relic_vault::verify(&*container, &ConsoleProgress::new())
    }
    .context(VerifySnafu)?;

    for file in &verified {
        println!("{}  {}", hex_digest(&file.digest), file.path);
    }

    if !quiet {
        let bytes: u64 = verified.iter().map(|f| f.size).sum();

        eprintln!(
            "Verified {} files ({} bytes) in {:.2}s.",
            verified.len(),
            bytes,
            start.elapsed().as_secs_f64()
        );
    }

    Ok(())
}

fn cmd_mounts(path: &Path) -> Result<()> {
    let config = Config::load(path).context(LoadConfigSnafu)?;
    let registry = Registry::from_config(&config);

    println!("Mounts from {} ({} of {} opened):", path.display(), registry.len(), config.disks.len());
    println!("{:<16}  {:<6}  {:>6}  {:<9}  Movie", "Prefix", "Kind", "Files", "Player");
    println!("{:-<16}  {:-<6}  {:-<6}  {:-<9}  {:-<20}", "", "", "", "", "");

    for prefix in registry.prefixes() {
        let Some(mount) = registry.get(&prefix) else {
            continue;
        };

        let settings = mount.settings();
        let (width, height) = settings.player.dimensions();

        println!(
            "{:<16}  {:<6}  {:>6}  {:<9}  {}",
            prefix,
            settings.kind,
            mount.container().paths().len(),
            format!("{width}x{height}"),
            settings.swf.as_deref().unwrap_or("-")
        );
    }

    Ok(())
}
