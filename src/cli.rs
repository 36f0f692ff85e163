//! CLI argument parsing and run setup

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::builder::NonEmptyStringValueParser;
use clap::{Parser, ValueEnum};

use conan_updater_bgfx::config::{self, ArchiveMode, PackageFamily, RunConfig};
use conan_updater_bgfx::output::{self, emoji, OutputConfig};
use conan_updater_bgfx::pipeline;

/// Directory created next to the executable when no temp dir is given
const DEFAULT_TEMP_DIR_NAME: &str = "tmp";

/// Add the latest (or a pinned) bgfx release, with matching bx and bimg
/// releases, to conan-center-index recipes
#[derive(Parser, Debug)]
#[command(name = "conan-updater-bgfx")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Existing conan-center-index working copy to update in place
    #[arg(long, value_name = "PATH")]
    conan_center_index_path: Option<PathBuf>,

    /// Directory for clones and archives [default: tmp next to the executable]
    #[arg(long, value_name = "DIR", env = "CONAN_UPDATER_TEMP_DIR")]
    temp_dir: Option<PathBuf>,

    /// Package this bgfx commit instead of the latest one
    #[arg(long, value_name = "SHA", value_parser = NonEmptyStringValueParser::new())]
    bgfx_sha: Option<String>,

    /// Package family configuration file
    #[arg(short, long, value_name = "PATH", env = "CONAN_UPDATER_CONFIG")]
    config: Option<PathBuf>,

    /// Pair the pinned commit with the last bx and bimg commits made before it
    #[arg(long, requires = "bgfx_sha")]
    pair_by_timestamp: bool,

    /// How source archive checksums are computed
    #[arg(long, value_enum, value_name = "MODE", default_value_t = ArchiveArg::Download)]
    archive: ArchiveArg,

    /// Show what would be changed without writing recipe files
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Remove the upstream clones after the run
    #[arg(long)]
    clean: bool,

    /// Set log level (error, warn, info, debug, trace); RUST_LOG takes precedence
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    log_level: String,

    /// Colorize output (always, never, auto)
    #[arg(long, value_name = "WHEN", default_value = "auto", value_parser = ["always", "never", "auto"])]
    color: String,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum ArchiveArg {
    /// Download the GitHub tarball and hash it
    Download,
    /// Hash a tarball built locally with git archive
    Git,
}

impl From<ArchiveArg> for ArchiveMode {
    fn from(arg: ArchiveArg) -> Self {
        match arg {
            ArchiveArg::Download => ArchiveMode::Download,
            ArchiveArg::Git => ArchiveMode::Git,
        }
    }
}

impl Cli {
    /// Run the update
    pub fn execute(self) -> Result<()> {
        init_logging(&self.log_level);
        let out = OutputConfig::from_env_and_flag(&self.color);
        let config = self.run_config()?;

        println!(
            "{} Updating {} recipes",
            emoji(&out, "🔍", "[SCAN]"),
            config.family.primary.name
        );
        if config.dry_run {
            println!(
                "{} DRY RUN MODE - No changes will be made",
                emoji(&out, "🔎", "[DRY RUN]")
            );
        }
        println!();

        let start_time = Instant::now();
        match pipeline::run(&config) {
            Ok(report) => {
                output::print_report(&out, &report);
                println!("   Finished in {:.2}s", start_time.elapsed().as_secs_f64());
                Ok(())
            }
            Err(e) => {
                eprintln!("{} Update failed", emoji(&out, "❌", "[ERR]"));
                Err(e.into())
            }
        }
    }

    /// Resolve the arguments into a [`RunConfig`].
    fn run_config(&self) -> Result<RunConfig> {
        let family = match &self.config {
            Some(path) => config::from_file(path)
                .with_context(|| format!("Failed to load {}", path.display()))?,
            None => PackageFamily::default(),
        };
        let temp_dir = match &self.temp_dir {
            Some(dir) => dir.clone(),
            None => default_temp_dir()?,
        };

        let mut run = RunConfig::new(temp_dir);
        run.family = family;
        run.downstream_path = self.conan_center_index_path.clone();
        run.pinned_revision = self.bgfx_sha.clone();
        run.pair_by_timestamp = self.pair_by_timestamp;
        run.archive_mode = self.archive.into();
        run.dry_run = self.dry_run;
        run.clean = self.clean;
        Ok(run)
    }
}

/// `tmp` in the directory holding the executable.
fn default_temp_dir() -> Result<PathBuf> {
    let exe = std::env::current_exe().context("Failed to locate the executable")?;
    let dir = exe
        .parent()
        .context("Executable path has no parent directory")?;
    Ok(dir.join(DEFAULT_TEMP_DIR_NAME))
}

/// Initialize `env_logger` at `level`, letting `RUST_LOG` override it.
fn init_logging(level: &str) {
    let _ = env_logger::Builder::new()
        .parse_filters(level)
        .parse_default_env()
        .format_timestamp(None)
        .try_init();
}
