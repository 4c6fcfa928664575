//! CLI mode for mustang - download songs, albums and playlists from the terminal.

mod progress;

use std::path::PathBuf;
use std::sync::Arc;

use indicatif::MultiProgress;

use crate::{
    AppConfig, DownloadProgress, Downloader, EnvelopeCodec, NeteaseClient, Session, Target,
    TargetKind, build_http_client,
};

pub use progress::BarProgress;
use progress::{print_banner, print_summary};

/// Options collected from the command line. `None` keeps the config value.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CliOptions {
    /// Song id(s), album id or playlist id.
    pub id: String,
    /// What `id` refers to.
    pub kind: TargetKind,
    /// Download directory.
    pub dir: Option<PathBuf>,
    /// Requested bitrate.
    pub bitrate: Option<u32>,
    /// Per-transfer timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Concurrent downloads.
    pub jobs: Option<usize>,
    /// Explicit config file.
    pub config: Option<PathBuf>,
}

impl CliOptions {
    /// Overrides `config` with the values given on the command line.
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(dir) = &self.dir {
            config.paths.download_dir.clone_from(dir);
        }
        if let Some(bitrate) = self.bitrate {
            config.download.bitrate = bitrate;
        }
        if let Some(secs) = self.timeout_secs {
            config.download.timeout_secs = secs;
        }
        if let Some(jobs) = self.jobs {
            config.download.concurrent_files = jobs;
        }
    }
}

/// What the command line asks for.
#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    /// Print usage.
    Help,
    /// Print the version.
    Version,
    /// Download something.
    Run(CliOptions),
}

fn print_usage() {
    eprintln!("Usage: mustang -i <id> [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -i, --id <id>         Song, album or playlist id (songs: 123.456 for several)");
    eprintln!("  -t, --type <s|a|p>    s = song (default), a = album, p = playlist");
    eprintln!("  -d, --dir <dir>       Download directory (default: ./downloads)");
    eprintln!("  -b, --bitrate <bps>   Requested bitrate (default: 320000)");
    eprintln!("      --timeout <secs>  Per-track download timeout (default: 60)");
    eprintln!("  -j, --jobs <n>        Concurrent downloads (default: 16)");
    eprintln!("  -c, --config <file>   Config file (default: <config dir>/mustang/config.toml)");
    eprintln!("  -V, --version         Show version");
    eprintln!("  -h, --help            Show this help");
}

fn value<'a>(args: &'a [String], i: &mut usize, flag: &str) -> crate::Result<&'a str> {
    *i += 1;
    args.get(*i)
        .map(String::as_str)
        .ok_or_else(|| crate::Error::Config(format!("{flag} requires a value")))
}

fn number<T: std::str::FromStr>(raw: &str, flag: &str) -> crate::Result<T> {
    raw.parse()
        .map_err(|_| crate::Error::Config(format!("{flag}: '{raw}' is not a valid number")))
}

/// Parses command-line arguments (without the program name).
///
/// # Errors
///
/// Returns [`crate::Error::Config`] for unknown flags, missing values, or a
/// missing `--id`.
pub fn parse_args(args: &[String]) -> crate::Result<Command> {
    let mut options = CliOptions::default();
    let mut id = None;

    let mut i = 0;
    while i < args.len() {
        let flag = args[i].as_str();
        match flag {
            "-h" | "--help" => return Ok(Command::Help),
            "-V" | "--version" => return Ok(Command::Version),
            "-i" | "--id" => id = Some(value(args, &mut i, flag)?.to_string()),
            "-t" | "--type" => options.kind = value(args, &mut i, flag)?.parse()?,
            "-d" | "--dir" => options.dir = Some(PathBuf::from(value(args, &mut i, flag)?)),
            "-b" | "--bitrate" => options.bitrate = Some(number(value(args, &mut i, flag)?, flag)?),
            "--timeout" => options.timeout_secs = Some(number(value(args, &mut i, flag)?, flag)?),
            "-j" | "--jobs" => options.jobs = Some(number(value(args, &mut i, flag)?, flag)?),
            "-c" | "--config" => options.config = Some(PathBuf::from(value(args, &mut i, flag)?)),
            other => {
                return Err(crate::Error::Config(format!("unknown argument '{other}'")));
            }
        }
        i += 1;
    }

    options.id = id.ok_or_else(|| crate::Error::Config("please provide an id with -i".to_string()))?;
    Ok(Command::Run(options))
}

/// Runs the CLI. Returns `Ok(false)` when some tracks failed.
///
/// # Errors
///
/// Returns an error for bad arguments or configuration, when the album or
/// playlist cannot be fetched, or when a single requested song fails.
pub async fn run(args: &[String]) -> crate::Result<bool> {
    let options = match parse_args(args) {
        Ok(Command::Run(options)) => options,
        Ok(Command::Help) => {
            print_usage();
            return Ok(true);
        }
        Ok(Command::Version) => {
            println!("mustang {}", env!("CARGO_PKG_VERSION"));
            return Ok(true);
        }
        Err(e) => {
            print_usage();
            return Err(e);
        }
    };

    let mut config = match &options.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };
    options.apply(&mut config);
    let target = Target::parse(options.kind, &options.id)?;

    print_banner();
    log::info!("Download directory: {}", config.paths.download_dir.display());

    let http = build_http_client(&config.download)?;
    let api = NeteaseClient::new(http.clone(), &config.api.base_url, EnvelopeCodec::default())
        .with_timeout(config.api.timeout());
    let downloader = Downloader::new(http, config.download.clone());
    let session = Session::new(api, downloader, &config.paths.download_dir);

    let multi = MultiProgress::new();
    let progress: Arc<dyn DownloadProgress> = Arc::new(BarProgress::new(multi.clone()));

    let stats = session.run(&target, &progress).await?;
    multi.clear().ok();
    print_summary(&stats);

    Ok(stats.is_success())
}
