//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

use webget_core::parse_rate_limit;

/// Fetch a file, a list of files, or a page with its assets.
///
/// URLs without a scheme are fetched over https.
#[derive(Parser, Debug)]
#[command(name = "webget")]
#[command(author, version, about)]
pub struct Args {
    /// URL to download
    #[arg(required_unless_present = "input_file")]
    pub url: Option<String>,

    /// Save the download under this file name
    #[arg(short = 'O', long = "output-document", value_name = "FILE", conflicts_with_all = ["input_file", "mirror"])]
    pub output_document: Option<PathBuf>,

    /// Directory downloads are saved into (default: current directory)
    #[arg(short = 'P', long = "directory-prefix", value_name = "DIR")]
    pub directory_prefix: Option<PathBuf>,

    /// Download every URL listed in FILE, one per line
    #[arg(short = 'i', long = "input-file", value_name = "FILE", conflicts_with_all = ["url", "mirror"])]
    pub input_file: Option<PathBuf>,

    /// Cap the aggregate download speed, e.g. 500k, 2M, 1G (bytes per second)
    #[arg(long, value_name = "RATE", value_parser = parse_rate_limit)]
    pub rate_limit: Option<u64>,

    /// Download the page and the assets it references
    #[arg(long)]
    pub mirror: bool,

    /// Comma-separated file extensions to skip while mirroring (e.g. jpg,gif)
    #[arg(short = 'R', long, value_name = "EXTS", requires = "mirror")]
    pub reject: Option<String>,

    /// Comma-separated directory prefixes to skip while mirroring (e.g. /ads,/tmp)
    #[arg(short = 'X', long, value_name = "DIRS", requires = "mirror")]
    pub exclude: Option<String>,

    /// Point links in the mirrored page at the local copies
    #[arg(long, requires = "mirror")]
    pub convert_links: bool,

    /// Write logs to ./webget-log instead of the terminal
    #[arg(short = 'B', long = "background-log")]
    pub background_log: bool,

    /// Maximum concurrent downloads (1-100)
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub concurrency: Option<u8>,

    /// Abort any single download that takes longer than SECS
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..=86_400))]
    pub timeout: Option<u64>,

    /// Read defaults from this TOML file instead of the standard location
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, conflicts_with = "quiet")]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}
