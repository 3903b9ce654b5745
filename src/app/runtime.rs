use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tracing::{debug, info};
use url::Url;
use webget_core::download::{BatchReport, ensure_scheme, expand_home};
use webget_core::{
    CancelToken, Destination, DownloadEngine, DownloadRequest, HttpClient, MirrorContext,
    MirrorEngine, MirrorReport, ProgressReporter, TokenBucket,
};

use crate::ProcessExit;
use crate::app::settings::RunSettings;
use crate::app::{config_file, terminal};
use crate::cli::Args;

/// Runs one invocation to completion. Returns the outcome that decides the
/// process exit code; hard failures come back as `Err`.
pub(crate) async fn run_webget(args: Args, cancel: CancelToken) -> Result<ProcessExit> {
    let file_config = config_file::load_config(args.config.as_deref())?;
    let settings = RunSettings::resolve(&args, file_config.as_ref())?;

    let log_file = args
        .background_log
        .then(|| PathBuf::from(terminal::BACKGROUND_LOG_FILE));
    terminal::init_tracing(
        terminal::default_level(args.quiet, args.verbose),
        log_file.as_deref(),
    )?;
    if let Some(path) = &log_file {
        println!("Output will be written to \"{}\".", path.display());
    }

    debug!(?args, "CLI arguments parsed");
    debug!(?settings, "effective settings");

    let progress = if terminal::should_show_progress(
        io::stderr().is_terminal(),
        args.quiet,
        args.background_log,
        terminal::is_dumb_terminal(),
    ) {
        ProgressReporter::stderr()
    } else {
        ProgressReporter::hidden()
    };

    let engine = build_engine(&settings, progress, cancel)?;

    if let Some(list) = &args.input_file {
        return run_batch_mode(&engine, list, &settings).await;
    }

    let Some(raw_url) = args.url.as_deref() else {
        bail!("No URL given. Pass a URL or use -i <file>.");
    };
    let url = ensure_scheme(raw_url);

    if args.mirror {
        run_mirror_mode(&engine, &url, &settings, args.convert_links).await
    } else {
        run_single_mode(&engine, &url, args.output_document.as_deref(), &settings).await
    }
}

fn build_engine(
    settings: &RunSettings,
    progress: ProgressReporter,
    cancel: CancelToken,
) -> Result<DownloadEngine> {
    let client = HttpClient::with_timeouts(
        settings.timeouts.connect,
        settings.timeouts.read,
        settings.timeouts.fetch,
    )
    .context("Failed to build HTTP client")?;

    let rate_limiter = settings.rate_limit.map(|rate| {
        debug!(bytes_per_second = rate, "rate limiting enabled");
        Arc::new(TokenBucket::new(rate))
    });
    if rate_limiter.is_none() {
        debug!("rate limiting disabled");
    }

    let engine = DownloadEngine::new(client, settings.concurrency)?
        .with_rate_limiter(rate_limiter)
        .with_progress(progress)
        .with_cancel(cancel);
    Ok(engine)
}

/// Where a single download lands: `-O` wins, joined under an explicit `-P`
/// when relative; otherwise a name derived from the URL inside the output dir.
fn single_destination(output_document: Option<&Path>, settings: &RunSettings) -> Destination {
    match output_document {
        Some(file) => {
            let file = expand_home(file);
            if settings.output_dir_explicit && file.is_relative() {
                Destination::File(settings.output_dir.join(file))
            } else {
                Destination::File(file)
            }
        }
        None => Destination::Directory(settings.output_dir.clone()),
    }
}

async fn run_single_mode(
    engine: &DownloadEngine,
    url: &str,
    output_document: Option<&Path>,
    settings: &RunSettings,
) -> Result<ProcessExit> {
    let request = DownloadRequest::new(url, single_destination(output_document, settings));
    let result = engine
        .fetch_one(request)
        .await
        .with_context(|| format!("Failed to download {url}"))?;

    info!(
        path = %result.saved_path.display(),
        bytes = result.byte_count,
        "saved"
    );
    println!("Saved {}", result.saved_path.display());
    Ok(ProcessExit::Success)
}

async fn run_batch_mode(
    engine: &DownloadEngine,
    list: &Path,
    settings: &RunSettings,
) -> Result<ProcessExit> {
    let report = engine.run_batch(list, &settings.output_dir).await?;
    print_batch_summary(&report);
    Ok(ProcessExit::from_counts(report.succeeded(), report.failed()))
}

fn print_batch_summary(report: &BatchReport) {
    for outcome in report.failures() {
        match &outcome.result {
            Some(Err(e)) => eprintln!("line {}: {e}", outcome.line),
            _ => eprintln!("line {}: {} did not complete", outcome.line, outcome.url),
        }
    }
    println!(
        "Downloaded {} of {} files ({} failed)",
        report.succeeded(),
        report.total(),
        report.failed()
    );
}

async fn run_mirror_mode(
    engine: &DownloadEngine,
    url: &str,
    settings: &RunSettings,
    convert_links: bool,
) -> Result<ProcessExit> {
    let root_url = Url::parse(url).with_context(|| format!("Invalid URL: {url}"))?;
    let ctx = MirrorContext::builder(root_url.clone())
        .reject_extensions(settings.reject.iter().map(String::as_str))
        .exclude_directories(settings.exclude.iter().map(String::as_str))
        .convert_links(convert_links)
        .build();

    let report = MirrorEngine::new(engine.clone())
        .mirror(&root_url, &ctx, &settings.output_dir)
        .await
        .with_context(|| format!("Failed to mirror {root_url}"))?;

    print_mirror_summary(&report);
    Ok(ProcessExit::from_counts(report.fetched + 1, report.failed()))
}

fn print_mirror_summary(report: &MirrorReport) {
    for failure in &report.failures {
        match &failure.error {
            Some(e) => eprintln!("{e}"),
            None => eprintln!("{} did not complete", failure.url),
        }
    }
    println!(
        "Mirrored {} ({} assets, {} failed, {} excluded, {} links converted)",
        report.root.saved_path.display(),
        report.fetched,
        report.failed(),
        report.excluded,
        report.rewritten
    );
}
