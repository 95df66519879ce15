use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use pan_refscan::cancel::CancelToken;
use pan_refscan::config::AnalyzerConfig;
use pan_refscan::progress::ProgressReporter;
use pan_refscan::session::Session;
use pan_refscan::store::EntityStore;

use crate::cli::{CommonArgs, OutputFormat};

const BAR_STEPS: u64 = 1000;

pub struct Loaded {
    pub session: Session,
    pub store: Arc<EntityStore>,
    pub cancel: CancelToken,
}

/// Resolve settings, then ingest `args.file` with a progress bar on stderr.
pub fn load_store(args: &CommonArgs) -> Result<Loaded> {
    let config = match &args.config {
        Some(path) => AnalyzerConfig::load(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => AnalyzerConfig::embedded(),
    };
    let timeout = args.timeout.map(Duration::from_secs).or(config.timeout);
    let cancel = match timeout {
        Some(timeout) => CancelToken::with_timeout(timeout),
        None => CancelToken::new(),
    };

    let session = Session::new(config).context("failed to start the store cache")?;
    let bar = progress_bar(args.format);
    let progress = match &bar {
        Some(bar) => {
            let bar = bar.clone();
            ProgressReporter::new(Box::new(move |fraction, message| {
                bar.set_position((fraction * BAR_STEPS as f64) as u64);
                bar.set_message(message.to_string());
            }))
        }
        None => ProgressReporter::silent(),
    };

    let loaded = session.load(&args.file, &cancel, &progress);
    progress.finish();
    if let Some(bar) = bar {
        bar.finish_and_clear();
    }
    let store = loaded.with_context(|| format!("failed to load {}", args.file.display()))?;

    let stats = store.stats();
    tracing::info!(
        addresses = stats.addresses,
        groups = stats.address_groups,
        security_rules = stats.security_rules,
        nat_rules = stats.nat_rules,
        device_groups = stats.device_groups,
        "store ready"
    );
    Ok(Loaded {
        session,
        store,
        cancel,
    })
}

/// Text output gets a bar on stderr; JSON output stays silent.
fn progress_bar(format: OutputFormat) -> Option<ProgressBar> {
    if format == OutputFormat::Json {
        return None;
    }
    let bar = ProgressBar::with_draw_target(Some(BAR_STEPS), ProgressDrawTarget::stderr());
    let style = ProgressStyle::with_template("{elapsed_precise} {bar:36.cyan/blue} {percent:>3}% {msg}")
        .map(|style| style.progress_chars("■■□"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style);
    Some(bar)
}
