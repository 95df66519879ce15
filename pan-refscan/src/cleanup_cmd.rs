use anyhow::{bail, Context, Result};
use pan_refscan::analysis::{analyze_target, AnalysisOptions};
use pan_refscan::report::render_cleanup_text;

use crate::cli::{CleanupArgs, OutputFormat};
use crate::loader::load_store;

pub fn run_cleanup(args: CleanupArgs) -> Result<()> {
    let loaded = load_store(&args.common)?;
    let report = analyze_target(
        &loaded.store,
        &args.target,
        &AnalysisOptions { with_cleanup: true },
        &loaded.cancel,
    )?;
    if !report.defined {
        bail!("address object {} is not defined in {}", args.target, args.common.file.display());
    }
    let plan = report
        .cleanup
        .context("no cleanup plan was produced")?;

    match args.common.format {
        OutputFormat::Text => println!("{}", render_cleanup_text(&plan)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&plan)?),
    }

    loaded.session.close();
    Ok(())
}
