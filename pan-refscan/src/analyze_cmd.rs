use anyhow::Result;
use pan_refscan::analysis::{analyze_targets, AnalysisOptions};
use pan_refscan::report::render_target_text;

use crate::cli::{AnalyzeArgs, OutputFormat};
use crate::loader::load_store;

pub fn run_analyze(args: AnalyzeArgs, verbose: bool) -> Result<()> {
    let loaded = load_store(&args.common)?;
    let options = AnalysisOptions {
        with_cleanup: args.cleanup,
    };
    let reports = analyze_targets(&loaded.store, &args.targets, &options, &loaded.cancel)?;

    match args.common.format {
        OutputFormat::Text => {
            let rendered: Vec<String> = reports
                .iter()
                .map(|report| render_target_text(report, verbose))
                .collect();
            println!("{}", rendered.join("\n\n"));
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&reports)?),
    }

    loaded.session.close();
    Ok(())
}
