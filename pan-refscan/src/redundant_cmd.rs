use anyhow::Result;
use pan_refscan::analysis::redundancy_report;
use pan_refscan::report::render_redundancy_text;

use crate::cli::{OutputFormat, RedundantArgs};
use crate::loader::load_store;

pub fn run_redundant(args: RedundantArgs) -> Result<()> {
    let loaded = load_store(&args.common)?;
    let report = redundancy_report(&loaded.store, &loaded.cancel)?;

    match args.common.format {
        OutputFormat::Text => println!("{}", render_redundancy_text(&report)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }

    loaded.session.close();
    Ok(())
}
