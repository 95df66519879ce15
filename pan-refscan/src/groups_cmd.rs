use anyhow::Result;
use pan_refscan::hierarchy::group_hierarchy;
use pan_refscan::report::render_hierarchy_text;

use crate::cli::{GroupsArgs, OutputFormat};
use crate::loader::load_store;

pub fn run_groups(args: GroupsArgs) -> Result<()> {
    let loaded = load_store(&args.common)?;
    let report = group_hierarchy(&loaded.store, &loaded.cancel)?;

    match args.common.format {
        OutputFormat::Text => println!("{}", render_hierarchy_text(&report)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }

    loaded.session.close();
    Ok(())
}
