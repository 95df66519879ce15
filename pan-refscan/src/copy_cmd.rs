use anyhow::{Context, Result};
use pan_refscan::copy::{plan_copy, CopyMode, CopyRequest};
use pan_refscan::model::Scope;
use pan_refscan::report::render_copy_text;

use crate::cli::{CopyArgs, CopyModeArg, OutputFormat};
use crate::loader::load_store;

pub fn run_copy(args: CopyArgs) -> Result<()> {
    let loaded = load_store(&args.common)?;
    let scope = match (args.shared, args.device_group) {
        (true, _) => Some(Scope::Shared),
        (false, Some(group)) => Some(Scope::device_group(group)),
        (false, None) => None,
    };
    let request = CopyRequest {
        source: args.source,
        scope,
        new_name: args.name,
        new_value: args.ip,
        mode: match args.mode {
            CopyModeArg::Add => CopyMode::Add,
            CopyModeArg::Replace => CopyMode::Replace,
        },
    };
    let plan = plan_copy(&loaded.store, &request)
        .with_context(|| format!("cannot copy {} in {}", request.source, args.common.file.display()))?;

    match args.common.format {
        OutputFormat::Text => println!("{}", render_copy_text(&plan)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&plan)?),
    }

    loaded.session.close();
    Ok(())
}
