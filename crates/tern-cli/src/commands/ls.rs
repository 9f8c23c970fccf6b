//! List selected nodes

use anyhow::{anyhow, Result};
use tern_core::node::ResourceType;
use tern_core::selector::NodeSelector;

use crate::cli::{GlobalArgs, LsArgs, LsOutput};
use crate::commands::common;

pub async fn execute(args: &LsArgs, global: &GlobalArgs) -> Result<()> {
    let ctx = common::load_context(global)?;
    let spec = common::build_spec(&args.selection, &ctx.project_dir)?;

    let mut selector = NodeSelector::new(&ctx.graph, &ctx.manifest, ctx.previous_state.as_ref());
    if let Some(types) = &args.resource_type {
        let types = types
            .iter()
            .map(|value| {
                ResourceType::from_selector(value)
                    .ok_or_else(|| anyhow!("'{value}' is not a valid resource type"))
            })
            .collect::<Result<Vec<_>>>()?;
        selector = selector.with_resource_types(types);
    }

    for unique_id in selector.get_selected(&spec)? {
        let Some(member) = ctx.manifest.graph_member(unique_id.as_str()) else {
            continue;
        };
        match args.output {
            LsOutput::Name => println!("{}", unique_id),
            LsOutput::Path => println!("{}", member.original_file_path()),
            LsOutput::Fqn => println!("{}", member.fqn().join(".")),
            LsOutput::Json => println!(
                "{}",
                serde_json::json!({
                    "unique_id": unique_id,
                    "resource_type": member.resource_type(),
                    "package_name": member.package_name(),
                    "tags": member.tags(),
                })
            ),
        }
    }
    Ok(())
}
