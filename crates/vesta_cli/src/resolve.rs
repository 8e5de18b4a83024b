//! `vesta resolve`: resolve one variant through the peer exchange.

use std::sync::Arc;

use vesta_compiler::Linkable;
use vesta_peer::{DistributedCache, PeerNode};

use crate::{setup, GlobalArgs, ReportFormat, ResolveArgs};

/// Runs the `vesta resolve` command.
///
/// Joins (or hosts) the directory, runs the producer and consumer for the
/// key, and prints the path of the fetched binary.
pub fn run(args: &ResolveArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let config = setup::load(global)?;
    let key = args.key.key()?;
    let membership = setup::membership(&args.peer, &config.peer)?;

    let node = Arc::new(PeerNode::bootstrap(
        &membership.node_id,
        membership.join.as_deref(),
        membership.listen,
    )?);
    let cache = DistributedCache::new(
        setup::backend(&config),
        node.clone(),
        config.kernel.name.clone(),
        setup::peer_options(&config.peer),
    );

    let request = config.kernel.request_for(key);
    let result = cache.resolve(key, &request);
    node.shutdown();

    let artifact = match result {
        Ok(artifact) => artifact,
        Err(e) => {
            eprintln!("error: {e}");
            return Ok(1);
        }
    };
    match args.format {
        ReportFormat::Text => println!("{}", artifact.binary_path().display()),
        ReportFormat::Json => {
            let report = serde_json::json!({
                "function": config.kernel.name,
                "node": membership.node_id,
                "min": key.lower(),
                "max": key.upper(),
                "binary": artifact.binary_path(),
                "symbols": artifact.symbol_names(),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(0)
}
