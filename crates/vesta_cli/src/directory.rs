//! `vesta directory`: host a directory node until interrupted.

use vesta_directory::{Directory, DirectoryNode};

use crate::setup::{self, Membership};
use crate::{DirectoryArgs, GlobalArgs, PeerArgs};

/// Runs the `vesta directory` command.
///
/// A `vesta.toml` is optional here; without one the default listen address
/// is used.
pub fn run(args: &DirectoryArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let config = setup::load_optional(global)?;
    let peer = config.map(|c| c.peer).unwrap_or_default();
    let overrides = PeerArgs {
        join: None,
        node_id: args.node_id.clone(),
        listen: args.listen.clone(),
    };
    let membership = setup::membership(&overrides, &peer)?;
    setup::runtime()?.block_on(host(membership, global.quiet))
}

async fn host(membership: Membership, quiet: bool) -> Result<i32, Box<dyn std::error::Error>> {
    let node = DirectoryNode::bootstrap(&membership.node_id, None, membership.listen).await?;
    if !quiet {
        eprintln!("   Hosting directory {} on {}", node.id(), node.address());
    }
    tokio::signal::ctrl_c().await?;
    node.shutdown().await;
    node.join().await;
    Ok(0)
}
