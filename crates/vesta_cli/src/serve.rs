//! `vesta serve`: build one variant and serve it to peers.

use std::sync::Arc;

use vesta_common::SpecKey;
use vesta_config::VestaConfig;
use vesta_directory::{Directory, DirectoryNode};
use vesta_peer::{PeerOptions, Producer};

use crate::setup::{self, Membership};
use crate::{GlobalArgs, ServeArgs};

/// Runs the `vesta serve` command.
///
/// Runs only the producer workflow: no election, no local consumer. Serving
/// stops after the configured number of transfers, on Ctrl-C, or when the
/// serve window elapses.
pub fn run(args: &ServeArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let config = setup::load(global)?;
    let key = args.key.key()?;
    let membership = setup::membership(&args.peer, &config.peer)?;
    let mut options = setup::peer_options(&config.peer);
    if let Some(transfers) = args.transfers {
        options.transfers = transfers.max(1);
    }
    setup::runtime()?.block_on(serve(&config, key, membership, options, global.quiet))
}

async fn serve(
    config: &VestaConfig,
    key: SpecKey,
    membership: Membership,
    options: PeerOptions,
    quiet: bool,
) -> Result<i32, Box<dyn std::error::Error>> {
    let node = Arc::new(
        DirectoryNode::bootstrap(
            &membership.node_id,
            membership.join.as_deref(),
            membership.listen,
        )
        .await?,
    );
    let shutdown = setup::interrupt_token();

    let producer = Producer::new(setup::backend(config), node.clone(), options);
    let request = config.kernel.request_for(key);
    let result = producer
        .run(key, &config.kernel.name, &request, shutdown)
        .await;
    node.shutdown().await;
    node.join().await;

    match result {
        Ok(report) => {
            if !quiet {
                eprintln!(
                    "    Served {} {key} from {} ({} transfers)",
                    config.kernel.name, report.location, report.transfers
                );
            }
            Ok(0)
        }
        Err(e) => {
            eprintln!("error: {e}");
            Ok(1)
        }
    }
}
