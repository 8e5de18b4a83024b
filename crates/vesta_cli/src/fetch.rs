//! `vesta fetch`: wait for a peer's publication and fetch the variant.

use std::sync::Arc;
use std::time::Duration;

use vesta_common::SpecKey;
use vesta_compiler::Linkable;
use vesta_config::VestaConfig;
use vesta_directory::{Directory, DirectoryNode};
use vesta_peer::{Consumer, PeerOptions};

use crate::setup::{self, Membership};
use crate::{FetchArgs, GlobalArgs};

/// Runs the `vesta fetch` command.
///
/// Runs only the consumer workflow and prints the path of the downloaded
/// binary once it has loaded.
pub fn run(args: &FetchArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let config = setup::load(global)?;
    let key = args.key.key()?;
    let membership = setup::membership(&args.peer, &config.peer)?;
    let mut options = setup::peer_options(&config.peer);
    if let Some(secs) = args.timeout {
        options.wait_timeout = Duration::from_secs(secs);
    }
    setup::runtime()?.block_on(fetch(&config, key, membership, options, global.quiet))
}

async fn fetch(
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
    let cancel = setup::interrupt_token();

    if !quiet {
        eprintln!("   Waiting for {}", key.directory_key(&config.kernel.name));
    }
    let consumer = Consumer::new(setup::backend(config), node.clone(), options);
    let result = consumer
        .run(key, &config.kernel.name, &config.kernel.symbols, cancel)
        .await;
    node.shutdown().await;
    node.join().await;

    match result {
        Ok(artifact) => {
            println!("{}", artifact.binary_path().display());
            Ok(0)
        }
        Err(e) => {
            eprintln!("error: {e}");
            Ok(1)
        }
    }
}
