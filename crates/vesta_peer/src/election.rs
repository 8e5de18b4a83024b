//! Single-producer election through the directory itself.
//!
//! Claims are grouped into generations. Nodes claim the current generation
//! under `<dkey>.producer.<n>` and the first claim wins. When the winner's
//! producer stops, or a waiting node gives up on it, the generation is
//! retired under `<dkey>.epoch` and the next resolve, on any node, elects a
//! fresh producer. Endpoints that stopped serving are recorded under
//! `<dkey>.closed` so consumers skip them.

use vesta_directory::{Directory, DirectoryError};

/// What a node does for one key after election.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Build, serve and publish the binary, and also consume it.
    Producer,
    /// Only wait for another node's publication.
    Consumer,
}

/// The outcome of [`elect`]: a role within one claim generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Election {
    /// This node's role.
    pub role: Role,
    /// The generation the role applies to.
    pub generation: u64,
}

/// The directory key holding producer claims for one generation.
pub fn producer_lock_key(directory_key: &str, generation: u64) -> String {
    format!("{directory_key}.producer.{generation}")
}

/// The directory key holding retired generation numbers.
pub fn epoch_key(directory_key: &str) -> String {
    format!("{directory_key}.epoch")
}

/// The directory key holding endpoints that no longer serve.
pub fn closed_key(directory_key: &str) -> String {
    format!("{directory_key}.closed")
}

/// The first generation not yet retired.
pub async fn current_generation(
    directory: &dyn Directory,
    directory_key: &str,
) -> Result<u64, DirectoryError> {
    let retired = directory.get(&epoch_key(directory_key)).await?;
    Ok(retired
        .iter()
        .filter_map(|value| value.parse::<u64>().ok())
        .max()
        .map_or(0, |last| last + 1))
}

/// Claims the producer role for `directory_key`.
///
/// The node publishes its id in the current generation and reads the
/// claims back; the first stored claim wins. A loser whose generation was
/// retired while it claimed tries the next one.
pub async fn elect(
    directory: &dyn Directory,
    directory_key: &str,
    node_id: &str,
) -> Result<Election, DirectoryError> {
    let mut generation = current_generation(directory, directory_key).await?;
    loop {
        let lock_key = producer_lock_key(directory_key, generation);
        directory.put(&lock_key, node_id).await?;
        let claims = directory.get(&lock_key).await?;
        let role = match claims.first() {
            Some(winner) if winner != node_id => Role::Consumer,
            _ => Role::Producer,
        };
        if role == Role::Consumer {
            let now = current_generation(directory, directory_key).await?;
            if now > generation {
                generation = now;
                continue;
            }
        }
        tracing::debug!(
            key = %directory_key,
            node = %node_id,
            ?role,
            generation,
            claims = claims.len(),
            "producer election"
        );
        return Ok(Election { role, generation });
    }
}

/// Records that `location` stopped serving.
pub async fn close_location(
    directory: &dyn Directory,
    directory_key: &str,
    location: &str,
) -> Result<(), DirectoryError> {
    directory.put(&closed_key(directory_key), location).await
}

/// Endpoints recorded as no longer serving.
pub async fn closed_locations(
    directory: &dyn Directory,
    directory_key: &str,
) -> Result<Vec<String>, DirectoryError> {
    directory.get(&closed_key(directory_key)).await
}

/// Ends `generation`, so the next election starts a new one.
///
/// Callers close the generation's endpoint first: a node electing in the
/// next generation must already see it as closed.
pub async fn retire(
    directory: &dyn Directory,
    directory_key: &str,
    generation: u64,
) -> Result<(), DirectoryError> {
    tracing::debug!(key = %directory_key, generation, "retiring producer generation");
    directory
        .put(&epoch_key(directory_key), &generation.to_string())
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use vesta_directory::MemoryNode;

    #[tokio::test]
    async fn first_claim_wins() {
        let a = MemoryNode::bootstrap("a");
        let b = MemoryNode::join("b", &a);
        let first = elect(&a, "vc_sort_0_256", "a").await.unwrap();
        let second = elect(&b, "vc_sort_0_256", "b").await.unwrap();
        assert_eq!(first, Election { role: Role::Producer, generation: 0 });
        assert_eq!(second, Election { role: Role::Consumer, generation: 0 });
    }

    #[tokio::test]
    async fn repeated_claim_keeps_role() {
        let a = MemoryNode::bootstrap("a");
        assert_eq!(elect(&a, "k", "a").await.unwrap().role, Role::Producer);
        assert_eq!(elect(&a, "k", "a").await.unwrap().role, Role::Producer);
    }

    #[tokio::test]
    async fn keys_elect_independently() {
        let a = MemoryNode::bootstrap("a");
        let b = MemoryNode::join("b", &a);
        assert_eq!(elect(&a, "vc_sort_0_256", "a").await.unwrap().role, Role::Producer);
        assert_eq!(elect(&b, "vc_sort_0_512", "b").await.unwrap().role, Role::Producer);
    }

    #[tokio::test]
    async fn retired_generation_elects_again() {
        let a = MemoryNode::bootstrap("a");
        let b = MemoryNode::join("b", &a);
        assert_eq!(elect(&a, "k", "a").await.unwrap().role, Role::Producer);
        retire(&a, "k", 0).await.unwrap();

        let next = elect(&b, "k", "b").await.unwrap();
        assert_eq!(next, Election { role: Role::Producer, generation: 1 });
        assert_eq!(elect(&a, "k", "a").await.unwrap().role, Role::Consumer);
    }

    #[tokio::test]
    async fn generation_follows_highest_retired() {
        let a = MemoryNode::bootstrap("a");
        assert_eq!(current_generation(&a, "k").await.unwrap(), 0);
        retire(&a, "k", 3).await.unwrap();
        retire(&a, "k", 1).await.unwrap();
        assert_eq!(current_generation(&a, "k").await.unwrap(), 4);
    }

    #[tokio::test]
    async fn bookkeeping_keys_do_not_collide_with_publication() {
        let a = MemoryNode::bootstrap("a");
        elect(&a, "k", "a").await.unwrap();
        close_location(&a, "k", "127.0.0.1:9000").await.unwrap();
        retire(&a, "k", 0).await.unwrap();
        assert!(a.get("k").await.unwrap().is_empty());
        assert_eq!(a.get(&producer_lock_key("k", 0)).await.unwrap(), vec!["a"]);
        assert_eq!(closed_locations(&a, "k").await.unwrap(), vec!["127.0.0.1:9000"]);
    }

    #[tokio::test]
    async fn election_after_shutdown_fails() {
        let a = MemoryNode::bootstrap("a");
        a.shutdown().await;
        assert!(elect(&a, "k", "a").await.is_err());
    }
}
