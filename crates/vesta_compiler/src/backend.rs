//! The capability boundary between the cache and a compilation toolchain.

use std::path::Path;

use crate::error::BuildFailure;
use crate::request::BuildRequest;

/// A compiled unit whose code can be loaded, released, and loaded again.
///
/// `link` and `fold` are both idempotent: linking a linked artifact and
/// folding a folded one are no-ops. Folding keeps the binary on disk so a
/// later `link` does not need the toolchain.
pub trait Linkable: Send + Sync + 'static {
    /// Loads the binary and checks that every entry symbol resolves.
    fn link(&self) -> Result<(), BuildFailure>;

    /// Releases the loaded code while keeping the binary file.
    fn fold(&self);

    /// Whether the code is currently loaded.
    fn is_linked(&self) -> bool;

    /// The backing binary on disk.
    fn binary_path(&self) -> &Path;

    /// Entry symbols in declaration order.
    fn symbol_names(&self) -> &[String];
}

/// Produces artifacts from build requests.
///
/// Identical requests are assumed to yield functionally equivalent
/// artifacts. Every failure is returned as a [`BuildFailure`].
pub trait Backend: Send + Sync + 'static {
    /// The artifact type this backend produces.
    type Artifact: Linkable;

    /// Compiles a request into a linked artifact.
    fn build(&self, request: &BuildRequest) -> Result<Self::Artifact, BuildFailure>;

    /// Wraps an existing binary (for example one fetched from a peer) as a
    /// linked artifact exposing `symbols`.
    fn load(&self, binary: &Path, symbols: &[String]) -> Result<Self::Artifact, BuildFailure>;
}
