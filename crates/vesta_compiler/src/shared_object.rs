//! Shared-library artifacts loaded through the platform dynamic loader.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use libloading::Library;
use parking_lot::RwLock;

use crate::backend::Linkable;
use crate::error::BuildFailure;

/// A shared library on disk plus its currently loaded image, if any.
pub struct SharedObject {
    binary: PathBuf,
    symbols: Vec<String>,
    library: RwLock<Option<Arc<Library>>>,
}

impl SharedObject {
    /// Opens `binary` and verifies that each of `symbols` resolves.
    pub fn open(binary: impl Into<PathBuf>, symbols: Vec<String>) -> Result<Self, BuildFailure> {
        let object = Self {
            binary: binary.into(),
            symbols,
            library: RwLock::new(None),
        };
        object.link()?;
        Ok(object)
    }

    /// Resolves the entry symbol at `index` as a value of type `F`.
    ///
    /// Returns `None` if the artifact is folded, `index` is out of range, or
    /// the loader cannot find the symbol.
    ///
    /// # Safety
    ///
    /// `F` must match the actual type of the symbol, normally an
    /// `extern "C" fn` pointer with the kernel's exact signature.
    pub unsafe fn symbol<F: Copy>(&self, index: usize) -> Option<SymbolHandle<F>> {
        let name = self.symbols.get(index)?;
        // SAFETY: forwarded from the caller.
        unsafe { self.symbol_named(name) }
    }

    /// Resolves a symbol by name as a value of type `F`.
    ///
    /// # Safety
    ///
    /// Same contract as [`SharedObject::symbol`].
    pub unsafe fn symbol_named<F: Copy>(&self, name: &str) -> Option<SymbolHandle<F>> {
        let library = self.library.read().clone()?;
        let value = {
            // SAFETY: the caller guarantees `F` is the symbol's real type.
            let symbol = unsafe { library.get::<F>(name.as_bytes()) }.ok()?;
            *symbol
        };
        Some(SymbolHandle {
            value,
            _library: library,
        })
    }
}

impl Linkable for SharedObject {
    fn link(&self) -> Result<(), BuildFailure> {
        let mut slot = self.library.write();
        if slot.is_some() {
            return Ok(());
        }

        // SAFETY: the binary was produced by a trusted backend for this
        // process; running its initializers is part of loading a kernel.
        let library = unsafe { Library::new(&self.binary) }.map_err(|e| BuildFailure::Load {
            path: self.binary.clone(),
            reason: e.to_string(),
        })?;

        for name in &self.symbols {
            // SAFETY: the pointer is only checked for presence, never used.
            let found = unsafe { library.get::<*const ()>(name.as_bytes()) }.is_ok();
            if !found {
                return Err(BuildFailure::UnresolvedSymbol {
                    symbol: name.clone(),
                    path: self.binary.clone(),
                });
            }
        }

        tracing::debug!(binary = %self.binary.display(), "linked shared object");
        *slot = Some(Arc::new(library));
        Ok(())
    }

    fn fold(&self) {
        if self.library.write().take().is_some() {
            tracing::debug!(binary = %self.binary.display(), "folded shared object");
        }
    }

    fn is_linked(&self) -> bool {
        self.library.read().is_some()
    }

    fn binary_path(&self) -> &Path {
        &self.binary
    }

    fn symbol_names(&self) -> &[String] {
        &self.symbols
    }
}

impl std::fmt::Debug for SharedObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedObject")
            .field("binary", &self.binary)
            .field("symbols", &self.symbols)
            .field("linked", &self.is_linked())
            .finish()
    }
}

/// A resolved symbol that keeps its library image loaded.
///
/// Folding the owning artifact does not unload code while a handle is
/// alive; the image is released when the last handle is dropped.
pub struct SymbolHandle<F> {
    value: F,
    _library: Arc<Library>,
}

impl<F: Copy> SymbolHandle<F> {
    /// The resolved value, typically a function pointer.
    pub fn get(&self) -> F {
        self.value
    }
}
