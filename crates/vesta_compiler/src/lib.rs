//! Compilation backend capability for specialized kernels.
//!
//! A [`Backend`] turns a [`BuildRequest`] (source files, entry symbols and
//! an ordered option list) into a loadable artifact implementing
//! [`Linkable`]. The [`SystemCompiler`] backend drives an external C/C++
//! toolchain and produces [`SharedObject`] artifacts whose symbols are
//! handed out as typed [`SymbolHandle`]s.

#![warn(missing_docs)]

pub mod backend;
pub mod error;
pub mod request;
pub mod shared_object;
pub mod system;

pub use backend::{Backend, Linkable};
pub use error::BuildFailure;
pub use request::BuildRequest;
pub use shared_object::{SharedObject, SymbolHandle};
pub use system::SystemCompiler;
