//! Ownership layer for native compiler contexts and modules.
//!
//! Native handles are created, transferred and destroyed exactly once, and a
//! module's handle is always released before the context it lives in. The
//! wrappers are generic over a [`NativeLibrary`] backend: [`HeapLibrary`] runs
//! in-process, `LlvmLibrary` (feature `llvm`) forwards to the LLVM C API.

pub mod context;
pub mod error;
pub mod global;
pub mod manager;
pub mod module;
pub mod native;
pub mod options;
pub mod scope;

pub use context::Context;
pub use error::{LifecycleError, ProtocolViolation, ResourceKind, ScopeResult};
pub use global::{GlobalSlot, global_context, global_context_in};
pub use manager::{ContextManager, ModuleManager};
pub use module::Module;
#[cfg(feature = "llvm")]
pub use native::LlvmLibrary;
pub use native::{DefaultLibrary, HeapHandle, HeapLibrary, NativeLibrary};
pub use options::ContextOptions;
pub use scope::{ScopeExit, ScopeGuard, Scoped};
