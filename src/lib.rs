//! Scoped ownership of native LLVM contexts and modules.
//!
//! Contexts and modules are acquired either directly, with the caller owning
//! disposal, or through a manager whose enter/exit pair brackets the
//! resource's lifetime.
//!
//! # Example
//!
//! ```
//! use llvm_scope::prelude::*;
//!
//! let mut contexts = llvm_scope::create_context_in::<HeapLibrary>();
//! contexts
//!     .with(|ctx| {
//!         ctx.create_module("local_module")
//!             .with(|module| module.set_target_triple("x86_64-unknown-linux-gnu"))
//!     })
//!     .unwrap()
//!     .unwrap()
//!     .unwrap();
//! ```

pub use llvm_scope_core::{
    Context, ContextManager, ContextOptions, DefaultLibrary, GlobalSlot, HeapHandle, HeapLibrary,
    LifecycleError, Module, ModuleManager, NativeLibrary, ProtocolViolation, ResourceKind,
    ScopeExit, ScopeGuard, ScopeResult, Scoped, global_context, global_context_in,
};

#[cfg(feature = "llvm")]
pub use llvm_scope_core::LlvmLibrary;

pub mod prelude {
    pub use llvm_scope_core::context::*;
    pub use llvm_scope_core::error::{LifecycleError, ScopeResult};
    pub use llvm_scope_core::manager::*;
    pub use llvm_scope_core::module::*;
    pub use llvm_scope_core::native::*;
    pub use llvm_scope_core::options::*;
    pub use llvm_scope_core::scope::*;
    pub use llvm_scope_core::{global_context, global_context_in};
}

/// A context manager for the default backend.
pub fn create_context() -> ContextManager {
    create_context_in::<DefaultLibrary>()
}

/// A context manager for backend `L`.
pub fn create_context_in<L: NativeLibrary>() -> ContextManager<L> {
    tracing::trace!(library = L::NAME, "context manager created");
    ContextManager::new()
}
