//! Access to the process-wide context.
//!
//! The global context belongs to the native library. This layer hands out a
//! shared, non-owning [`Context`] view of it and never disposes the handle:
//! dropping or reassigning a global view releases nothing. The view is
//! created on first access behind a [`OnceLock`], so concurrent first calls
//! agree on a single instance.

use crate::context::Context;
use crate::native::{DefaultLibrary, NativeLibrary};
use std::sync::OnceLock;

struct SharedContext<L: NativeLibrary>(Context<L>);

// The view never disposes its handle and only exposes `&Context`. Backends
// serialize native calls that touch the global context (see `NativeLibrary`).
unsafe impl<L: NativeLibrary> Send for SharedContext<L> {}
unsafe impl<L: NativeLibrary> Sync for SharedContext<L> {}

/// One-time-initialised storage for a backend's global context view.
pub struct GlobalSlot<L: NativeLibrary> {
    cell: OnceLock<SharedContext<L>>,
}

impl<L: NativeLibrary> GlobalSlot<L> {
    pub const fn new() -> Self {
        Self {
            cell: OnceLock::new(),
        }
    }

    fn get(&'static self) -> &'static Context<L> {
        &self
            .cell
            .get_or_init(|| {
                tracing::debug!(library = L::NAME, "initializing global context view");
                SharedContext(Context::global())
            })
            .0
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.get().is_some()
    }
}

impl<L: NativeLibrary> Default for GlobalSlot<L> {
    fn default() -> Self {
        Self::new()
    }
}

/// The process-wide context of backend `L`.
///
/// Every call returns the same reference. The underlying handle is never torn
/// down by this crate; its lifetime ends with the native library.
pub fn global_context_in<L: NativeLibrary>() -> &'static Context<L> {
    L::global_slot().get()
}

/// The process-wide context of the default backend.
pub fn global_context() -> &'static Context<DefaultLibrary> {
    global_context_in::<DefaultLibrary>()
}
