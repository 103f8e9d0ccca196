//! The seam between the ownership layer and the native library that hands
//! out context and module handles.
//!
//! Every backend exposes the same small C-level contract: allocation calls
//! that either return a handle or signal failure, disposal calls, and a few
//! property accessors. Handles are opaque here; the wrappers in
//! [`crate::context`] and [`crate::module`] only hold them and pass them back.

mod heap;
#[cfg(feature = "llvm")]
mod llvm;

pub use heap::{HeapHandle, HeapLibrary};
#[cfg(feature = "llvm")]
pub use llvm::LlvmLibrary;

use crate::global::GlobalSlot;
use std::ffi::CStr;
use std::fmt::Debug;

/// The backend used when a wrapper type does not name one.
#[cfg(feature = "llvm")]
pub type DefaultLibrary = LlvmLibrary;

/// The backend used when a wrapper type does not name one.
#[cfg(not(feature = "llvm"))]
pub type DefaultLibrary = HeapLibrary;

/// A native compiler library that owns contexts and modules.
///
/// All functions are associated functions: the library is process-wide
/// state, not a value.
///
/// # Safety
///
/// The `unsafe` functions require a handle previously returned by the same
/// backend and not yet disposed (the global context handle is never
/// disposed).
///
/// The global context is reachable from every thread through
/// [`global_context_in`](crate::global_context_in). Implementations must
/// serialize every call that reads or mutates it, including creating,
/// cloning and disposing modules that live in it.
pub trait NativeLibrary: Sized + 'static {
    type ContextRef: Copy + Eq + Debug;
    type ModuleRef: Copy + Eq + Debug;

    /// Short name used in log events.
    const NAME: &'static str;

    /// Allocate a new, independent context. `None` signals allocation failure.
    fn create_context() -> Option<Self::ContextRef>;

    /// The process-wide context. Returns the same handle on every call.
    fn global_context_ref() -> Self::ContextRef;

    /// One-time-initialised slot holding this backend's global wrapper.
    fn global_slot() -> &'static GlobalSlot<Self>;

    /// Whether `context` still refers to a live native context.
    ///
    /// Backends that cannot tell report `true`.
    fn context_is_live(_context: Self::ContextRef) -> bool {
        true
    }

    unsafe fn dispose_context(context: Self::ContextRef);

    unsafe fn discard_value_names(context: Self::ContextRef) -> bool;

    unsafe fn set_discard_value_names(context: Self::ContextRef, discard: bool);

    /// Allocate a module named `name`. Without a context the library's
    /// default resolution applies (the global context for LLVM).
    unsafe fn create_module(
        name: &CStr,
        context: Option<Self::ContextRef>,
    ) -> Option<Self::ModuleRef>;

    unsafe fn dispose_module(module: Self::ModuleRef);

    unsafe fn module_context(module: Self::ModuleRef) -> Self::ContextRef;

    unsafe fn module_identifier(module: Self::ModuleRef) -> String;

    unsafe fn set_module_identifier(module: Self::ModuleRef, identifier: &CStr);

    unsafe fn source_file_name(module: Self::ModuleRef) -> String;

    unsafe fn set_source_file_name(module: Self::ModuleRef, name: &CStr);

    unsafe fn data_layout(module: Self::ModuleRef) -> String;

    unsafe fn set_data_layout(module: Self::ModuleRef, layout: &CStr);

    unsafe fn target_triple(module: Self::ModuleRef) -> String;

    unsafe fn set_target_triple(module: Self::ModuleRef, triple: &CStr);

    unsafe fn clone_module(module: Self::ModuleRef) -> Option<Self::ModuleRef>;
}
