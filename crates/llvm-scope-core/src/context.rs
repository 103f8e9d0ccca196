//! Owned and global compilation contexts.
//!
//! A [`Context`] either exclusively owns a native context handle, which it
//! disposes exactly once when dropped, or is a view of the process-wide
//! global context, which it never disposes.
//!
//! # Example
//!
//! ```
//! use llvm_scope_core::{Context, HeapLibrary};
//!
//! let mut ctx = Context::<HeapLibrary>::new().unwrap();
//! ctx.set_discard_value_names(true).unwrap();
//! assert!(ctx.discard_value_names().unwrap());
//!
//! let moved = ctx.take();
//! assert!(!ctx.has_handle());
//! assert!(moved.has_handle());
//! ```

use crate::error::{LifecycleError, ResourceKind, ScopeResult};
use crate::manager::ModuleManager;
use crate::module::Module;
use crate::native::{DefaultLibrary, NativeLibrary};
use crate::options::ContextOptions;
use std::fmt;
use std::marker::PhantomData;

pub struct Context<L: NativeLibrary = DefaultLibrary> {
    handle: Option<L::ContextRef>,
    global: bool,
    _library: PhantomData<fn() -> L>,
}

impl<L: NativeLibrary> Context<L> {
    /// Create a context. With `global` set this binds to the process-wide
    /// context and never allocates; otherwise a new native context is
    /// allocated and owned.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn create(global: bool) -> ScopeResult<Self> {
        if global {
            return Ok(Self::global());
        }
        let handle = L::create_context().ok_or(LifecycleError::Allocation(ResourceKind::Context))?;
        tracing::trace!(library = L::NAME, ?handle, "context created");
        Ok(Self {
            handle: Some(handle),
            global: false,
            _library: PhantomData,
        })
    }

    pub fn new() -> ScopeResult<Self> {
        Self::create(false)
    }

    /// A non-owning view of the process-wide context.
    pub fn global() -> Self {
        let handle = L::global_context_ref();
        tracing::trace!(library = L::NAME, ?handle, "global context bound");
        Self {
            handle: Some(handle),
            global: true,
            _library: PhantomData,
        }
    }

    /// Allocate a context and apply `options` to it.
    pub fn with_options(options: ContextOptions) -> ScopeResult<Self> {
        let mut context = Self::new()?;
        context.apply(options)?;
        Ok(context)
    }

    pub(crate) fn apply(&mut self, options: ContextOptions) -> ScopeResult<()> {
        if let Some(discard) = options.discard_value_names {
            self.set_discard_value_names(discard)?;
        }
        Ok(())
    }

    pub fn is_global(&self) -> bool {
        self.global
    }

    /// False once the handle has been moved out with [`Context::take`].
    pub fn has_handle(&self) -> bool {
        self.handle.is_some()
    }

    pub fn as_raw(&self) -> Option<L::ContextRef> {
        self.handle
    }

    /// The live native handle, or `InvalidState` for a moved-from or
    /// already-disposed context.
    pub(crate) fn raw(&self) -> ScopeResult<L::ContextRef> {
        let handle = self
            .handle
            .ok_or(LifecycleError::InvalidState("context has no native handle"))?;
        if !L::context_is_live(handle) {
            return Err(LifecycleError::InvalidState("context handle is no longer live"));
        }
        Ok(handle)
    }

    /// Whether only global value names are kept in the IR.
    pub fn discard_value_names(&self) -> ScopeResult<bool> {
        let handle = self.raw()?;
        Ok(unsafe { L::discard_value_names(handle) })
    }

    pub fn set_discard_value_names(&mut self, discard: bool) -> ScopeResult<()> {
        let handle = self.raw()?;
        unsafe { L::set_discard_value_names(handle, discard) };
        Ok(())
    }

    /// Move the handle and global flag out, leaving `self` empty.
    pub fn take(&mut self) -> Self {
        tracing::trace!(library = L::NAME, handle = ?self.handle, "context moved");
        Self {
            handle: self.handle.take(),
            global: std::mem::take(&mut self.global),
            _library: PhantomData,
        }
    }

    /// Release the currently owned handle, then adopt `other`'s.
    pub fn assign(&mut self, mut other: Self) {
        if self.handle.is_some() && self.handle == other.handle {
            return;
        }
        self.dispose();
        self.handle = other.handle.take();
        self.global = std::mem::take(&mut other.global);
    }

    /// A manager that creates modules named `name` inside this context.
    pub fn create_module(&self, name: impl Into<String>) -> ModuleManager<'_, L> {
        ModuleManager::new(name, Some(self))
    }

    /// Create a module directly, owned by the caller.
    pub fn module(&self, name: &str) -> ScopeResult<Module<'_, L>> {
        Module::create(name, Some(self))
    }

    fn dispose(&mut self) {
        let global = std::mem::take(&mut self.global);
        let Some(handle) = self.handle.take() else {
            return;
        };
        if global {
            tracing::trace!(library = L::NAME, ?handle, "global context view released");
            return;
        }
        tracing::trace!(library = L::NAME, ?handle, "context disposed");
        unsafe { L::dispose_context(handle) };
    }
}

impl<L: NativeLibrary> Drop for Context<L> {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl<L: NativeLibrary> PartialEq for Context<L> {
    fn eq(&self, other: &Self) -> bool {
        self.handle == other.handle
    }
}

impl<L: NativeLibrary> fmt::Debug for Context<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("library", &L::NAME)
            .field("handle", &self.handle)
            .field("global", &self.global)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::HeapLibrary;

    type HeapContext = Context<HeapLibrary>;

    #[test]
    fn drop_disposes_exactly_once() {
        let context = HeapContext::new().unwrap();
        let handle = context.as_raw().unwrap();
        assert!(HeapLibrary::is_live_context(handle));

        drop(context);
        assert!(!HeapLibrary::is_live_context(handle));
        assert_eq!(HeapLibrary::dispose_count(handle), 1);
    }

    #[test]
    fn take_transfers_ownership() {
        let mut source = HeapContext::new().unwrap();
        let handle = source.as_raw().unwrap();

        let target = source.take();
        assert!(!source.has_handle());
        assert!(!source.is_global());
        assert_eq!(target.as_raw(), Some(handle));

        drop(source);
        assert!(HeapLibrary::is_live_context(handle));
        assert_eq!(HeapLibrary::dispose_count(handle), 0);

        drop(target);
        assert_eq!(HeapLibrary::dispose_count(handle), 1);
    }

    #[test]
    fn moved_from_context_rejects_property_access() {
        let mut source = HeapContext::new().unwrap();
        let _target = source.take();

        assert!(source.discard_value_names().unwrap_err().is_invalid_state());
        assert!(
            source
                .set_discard_value_names(true)
                .unwrap_err()
                .is_invalid_state()
        );
    }

    #[test]
    fn assign_releases_previous_handle() {
        let mut first = HeapContext::new().unwrap();
        let second = HeapContext::new().unwrap();
        let old = first.as_raw().unwrap();
        let new = second.as_raw().unwrap();

        first.assign(second);
        assert!(!HeapLibrary::is_live_context(old));
        assert_eq!(first.as_raw(), Some(new));
        assert!(HeapLibrary::is_live_context(new));
    }

    #[test]
    fn assigning_over_global_view_keeps_global_alive() {
        let mut view = HeapContext::global();
        let global = view.as_raw().unwrap();

        view.assign(HeapContext::new().unwrap());
        assert!(!view.is_global());
        assert!(HeapLibrary::is_live_context(global));
    }

    #[test]
    fn global_view_is_never_disposed() {
        let view = HeapContext::create(true).unwrap();
        let handle = view.as_raw().unwrap();
        assert!(view.is_global());

        drop(view);
        assert!(HeapLibrary::is_live_context(handle));
        assert_eq!(HeapLibrary::dispose_count(handle), 0);
    }

    #[test]
    fn discard_value_names_round_trip() {
        let mut context = HeapContext::new().unwrap();
        assert!(!context.discard_value_names().unwrap());
        context.set_discard_value_names(true).unwrap();
        assert!(context.discard_value_names().unwrap());
    }

    #[test]
    fn options_are_applied() {
        let context =
            HeapContext::with_options(ContextOptions::new().discard_value_names(true)).unwrap();
        assert!(context.discard_value_names().unwrap());
    }

    #[test]
    fn allocation_failure_surfaces() {
        HeapLibrary::inject_allocation_failure(ResourceKind::Context);
        let err = HeapContext::new().unwrap_err();
        assert_eq!(err, LifecycleError::Allocation(ResourceKind::Context));
    }
}
