//! Compilation units.
//!
//! A [`Module`] exclusively owns its native handle and borrows the
//! [`Context`] it was created in, so the compiler rejects any program in
//! which the module could outlive its context:
//!
//! ```compile_fail
//! use llvm_scope_core::{Context, HeapLibrary, Module};
//!
//! let module = {
//!     let ctx = Context::<HeapLibrary>::new().unwrap();
//!     Module::create("unit", Some(&ctx)).unwrap()
//! };
//! ```
//!
//! The context cannot be moved out from under a live module either:
//!
//! ```compile_fail
//! use llvm_scope_core::{Context, HeapLibrary};
//!
//! let mut ctx = Context::<HeapLibrary>::new().unwrap();
//! let module = ctx.module("unit").unwrap();
//! let moved = ctx.take();
//! drop(module);
//! ```
//!
//! Modules cannot be copied; [`Module::try_clone`] allocates a new native
//! module instead:
//!
//! ```compile_fail
//! use llvm_scope_core::{HeapLibrary, Module};
//!
//! fn assert_clone<T: Clone>() {}
//! assert_clone::<Module<'static, HeapLibrary>>();
//! ```

use crate::context::Context;
use crate::error::{LifecycleError, ResourceKind, ScopeResult};
use crate::native::{DefaultLibrary, NativeLibrary};
use std::ffi::CString;
use std::fmt;

pub struct Module<'ctx, L: NativeLibrary = DefaultLibrary> {
    handle: L::ModuleRef,
    name: String,
    context: Option<&'ctx Context<L>>,
}

impl<'ctx, L: NativeLibrary> Module<'ctx, L> {
    /// Allocate a module named `name` inside `context`, or inside the
    /// library's default context when `context` is `None`.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn create(name: &str, context: Option<&'ctx Context<L>>) -> ScopeResult<Self> {
        let c_name = CString::new(name)?;
        let native_context = context.map(Context::raw).transpose()?;
        let handle = unsafe { L::create_module(&c_name, native_context) }
            .ok_or(LifecycleError::Allocation(ResourceKind::Module))?;
        tracing::trace!(
            library = L::NAME,
            ?handle,
            module = name,
            context = ?native_context,
            "module created"
        );
        Ok(Self {
            handle,
            name: name.to_owned(),
            context,
        })
    }

    /// The name the module was created with.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The context passed at creation, if any.
    pub fn context(&self) -> Option<&'ctx Context<L>> {
        self.context
    }

    /// The native context the module actually lives in. For modules created
    /// without a context this is the library's default.
    pub fn native_context(&self) -> L::ContextRef {
        unsafe { L::module_context(self.handle) }
    }

    pub fn as_raw(&self) -> L::ModuleRef {
        self.handle
    }

    pub fn identifier(&self) -> String {
        unsafe { L::module_identifier(self.handle) }
    }

    pub fn set_identifier(&mut self, identifier: &str) -> ScopeResult<()> {
        let identifier = CString::new(identifier)?;
        unsafe { L::set_module_identifier(self.handle, &identifier) };
        Ok(())
    }

    pub fn source_file_name(&self) -> String {
        unsafe { L::source_file_name(self.handle) }
    }

    pub fn set_source_file_name(&mut self, name: &str) -> ScopeResult<()> {
        let name = CString::new(name)?;
        unsafe { L::set_source_file_name(self.handle, &name) };
        Ok(())
    }

    /// The data layout string, copied out of the native module.
    pub fn data_layout(&self) -> String {
        unsafe { L::data_layout(self.handle) }
    }

    pub fn set_data_layout(&mut self, layout: &str) -> ScopeResult<()> {
        let layout = CString::new(layout)?;
        unsafe { L::set_data_layout(self.handle, &layout) };
        Ok(())
    }

    pub fn target_triple(&self) -> String {
        unsafe { L::target_triple(self.handle) }
    }

    pub fn set_target_triple(&mut self, triple: &str) -> ScopeResult<()> {
        let triple = CString::new(triple)?;
        unsafe { L::set_target_triple(self.handle, &triple) };
        Ok(())
    }

    /// Duplicate the native module into a new, separately owned `Module` in
    /// the same context.
    pub fn try_clone(&self) -> ScopeResult<Module<'ctx, L>> {
        let handle = unsafe { L::clone_module(self.handle) }
            .ok_or(LifecycleError::Allocation(ResourceKind::Module))?;
        tracing::trace!(library = L::NAME, source = ?self.handle, ?handle, "module cloned");
        Ok(Module {
            handle,
            name: self.name.clone(),
            context: self.context,
        })
    }
}

impl<L: NativeLibrary> Drop for Module<'_, L> {
    fn drop(&mut self) {
        tracing::trace!(library = L::NAME, handle = ?self.handle, module = %self.name, "module disposed");
        unsafe { L::dispose_module(self.handle) };
    }
}

impl<L: NativeLibrary> fmt::Debug for Module<'_, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("library", &L::NAME)
            .field("handle", &self.handle)
            .field("name", &self.name)
            .field("context", &self.context.and_then(Context::as_raw))
            .finish()
    }
}
