//! Scoped acquisition of contexts and modules.
//!
//! Both managers follow the `Empty -> Entered -> Empty` cycle of
//! [`Scoped`]. Dropping a manager that is still entered releases the held
//! resource.
//!
//! # Example
//!
//! ```
//! use llvm_scope_core::{ContextManager, HeapLibrary, ModuleManager, Scoped};
//!
//! let mut contexts = ContextManager::<HeapLibrary>::new();
//! let ctx = contexts.enter().unwrap();
//!
//! let mut modules = ModuleManager::new("unit", Some(&*ctx));
//! let module = modules.enter().unwrap();
//! module.set_data_layout("e-m:e-i64:64").unwrap();
//! modules.exit().unwrap();
//! drop(modules);
//!
//! contexts.exit().unwrap();
//! ```

use crate::context::Context;
use crate::error::{LifecycleError, ScopeResult};
use crate::module::Module;
use crate::native::{DefaultLibrary, NativeLibrary};
use crate::options::ContextOptions;
use crate::scope::{ScopeExit, Scoped};
use std::fmt;

const CONTEXT_MANAGER: &str = "ContextManager";
const MODULE_MANAGER: &str = "ModuleManager";

/// Produces and retires one owned [`Context`] per enter/exit cycle.
///
/// Moving the handle out of an entered context (with [`Context::take`]) makes
/// the following exit fail with `InvalidState`; the manager is empty
/// afterwards and the moved handle belongs to whoever took it.
pub struct ContextManager<L: NativeLibrary = DefaultLibrary> {
    context: Option<Context<L>>,
    options: ContextOptions,
}

impl<L: NativeLibrary> ContextManager<L> {
    pub fn new() -> Self {
        Self::with_options(ContextOptions::default())
    }

    /// A manager whose contexts are configured with `options` on every enter.
    pub fn with_options(options: ContextOptions) -> Self {
        Self {
            context: None,
            options,
        }
    }

    pub fn options(&self) -> &ContextOptions {
        &self.options
    }
}

impl<L: NativeLibrary> Default for ContextManager<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: NativeLibrary> Scoped for ContextManager<L> {
    type Resource = Context<L>;

    #[cfg_attr(feature = "profiling", profiling::function)]
    fn enter(&mut self) -> ScopeResult<&mut Context<L>> {
        if self.context.is_some() {
            return Err(LifecycleError::already_entered(CONTEXT_MANAGER));
        }
        let context = Context::with_options(self.options)?;
        tracing::debug!(library = L::NAME, handle = ?context.as_raw(), "context scope entered");
        Ok(self.context.insert(context))
    }

    #[cfg_attr(feature = "profiling", profiling::function)]
    fn exit_with(&mut self, reason: ScopeExit) -> ScopeResult<()> {
        let context = self
            .context
            .take()
            .ok_or_else(|| LifecycleError::not_entered(CONTEXT_MANAGER))?;
        if !context.has_handle() {
            tracing::warn!(library = L::NAME, ?reason, "context scope exited without its handle");
            return Err(LifecycleError::InvalidState("context was moved out of its scope"));
        }
        tracing::debug!(library = L::NAME, handle = ?context.as_raw(), ?reason, "context scope exited");
        drop(context);
        Ok(())
    }

    fn is_entered(&self) -> bool {
        self.context.is_some()
    }

    fn resource(&self) -> Option<&Context<L>> {
        self.context.as_ref()
    }

    fn resource_mut(&mut self) -> Option<&mut Context<L>> {
        self.context.as_mut()
    }
}

impl<L: NativeLibrary> Drop for ContextManager<L> {
    fn drop(&mut self) {
        if let Some(context) = self.context.take() {
            tracing::debug!(
                library = L::NAME,
                handle = ?context.as_raw(),
                "context manager dropped while entered"
            );
        }
    }
}

impl<L: NativeLibrary> fmt::Debug for ContextManager<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextManager")
            .field("context", &self.context)
            .field("options", &self.options)
            .finish()
    }
}

/// Produces and retires one owned [`Module`] per enter/exit cycle, always
/// with the same name and context.
///
/// The manager only borrows the context; it must be entered and exited
/// within that context's lifetime, which the `'ctx` borrow enforces.
pub struct ModuleManager<'ctx, L: NativeLibrary = DefaultLibrary> {
    name: String,
    context: Option<&'ctx Context<L>>,
    module: Option<Module<'ctx, L>>,
}

impl<'ctx, L: NativeLibrary> ModuleManager<'ctx, L> {
    /// Without a context, modules use the library's default resolution.
    pub fn new(name: impl Into<String>, context: Option<&'ctx Context<L>>) -> Self {
        Self {
            name: name.into(),
            context,
            module: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn context(&self) -> Option<&'ctx Context<L>> {
        self.context
    }
}

impl<'ctx, L: NativeLibrary> Scoped for ModuleManager<'ctx, L> {
    type Resource = Module<'ctx, L>;

    #[cfg_attr(feature = "profiling", profiling::function)]
    fn enter(&mut self) -> ScopeResult<&mut Module<'ctx, L>> {
        if self.module.is_some() {
            return Err(LifecycleError::already_entered(MODULE_MANAGER));
        }
        let module = Module::create(&self.name, self.context)?;
        tracing::debug!(library = L::NAME, handle = ?module.as_raw(), module = %self.name, "module scope entered");
        Ok(self.module.insert(module))
    }

    #[cfg_attr(feature = "profiling", profiling::function)]
    fn exit_with(&mut self, reason: ScopeExit) -> ScopeResult<()> {
        let module = self
            .module
            .take()
            .ok_or_else(|| LifecycleError::not_entered(MODULE_MANAGER))?;
        tracing::debug!(library = L::NAME, handle = ?module.as_raw(), ?reason, "module scope exited");
        drop(module);
        Ok(())
    }

    fn is_entered(&self) -> bool {
        self.module.is_some()
    }

    fn resource(&self) -> Option<&Module<'ctx, L>> {
        self.module.as_ref()
    }

    fn resource_mut(&mut self) -> Option<&mut Module<'ctx, L>> {
        self.module.as_mut()
    }
}

impl<L: NativeLibrary> Drop for ModuleManager<'_, L> {
    fn drop(&mut self) {
        if let Some(module) = self.module.take() {
            tracing::debug!(
                library = L::NAME,
                handle = ?module.as_raw(),
                "module manager dropped while entered"
            );
        }
    }
}

impl<L: NativeLibrary> fmt::Debug for ModuleManager<'_, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleManager")
            .field("name", &self.name)
            .field("context", &self.context.and_then(Context::as_raw))
            .field("module", &self.module)
            .finish()
    }
}
