//! LLVM C API backend.
//!
//! `LLVMContext` is not thread-safe, but the global view is shared by every
//! thread. Calls that touch the global context (module creation, disposal
//! and cloning inside it, and its own properties) run under one process-wide
//! lock. Owned contexts and their modules are `!Send` and need none.

use super::NativeLibrary;
use crate::global::GlobalSlot;
use llvm_sys::core::{
    LLVMCloneModule, LLVMContextCreate, LLVMContextDispose, LLVMContextSetDiscardValueNames,
    LLVMContextShouldDiscardValueNames, LLVMDisposeModule, LLVMGetDataLayoutStr,
    LLVMGetGlobalContext, LLVMGetModuleContext, LLVMGetModuleIdentifier, LLVMGetSourceFileName,
    LLVMGetTarget, LLVMModuleCreateWithName, LLVMModuleCreateWithNameInContext,
    LLVMSetDataLayout, LLVMSetModuleIdentifier, LLVMSetSourceFileName, LLVMSetTarget,
};
use llvm_sys::prelude::{LLVMContextRef, LLVMModuleRef};
use std::ffi::{CStr, c_char};
use std::slice;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Held while a native call touches the global context.
fn global_lock(context: LLVMContextRef) -> Option<MutexGuard<'static, ()>> {
    static GLOBAL_CONTEXT: Mutex<()> = Mutex::new(());
    (context == unsafe { LLVMGetGlobalContext() })
        .then(|| GLOBAL_CONTEXT.lock().unwrap_or_else(PoisonError::into_inner))
}

/// Copy a string the library owns; it is only valid until the next mutation.
unsafe fn copy_c_str(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
}

unsafe fn copy_sized(ptr: *const c_char, len: usize) -> String {
    if ptr.is_null() {
        return String::new();
    }
    let bytes = unsafe { slice::from_raw_parts(ptr.cast::<u8>(), len) };
    String::from_utf8_lossy(bytes).into_owned()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LlvmLibrary;

impl NativeLibrary for LlvmLibrary {
    type ContextRef = LLVMContextRef;
    type ModuleRef = LLVMModuleRef;

    const NAME: &'static str = "llvm";

    fn create_context() -> Option<LLVMContextRef> {
        let context = unsafe { LLVMContextCreate() };
        (!context.is_null()).then_some(context)
    }

    fn global_context_ref() -> LLVMContextRef {
        unsafe { LLVMGetGlobalContext() }
    }

    fn global_slot() -> &'static GlobalSlot<Self> {
        static SLOT: GlobalSlot<LlvmLibrary> = GlobalSlot::new();
        &SLOT
    }

    unsafe fn dispose_context(context: LLVMContextRef) {
        unsafe { LLVMContextDispose(context) }
    }

    unsafe fn discard_value_names(context: LLVMContextRef) -> bool {
        let _guard = global_lock(context);
        unsafe { LLVMContextShouldDiscardValueNames(context) != 0 }
    }

    unsafe fn set_discard_value_names(context: LLVMContextRef, discard: bool) {
        let _guard = global_lock(context);
        unsafe { LLVMContextSetDiscardValueNames(context, discard as i32) }
    }

    unsafe fn create_module(name: &CStr, context: Option<LLVMContextRef>) -> Option<LLVMModuleRef> {
        let _guard = global_lock(context.unwrap_or_else(Self::global_context_ref));
        let module = unsafe {
            match context {
                Some(context) => LLVMModuleCreateWithNameInContext(name.as_ptr(), context),
                None => LLVMModuleCreateWithName(name.as_ptr()),
            }
        };
        (!module.is_null()).then_some(module)
    }

    unsafe fn dispose_module(module: LLVMModuleRef) {
        unsafe {
            let _guard = global_lock(LLVMGetModuleContext(module));
            LLVMDisposeModule(module)
        }
    }

    unsafe fn module_context(module: LLVMModuleRef) -> LLVMContextRef {
        unsafe { LLVMGetModuleContext(module) }
    }

    unsafe fn module_identifier(module: LLVMModuleRef) -> String {
        let mut len = 0usize;
        unsafe {
            let ptr = LLVMGetModuleIdentifier(module, &mut len);
            copy_sized(ptr, len)
        }
    }

    unsafe fn set_module_identifier(module: LLVMModuleRef, identifier: &CStr) {
        let len = identifier.to_bytes().len();
        unsafe { LLVMSetModuleIdentifier(module, identifier.as_ptr(), len) }
    }

    unsafe fn source_file_name(module: LLVMModuleRef) -> String {
        let mut len = 0usize;
        unsafe {
            let ptr = LLVMGetSourceFileName(module, &mut len);
            copy_sized(ptr, len)
        }
    }

    unsafe fn set_source_file_name(module: LLVMModuleRef, name: &CStr) {
        let len = name.to_bytes().len();
        unsafe { LLVMSetSourceFileName(module, name.as_ptr(), len) }
    }

    unsafe fn data_layout(module: LLVMModuleRef) -> String {
        unsafe { copy_c_str(LLVMGetDataLayoutStr(module)) }
    }

    unsafe fn set_data_layout(module: LLVMModuleRef, layout: &CStr) {
        unsafe { LLVMSetDataLayout(module, layout.as_ptr()) }
    }

    unsafe fn target_triple(module: LLVMModuleRef) -> String {
        unsafe { copy_c_str(LLVMGetTarget(module)) }
    }

    unsafe fn set_target_triple(module: LLVMModuleRef, triple: &CStr) {
        unsafe { LLVMSetTarget(module, triple.as_ptr()) }
    }

    unsafe fn clone_module(module: LLVMModuleRef) -> Option<LLVMModuleRef> {
        let cloned = unsafe {
            let _guard = global_lock(LLVMGetModuleContext(module));
            LLVMCloneModule(module)
        };
        (!cloned.is_null()).then_some(cloned)
    }
}
