//! Scoped acquisition through `ContextManager` and `ModuleManager`.

use llvm_scope::prelude::*;
use llvm_scope::{ProtocolViolation, ResourceKind};
use std::panic::{self, AssertUnwindSafe};

type HeapContextManager = ContextManager<HeapLibrary>;

// =============================================================================
// ContextManager
// =============================================================================

#[test]
fn test_round_trip_scope() {
    let mut manager = HeapContextManager::new();

    let first = manager.enter().unwrap().as_raw().unwrap();
    manager.exit().unwrap();
    assert!(!manager.is_entered());
    assert!(!HeapLibrary::is_live_context(first));

    let second = manager.enter().unwrap().as_raw().unwrap();
    assert_ne!(first, second);
    assert!(HeapLibrary::is_live_context(second));
}

#[test]
fn test_exit_without_enter() {
    let mut manager = HeapContextManager::new();
    let err = manager.exit().unwrap_err();
    assert!(matches!(
        err,
        LifecycleError::Protocol {
            violation: ProtocolViolation::NotEntered,
            ..
        }
    ));
}

#[test]
fn test_double_enter() {
    let mut manager = HeapContextManager::new();
    let first = manager.enter().unwrap().as_raw().unwrap();

    let err = manager.enter().unwrap_err();
    assert_eq!(err.as_protocol_violation(), Some(ProtocolViolation::AlreadyEntered));

    // The first context is still held and usable.
    let ctx = manager.resource_mut().unwrap();
    assert_eq!(ctx.as_raw(), Some(first));
    ctx.set_discard_value_names(true).unwrap();
    assert!(ctx.discard_value_names().unwrap());
}

#[test]
fn test_context_manager_from_factory() {
    let mut manager = llvm_scope::create_context_in::<HeapLibrary>();
    let handle = manager.enter().unwrap().as_raw().unwrap();
    drop(manager);
    assert!(!HeapLibrary::is_live_context(handle));
}

// =============================================================================
// ModuleManager
// =============================================================================

#[test]
fn test_nested_module_in_context() {
    let mut contexts = HeapContextManager::new();
    let ctx = contexts.enter().unwrap();
    let context_handle = ctx.as_raw().unwrap();

    let mut modules = ModuleManager::new("unit", Some(&*ctx));
    let module_handle = modules.enter().unwrap().as_raw();
    modules.exit().unwrap();

    assert!(!HeapLibrary::is_live_module(module_handle));
    assert!(HeapLibrary::is_live_context(context_handle));
    drop(modules);

    contexts.exit().unwrap();
    assert!(!HeapLibrary::is_live_context(context_handle));
    assert_eq!(HeapLibrary::dispose_count(module_handle), 1);
    assert_eq!(HeapLibrary::dispose_count(context_handle), 1);
}

#[test]
fn test_reentry_keeps_context_association() {
    let context = Context::<HeapLibrary>::new().unwrap();
    let mut manager = context.create_module("unit");

    let mut seen = Vec::new();
    for _ in 0..3 {
        let module = manager.enter().unwrap();
        assert_eq!(module.name(), "unit");
        assert_eq!(Some(module.native_context()), context.as_raw());
        seen.push(module.as_raw());
        manager.exit().unwrap();

        let err = manager.exit().unwrap_err();
        assert_eq!(err.as_protocol_violation(), Some(ProtocolViolation::NotEntered));
    }

    assert!(seen.iter().all(|handle| !HeapLibrary::is_live_module(*handle)));
    assert_eq!(HeapLibrary::module_count(context.as_raw().unwrap()), 0);
}

#[test]
fn test_default_context_module() {
    let mut manager = ModuleManager::<HeapLibrary>::new("unit", None);
    let module = manager.enter().unwrap();
    assert!(module.context().is_none());
    assert_eq!(module.native_context(), HeapLibrary::global_context_ref());
    manager.exit().unwrap();
}

#[test]
fn test_module_allocation_failure_keeps_manager_empty() {
    let context = Context::<HeapLibrary>::new().unwrap();
    let mut manager = context.create_module("unit");

    HeapLibrary::inject_allocation_failure(ResourceKind::Module);
    assert!(manager.enter().unwrap_err().is_allocation());
    assert!(!manager.is_entered());
    assert!(manager.enter().is_ok());
}

// =============================================================================
// Guards
// =============================================================================

#[test]
fn test_guard_exits_on_drop() {
    let mut manager = HeapContextManager::new();
    let handle = {
        let guard = manager.scope().unwrap();
        guard.as_raw().unwrap()
    };
    assert!(!manager.is_entered());
    assert!(!HeapLibrary::is_live_context(handle));
}

#[test]
fn test_guard_rejects_double_entry() {
    let mut manager = HeapContextManager::new();
    manager.enter().unwrap();
    assert!(manager.scope().unwrap_err().is_protocol());
    assert!(manager.is_entered());
}

#[test]
fn test_guard_releases_on_panic() {
    let mut contexts = HeapContextManager::new();
    let mut handles = None;

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        let ctx = contexts.scope().unwrap();
        let mut modules = ModuleManager::new("unit", Some(&*ctx));
        let module = modules.scope().unwrap();
        handles = Some((ctx.as_raw().unwrap(), module.as_raw()));
        panic!("compilation failed");
    }));
    assert!(result.is_err());

    let (context_handle, module_handle) = handles.unwrap();
    assert!(!contexts.is_entered());
    assert!(!HeapLibrary::is_live_module(module_handle));
    assert!(!HeapLibrary::is_live_context(context_handle));
    assert_eq!(HeapLibrary::dispose_count(module_handle), 1);
}

#[test]
fn test_with_runs_closure_in_scope() {
    let mut contexts = HeapContextManager::new();
    let layout = contexts
        .with(|ctx| {
            ctx.create_module("local_module").with(|module| {
                module.set_data_layout("e-m:o-i64:64").unwrap();
                module.data_layout()
            })
        })
        .unwrap()
        .unwrap();

    assert_eq!(layout, "e-m:o-i64:64");
    assert!(!contexts.is_entered());
}

#[test]
fn test_guard_close_reports_outcome() {
    let mut manager = HeapContextManager::new();
    let guard = manager.scope().unwrap();
    guard.close().unwrap();
    assert!(!manager.is_entered());
    assert!(manager.exit().unwrap_err().is_protocol());
}

#[test]
fn test_context_taken_out_of_scope_is_reported() {
    let mut contexts = HeapContextManager::new();
    let err = contexts.with(|ctx| ctx.take()).unwrap_err();
    assert!(err.is_invalid_state());
    assert!(!contexts.is_entered());

    let mut manager = HeapContextManager::new();
    let escaped = manager.enter().unwrap().take();
    let handle = escaped.as_raw().unwrap();
    assert!(manager.exit().unwrap_err().is_invalid_state());
    assert!(HeapLibrary::is_live_context(handle));
    drop(escaped);
    assert_eq!(HeapLibrary::dispose_count(handle), 1);
}
