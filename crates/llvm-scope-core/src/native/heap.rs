//! In-process backend built on a generational arena.
//!
//! `HeapLibrary` honours the same contract as the LLVM backend without
//! linking LLVM: handles are generational indices, so a disposed handle is
//! never confused with a later allocation that reuses its slot. Disposing a
//! context also releases every module still created inside it, as LLVM
//! does.
//!
//! With the `testing` feature the arena also keeps a per-handle dispose
//! ledger and accepts injected allocation failures. The ledger grows with
//! every dispose, so it is not built otherwise.

use super::NativeLibrary;
use crate::error::ResourceKind;
use crate::global::GlobalSlot;
#[cfg(any(test, feature = "testing"))]
use rustc_hash::FxHashMap;
#[cfg(any(test, feature = "testing"))]
use std::cell::Cell;
use std::ffi::CStr;
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};

/// Handle to a record in the arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HeapHandle {
    index: u32,
    generation: u32,
}

impl HeapHandle {
    /// Never refers to a record. Returned when a lookup hits a stale handle.
    pub const DANGLING: HeapHandle = HeapHandle {
        index: u32::MAX,
        generation: u32::MAX,
    };

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

struct ContextRecord {
    discard_value_names: bool,
}

#[derive(Clone)]
struct ModuleRecord {
    context: HeapHandle,
    identifier: String,
    source_file_name: String,
    data_layout: String,
    target_triple: String,
}

enum Record {
    Context(ContextRecord),
    Module(ModuleRecord),
}

struct Slot {
    generation: u32,
    record: Option<Record>,
}

#[derive(Default)]
struct Arena {
    slots: Vec<Slot>,
    free_list: Vec<u32>,
    #[cfg(any(test, feature = "testing"))]
    disposals: FxHashMap<HeapHandle, u32>,
    global: Option<HeapHandle>,
}

impl Arena {
    fn allocate(&mut self, record: Record) -> HeapHandle {
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.record = Some(record);
            HeapHandle {
                index,
                generation: slot.generation,
            }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                record: Some(record),
            });
            HeapHandle {
                index,
                generation: 0,
            }
        }
    }

    fn get(&self, handle: HeapHandle) -> Option<&Record> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.record.as_ref()
    }

    fn get_mut(&mut self, handle: HeapHandle) -> Option<&mut Record> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.record.as_mut()
    }

    fn context(&self, handle: HeapHandle) -> Option<&ContextRecord> {
        match self.get(handle)? {
            Record::Context(record) => Some(record),
            Record::Module(_) => None,
        }
    }

    fn module(&self, handle: HeapHandle) -> Option<&ModuleRecord> {
        match self.get(handle)? {
            Record::Module(record) => Some(record),
            Record::Context(_) => None,
        }
    }

    fn module_mut(&mut self, handle: HeapHandle) -> Option<&mut ModuleRecord> {
        match self.get_mut(handle)? {
            Record::Module(record) => Some(record),
            Record::Context(_) => None,
        }
    }

    /// Free the slot; stale handles are counted but otherwise ignored.
    fn free(&mut self, handle: HeapHandle) -> bool {
        #[cfg(any(test, feature = "testing"))]
        {
            *self.disposals.entry(handle).or_insert(0) += 1;
        }
        let Some(slot) = self.slots.get_mut(handle.index as usize) else {
            return false;
        };
        if slot.generation != handle.generation || slot.record.is_none() {
            return false;
        }
        slot.record = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(handle.index);
        true
    }

    fn global(&mut self) -> HeapHandle {
        if let Some(handle) = self.global {
            return handle;
        }
        let handle = self.allocate(Record::Context(ContextRecord {
            discard_value_names: false,
        }));
        self.global = Some(handle);
        handle
    }

    fn modules_in(&self, context: HeapHandle) -> Vec<HeapHandle> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| match &slot.record {
                Some(Record::Module(module)) if module.context == context => Some(HeapHandle {
                    index: index as u32,
                    generation: slot.generation,
                }),
                _ => None,
            })
            .collect()
    }
}

fn arena() -> MutexGuard<'static, Arena> {
    static ARENA: OnceLock<Mutex<Arena>> = OnceLock::new();
    ARENA
        .get_or_init(|| Mutex::new(Arena::default()))
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

#[cfg(any(test, feature = "testing"))]
thread_local! {
    static FAIL_NEXT: Cell<Option<ResourceKind>> = const { Cell::new(None) };
}

#[cfg(any(test, feature = "testing"))]
fn take_injected_failure(kind: ResourceKind) -> bool {
    FAIL_NEXT.with(|cell| {
        if cell.get() == Some(kind) {
            cell.set(None);
            true
        } else {
            false
        }
    })
}

#[cfg(not(any(test, feature = "testing")))]
fn take_injected_failure(_kind: ResourceKind) -> bool {
    false
}

/// In-process native library.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeapLibrary;

impl HeapLibrary {
    /// Make the next allocation of `kind` on the calling thread fail.
    #[cfg(any(test, feature = "testing"))]
    pub fn inject_allocation_failure(kind: ResourceKind) {
        FAIL_NEXT.with(|cell| cell.set(Some(kind)));
    }

    pub fn is_live_context(handle: HeapHandle) -> bool {
        arena().context(handle).is_some()
    }

    pub fn is_live_module(handle: HeapHandle) -> bool {
        arena().module(handle).is_some()
    }

    /// How many times `handle` has been passed to a dispose call.
    #[cfg(any(test, feature = "testing"))]
    pub fn dispose_count(handle: HeapHandle) -> u32 {
        arena().disposals.get(&handle).copied().unwrap_or(0)
    }

    /// Live modules created inside `context`.
    pub fn module_count(context: HeapHandle) -> usize {
        arena().modules_in(context).len()
    }
}

impl NativeLibrary for HeapLibrary {
    type ContextRef = HeapHandle;
    type ModuleRef = HeapHandle;

    const NAME: &'static str = "heap";

    fn create_context() -> Option<HeapHandle> {
        if take_injected_failure(ResourceKind::Context) {
            return None;
        }
        Some(arena().allocate(Record::Context(ContextRecord {
            discard_value_names: false,
        })))
    }

    fn global_context_ref() -> HeapHandle {
        arena().global()
    }

    fn global_slot() -> &'static GlobalSlot<Self> {
        static SLOT: GlobalSlot<HeapLibrary> = GlobalSlot::new();
        &SLOT
    }

    fn context_is_live(context: HeapHandle) -> bool {
        Self::is_live_context(context)
    }

    unsafe fn dispose_context(context: HeapHandle) {
        let mut arena = arena();
        if arena.global == Some(context) {
            tracing::warn!(?context, "refusing to dispose the global context");
            return;
        }
        if arena.context(context).is_none() {
            arena.free(context);
            return;
        }
        for module in arena.modules_in(context) {
            tracing::debug!(?module, ?context, "module released with its context");
            arena.free(module);
        }
        arena.free(context);
    }

    unsafe fn discard_value_names(context: HeapHandle) -> bool {
        arena()
            .context(context)
            .is_some_and(|record| record.discard_value_names)
    }

    unsafe fn set_discard_value_names(context: HeapHandle, discard: bool) {
        if let Some(Record::Context(record)) = arena().get_mut(context) {
            record.discard_value_names = discard;
        }
    }

    unsafe fn create_module(name: &CStr, context: Option<HeapHandle>) -> Option<HeapHandle> {
        if take_injected_failure(ResourceKind::Module) {
            return None;
        }
        let mut arena = arena();
        let context = match context {
            Some(context) => {
                arena.context(context)?;
                context
            }
            None => arena.global(),
        };
        let identifier = name.to_string_lossy().into_owned();
        Some(arena.allocate(Record::Module(ModuleRecord {
            context,
            source_file_name: identifier.clone(),
            identifier,
            data_layout: String::new(),
            target_triple: String::new(),
        })))
    }

    unsafe fn dispose_module(module: HeapHandle) {
        arena().free(module);
    }

    unsafe fn module_context(module: HeapHandle) -> HeapHandle {
        match arena().module(module) {
            Some(record) => record.context,
            None => {
                tracing::warn!(?module, "context lookup on a stale module handle");
                HeapHandle::DANGLING
            }
        }
    }

    unsafe fn module_identifier(module: HeapHandle) -> String {
        arena()
            .module(module)
            .map(|record| record.identifier.clone())
            .unwrap_or_default()
    }

    unsafe fn set_module_identifier(module: HeapHandle, identifier: &CStr) {
        if let Some(record) = arena().module_mut(module) {
            record.identifier = identifier.to_string_lossy().into_owned();
        }
    }

    unsafe fn source_file_name(module: HeapHandle) -> String {
        arena()
            .module(module)
            .map(|record| record.source_file_name.clone())
            .unwrap_or_default()
    }

    unsafe fn set_source_file_name(module: HeapHandle, name: &CStr) {
        if let Some(record) = arena().module_mut(module) {
            record.source_file_name = name.to_string_lossy().into_owned();
        }
    }

    unsafe fn data_layout(module: HeapHandle) -> String {
        arena()
            .module(module)
            .map(|record| record.data_layout.clone())
            .unwrap_or_default()
    }

    unsafe fn set_data_layout(module: HeapHandle, layout: &CStr) {
        if let Some(record) = arena().module_mut(module) {
            record.data_layout = layout.to_string_lossy().into_owned();
        }
    }

    unsafe fn target_triple(module: HeapHandle) -> String {
        arena()
            .module(module)
            .map(|record| record.target_triple.clone())
            .unwrap_or_default()
    }

    unsafe fn set_target_triple(module: HeapHandle, triple: &CStr) {
        if let Some(record) = arena().module_mut(module) {
            record.target_triple = triple.to_string_lossy().into_owned();
        }
    }

    unsafe fn clone_module(module: HeapHandle) -> Option<HeapHandle> {
        if take_injected_failure(ResourceKind::Module) {
            return None;
        }
        let mut arena = arena();
        let record = arena.module(module)?.clone();
        Some(arena.allocate(Record::Module(record)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_handles_are_detected() {
        let first = HeapLibrary::create_context().unwrap();
        unsafe { HeapLibrary::dispose_context(first) };
        assert!(!HeapLibrary::is_live_context(first));

        let second = HeapLibrary::create_context().unwrap();
        assert_ne!(first, second);
        assert!(HeapLibrary::is_live_context(second));
        unsafe { HeapLibrary::dispose_context(second) };
    }

    #[test]
    fn disposing_a_context_releases_its_modules() {
        let context = HeapLibrary::create_context().unwrap();
        let module = unsafe { HeapLibrary::create_module(c"orphan", Some(context)) }.unwrap();
        assert_eq!(HeapLibrary::module_count(context), 1);

        unsafe { HeapLibrary::dispose_context(context) };
        assert!(!HeapLibrary::is_live_module(module));

        // The later module dispose lands on a stale handle.
        unsafe { HeapLibrary::dispose_module(module) };
        assert_eq!(HeapLibrary::dispose_count(module), 2);
    }

    #[test]
    fn global_context_is_never_freed() {
        let global = HeapLibrary::global_context_ref();
        unsafe { HeapLibrary::dispose_context(global) };
        assert!(HeapLibrary::is_live_context(global));
        assert_eq!(global, HeapLibrary::global_context_ref());
    }

    #[test]
    fn module_without_context_lands_in_global() {
        let module = unsafe { HeapLibrary::create_module(c"unit", None) }.unwrap();
        let context = unsafe { HeapLibrary::module_context(module) };
        assert_eq!(context, HeapLibrary::global_context_ref());
        unsafe { HeapLibrary::dispose_module(module) };
    }

    #[test]
    fn stale_module_has_no_context() {
        let module = unsafe { HeapLibrary::create_module(c"gone", None) }.unwrap();
        unsafe { HeapLibrary::dispose_module(module) };

        let context = unsafe { HeapLibrary::module_context(module) };
        assert_eq!(context, HeapHandle::DANGLING);
        assert_ne!(context, HeapLibrary::global_context_ref());
        assert!(!HeapLibrary::is_live_context(context));
    }

    #[test]
    fn reused_slots_keep_the_arena_bounded() {
        let mut arena = Arena::default();
        let mut last = None;
        for _ in 0..10_000 {
            let handle = arena.allocate(Record::Context(ContextRecord {
                discard_value_names: false,
            }));
            assert!(arena.free(handle));
            last = Some(handle);
        }
        assert_eq!(arena.slots.len(), 1);
        assert_eq!(arena.free_list.len(), 1);
        assert_eq!(last.map(|handle| handle.generation()), Some(9_999));
    }

    #[test]
    fn injected_failure_applies_once() {
        HeapLibrary::inject_allocation_failure(ResourceKind::Context);
        assert!(HeapLibrary::create_context().is_none());

        let context = HeapLibrary::create_context().unwrap();
        unsafe { HeapLibrary::dispose_context(context) };
    }

    #[test]
    fn module_properties_round_trip() {
        let module = unsafe { HeapLibrary::create_module(c"props", None) }.unwrap();
        unsafe {
            assert_eq!(HeapLibrary::module_identifier(module), "props");
            assert_eq!(HeapLibrary::data_layout(module), "");
            HeapLibrary::set_data_layout(module, c"e-m:e-i64:64");
            HeapLibrary::set_target_triple(module, c"x86_64-unknown-linux-gnu");
            assert_eq!(HeapLibrary::data_layout(module), "e-m:e-i64:64");
            assert_eq!(HeapLibrary::target_triple(module), "x86_64-unknown-linux-gnu");
            HeapLibrary::dispose_module(module);
        }
    }
}
