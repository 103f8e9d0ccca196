//! The enter/exit protocol shared by the managers.
//!
//! A manager is either empty or holds exactly one resource. `enter` fills the
//! slot, `exit` empties it and releases the native resource; calling either
//! out of turn is a [`LifecycleError::Protocol`](crate::LifecycleError)
//! error that leaves the manager untouched.
//!
//! [`Scoped::scope`] wraps the pair in a guard whose `Drop` performs the
//! exit, so release happens exactly once on every path out of a block,
//! including unwinding.

use crate::error::ScopeResult;
use std::fmt;
use std::ops::{Deref, DerefMut};

/// Why a scope is being exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeExit {
    Normal,
    /// The enclosing operation is unwinding from a panic.
    Unwinding,
}

pub trait Scoped {
    type Resource;

    /// Acquire a fresh resource. Fails if already entered.
    fn enter(&mut self) -> ScopeResult<&mut Self::Resource>;

    /// Release the held resource. Fails if not entered.
    ///
    /// `reason` describes how the caller's scope ended; it is recorded in
    /// logs and does not change what is released.
    fn exit_with(&mut self, reason: ScopeExit) -> ScopeResult<()>;

    fn exit(&mut self) -> ScopeResult<()> {
        self.exit_with(ScopeExit::Normal)
    }

    fn is_entered(&self) -> bool;

    fn resource(&self) -> Option<&Self::Resource>;

    fn resource_mut(&mut self) -> Option<&mut Self::Resource>;

    /// Enter and return a guard that exits when dropped.
    fn scope(&mut self) -> ScopeResult<ScopeGuard<'_, Self>>
    where
        Self: Sized,
    {
        self.enter()?;
        Ok(ScopeGuard {
            manager: Some(self),
        })
    }

    /// Run `f` against a freshly entered resource, exiting afterwards.
    fn with<R>(&mut self, f: impl FnOnce(&mut Self::Resource) -> R) -> ScopeResult<R>
    where
        Self: Sized,
    {
        let mut guard = self.scope()?;
        let result = f(&mut *guard);
        guard.close()?;
        Ok(result)
    }
}

/// An entered manager; exits on drop.
pub struct ScopeGuard<'m, M: Scoped> {
    manager: Option<&'m mut M>,
}

impl<M: Scoped> ScopeGuard<'_, M> {
    /// Exit now and report the outcome instead of deferring it to `Drop`.
    pub fn close(mut self) -> ScopeResult<()> {
        match self.manager.take() {
            Some(manager) => manager.exit(),
            None => Ok(()),
        }
    }
}

impl<M: Scoped> Deref for ScopeGuard<'_, M> {
    type Target = M::Resource;

    fn deref(&self) -> &M::Resource {
        match self.manager.as_deref().and_then(Scoped::resource) {
            Some(resource) => resource,
            None => unreachable!("scope guard outlived its resource"),
        }
    }
}

impl<M: Scoped> DerefMut for ScopeGuard<'_, M> {
    fn deref_mut(&mut self) -> &mut M::Resource {
        match self.manager.as_deref_mut().and_then(Scoped::resource_mut) {
            Some(resource) => resource,
            None => unreachable!("scope guard outlived its resource"),
        }
    }
}

impl<M: Scoped + fmt::Debug> fmt::Debug for ScopeGuard<'_, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeGuard")
            .field("manager", &self.manager)
            .finish()
    }
}

impl<M: Scoped> Drop for ScopeGuard<'_, M> {
    fn drop(&mut self) {
        let Some(manager) = self.manager.take() else {
            return;
        };
        let reason = if std::thread::panicking() {
            ScopeExit::Unwinding
        } else {
            ScopeExit::Normal
        };
        if let Err(error) = manager.exit_with(reason) {
            tracing::warn!(%error, ?reason, "scope guard exit failed");
        }
    }
}
