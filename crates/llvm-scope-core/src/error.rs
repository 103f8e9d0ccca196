use std::ffi::NulError;
use std::fmt;
use thiserror::Error;

pub type ScopeResult<T> = Result<T, LifecycleError>;

/// Which native resource an allocation was requested for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Context,
    Module,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Context => write!(f, "context"),
            ResourceKind::Module => write!(f, "module"),
        }
    }
}

/// An enter/exit call made in the wrong manager state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolViolation {
    AlreadyEntered,
    NotEntered,
}

impl fmt::Display for ProtocolViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolViolation::AlreadyEntered => write!(f, "already entered"),
            ProtocolViolation::NotEntered => write!(f, "not entered"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("native library failed to allocate a {0}")]
    Allocation(ResourceKind),

    #[error("{manager} {violation}")]
    Protocol {
        manager: &'static str,
        violation: ProtocolViolation,
    },

    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    #[error("string conversion error: {0}")]
    StringConversion(#[from] NulError),
}

impl LifecycleError {
    pub(crate) fn already_entered(manager: &'static str) -> Self {
        LifecycleError::Protocol {
            manager,
            violation: ProtocolViolation::AlreadyEntered,
        }
    }

    pub(crate) fn not_entered(manager: &'static str) -> Self {
        LifecycleError::Protocol {
            manager,
            violation: ProtocolViolation::NotEntered,
        }
    }

    pub fn is_allocation(&self) -> bool {
        matches!(self, LifecycleError::Allocation(_))
    }

    pub fn is_protocol(&self) -> bool {
        matches!(self, LifecycleError::Protocol { .. })
    }

    pub fn is_invalid_state(&self) -> bool {
        matches!(self, LifecycleError::InvalidState(_))
    }

    /// The protocol violation, if this is a protocol error.
    pub fn as_protocol_violation(&self) -> Option<ProtocolViolation> {
        match self {
            LifecycleError::Protocol { violation, .. } => Some(*violation),
            _ => None,
        }
    }
}
