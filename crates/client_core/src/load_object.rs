//! Lifecycle wrapper for values that live on the server.
//!
//! A [`LoadObject`] is never changed in place: every transition consumes the
//! receiver and hands back a new instance, so stores can keep the old one
//! around for identity comparison.

use shared::error::ApiError;
use thiserror::Error;

/// In-flight work on the wrapped value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    None,
    Creating,
    Loading,
    Updating,
    Deleting,
}

/// Lifecycle state derived from the operation, value and error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadState {
    NotLoaded,
    Loading,
    Creating,
    Updating,
    Deleting,
    Done,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadObjectError {
    #[error("load object has no value (state {state:?})")]
    NoValue { state: LoadState },
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadObject<T, E = ApiError> {
    operation: Operation,
    value: Option<T>,
    error: Option<E>,
}

impl<T, E> Default for LoadObject<T, E> {
    fn default() -> Self {
        Self::not_loaded()
    }
}

impl<T, E> LoadObject<T, E> {
    pub fn not_loaded() -> Self {
        Self {
            operation: Operation::None,
            value: None,
            error: None,
        }
    }

    pub fn with_value(value: T) -> Self {
        Self {
            operation: Operation::None,
            value: Some(value),
            error: None,
        }
    }

    pub fn state(&self) -> LoadState {
        match self.operation {
            Operation::Loading => LoadState::Loading,
            Operation::Creating => LoadState::Creating,
            Operation::Updating => LoadState::Updating,
            Operation::Deleting => LoadState::Deleting,
            Operation::None if self.error.is_some() => LoadState::Error,
            Operation::None if self.value.is_some() => LoadState::Done,
            Operation::None => LoadState::NotLoaded,
        }
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn loading(self) -> Self {
        self.begin(Operation::Loading)
    }

    pub fn creating(self) -> Self {
        self.begin(Operation::Creating)
    }

    /// Marks a write over the current value. Calling this without a value is
    /// a caller bug.
    pub fn updating(self) -> Self {
        debug_assert!(self.value.is_some(), "updating() needs a value");
        self.begin(Operation::Updating)
    }

    pub fn deleting(self) -> Self {
        self.begin(Operation::Deleting)
    }

    /// Settles the value. Calling this without a value is a caller bug.
    pub fn done(self) -> Self {
        debug_assert!(self.value.is_some(), "done() needs a value");
        Self {
            operation: Operation::None,
            value: self.value,
            error: None,
        }
    }

    /// Ends the current operation with `error`. A value, if any, is kept so
    /// callers can still show the last known copy.
    pub fn error(self, error: E) -> Self {
        Self {
            operation: Operation::None,
            value: self.value,
            error: Some(error),
        }
    }

    fn begin(self, operation: Operation) -> Self {
        Self {
            operation,
            value: self.value,
            error: None,
        }
    }

    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }

    pub fn is_loading(&self) -> bool {
        matches!(
            self.operation,
            Operation::Loading | Operation::Creating | Operation::Updating
        )
    }

    pub fn is_done(&self) -> bool {
        self.state() == LoadState::Done
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn has_operation(&self) -> bool {
        self.operation != Operation::None
    }

    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn value_enforcing(&self) -> Result<&T, LoadObjectError> {
        self.value.as_ref().ok_or(LoadObjectError::NoValue {
            state: self.state(),
        })
    }

    pub fn into_value(self) -> Option<T> {
        self.value
    }

    pub fn last_error(&self) -> Option<&E> {
        self.error.as_ref()
    }

    /// Transforms the value, if any, keeping the state.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> LoadObject<U, E> {
        LoadObject {
            operation: self.operation,
            value: self.value.map(f),
            error: self.error,
        }
    }

    /// Replaces the value, keeping the state. A not-loaded object becomes
    /// done.
    pub fn set_value(self, value: T) -> Self {
        Self {
            operation: self.operation,
            value: Some(value),
            error: self.error,
        }
    }

    pub fn remove_value(self) -> Self {
        Self {
            operation: self.operation,
            value: None,
            error: self.error,
        }
    }
}
