//! Lifecycle state of an asynchronous operation.
//!
//! [`AsyncState`] is what both the resource fetcher and the action
//! dispatcher expose. It is a phase plus the last good value and the last
//! error, because a reload keeps showing the previous value and a failure
//! does not erase it either.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    Loading,
    Ready,
    Failed,
}

/// `{loading, error, value}` of an in-flight or finished operation.
///
/// | phase   | value                 | error          |
/// |---------|-----------------------|----------------|
/// | Idle    | none                  | none           |
/// | Loading | previous, if any      | none           |
/// | Ready   | the result            | none           |
/// | Failed  | previous, if any      | the rejection  |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsyncState<T, E> {
    phase: Phase,
    value: Option<T>,
    error: Option<E>,
}

impl<T, E> Default for AsyncState<T, E> {
    fn default() -> Self {
        Self::idle()
    }
}

impl<T, E> AsyncState<T, E> {
    pub fn idle() -> Self {
        Self {
            phase: Phase::Idle,
            value: None,
            error: None,
        }
    }

    pub fn ready(value: T) -> Self {
        Self {
            phase: Phase::Ready,
            value: Some(value),
            error: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn loading(&self) -> bool {
        self.phase == Phase::Loading
    }

    pub fn is_idle(&self) -> bool {
        self.phase == Phase::Idle
    }

    pub fn is_ready(&self) -> bool {
        self.phase == Phase::Ready
    }

    pub fn is_failed(&self) -> bool {
        self.phase == Phase::Failed
    }

    /// Loading with nothing to show yet.
    pub fn is_first_load(&self) -> bool {
        self.loading() && self.value.is_none()
    }

    /// Loading while a previous value is still on screen.
    pub fn is_refreshing(&self) -> bool {
        self.loading() && self.value.is_some()
    }

    /// Latest value, retained across reloads and failures.
    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn error(&self) -> Option<&E> {
        self.error.as_ref()
    }

    pub fn into_value(self) -> Option<T> {
        self.value
    }

    /// Enter `Loading`. The value is kept, the error cleared.
    pub fn begin_load(&mut self) {
        self.phase = Phase::Loading;
        self.error = None;
    }

    pub fn resolve(&mut self, value: T) {
        self.phase = Phase::Ready;
        self.value = Some(value);
        self.error = None;
    }

    /// Enter `Failed`, keeping the last good value.
    pub fn fail(&mut self, error: E) {
        self.phase = Phase::Failed;
        self.error = Some(error);
    }

    /// Overwrite the value without touching `loading` or `error`.
    ///
    /// An idle state becomes `Ready`, since it now holds a value.
    pub fn replace_value(&mut self, value: T) {
        self.value = Some(value);
        if self.phase == Phase::Idle {
            self.phase = Phase::Ready;
        }
    }

    /// Back to `Idle`, dropping value and error.
    pub fn reset(&mut self) {
        *self = Self::idle();
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> AsyncState<U, E> {
        AsyncState {
            phase: self.phase,
            value: self.value.map(f),
            error: self.error,
        }
    }
}
