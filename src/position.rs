//! Position source
//!
//! Device location access: a permission prompt and on-demand fixes.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{HeartwaveError, Result};
use crate::geo::Coordinate;

/// Interface to the device's location service.
#[async_trait]
pub trait PositionSource: Send + Sync {
    /// Ask for location access. `Ok(false)` means the user refused.
    async fn request_permission(&self) -> Result<bool>;

    /// Current fix. Fails with `PermissionDenied` or `Unavailable`.
    async fn current_position(&self) -> Result<Coordinate>;
}

#[derive(Debug)]
struct ManualState {
    position: Option<Coordinate>,
    permission: bool,
    failures: u32,
    requests: u32,
}

/// Position source driven by explicit calls.
///
/// Used for simulated devices and tests: move it with [`set`](Self::set),
/// revoke permission, or make the next few fixes fail.
#[derive(Debug)]
pub struct ManualPositionSource {
    state: Mutex<ManualState>,
}

impl ManualPositionSource {
    pub fn new(position: Coordinate) -> Self {
        Self {
            state: Mutex::new(ManualState {
                position: Some(position),
                permission: true,
                failures: 0,
                requests: 0,
            }),
        }
    }

    /// A source that has no fix yet.
    pub fn without_fix() -> Self {
        let source = Self::new(Coordinate::new(0.0, 0.0));
        source.with_state(|s| s.position = None);
        source
    }

    pub fn set(&self, position: Coordinate) {
        self.with_state(|s| s.position = Some(position));
    }

    pub fn set_permission(&self, granted: bool) {
        self.with_state(|s| s.permission = granted);
    }

    /// Make the next `n` fixes fail with `Unavailable`.
    pub fn fail_next(&self, n: u32) {
        self.with_state(|s| s.failures = n);
    }

    /// Number of `current_position` calls so far.
    pub fn requests(&self) -> u32 {
        self.with_state(|s| s.requests)
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut ManualState) -> T) -> T {
        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }
}

#[async_trait]
impl PositionSource for ManualPositionSource {
    async fn request_permission(&self) -> Result<bool> {
        Ok(self.with_state(|s| s.permission))
    }

    async fn current_position(&self) -> Result<Coordinate> {
        self.with_state(|s| {
            s.requests += 1;
            if !s.permission {
                return Err(HeartwaveError::PermissionDenied);
            }
            if s.failures > 0 {
                s.failures -= 1;
                return Err(HeartwaveError::Unavailable("no position fix".into()));
            }
            s.position
                .ok_or_else(|| HeartwaveError::Unavailable("no position fix".into()))
        })
    }
}
