//! Sync state machine vocabulary.
//!
//! [`next_state`] is the pure transition table; the coordinator performs the
//! side effects that go with each transition.

use serde::Serialize;
use std::fmt;

use crate::types::credential::Credentials;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncState {
    /// Not started yet.
    Start,
    /// Waiting for the user to provide a valid login.
    Cfg,
    /// First exchange after a new login.
    Login,
    /// First exchange after a start without a recoverable snapshot.
    Init,
    /// Waiting to retry the first exchange.
    Retry,
    /// In sync; next exchange on the sync interval.
    Idle,
    /// Local changes pending; next exchange after the settle delay or backoff.
    Wait,
    /// Exchange in flight.
    Sync,
    /// Exchange in flight and local changes arrived meanwhile.
    SyncW,
    /// Terminal.
    Stop,
}

impl SyncState {
    /// States in which an exchange worker is running.
    pub fn is_exchanging(self) -> bool {
        matches!(
            self,
            SyncState::Login | SyncState::Init | SyncState::Sync | SyncState::SyncW
        )
    }

    /// States in which local stores are registered and watched.
    pub fn has_stores(self) -> bool {
        !matches!(self, SyncState::Start | SyncState::Cfg | SyncState::Stop)
    }

    /// States whose exchange is the first one since the trees were (re)built.
    pub fn is_first_exchange(self) -> bool {
        matches!(self, SyncState::Login | SyncState::Init)
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncState::Start => "START",
            SyncState::Cfg => "CFG",
            SyncState::Login => "LOGIN",
            SyncState::Init => "INIT",
            SyncState::Retry => "RETRY",
            SyncState::Idle => "IDLE",
            SyncState::Wait => "WAIT",
            SyncState::Sync => "SYNC",
            SyncState::SyncW => "SYNCW",
            SyncState::Stop => "STOP",
        };
        f.write_str(name)
    }
}

/// Abstract inputs of the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    /// No credentials stored.
    StartErr,
    /// Credentials, but no recoverable snapshot.
    StartOk0,
    /// Credentials and a recoverable snapshot.
    StartOk1,
    /// New credentials supplied by the user.
    Login,
    LocalChange,
    ExchangeOk,
    TemporaryError,
    PermanentError,
    TimerExpired,
    /// Manual request to exchange now; behaves like an expired timer.
    SyncNow,
    UserCancel,
    Shutdown,
}

/// The transition table. `None` means the trigger is ignored in `state`.
pub fn next_state(state: SyncState, trigger: Trigger) -> Option<SyncState> {
    use SyncState::*;
    use Trigger::*;

    match (state, trigger) {
        (Stop, _) => None,
        (_, UserCancel | Shutdown) => Some(Stop),

        (Start, StartErr) => Some(Cfg),
        (Start, StartOk0) => Some(Retry),
        (Start, StartOk1) => Some(Wait),

        (Cfg, Trigger::Login) => Some(SyncState::Login),

        (Idle | Wait, LocalChange) => Some(Wait),
        (Sync | SyncW, LocalChange) => Some(SyncW),

        (SyncState::Login | Init, ExchangeOk) => Some(Sync),
        (Sync, ExchangeOk) => Some(Idle),
        (SyncW, ExchangeOk) => Some(Wait),

        (SyncState::Login, TemporaryError) => Some(Cfg),
        (Init, TemporaryError) => Some(Retry),
        (Sync | SyncW, TemporaryError) => Some(Wait),

        (SyncState::Login | Init | Sync | SyncW, PermanentError) => Some(Cfg),

        (Retry, TimerExpired | SyncNow) => Some(Init),
        (Idle | Wait, TimerExpired | SyncNow) => Some(Sync),
        (SyncW, TimerExpired) => Some(SyncW),

        _ => None,
    }
}

/// Snapshot of the coordinator for observers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncStatus {
    pub state: SyncState,
    /// Human-readable status line.
    pub message: String,
    pub last_error: Option<String>,
    pub stores: usize,
    pub handles: usize,
}

impl SyncStatus {
    pub fn new(state: SyncState) -> Self {
        Self {
            state,
            message: describe(state).to_string(),
            last_error: None,
            stores: 0,
            handles: 0,
        }
    }
}

/// Default status line for a state.
pub fn describe(state: SyncState) -> &'static str {
    match state {
        SyncState::Start => "Starting",
        SyncState::Cfg => "Login required",
        SyncState::Login => "Logging in",
        SyncState::Init => "Connecting",
        SyncState::Retry => "Waiting to reconnect",
        SyncState::Idle => "Up to date",
        SyncState::Wait => "Changes pending",
        SyncState::Sync | SyncState::SyncW => "Synchronizing",
        SyncState::Stop => "Stopped",
    }
}

/// Messages delivered to the coordinator's event loop.
#[derive(Debug)]
pub enum SyncEvent {
    /// The local store at this index changed on disk.
    StoreChanged(usize),
    Login(Credentials),
    SyncNow,
    Cancel,
    Shutdown,
}
