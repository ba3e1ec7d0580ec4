//! Session state machine using rust-fsm.
//!
//! Storage stays the source of truth for the session. The machine records
//! what one [`crate::SessionManager`] last observed or did, so observers can
//! follow the lifecycle and tests can assert on it.
//!
//! ## State Diagram
//!
//! ```text
//!                 LoginAttempt               LoginSuccess
//! Unauthenticated ────────────► LoggingIn ─────────────────► Valid
//!       ▲   ▲                      │ LoginFailed               │ ▲
//!       │   └──────────────────────┘                           │ │
//!       │                                        TokenExpired  │ │ TokenFound
//!       │ SessionCleared                                       ▼ │
//!       │                                                    Expired
//!       │                                                      │ RefreshStarted
//!       │                RefreshRejected                       ▼
//!  RefreshFailed ◄─────────────────────────────────────── Refreshing
//!                                                              │ RefreshSuccess
//!                                                              ▼
//!                                                            Valid
//! ```
//!
//! `RefreshFailed` is transient: the manager clears the session and feeds
//! `SessionCleared` right after entering it.

use rust_fsm::*;
use serde::{Deserialize, Serialize};

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub auth_machine(Unauthenticated)

    Unauthenticated => {
        LoginAttempt => LoggingIn,
        TokenFound => Valid,
        TokenExpired => Expired,
        RefreshStarted => Refreshing,
        SessionCleared => Unauthenticated
    },
    LoggingIn => {
        LoginSuccess => Valid,
        LoginFailed => Unauthenticated
    },
    Valid => {
        TokenFound => Valid,
        TokenExpired => Expired,
        RefreshStarted => Refreshing,
        LoginAttempt => LoggingIn,
        SessionCleared => Unauthenticated
    },
    Expired => {
        TokenFound => Valid,
        TokenExpired => Expired,
        RefreshStarted => Refreshing,
        LoginAttempt => LoggingIn,
        SessionCleared => Unauthenticated
    },
    Refreshing => {
        RefreshSuccess => Valid,
        RefreshRejected => RefreshFailed
    },
    RefreshFailed => {
        SessionCleared => Unauthenticated
    }
}

pub use auth_machine::Input as AuthMachineInput;
pub use auth_machine::State as AuthMachineState;
pub use auth_machine::StateMachine as AuthMachine;

/// Session state for external consumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    /// No access token stored.
    Unauthenticated,
    /// Login request in flight.
    LoggingIn,
    /// Access token present and not expired.
    Valid,
    /// Access token present but past its expiry margin.
    Expired,
    /// Refresh request in flight.
    Refreshing,
    /// Refresh was rejected; the session is being cleared.
    RefreshFailed,
}

impl AuthState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::Valid)
    }

    /// Returns true while a request is in flight or a failure is being handled.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AuthState::LoggingIn | AuthState::Refreshing | AuthState::RefreshFailed
        )
    }
}

impl From<&AuthMachineState> for AuthState {
    fn from(state: &AuthMachineState) -> Self {
        match state {
            AuthMachineState::Unauthenticated => AuthState::Unauthenticated,
            AuthMachineState::LoggingIn => AuthState::LoggingIn,
            AuthMachineState::Valid => AuthState::Valid,
            AuthMachineState::Expired => AuthState::Expired,
            AuthMachineState::Refreshing => AuthState::Refreshing,
            AuthMachineState::RefreshFailed => AuthState::RefreshFailed,
        }
    }
}

/// Payload for state change notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthStateChangedPayload {
    pub previous: AuthState,
    pub state: AuthState,
}
