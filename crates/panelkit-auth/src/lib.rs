//! Session lifecycle for panelkit.
//!
//! This crate provides:
//! - [`SessionManager`]: login, token validation, single-flight refresh,
//!   logout and the authenticated-request wrapper with retry-once-on-401
//! - [`SessionContext`]: an observable `{is_authenticated, is_loading, error}`
//!   view that polls and follows storage-driven changes from other contexts
//! - An explicit FSM tracking the lifecycle of one manager
//! - Diagnostics for exercising the refresh path by hand

mod auth_fsm;
mod context;
mod diagnostics;
mod error;
mod session;

pub use auth_fsm::auth_machine;
pub use auth_fsm::{AuthMachine, AuthMachineInput, AuthMachineState, AuthState, AuthStateChangedPayload};
pub use context::{SessionContext, SessionView, CHECK_AUTH_FAILED, LOGOUT_FAILED};
pub use diagnostics::{TokenState, TokenTestReport};
pub use error::{AuthError, AuthResult};
pub use reqwest::Method;
pub use session::{ApiRequest, AuthSnapshot, AuthStateCallback, Credentials, SessionManager, TokenGrant};
