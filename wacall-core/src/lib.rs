pub mod events;
pub mod session;
pub mod webhook;

pub use session::{CallDirection, CallSession, CallState, SessionError, SessionPatch};
