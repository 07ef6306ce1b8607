pub mod session;

pub use session::{SessionHandle, SessionManager, SessionState, SessionStatus};
