pub mod config;
pub mod error;
pub mod media;
pub mod mux;
pub mod session;
pub mod transport;
pub mod uri;

pub use error::{Result, SessionError};
pub use mux::{MuxEvent, PassthroughMux, SessionMux};
pub use session::{RtpSession, SessionCapabilities, SessionRole, SessionState};
pub use uri::SessionUri;
