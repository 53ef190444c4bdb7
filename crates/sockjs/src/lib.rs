//! Server side of the SockJS protocol on top of axum.
//!
//! Sessions live in a [`SessionRegistry`]; transports attach to them through
//! the routes built by [`Handler::router`], and applications talk to each
//! session through a [`Conn`].

pub mod conn;
pub mod error;
pub mod frame;
pub mod handler;
pub mod options;
pub mod registry;
pub mod session;
pub mod transport;

pub use conn::Conn;
pub use error::{AttachError, FrameError, SessionError, TransportError};
pub use frame::{CloseFrame, Frame, Framing};
pub use handler::Handler;
pub use options::Options;
pub use registry::SessionRegistry;
pub use session::{Attachment, Session, SessionState};
pub use transport::TransportKind;
