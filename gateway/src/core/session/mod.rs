//! Per-client session relay.
//!
//! - [`SessionRelay`] drives one session from accept to close
//! - [`SessionRegistry`] tracks every live session by identity
//! - [`SendGate`] serializes writes to one client
//! - [`messages`] is the client wire protocol

pub mod gate;
pub mod messages;
pub mod registry;
pub mod relay;
pub mod state;

pub use gate::{GATE_CHANNEL_CAPACITY, SendGate, TransportError};
pub use messages::{
    ClientCommand, ClientFrame, DecodeError, RelayOutgoingMessage, RelayRoute,
};
pub use registry::{NotFound, SessionHandle, SessionRegistry};
pub use relay::{SessionRelay, UPSTREAM_CONNECT_FAILED};
pub use state::{RelayState, Session, SessionSnapshot};
