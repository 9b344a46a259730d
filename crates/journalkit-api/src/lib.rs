// journalkit-api: async transport for the flat journal protocol

pub mod account;
pub mod auth;
pub mod codec;
pub mod error;
pub mod reachability;
pub mod server;
pub mod transport;

pub use account::{Account, CLIENT_VERSION, LoginReply};
pub use auth::LoginPayload;
pub use codec::{FlatValue, Framing, Params, Record, ReplyMap, params};
pub use error::Error;
pub use reachability::{
    ReachabilityEvent, ReachabilityFlags, ReachabilityHandle, ReachabilityMonitor,
    ReachabilityProbe, ReachabilityState, ReachabilityTarget, TcpProbe,
};
pub use server::{FLAT_INTERFACE_PATH, PROTOCOL_VERSION, ProtocolServer, ServerState};
pub use transport::{TlsMode, TransportConfig};
