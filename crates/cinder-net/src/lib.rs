//! TCP transport: length-prefixed framing, bounded per-connection outbound
//! queues, and an accept loop that turns client traffic into events for the
//! simulation tick.

pub mod connection;
pub mod framing;
pub mod server;

pub use connection::ChannelConnection;
pub use framing::{FrameConfig, FrameError, read_frame, read_message, write_frame, write_message};
pub use server::{ConnectionId, ConnectionMap, GameServer, IdGenerator, InboundEvent, ServerConfig};
