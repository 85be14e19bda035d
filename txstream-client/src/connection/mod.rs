//! Transport plumbing: the sink/observer seams, framing, and TCP setup.

mod connection;
mod framed;
mod transport;

pub use connection::{connect, ConnectionId};
pub use framed::{spawn_framed, ChannelSink};
pub use transport::{RequestSink, ResponseObserver};
