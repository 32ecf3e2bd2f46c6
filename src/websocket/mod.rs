mod handler;
mod transport;

pub use handler::ws_handler;
pub use transport::{watch_peer, WsTransport};
