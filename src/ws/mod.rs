//! WebSocket Router (§4.7): connection handshake, room membership, and
//! the inbound event dispatch loop.

mod handler;

pub use handler::ws_routes;
