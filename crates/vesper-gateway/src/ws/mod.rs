//! Dashboard WebSocket surface: connection lifecycle, JSON-RPC method
//! dispatch, and the concrete method handlers.

pub mod broadcast;
pub mod connection;
pub mod dispatch;
pub mod handlers;
pub mod handshake;
pub mod message;
pub mod send;
