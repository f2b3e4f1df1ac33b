//! Websocket transport: wire protocol, the connection gateway and socket loops.

pub mod connection;
pub mod gateway;
pub mod protocol;
