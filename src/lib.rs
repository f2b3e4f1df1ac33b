//! Two-player tic-tac-toe room server.
//!
//! Clients log in over HTTP, open a websocket with their session token, then
//! create, join, rejoin and play rooms by id. All game state lives in the
//! [`room::RoomRegistry`]; the [`ws::gateway::ConnectionGateway`] relays its
//! results to subscribed connections.

pub mod auth;
pub mod config;
pub mod http;
pub mod room;
pub mod telemetry;
pub mod util;
pub mod ws;

pub use config::Config;
pub use http::routes::{build_router, AppState};
