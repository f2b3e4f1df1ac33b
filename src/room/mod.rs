//! Rooms: board rules and the registry that owns every game.

pub mod board;
pub mod registry;

pub use registry::{RoomError, RoomRegistry, RoomSnapshot};
