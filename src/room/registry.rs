//! Registry of rooms and the turn-based game state machine.
//!
//! Every mutating call takes the room's map entry for its whole
//! validate-then-apply sequence, so operations on one room are strictly
//! ordered while different rooms only contend on a shared shard.

use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use super::board::{Board, Cell, Mark, Verdict, CELLS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Waiting,
    Playing,
    Finished,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Winner(String),
    Draw,
}

#[derive(Debug, Clone)]
pub struct Room {
    players: Vec<String>,
    board: Board,
    current_player: String,
    status: Status,
    outcome: Option<Outcome>,
    updated_at: Instant,
    finished_at: Option<Instant>,
}

/// Full room state as sent to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub players: Vec<String>,
    pub board: [Cell; CELLS],
    pub current_player: String,
    pub game_state: GameState,
}

/// `winner` is `None` both while the game runs and after a draw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameState {
    pub status: Status,
    pub winner: Option<String>,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RoomError {
    #[error("Room id must not be empty")]
    InvalidRoomId,
    #[error("Username must not be empty")]
    InvalidUsername,
    #[error("Room already exists")]
    RoomExists,
    #[error("Room not found")]
    RoomNotFound,
    #[error("Room is full")]
    RoomFull,
    #[error("Username already in room")]
    DuplicateUsername,
    #[error("You are not a player in this room")]
    NotAMember,
    #[error("Waiting for an opponent to join")]
    GameNotStarted,
    #[error("Not your turn")]
    NotYourTurn,
    #[error("Invalid position")]
    InvalidPosition,
    #[error("Game is already finished")]
    GameAlreadyFinished,
}

impl Room {
    fn new(creator: &str, now: Instant) -> Self {
        Room {
            players: vec![creator.to_string()],
            board: Board::new(),
            current_player: creator.to_string(),
            status: Status::Waiting,
            outcome: None,
            updated_at: now,
            finished_at: None,
        }
    }

    fn seat_of(&self, username: &str) -> Option<usize> {
        self.players.iter().position(|p| p == username)
    }

    pub fn outcome(&self) -> Option<&Outcome> { self.outcome.as_ref() }

    pub fn snapshot(&self) -> RoomSnapshot {
        let winner = match &self.outcome {
            Some(Outcome::Winner(name)) => Some(name.clone()),
            Some(Outcome::Draw) | None => None,
        };
        RoomSnapshot {
            players: self.players.clone(),
            board: *self.board.cells(),
            current_player: self.current_player.clone(),
            game_state: GameState { status: self.status, winner },
        }
    }

    /// Writes the mover's mark and advances the state machine. The move must
    /// already be validated.
    fn apply_move(&mut self, seat: usize, position: usize, now: Instant) {
        self.board.place(position, Mark::for_seat(seat));
        self.updated_at = now;
        match self.board.verdict() {
            Verdict::Line(_) => {
                let winner = self.players[seat].clone();
                self.finish(Outcome::Winner(winner), now);
            }
            Verdict::Full => self.finish(Outcome::Draw, now),
            Verdict::Open => self.current_player = self.players[1 - seat].clone(),
        }
    }

    // current_player is left on the last mover.
    fn finish(&mut self, outcome: Outcome, now: Instant) {
        self.status = Status::Finished;
        self.outcome = Some(outcome);
        self.finished_at = Some(now);
    }

    fn is_expired(&self, now: Instant, finished_ttl: Duration, idle_ttl: Duration) -> bool {
        let finished_long_ago = self
            .finished_at
            .map(|at| now.saturating_duration_since(at) >= finished_ttl)
            .unwrap_or(false);
        finished_long_ago || now.saturating_duration_since(self.updated_at) >= idle_ttl
    }
}

#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: DashMap<String, Room>,
}

impl RoomRegistry {
    pub fn new() -> Self { Self { rooms: DashMap::new() } }

    pub fn len(&self) -> usize { self.rooms.len() }

    pub fn is_empty(&self) -> bool { self.rooms.is_empty() }

    pub fn snapshot(&self, room_id: &str) -> Option<RoomSnapshot> {
        self.rooms.get(room_id).map(|r| r.snapshot())
    }

    pub fn create_room(&self, room_id: &str, username: &str) -> Result<RoomSnapshot, RoomError> {
        if room_id.is_empty() { return Err(RoomError::InvalidRoomId); }
        if username.is_empty() { return Err(RoomError::InvalidUsername); }
        match self.rooms.entry(room_id.to_string()) {
            Entry::Occupied(_) => Err(RoomError::RoomExists),
            Entry::Vacant(slot) => {
                let room = Room::new(username, Instant::now());
                let snapshot = room.snapshot();
                slot.insert(room);
                tracing::info!(%room_id, %username, "room created");
                Ok(snapshot)
            }
        }
    }

    /// Seats `username` as the second player. The creator keeps the first move.
    pub fn join_room(&self, room_id: &str, username: &str) -> Result<RoomSnapshot, RoomError> {
        if username.is_empty() { return Err(RoomError::InvalidUsername); }
        let mut room = self.rooms.get_mut(room_id).ok_or(RoomError::RoomNotFound)?;
        if room.players.len() >= 2 { return Err(RoomError::RoomFull); }
        if room.seat_of(username).is_some() { return Err(RoomError::DuplicateUsername); }
        room.players.push(username.to_string());
        room.status = Status::Playing;
        room.updated_at = Instant::now();
        tracing::info!(%room_id, %username, "player joined");
        Ok(room.snapshot())
    }

    pub fn rejoin_room(&self, room_id: &str, username: &str) -> Result<RoomSnapshot, RoomError> {
        let mut room = self.rooms.get_mut(room_id).ok_or(RoomError::RoomNotFound)?;
        if room.seat_of(username).is_none() { return Err(RoomError::NotAMember); }
        room.updated_at = Instant::now();
        Ok(room.snapshot())
    }

    /// Membership is kept; leaving never forfeits the game.
    pub fn leave_room(&self, room_id: &str, username: &str) -> Result<RoomSnapshot, RoomError> {
        let room = self.rooms.get(room_id).ok_or(RoomError::RoomNotFound)?;
        if room.seat_of(username).is_none() { return Err(RoomError::NotAMember); }
        Ok(room.snapshot())
    }

    pub fn make_move(&self, room_id: &str, position: usize, username: &str) -> Result<RoomSnapshot, RoomError> {
        let mut room = self.rooms.get_mut(room_id).ok_or(RoomError::RoomNotFound)?;
        let seat = room.seat_of(username).ok_or(RoomError::NotAMember)?;
        match room.status {
            Status::Finished => return Err(RoomError::GameAlreadyFinished),
            Status::Waiting => return Err(RoomError::GameNotStarted),
            Status::Playing => {}
        }
        if room.current_player != username { return Err(RoomError::NotYourTurn); }
        if !room.board.is_playable(position) { return Err(RoomError::InvalidPosition); }

        room.apply_move(seat, position, Instant::now());
        if let Some(outcome) = room.outcome() {
            tracing::info!(%room_id, ?outcome, "game finished");
        }
        Ok(room.snapshot())
    }

    /// Drops rooms finished at least `finished_ttl` ago and rooms untouched for
    /// `idle_ttl`. Returns the removed room ids.
    pub fn prune(&self, now: Instant, finished_ttl: Duration, idle_ttl: Duration) -> Vec<String> {
        let mut removed = Vec::new();
        self.rooms.retain(|id, room| {
            let expired = room.is_expired(now, finished_ttl, idle_ttl);
            if expired { removed.push(id.clone()); }
            !expired
        });
        removed
    }
}
