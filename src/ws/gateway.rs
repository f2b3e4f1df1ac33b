//! Routes decoded client messages to the room registry and fans results out
//! to the connections subscribed to each room.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::room::{RoomError, RoomRegistry};
use crate::util::id::ConnectionId;
use crate::ws::protocol::{ClientMsg, ServerMsg};

pub type Outbox = mpsc::UnboundedSender<ServerMsg>;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("Username does not match session")]
    UsernameMismatch,
}

/// A live connection bound to the username it authenticated as.
#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnectionId,
    username: String,
    outbox: Outbox,
}

impl Connection {
    pub fn new(username: impl Into<String>, outbox: Outbox) -> Self {
        Self { id: ConnectionId::new(), username: username.into(), outbox }
    }

    pub fn id(&self) -> ConnectionId { self.id }

    pub fn username(&self) -> &str { &self.username }

    // A closed outbox means the socket is already going away.
    pub fn send(&self, msg: ServerMsg) {
        let _ = self.outbox.send(msg);
    }
}

pub struct ConnectionGateway {
    registry: Arc<RoomRegistry>,
    subscribers: DashMap<String, HashMap<ConnectionId, Outbox>>,
    memberships: DashMap<ConnectionId, String>,
}

impl ConnectionGateway {
    pub fn new(registry: Arc<RoomRegistry>) -> Self {
        Self { registry, subscribers: DashMap::new(), memberships: DashMap::new() }
    }

    pub fn registry(&self) -> &RoomRegistry { &self.registry }

    pub fn subscriber_count(&self, room_id: &str) -> usize {
        self.subscribers.get(room_id).map(|s| s.len()).unwrap_or(0)
    }

    pub fn subscribed_room(&self, conn: ConnectionId) -> Option<String> {
        self.memberships.get(&conn).map(|r| r.value().clone())
    }

    /// Entry point for every inbound frame. Messages naming a different user
    /// than the one bound to the connection are rejected here.
    pub fn dispatch(&self, conn: &Connection, msg: ClientMsg) {
        if let Some(claimed) = msg.username() {
            if claimed != conn.username() {
                tracing::warn!(conn_id = %conn.id(), bound = %conn.username(), %claimed, "username mismatch");
                conn.send(ServerMsg::error(GatewayError::UsernameMismatch));
                return;
            }
        }
        match msg {
            ClientMsg::CreateRoom { room_id, username } => self.on_create_room(conn, &room_id, &username),
            ClientMsg::JoinRoom { room_id, username } => self.on_join_room(conn, &room_id, &username),
            ClientMsg::RejoinRoom { room_id, username } => self.on_rejoin_room(conn, &room_id, &username),
            ClientMsg::MakeMove { room_id, position, username } => {
                self.on_make_move(conn, &room_id, position, &username)
            }
            ClientMsg::LeaveRoom { room_id, username } => self.on_leave_room(conn, &room_id, &username),
            ClientMsg::Ping => conn.send(ServerMsg::Pong),
        }
    }

    pub fn on_create_room(&self, conn: &Connection, room_id: &str, username: &str) {
        match self.registry.create_room(room_id, username) {
            Ok(room) => {
                self.subscribe(conn, room_id);
                conn.send(ServerMsg::RoomCreated { room_id: room_id.to_string(), room });
            }
            Err(err) => self.reject(conn, room_id, err),
        }
    }

    pub fn on_join_room(&self, conn: &Connection, room_id: &str, username: &str) {
        match self.registry.join_room(room_id, username) {
            Ok(room) => {
                self.subscribe(conn, room_id);
                conn.send(ServerMsg::RoomJoined { room_id: room_id.to_string() });
                self.broadcast(room_id, ServerMsg::GameUpdate { room_id: room_id.to_string(), room });
            }
            Err(err) => self.reject(conn, room_id, err),
        }
    }

    pub fn on_rejoin_room(&self, conn: &Connection, room_id: &str, username: &str) {
        match self.registry.rejoin_room(room_id, username) {
            Ok(room) => {
                self.subscribe(conn, room_id);
                conn.send(ServerMsg::GameUpdate { room_id: room_id.to_string(), room });
            }
            Err(err) => self.reject(conn, room_id, err),
        }
    }

    pub fn on_make_move(&self, conn: &Connection, room_id: &str, position: i64, username: &str) {
        // Negative input maps past the board and fails validation in the registry.
        let position = usize::try_from(position).unwrap_or(usize::MAX);
        match self.registry.make_move(room_id, position, username) {
            Ok(room) => self.broadcast(room_id, ServerMsg::GameUpdate { room_id: room_id.to_string(), room }),
            Err(err) => self.reject(conn, room_id, err),
        }
    }

    /// Unsubscribes without touching the game; no reply is sent either way.
    pub fn on_leave_room(&self, conn: &Connection, room_id: &str, username: &str) {
        if let Err(err) = self.registry.leave_room(room_id, username) {
            tracing::debug!(conn_id = %conn.id(), %room_id, %err, "leave for unknown membership");
        }
        let removed = self.memberships.remove_if(&conn.id(), |_, r| r == room_id);
        if removed.is_some() {
            self.remove_subscriber(room_id, conn.id());
        }
    }

    pub fn on_disconnect(&self, conn: &Connection) {
        if let Some((_, room_id)) = self.memberships.remove(&conn.id()) {
            self.remove_subscriber(&room_id, conn.id());
            tracing::debug!(conn_id = %conn.id(), %room_id, "unsubscribed on disconnect");
        }
    }

    /// Expires rooms in the registry and forgets their subscribers.
    pub fn prune_rooms(&self, now: Instant, finished_ttl: Duration, idle_ttl: Duration) -> Vec<String> {
        let removed = self.registry.prune(now, finished_ttl, idle_ttl);
        if !removed.is_empty() {
            for room_id in &removed {
                self.subscribers.remove(room_id);
            }
            self.memberships.retain(|_, room_id| !removed.contains(room_id));
            tracing::info!(count = removed.len(), rooms = ?removed, "pruned rooms");
        }
        removed
    }

    fn reject(&self, conn: &Connection, room_id: &str, err: RoomError) {
        tracing::debug!(conn_id = %conn.id(), username = %conn.username(), %room_id, %err, "request rejected");
        conn.send(ServerMsg::error(err));
    }

    fn subscribe(&self, conn: &Connection, room_id: &str) {
        let previous = self.memberships.insert(conn.id(), room_id.to_string());
        if let Some(previous) = previous.filter(|p| p != room_id) {
            self.remove_subscriber(&previous, conn.id());
        }
        self.subscribers
            .entry(room_id.to_string())
            .or_default()
            .insert(conn.id(), conn.outbox.clone());
        tracing::debug!(conn_id = %conn.id(), %room_id, "subscribed");
    }

    fn remove_subscriber(&self, room_id: &str, id: ConnectionId) {
        if let Some(mut subs) = self.subscribers.get_mut(room_id) {
            subs.remove(&id);
        }
        self.subscribers.remove_if(room_id, |_, subs| subs.is_empty());
    }

    fn broadcast(&self, room_id: &str, msg: ServerMsg) {
        if let Some(subs) = self.subscribers.get(room_id) {
            for outbox in subs.values() {
                let _ = outbox.send(msg.clone());
            }
        }
    }
}

/// Periodically expires rooms until `shutdown` fires.
pub async fn run_reaper(
    gateway: Arc<ConnectionGateway>,
    every: Duration,
    finished_ttl: Duration,
    idle_ttl: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                gateway.prune_rooms(Instant::now(), finished_ttl, idle_ttl);
            }
        }
    }
    tracing::debug!("room reaper stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::room::registry::Status;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn gateway() -> ConnectionGateway {
        ConnectionGateway::new(Arc::new(RoomRegistry::new()))
    }

    fn connect(name: &str) -> (Connection, UnboundedReceiver<ServerMsg>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Connection::new(name, tx), rx)
    }

    fn drain(rx: &mut UnboundedReceiver<ServerMsg>) -> Vec<ServerMsg> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() { out.push(msg); }
        out
    }

    fn create(room_id: &str, username: &str) -> ClientMsg {
        ClientMsg::CreateRoom { room_id: room_id.into(), username: username.into() }
    }

    fn join(room_id: &str, username: &str) -> ClientMsg {
        ClientMsg::JoinRoom { room_id: room_id.into(), username: username.into() }
    }

    fn mv(room_id: &str, position: i64, username: &str) -> ClientMsg {
        ClientMsg::MakeMove { room_id: room_id.into(), position, username: username.into() }
    }

    #[test]
    fn create_replies_to_creator_only() {
        let gw = gateway();
        let (alice, mut alice_rx) = connect("alice");
        gw.dispatch(&alice, create("r1", "alice"));
        let msgs = drain(&mut alice_rx);
        assert_eq!(msgs.len(), 1);
        assert!(matches!(&msgs[0], ServerMsg::RoomCreated { room_id, room } if room_id == "r1" && room.players == ["alice"]));
        assert_eq!(gw.subscriber_count("r1"), 1);
    }

    #[test]
    fn join_broadcasts_to_both_players() {
        let gw = gateway();
        let (alice, mut alice_rx) = connect("alice");
        let (bob, mut bob_rx) = connect("bob");
        gw.dispatch(&alice, create("r1", "alice"));
        drain(&mut alice_rx);

        gw.dispatch(&bob, join("r1", "bob"));
        let to_alice = drain(&mut alice_rx);
        let to_bob = drain(&mut bob_rx);
        assert_eq!(to_alice.len(), 1);
        assert!(matches!(&to_alice[0], ServerMsg::GameUpdate { room, .. } if room.game_state.status == Status::Playing));
        assert_eq!(to_bob[0], ServerMsg::RoomJoined { room_id: "r1".into() });
        assert_eq!(to_bob[1], to_alice[0]);
    }

    #[test]
    fn errors_go_to_sender_only() {
        let gw = gateway();
        let (alice, mut alice_rx) = connect("alice");
        let (bob, mut bob_rx) = connect("bob");
        gw.dispatch(&alice, create("r1", "alice"));
        gw.dispatch(&bob, join("r1", "bob"));
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        gw.dispatch(&bob, mv("r1", 0, "bob"));
        assert_eq!(drain(&mut bob_rx), vec![ServerMsg::error("Not your turn")]);
        assert!(drain(&mut alice_rx).is_empty());

        gw.dispatch(&alice, mv("r1", -3, "alice"));
        assert_eq!(drain(&mut alice_rx), vec![ServerMsg::error("Invalid position")]);
        assert!(drain(&mut bob_rx).is_empty());
    }

    #[test]
    fn moves_broadcast_snapshots() {
        let gw = gateway();
        let (alice, mut alice_rx) = connect("alice");
        let (bob, mut bob_rx) = connect("bob");
        gw.dispatch(&alice, create("r1", "alice"));
        gw.dispatch(&bob, join("r1", "bob"));
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        gw.dispatch(&alice, mv("r1", 4, "alice"));
        let a = drain(&mut alice_rx);
        let b = drain(&mut bob_rx);
        assert_eq!(a, b);
        assert!(matches!(&a[0], ServerMsg::GameUpdate { room, .. } if room.current_player == "bob"));
    }

    #[test]
    fn username_must_match_connection() {
        let gw = gateway();
        let (alice, mut alice_rx) = connect("alice");
        gw.dispatch(&alice, create("r1", "bob"));
        assert_eq!(drain(&mut alice_rx), vec![ServerMsg::error(GatewayError::UsernameMismatch)]);
        assert!(gw.registry().snapshot("r1").is_none());
    }

    #[test]
    fn ping_gets_pong() {
        let gw = gateway();
        let (alice, mut alice_rx) = connect("alice");
        gw.dispatch(&alice, ClientMsg::Ping);
        assert_eq!(drain(&mut alice_rx), vec![ServerMsg::Pong]);
    }

    #[test]
    fn disconnect_keeps_membership_and_rejoin_restores_updates() {
        let gw = gateway();
        let (alice, mut alice_rx) = connect("alice");
        let (bob, _bob_rx) = connect("bob");
        gw.dispatch(&alice, create("r1", "alice"));
        gw.dispatch(&bob, join("r1", "bob"));
        gw.on_disconnect(&bob);
        assert_eq!(gw.subscriber_count("r1"), 1);

        gw.dispatch(&alice, mv("r1", 0, "alice"));
        drain(&mut alice_rx);

        let (bob2, mut bob2_rx) = connect("bob");
        gw.dispatch(&bob2, ClientMsg::RejoinRoom { room_id: "r1".into(), username: "bob".into() });
        let msgs = drain(&mut bob2_rx);
        assert_eq!(msgs.len(), 1);
        assert!(matches!(&msgs[0], ServerMsg::GameUpdate { room, .. } if room.current_player == "bob"));
        // Rejoin is not re-broadcast.
        assert!(drain(&mut alice_rx).is_empty());
        assert_eq!(gw.subscriber_count("r1"), 2);

        gw.dispatch(&bob2, mv("r1", 4, "bob"));
        assert_eq!(drain(&mut alice_rx).len(), 1);
        assert_eq!(drain(&mut bob2_rx).len(), 1);
    }

    #[test]
    fn leave_unsubscribes_without_reply() {
        let gw = gateway();
        let (alice, mut alice_rx) = connect("alice");
        gw.dispatch(&alice, create("r1", "alice"));
        drain(&mut alice_rx);

        gw.dispatch(&alice, ClientMsg::LeaveRoom { room_id: "r1".into(), username: "alice".into() });
        assert!(drain(&mut alice_rx).is_empty());
        assert_eq!(gw.subscriber_count("r1"), 0);
        assert_eq!(gw.subscribed_room(alice.id()), None);
        assert_eq!(gw.registry().snapshot("r1").map(|r| r.players), Some(vec!["alice".to_string()]));
    }

    #[test]
    fn subscribing_elsewhere_drops_previous_room() {
        let gw = gateway();
        let (alice, _alice_rx) = connect("alice");
        gw.dispatch(&alice, create("r1", "alice"));
        gw.dispatch(&alice, create("r2", "alice"));
        assert_eq!(gw.subscriber_count("r1"), 0);
        assert_eq!(gw.subscriber_count("r2"), 1);
        assert_eq!(gw.subscribed_room(alice.id()).as_deref(), Some("r2"));
    }

    #[test]
    fn prune_forgets_subscribers() {
        let gw = gateway();
        let (alice, _alice_rx) = connect("alice");
        gw.dispatch(&alice, create("r1", "alice"));
        let later = Instant::now() + Duration::from_secs(10);
        let removed = gw.prune_rooms(later, Duration::from_secs(1), Duration::from_secs(5));
        assert_eq!(removed, vec!["r1".to_string()]);
        assert_eq!(gw.subscriber_count("r1"), 0);
        assert_eq!(gw.subscribed_room(alice.id()), None);
    }

    #[tokio::test]
    async fn reaper_expires_finished_rooms() {
        let gw = Arc::new(gateway());
        let (alice, _a) = connect("alice");
        let (bob, _b) = connect("bob");
        gw.dispatch(&alice, create("r1", "alice"));
        gw.dispatch(&bob, join("r1", "bob"));
        for (conn, pos) in [(&alice, 0), (&bob, 3), (&alice, 1), (&bob, 4), (&alice, 2)] {
            gw.dispatch(conn, mv("r1", pos, conn.username()));
        }
        gw.dispatch(&alice, create("r2", "alice"));

        let shutdown = CancellationToken::new();
        let task = tokio::spawn(run_reaper(
            gw.clone(),
            Duration::from_millis(10),
            Duration::ZERO,
            Duration::from_secs(3600),
            shutdown.clone(),
        ));
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.cancel();
        task.await.unwrap();

        assert!(gw.registry().snapshot("r1").is_none());
        assert!(gw.registry().snapshot("r2").is_some());
    }
}
