//! Room membership table.
//!
//! Two independent lookup tables keyed by id: room → member connections (for
//! fan-out) and connection → rooms (for disconnect cleanup).
//!
//! Every mutation or fan-out for a room runs while holding that room's map
//! entry, and enqueueing to a member never blocks, so all members observe a
//! room's events in one order. Lock order is always room entry, then the
//! connection → rooms index, then the registry. Never lock a room while
//! holding an index guard.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use roomcast_common::{ConnectionId, UserIdentity};

use super::events::ServerEvent;
use super::registry::ConnectionRegistry;
use super::session::Delivery;

#[derive(Default)]
pub struct RoomTable {
    /// room id -> member connections. A key exists iff its set is non-empty.
    rooms: DashMap<String, HashSet<ConnectionId>>,
    /// connection id -> rooms it has joined
    memberships: DashMap<ConnectionId, HashSet<String>>,
}

impl RoomTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to a room.
    ///
    /// Other members get `user-joined` (only when the connection was not
    /// already a member); the joiner gets `room-joined` with the full member
    /// snapshot. Returns that snapshot.
    pub fn join(
        &self,
        conn: &ConnectionId,
        identity: &UserIdentity,
        room_id: &str,
        registry: &ConnectionRegistry,
    ) -> Vec<UserIdentity> {
        let mut members = self.rooms.entry(room_id.to_string()).or_default();

        if members.insert(conn.clone()) {
            self.memberships
                .entry(conn.clone())
                .or_default()
                .insert(room_id.to_string());

            let joined = Arc::new(ServerEvent::UserJoined(identity.clone()));
            for member in members.iter().filter(|m| *m != conn) {
                registry.deliver(member, joined.clone());
            }
        }

        let snapshot: Vec<UserIdentity> = members
            .iter()
            .filter_map(|member| registry.identity(member))
            .collect();

        registry.deliver(
            conn,
            Arc::new(ServerEvent::RoomJoined {
                room_id: room_id.to_string(),
                members: snapshot.clone(),
            }),
        );

        snapshot
    }

    /// Remove a connection from a room and tell the remaining members.
    ///
    /// Returns `false` (and notifies nobody) if it was not a member.
    pub fn leave(
        &self,
        conn: &ConnectionId,
        identity: Option<&UserIdentity>,
        room_id: &str,
        registry: &ConnectionRegistry,
    ) -> bool {
        let Entry::Occupied(mut room) = self.rooms.entry(room_id.to_string()) else {
            return false;
        };
        if !room.get_mut().remove(conn) {
            return false;
        }

        let now_roomless = match self.memberships.get_mut(conn) {
            Some(mut rooms) => {
                rooms.remove(room_id);
                rooms.is_empty()
            }
            None => false,
        };
        if now_roomless {
            self.memberships.remove_if(conn, |_, rooms| rooms.is_empty());
        }

        if let Some(identity) = identity {
            let left = Arc::new(ServerEvent::UserLeft(identity.clone()));
            for member in room.get().iter() {
                registry.deliver(member, left.clone());
            }
        }

        if room.get().is_empty() {
            room.remove();
        }
        true
    }

    /// Leave every room the connection is in. Returns the rooms left.
    pub fn leave_all(
        &self,
        conn: &ConnectionId,
        identity: Option<&UserIdentity>,
        registry: &ConnectionRegistry,
    ) -> Vec<String> {
        let rooms = self
            .memberships
            .remove(conn)
            .map(|(_, rooms)| rooms)
            .unwrap_or_default();

        rooms
            .into_iter()
            .filter(|room_id| self.leave(conn, identity, room_id, registry))
            .collect()
    }

    /// Deliver an event to every member of a room, optionally skipping one.
    /// Returns how many members it was handed to.
    ///
    /// Holds the room's entry exclusively, like `join` and `leave`, so
    /// concurrent broadcasts reach every member in the same order.
    pub fn broadcast(
        &self,
        room_id: &str,
        event: Arc<ServerEvent>,
        except: Option<&ConnectionId>,
        registry: &ConnectionRegistry,
    ) -> usize {
        let Some(members) = self.rooms.get_mut(room_id) else {
            return 0;
        };

        members
            .iter()
            .filter(|member| Some(*member) != except)
            .filter(|member| registry.deliver(member, event.clone()) == Delivery::Sent)
            .count()
    }

    pub fn members(&self, room_id: &str) -> Vec<ConnectionId> {
        self.rooms
            .get(room_id)
            .map(|m| m.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn member_count(&self, room_id: &str) -> usize {
        self.rooms.get(room_id).map(|m| m.len()).unwrap_or(0)
    }

    pub fn contains_room(&self, room_id: &str) -> bool {
        self.rooms.contains_key(room_id)
    }

    pub fn is_member(&self, conn: &ConnectionId, room_id: &str) -> bool {
        self.rooms
            .get(room_id)
            .map(|m| m.contains(conn))
            .unwrap_or(false)
    }

    /// Rooms a connection currently belongs to.
    pub fn rooms_of(&self, conn: &ConnectionId) -> Vec<String> {
        self.memberships
            .get(conn)
            .map(|r| r.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc::Receiver;

    use super::*;
    use crate::gateway::session::{ConnectionSender, Outbound};

    struct Member {
        id: ConnectionId,
        identity: UserIdentity,
        rx: Receiver<Outbound>,
    }

    impl Member {
        fn events(&mut self) -> Vec<ServerEvent> {
            let mut out = Vec::new();
            while let Ok(item) = self.rx.try_recv() {
                if let Outbound::Event(event) = item {
                    out.push((*event).clone());
                }
            }
            out
        }
    }

    fn member(registry: &ConnectionRegistry, conn: &str, user_id: &str, name: &str) -> Member {
        member_with_capacity(registry, conn, user_id, name, 64)
    }

    fn member_with_capacity(
        registry: &ConnectionRegistry,
        conn: &str,
        user_id: &str,
        name: &str,
        capacity: usize,
    ) -> Member {
        let id = ConnectionId::from(conn);
        let (sender, rx) = ConnectionSender::with_id(id.clone(), capacity);
        registry.open(sender);
        let identity = UserIdentity::new(user_id, name);
        registry.authenticate(&id, identity.clone()).unwrap();
        Member { id, identity, rx }
    }

    #[test]
    fn join_replies_with_snapshot_and_notifies_others() {
        let registry = ConnectionRegistry::new();
        let table = RoomTable::new();
        let mut a = member(&registry, "c1", "u1", "alice");
        let mut b = member(&registry, "c2", "u2", "bob");

        table.join(&a.id, &a.identity, "r1", &registry);
        assert_eq!(
            a.events(),
            vec![ServerEvent::RoomJoined {
                room_id: "r1".into(),
                members: vec![a.identity.clone()],
            }]
        );

        let snapshot = table.join(&b.id, &b.identity, "r1", &registry);
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.contains(&a.identity));
        assert!(snapshot.contains(&b.identity));

        assert_eq!(a.events(), vec![ServerEvent::UserJoined(b.identity.clone())]);
        let b_events = b.events();
        assert_eq!(b_events.len(), 1);
        assert!(matches!(&b_events[0], ServerEvent::RoomJoined { members, .. } if members.len() == 2));
    }

    #[test]
    fn double_join_keeps_single_membership() {
        let registry = ConnectionRegistry::new();
        let table = RoomTable::new();
        let a = member(&registry, "c1", "u1", "alice");
        let mut b = member(&registry, "c2", "u2", "bob");

        table.join(&b.id, &b.identity, "r1", &registry);
        table.join(&a.id, &a.identity, "r1", &registry);
        b.events();

        table.join(&a.id, &a.identity, "r1", &registry);

        assert_eq!(table.member_count("r1"), 2);
        assert_eq!(table.rooms_of(&a.id), vec!["r1".to_string()]);
        // No duplicate presence for peers.
        assert!(b.events().is_empty());
    }

    #[test]
    fn room_exists_iff_non_empty() {
        let registry = ConnectionRegistry::new();
        let table = RoomTable::new();
        let a = member(&registry, "c1", "u1", "alice");
        let b = member(&registry, "c2", "u2", "bob");

        assert!(!table.contains_room("r1"));
        table.join(&a.id, &a.identity, "r1", &registry);
        table.join(&b.id, &b.identity, "r1", &registry);
        assert!(table.contains_room("r1"));

        assert!(table.leave(&a.id, Some(&a.identity), "r1", &registry));
        assert!(table.contains_room("r1"));

        assert!(table.leave(&b.id, Some(&b.identity), "r1", &registry));
        assert!(!table.contains_room("r1"));
        assert_eq!(table.room_count(), 0);
        assert!(table.rooms_of(&b.id).is_empty());
    }

    #[test]
    fn leave_notifies_remaining_members() {
        let registry = ConnectionRegistry::new();
        let table = RoomTable::new();
        let mut a = member(&registry, "c1", "u1", "alice");
        let mut b = member(&registry, "c2", "u2", "bob");
        table.join(&a.id, &a.identity, "r1", &registry);
        table.join(&b.id, &b.identity, "r1", &registry);
        a.events();
        b.events();

        table.leave(&b.id, Some(&b.identity), "r1", &registry);

        assert_eq!(a.events(), vec![ServerEvent::UserLeft(b.identity.clone())]);
        assert!(b.events().is_empty());
    }

    #[test]
    fn leave_when_not_member_is_noop() {
        let registry = ConnectionRegistry::new();
        let table = RoomTable::new();
        let mut a = member(&registry, "c1", "u1", "alice");
        let b = member(&registry, "c2", "u2", "bob");
        table.join(&a.id, &a.identity, "r1", &registry);
        a.events();

        assert!(!table.leave(&b.id, Some(&b.identity), "r1", &registry));
        assert!(!table.leave(&b.id, Some(&b.identity), "nowhere", &registry));

        assert!(a.events().is_empty());
        assert_eq!(table.member_count("r1"), 1);
        assert!(!table.contains_room("nowhere"));
    }

    #[test]
    fn leave_all_clears_every_room() {
        let registry = ConnectionRegistry::new();
        let table = RoomTable::new();
        let mut a = member(&registry, "c1", "u1", "alice");
        let b = member(&registry, "c2", "u2", "bob");
        table.join(&a.id, &a.identity, "r1", &registry);
        table.join(&b.id, &b.identity, "r1", &registry);
        table.join(&b.id, &b.identity, "r2", &registry);
        a.events();

        let mut left = table.leave_all(&b.id, Some(&b.identity), &registry);
        left.sort();

        assert_eq!(left, vec!["r1".to_string(), "r2".to_string()]);
        assert!(table.rooms_of(&b.id).is_empty());
        assert!(!table.is_member(&b.id, "r1"));
        assert!(!table.contains_room("r2"));
        assert_eq!(a.events(), vec![ServerEvent::UserLeft(b.identity.clone())]);
    }

    #[test]
    fn broadcast_skips_excluded_member() {
        let registry = ConnectionRegistry::new();
        let table = RoomTable::new();
        let mut a = member(&registry, "c1", "u1", "alice");
        let mut b = member(&registry, "c2", "u2", "bob");
        let mut c = member(&registry, "c3", "u3", "carol");
        for m in [&a, &b, &c] {
            table.join(&m.id, &m.identity, "r1", &registry);
        }
        a.events();
        b.events();
        c.events();

        let event = Arc::new(ServerEvent::error("ping"));
        let delivered = table.broadcast("r1", event, Some(&a.id), &registry);

        assert_eq!(delivered, 2);
        assert!(a.events().is_empty());
        assert_eq!(b.events().len(), 1);
        assert_eq!(c.events().len(), 1);
    }

    #[test]
    fn broadcast_to_unknown_room_reaches_nobody() {
        let registry = ConnectionRegistry::new();
        let table = RoomTable::new();
        assert_eq!(
            table.broadcast("ghost", Arc::new(ServerEvent::error("x")), None, &registry),
            0
        );
    }

    #[test]
    fn members_observe_presence_in_issue_order() {
        let registry = ConnectionRegistry::new();
        let table = RoomTable::new();
        let mut watcher = member(&registry, "c0", "u0", "watcher");
        table.join(&watcher.id, &watcher.identity, "r1", &registry);
        watcher.events();

        let others: Vec<Member> = (1..=5)
            .map(|n| member(&registry, &format!("c{n}"), &format!("u{n}"), &format!("user{n}")))
            .collect();
        for m in &others {
            table.join(&m.id, &m.identity, "r1", &registry);
        }
        for m in others.iter().rev() {
            table.leave(&m.id, Some(&m.identity), "r1", &registry);
        }

        let mut expected: Vec<ServerEvent> = others
            .iter()
            .map(|m| ServerEvent::UserJoined(m.identity.clone()))
            .collect();
        expected.extend(others.iter().rev().map(|m| ServerEvent::UserLeft(m.identity.clone())));
        assert_eq!(watcher.events(), expected);
    }

    #[test]
    fn concurrent_broadcasts_arrive_in_one_order_for_everyone() {
        const PER_SENDER: usize = 200;

        for _ in 0..20 {
            let registry = Arc::new(ConnectionRegistry::new());
            let table = Arc::new(RoomTable::new());
            let mut receivers: Vec<Member> = (0..6)
                .map(|n| {
                    member_with_capacity(&registry, &format!("c{n}"), &format!("u{n}"), "x", 1024)
                })
                .collect();
            for m in &receivers {
                table.join(&m.id, &m.identity, "r1", &registry);
            }
            for m in receivers.iter_mut() {
                m.events();
            }

            let senders: Vec<_> = ["a", "b"]
                .into_iter()
                .map(|tag| {
                    let registry = registry.clone();
                    let table = table.clone();
                    std::thread::spawn(move || {
                        for i in 0..PER_SENDER {
                            let event = Arc::new(ServerEvent::error(format!("{tag}{i}")));
                            table.broadcast("r1", event, None, &registry);
                        }
                    })
                })
                .collect();
            for h in senders {
                h.join().unwrap();
            }

            let first = receivers[0].events();
            assert_eq!(first.len(), 2 * PER_SENDER);
            for m in receivers.iter_mut().skip(1) {
                assert_eq!(m.events(), first);
            }
        }
    }

    #[test]
    fn concurrent_joins_and_leaves_keep_invariants() {
        let registry = Arc::new(ConnectionRegistry::new());
        let table = Arc::new(RoomTable::new());

        let handles: Vec<_> = (0..8)
            .map(|n| {
                let registry = registry.clone();
                let table = table.clone();
                std::thread::spawn(move || {
                    let m = member(&registry, &format!("c{n}"), &format!("u{n}"), "x");
                    for round in 0..50 {
                        let room = format!("r{}", round % 3);
                        table.join(&m.id, &m.identity, &room, &registry);
                        if round % 2 == 0 {
                            table.leave(&m.id, Some(&m.identity), &room, &registry);
                        }
                    }
                    table.leave_all(&m.id, Some(&m.identity), &registry);
                    drop(m.rx);
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(table.room_count(), 0);
        for n in 0..8 {
            assert!(table.rooms_of(&ConnectionId::from(format!("c{n}"))).is_empty());
        }
    }
}
