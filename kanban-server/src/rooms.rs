//! Live rooms: which WebSocket sessions watch which project.
//!
//! Each connected session registers an outbound channel. A session joins
//! the room of every project it has open; board events for a project are
//! fanned out to the sessions in its room. Sessions are also indexed by
//! user so notification events can reach every tab a user has open.
//!
//! Room state is ephemeral and process-local: a client that reconnects
//! must fetch the board again.

use std::collections::{HashMap, HashSet};

use axum::extract::ws::{Message, Utf8Bytes};
use kanban_proto::codec;
use kanban_proto::event::{BoardEvent, ServerFrame};
use kanban_proto::ids::{ProjectId, SessionId, UserId};
use parking_lot::RwLock;
use tokio::sync::mpsc;

/// Maximum number of rooms a single session may be in at once.
pub const MAX_ROOMS_PER_SESSION: usize = 64;

/// Channel half used to push frames to a session's socket writer.
pub type Outbound = mpsc::UnboundedSender<Message>;

/// Destination for board events.
///
/// [`RoomRegistry`] delivers to sessions connected to this process; other
/// implementations can forward to a shared bus so several server instances
/// see each other's events.
pub trait EventSink: Send + Sync {
    /// Delivers a task event to every session in the project's room,
    /// returning the number of sessions reached.
    fn publish(&self, project_id: ProjectId, event: &BoardEvent) -> usize;

    /// Delivers an event to every session of one user, returning the number
    /// of sessions reached.
    fn notify_user(&self, user_id: UserId, event: &BoardEvent) -> usize;

    /// Takes every session of `user_id` out of the project's room after the
    /// user lost access, returning the number of sessions removed.
    fn evict_user(&self, project_id: ProjectId, user_id: UserId) -> usize;
}

/// Errors that can occur during room operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    /// The session is not connected.
    #[error("unknown session: {0}")]
    UnknownSession(SessionId),
    /// The session has joined too many rooms.
    #[error("too many open projects (max {MAX_ROOMS_PER_SESSION})")]
    TooManyRooms,
    /// The session tried to relay into a room it has not joined.
    #[error("not joined to project {0}")]
    NotJoined(ProjectId),
    /// Only task events can be relayed between clients.
    #[error("only task events can be relayed")]
    NotRelayable,
}

struct Session {
    user: UserId,
    sender: Outbound,
    rooms: HashSet<ProjectId>,
}

#[derive(Default)]
struct Registry {
    sessions: HashMap<SessionId, Session>,
    rooms: HashMap<ProjectId, HashSet<SessionId>>,
}

impl Registry {
    fn remove_session(&mut self, id: SessionId) -> Option<Session> {
        let session = self.sessions.remove(&id)?;
        for project in &session.rooms {
            if let Some(members) = self.rooms.get_mut(project) {
                members.remove(&id);
                if members.is_empty() {
                    self.rooms.remove(project);
                }
            }
        }
        Some(session)
    }
}

/// Registry of live sessions and project rooms.
pub struct RoomRegistry {
    inner: RwLock<Registry>,
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Registry::default()),
        }
    }

    /// Registers a connected session.
    pub fn connect(&self, session: SessionId, user: UserId, sender: Outbound) {
        self.inner.write().sessions.insert(
            session,
            Session {
                user,
                sender,
                rooms: HashSet::new(),
            },
        );
    }

    /// Removes a session from the registry and from every room it joined.
    ///
    /// Returns the number of rooms it was in.
    pub fn disconnect(&self, session: SessionId) -> usize {
        self.inner
            .write()
            .remove_session(session)
            .map_or(0, |s| s.rooms.len())
    }

    /// Adds a session to a project's room.
    ///
    /// Joining a room twice is harmless; returns `true` only when the session
    /// was not already in the room.
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::UnknownSession`] or [`RoomError::TooManyRooms`].
    pub fn join(&self, session: SessionId, project: ProjectId) -> Result<bool, RoomError> {
        let mut inner = self.inner.write();
        let entry = inner
            .sessions
            .get_mut(&session)
            .ok_or(RoomError::UnknownSession(session))?;
        if entry.rooms.contains(&project) {
            return Ok(false);
        }
        if entry.rooms.len() >= MAX_ROOMS_PER_SESSION {
            return Err(RoomError::TooManyRooms);
        }
        entry.rooms.insert(project);
        inner.rooms.entry(project).or_default().insert(session);
        drop(inner);
        Ok(true)
    }

    /// Removes a session from a project's room. Returns `true` if it was in it.
    pub fn leave(&self, session: SessionId, project: ProjectId) -> bool {
        let mut inner = self.inner.write();
        let was_in = inner
            .sessions
            .get_mut(&session)
            .is_some_and(|s| s.rooms.remove(&project));
        if let Some(members) = inner.rooms.get_mut(&project) {
            members.remove(&session);
            if members.is_empty() {
                inner.rooms.remove(&project);
            }
        }
        drop(inner);
        was_in
    }

    /// Whether a session is in a project's room.
    #[must_use]
    pub fn is_member(&self, session: SessionId, project: ProjectId) -> bool {
        self.inner
            .read()
            .rooms
            .get(&project)
            .is_some_and(|m| m.contains(&session))
    }

    /// Number of sessions in a project's room.
    #[must_use]
    pub fn room_size(&self, project: ProjectId) -> usize {
        self.inner.read().rooms.get(&project).map_or(0, HashSet::len)
    }

    /// Number of connected sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.inner.read().sessions.len()
    }

    /// Removes every session from a project's room, e.g. after the project
    /// was deleted. Returns how many sessions were in it.
    pub fn close_room(&self, project: ProjectId) -> usize {
        let mut inner = self.inner.write();
        let Some(members) = inner.rooms.remove(&project) else {
            return 0;
        };
        for id in &members {
            if let Some(session) = inner.sessions.get_mut(id) {
                session.rooms.remove(&project);
            }
        }
        drop(inner);
        members.len()
    }

    /// Removes one user's sessions from a project's room. Other members and
    /// the sessions themselves are untouched.
    pub fn evict(&self, project: ProjectId, user: UserId) -> usize {
        let mut inner = self.inner.write();
        let Registry { sessions, rooms } = &mut *inner;
        let Some(members) = rooms.get_mut(&project) else {
            return 0;
        };
        let mut evicted = 0;
        members.retain(|id| match sessions.get_mut(id) {
            Some(session) if session.user == user => {
                session.rooms.remove(&project);
                evicted += 1;
                false
            }
            _ => true,
        });
        if members.is_empty() {
            rooms.remove(&project);
        }
        drop(inner);
        evicted
    }

    /// Sends a frame to one session. Returns `false` if the session is gone.
    pub fn send_to(&self, session: SessionId, frame: &ServerFrame) -> bool {
        let Some(payload) = encode(frame) else {
            return false;
        };
        let delivered = self
            .inner
            .read()
            .sessions
            .get(&session)
            .is_some_and(|s| s.sender.send(Message::Text(payload)).is_ok());
        if !delivered {
            self.prune(&[session]);
        }
        delivered
    }

    /// Forwards a task event produced by a client to the other members of
    /// the room, excluding the sender.
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::NotRelayable`] for events without a project and
    /// [`RoomError::NotJoined`] when the sender is not in the room.
    pub fn relay_from(&self, sender: SessionId, event: &BoardEvent) -> Result<usize, RoomError> {
        let project = event.project_id().ok_or(RoomError::NotRelayable)?;
        let targets: Vec<SessionId> = {
            let inner = self.inner.read();
            let members = inner
                .rooms
                .get(&project)
                .filter(|m| m.contains(&sender))
                .ok_or(RoomError::NotJoined(project))?;
            members.iter().copied().filter(|id| *id != sender).collect()
        };
        Ok(self.deliver(&targets, event))
    }

    fn deliver(&self, targets: &[SessionId], event: &BoardEvent) -> usize {
        if targets.is_empty() {
            return 0;
        }
        let Some(payload) = encode(&ServerFrame::Event(event.clone())) else {
            return 0;
        };
        let mut dead = Vec::new();
        let mut delivered = 0;
        {
            let inner = self.inner.read();
            for id in targets {
                match inner.sessions.get(id) {
                    Some(s) if s.sender.send(Message::Text(payload.clone())).is_ok() => {
                        delivered += 1;
                    }
                    Some(_) => dead.push(*id),
                    None => {}
                }
            }
        }
        if !dead.is_empty() {
            self.prune(&dead);
        }
        delivered
    }

    fn prune(&self, dead: &[SessionId]) {
        let mut inner = self.inner.write();
        for id in dead {
            if inner.remove_session(*id).is_some() {
                tracing::debug!(session_id = %id, "pruned closed session");
            }
        }
    }
}

impl EventSink for RoomRegistry {
    fn publish(&self, project_id: ProjectId, event: &BoardEvent) -> usize {
        let targets: Vec<SessionId> = self
            .inner
            .read()
            .rooms
            .get(&project_id)
            .map(|m| m.iter().copied().collect())
            .unwrap_or_default();
        let delivered = self.deliver(&targets, event);
        tracing::debug!(
            project_id = %project_id,
            event = event.name(),
            delivered,
            "published board event"
        );
        delivered
    }

    fn notify_user(&self, user_id: UserId, event: &BoardEvent) -> usize {
        let targets: Vec<SessionId> = self
            .inner
            .read()
            .sessions
            .iter()
            .filter(|(_, s)| s.user == user_id)
            .map(|(id, _)| *id)
            .collect();
        self.deliver(&targets, event)
    }

    fn evict_user(&self, project_id: ProjectId, user_id: UserId) -> usize {
        let evicted = self.evict(project_id, user_id);
        tracing::debug!(project_id = %project_id, user_id = %user_id, evicted, "evicted user from room");
        evicted
    }
}

fn encode(frame: &ServerFrame) -> Option<Utf8Bytes> {
    match codec::encode_server(frame) {
        Ok(text) => Some(Utf8Bytes::from(text)),
        Err(e) => {
            tracing::warn!(error = %e, "failed to encode server frame");
            None
        }
    }
}
