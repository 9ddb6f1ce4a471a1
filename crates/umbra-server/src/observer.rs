use std::collections::{HashMap, HashSet};
use umbra_common::{ChunkPos, Position};
use umbra_shadow::DynamicVisibilityTracker;
use uuid::Uuid;

/// Name based id, stable across restarts like offline player ids.
pub fn observer_id(name: &str) -> Uuid {
    Uuid::new_v3(&Uuid::NAMESPACE_DNS, format!("OfflineObserver:{}", name).as_bytes())
}

/// Chunks within a square radius of `center`.
pub fn chunks_around(center: ChunkPos, radius: u32) -> HashSet<ChunkPos> {
    let radius = radius as i32;
    (-radius..=radius)
        .flat_map(|dx| {
            (-radius..=radius).map(move |dz| ChunkPos::new(center.x + dx, center.z + dz))
        })
        .collect()
}

pub struct ObserverSession {
    pub name: String,
    pub id: Uuid,
    pub position: Position,
    /// Set when the position changed since the last sync pass.
    pub moved: bool,
    pub tracker: DynamicVisibilityTracker,
}

impl ObserverSession {
    pub fn new(name: String, position: Position) -> Self {
        let id = observer_id(&name);
        Self {
            name,
            id,
            position,
            moved: true,
            tracker: DynamicVisibilityTracker::new(id),
        }
    }

    pub fn update_position(&mut self, position: Position) {
        if position != self.position {
            self.position = position;
            self.moved = true;
        }
    }

    pub fn watched(&self) -> HashSet<ChunkPos> {
        self.tracker.watched().collect()
    }
}

#[derive(Default)]
pub struct ObserverManager {
    sessions: HashMap<Uuid, ObserverSession>,
}

impl ObserverManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces any session with the same id.
    pub fn add_session(&mut self, session: ObserverSession) -> Option<ObserverSession> {
        self.sessions.insert(session.id, session)
    }

    pub fn remove_session(&mut self, id: Uuid) -> Option<ObserverSession> {
        self.sessions.remove(&id)
    }

    pub fn get_session(&self, id: Uuid) -> Option<&ObserverSession> {
        self.sessions.get(&id)
    }

    pub fn get_session_mut(&mut self, id: Uuid) -> Option<&mut ObserverSession> {
        self.sessions.get_mut(&id)
    }

    pub fn sessions(&self) -> impl Iterator<Item = &ObserverSession> {
        self.sessions.values()
    }

    pub fn sessions_mut(&mut self) -> impl Iterator<Item = &mut ObserverSession> {
        self.sessions.values_mut()
    }

    /// Ids of the sessions watching `chunk`.
    pub fn watching(&self, chunk: ChunkPos) -> HashSet<Uuid> {
        self.sessions
            .values()
            .filter(|session| session.tracker.is_watching(chunk))
            .map(|session| session.id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
