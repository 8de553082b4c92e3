use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::oneshot;
use tracing::debug;
use uuid::Uuid;

use crate::{config::AppConfig, crm::CrmStore, diagnosis::DiagnosisSession, glossary::Glossary};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub glossary: Arc<Glossary>,
    pub crm: Arc<Mutex<CrmStore>>,
    /// Una sesión del asistente por conversación.
    pub sessions: Arc<Mutex<SessionStore>>,
    pub shutdown_sender: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

impl AppState {
    pub fn new(config: AppConfig, shutdown_sender: Option<oneshot::Sender<()>>) -> Self {
        let sessions = SessionStore::new(
            Duration::minutes(config.session_idle_minutes),
            config.max_sessions,
        );
        Self {
            config,
            glossary: Arc::new(Glossary::nmx()),
            crm: Arc::new(Mutex::new(CrmStore::new())),
            sessions: Arc::new(Mutex::new(sessions)),
            shutdown_sender: Arc::new(Mutex::new(shutdown_sender)),
        }
    }

    pub fn crm(&self) -> MutexGuard<'_, CrmStore> {
        lock(&self.crm)
    }

    pub fn sessions(&self) -> MutexGuard<'_, SessionStore> {
        lock(&self.sessions)
    }
}

/// Un panic con el lock tomado no invalida los datos en memoria.
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct SessionEntry {
    session: DiagnosisSession,
    last_seen: DateTime<Utc>,
}

/// Sesiones del asistente con caducidad por inactividad y tope de tamaño.
pub struct SessionStore {
    idle: Duration,
    capacity: usize,
    entries: HashMap<Uuid, SessionEntry>,
}

impl SessionStore {
    pub fn new(idle: Duration, capacity: usize) -> Self {
        Self {
            idle,
            capacity,
            entries: HashMap::new(),
        }
    }

    /// Descarta las sesiones inactivas y devuelve cuántas se quitaron.
    pub fn prune_idle(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        let idle = self.idle;
        self.entries.retain(|_, entry| now - entry.last_seen < idle);
        let pruned = before - self.entries.len();
        if pruned > 0 {
            debug!("{} sesiones de diagnóstico inactivas descartadas", pruned);
        }
        pruned
    }

    /// Guarda una sesión nueva tras purgar las inactivas. Si el almacén sigue
    /// lleno, devuelve la sesión sin guardarla.
    pub fn insert(
        &mut self,
        id: Uuid,
        session: DiagnosisSession,
        now: DateTime<Utc>,
    ) -> Result<(), DiagnosisSession> {
        self.prune_idle(now);
        if self.entries.len() >= self.capacity {
            return Err(session);
        }
        self.entries.insert(
            id,
            SessionEntry {
                session,
                last_seen: now,
            },
        );
        Ok(())
    }

    /// Acceso que cuenta como actividad.
    pub fn touch(&mut self, id: &Uuid, now: DateTime<Utc>) -> Option<&mut DiagnosisSession> {
        if now - self.entries.get(id)?.last_seen >= self.idle {
            self.entries.remove(id);
            return None;
        }
        let entry = self.entries.get_mut(id)?;
        entry.last_seen = now;
        Some(&mut entry.session)
    }

    pub fn remove(&mut self, id: &Uuid) -> Option<DiagnosisSession> {
        self.entries.remove(id).map(|entry| entry.session)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SessionStore {
        SessionStore::new(Duration::minutes(30), 3)
    }

    #[test]
    fn idle_sessions_are_evicted_on_insert() {
        let mut sessions = store();
        let start = Utc::now();
        let old = Uuid::new_v4();
        sessions.insert(old, DiagnosisSession::new(), start).unwrap();

        let later = start + Duration::minutes(31);
        let fresh = Uuid::new_v4();
        sessions.insert(fresh, DiagnosisSession::new(), later).unwrap();

        assert_eq!(sessions.len(), 1);
        assert!(sessions.touch(&old, later).is_none());
        assert!(sessions.touch(&fresh, later).is_some());
    }

    #[test]
    fn activity_keeps_a_session_alive() {
        let mut sessions = store();
        let start = Utc::now();
        let id = Uuid::new_v4();
        sessions.insert(id, DiagnosisSession::new(), start).unwrap();

        let mid = start + Duration::minutes(20);
        sessions.touch(&id, mid).unwrap().answer("fuga").unwrap();

        assert_eq!(sessions.prune_idle(start + Duration::minutes(40)), 0);
        assert_eq!(sessions.prune_idle(mid + Duration::minutes(30)), 1);
    }

    #[test]
    fn expired_lookup_drops_the_entry() {
        let mut sessions = store();
        let start = Utc::now();
        let id = Uuid::new_v4();
        sessions.insert(id, DiagnosisSession::new(), start).unwrap();
        assert!(sessions.touch(&id, start + Duration::minutes(30)).is_none());
        assert_eq!(sessions.len(), 0);
    }

    #[test]
    fn full_store_rejects_new_sessions() {
        let mut sessions = store();
        let now = Utc::now();
        for _ in 0..3 {
            sessions
                .insert(Uuid::new_v4(), DiagnosisSession::new(), now)
                .unwrap();
        }
        assert!(sessions
            .insert(Uuid::new_v4(), DiagnosisSession::new(), now)
            .is_err());
        assert_eq!(sessions.len(), 3);

        // Al caducar las anteriores vuelve a haber sitio.
        let later = now + Duration::minutes(31);
        assert!(sessions
            .insert(Uuid::new_v4(), DiagnosisSession::new(), later)
            .is_ok());
        assert_eq!(sessions.len(), 1);
    }
}
