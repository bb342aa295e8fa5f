//! Session and edit-token lifecycle.
//!
//! # Responsibilities
//! - Issue bearer tokens; only one session holds edit rights at a time
//! - Expire idle sessions and auto-cancel their open candidate
//! - Reset the inactivity timer on every authorized request
//!
//! # Design Decisions
//! - The expiry timer is a spawned task guarded by an epoch counter:
//!   touching the session bumps the epoch, so a superseded timer wakes
//!   up, sees a stale epoch and exits without acting
//! - Expiry cancels the candidate through the transaction manager's own
//!   lock; the session lock is released first, so the two never nest

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use uuid::Uuid;

use crate::transaction::TransactionManager;

/// Inactivity window before an idle session is expired.
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Error, PartialEq)]
pub enum SessionError {
    #[error("another session already holds edit rights")]
    Conflict,
    #[error("unknown or expired session token")]
    Invalid,
}

struct ActiveSession {
    token: Uuid,
}

pub struct SessionManager {
    manager: Arc<TransactionManager>,
    timeout: Duration,
    active: Arc<Mutex<Option<ActiveSession>>>,
    epoch: Arc<AtomicU64>,
}

impl SessionManager {
    pub fn new(manager: Arc<TransactionManager>, timeout: Duration) -> Self {
        SessionManager {
            manager,
            timeout,
            active: Arc::new(Mutex::new(None)),
            epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Issue a token. Fails while another session is active.
    pub fn create(&self) -> Result<Uuid, SessionError> {
        let mut active = self.active.lock();
        if active.is_some() {
            return Err(SessionError::Conflict);
        }
        let token = Uuid::new_v4();
        *active = Some(ActiveSession { token });
        drop(active);

        let epoch = self.bump_epoch();
        self.spawn_expiry(token, epoch);
        tracing::info!(%token, "session created");
        Ok(token)
    }

    /// Validate a token and reset the inactivity timer.
    pub fn touch(&self, token: &Uuid) -> Result<(), SessionError> {
        self.validate(token)?;
        let epoch = self.bump_epoch();
        self.spawn_expiry(*token, epoch);
        Ok(())
    }

    /// End the session. An open candidate cannot outlive its editor and
    /// is cancelled along the way.
    pub fn end(&self, token: &Uuid) -> Result<(), SessionError> {
        let mut active = self.active.lock();
        match &*active {
            Some(session) if session.token == *token => {
                *active = None;
            }
            _ => return Err(SessionError::Invalid),
        }
        drop(active);

        self.bump_epoch();
        let _ = self.manager.cancel_candidate_config();
        tracing::info!(%token, "session ended");
        Ok(())
    }

    pub fn validate(&self, token: &Uuid) -> Result<(), SessionError> {
        let active = self.active.lock();
        match &*active {
            Some(session) if session.token == *token => Ok(()),
            _ => Err(SessionError::Invalid),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.lock().is_some()
    }

    fn bump_epoch(&self) -> u64 {
        self.epoch.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Schedule the expiry task for this activity epoch.
    fn spawn_expiry(&self, token: Uuid, epoch: u64) {
        let timeout = self.timeout;
        let epochs = Arc::clone(&self.epoch);
        let active = Arc::clone(&self.active);
        let manager = Arc::clone(&self.manager);
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if epochs.load(Ordering::SeqCst) != epoch {
                // Superseded by later activity.
                return;
            }
            let mut active = active.lock();
            match &*active {
                Some(session) if session.token == token => {
                    *active = None;
                }
                _ => return,
            }
            drop(active);

            tracing::info!(%token, "session expired, cancelling candidate");
            let _ = manager.cancel_candidate_config();
        });
    }
}
