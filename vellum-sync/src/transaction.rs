//! Transaction coordinator.
//!
//! ```text
//! None ──begin──▶ Active ──commit──▶ Committed
//!                   │  ▲
//!                renew │ ──rollback─▶ RolledBack
//!                   │
//!                   └──lease lapses─▶ Expired
//! ```
//!
//! Every call made while `Active` carries the transaction location through
//! [`Transaction::options`]. A transaction dropped while still `Active` is
//! rolled back.

use chrono::{DateTime, Duration, Utc};

use crate::error::SyncError;
use crate::repository::{Repository, RequestOptions, TransactionReply};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    None,
    Active,
    Committed,
    RolledBack,
    Expired,
}

pub struct Transaction<'r> {
    repo: &'r dyn Repository,
    state: TxState,
    location: Option<String>,
    expires: Option<DateTime<Utc>>,
}

impl<'r> Transaction<'r> {
    pub fn new(repo: &'r dyn Repository) -> Self {
        Self {
            repo,
            state: TxState::None,
            location: None,
            expires: None,
        }
    }

    pub fn state(&self) -> TxState {
        self.state
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    pub fn expires(&self) -> Option<DateTime<Utc>> {
        self.expires
    }

    /// Request options scoped to this transaction while it is active.
    pub fn options(&self) -> RequestOptions {
        let scope = match self.state {
            TxState::Active => self.location.as_deref(),
            _ => None,
        };
        RequestOptions::new().in_transaction(scope)
    }

    /// Begin. When the repository does not advertise an expiry the lease is
    /// renewed straight away to learn it.
    pub fn begin(&mut self) -> Result<(), SyncError> {
        if self.state != TxState::None {
            return Err(SyncError::TransactionNotActive);
        }
        let handle = self.repo.begin_transaction()?;
        tracing::info!("transaction {} begun", handle.location);
        self.location = Some(handle.location);
        self.expires = handle.expires;
        self.state = TxState::Active;
        if self.expires.is_none() {
            self.renew()?;
        }
        Ok(())
    }

    fn active_location(&self) -> Result<String, SyncError> {
        match (&self.state, &self.location) {
            (TxState::Active, Some(location)) => Ok(location.clone()),
            _ => Err(SyncError::TransactionNotActive),
        }
    }

    /// Map a non-`Ok` reply to its typed failure, updating the state.
    fn fail(&mut self, location: String, reply: TransactionReply) -> SyncError {
        match reply {
            TransactionReply::Conflict => SyncError::CommitConflict { location },
            TransactionReply::Gone => {
                self.state = TxState::Expired;
                SyncError::TransactionExpired { location }
            }
            TransactionReply::NotFound => {
                self.state = TxState::Expired;
                SyncError::TransactionNotFound { location }
            }
            TransactionReply::Ok { .. } => SyncError::TransactionNotActive,
        }
    }

    pub fn renew(&mut self) -> Result<(), SyncError> {
        let location = self.active_location()?;
        match self.repo.renew_transaction(&location)? {
            TransactionReply::Ok { expires } => {
                tracing::debug!(
                    "transaction {location} renewed until {}",
                    expires.map(|e| e.to_rfc3339()).unwrap_or_else(|| "unknown".into())
                );
                self.expires = expires;
                Ok(())
            }
            other => Err(self.fail(location, other)),
        }
    }

    /// Renew when less than `margin` of the lease remains. A lease that has
    /// already lapsed fails with [`SyncError::TransactionExpired`].
    pub fn renew_if_needed(&mut self, margin: Duration) -> Result<(), SyncError> {
        let location = self.active_location()?;
        let now = Utc::now();
        match self.expires {
            Some(expires) if expires <= now => {
                self.state = TxState::Expired;
                Err(SyncError::TransactionExpired { location })
            }
            Some(expires) if expires - now >= margin => Ok(()),
            _ => self.renew(),
        }
    }

    pub fn commit(&mut self) -> Result<(), SyncError> {
        let location = self.active_location()?;
        match self.repo.commit_transaction(&location)? {
            TransactionReply::Ok { .. } => {
                tracing::info!("transaction {location} committed");
                self.state = TxState::Committed;
                Ok(())
            }
            other => Err(self.fail(location, other)),
        }
    }

    /// Roll back if still active; a no-op in every other state.
    pub fn rollback(&mut self) -> Result<(), SyncError> {
        let Ok(location) = self.active_location() else {
            return Ok(());
        };
        self.state = TxState::RolledBack;
        match self.repo.rollback_transaction(&location)? {
            TransactionReply::Ok { .. } => {
                tracing::error!("transaction {location} rolled back");
            }
            TransactionReply::Gone | TransactionReply::NotFound => {
                tracing::error!("transaction {location} rolled back (already ended at the repository)");
            }
            TransactionReply::Conflict => {
                tracing::warn!("transaction {location}: conflict reported on rollback");
            }
        }
        Ok(())
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.state == TxState::Active {
            if let Err(e) = self.rollback() {
                tracing::error!("rollback on drop failed: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryRepository;

    #[test]
    fn begin_without_advertised_expiry_renews_immediately() {
        let repo = MemoryRepository::new();
        repo.set_advertise_expiry(false);
        let mut tx = Transaction::new(&repo);
        tx.begin().expect("begin");
        assert_eq!(tx.state(), TxState::Active);
        assert!(tx.expires().is_some());
        assert_eq!(repo.calls().renew, 1);
        tx.commit().expect("commit");
    }

    #[test]
    fn options_carry_location_only_while_active() {
        let repo = MemoryRepository::new();
        let mut tx = Transaction::new(&repo);
        assert!(tx.options().transaction.is_none());
        tx.begin().expect("begin");
        assert_eq!(tx.options().transaction.as_deref(), tx.location());
        tx.commit().expect("commit");
        assert!(tx.options().transaction.is_none());
    }

    #[test]
    fn renews_only_inside_margin() {
        let repo = MemoryRepository::new();
        repo.set_lease(Duration::minutes(10));
        let mut tx = Transaction::new(&repo);
        tx.begin().expect("begin");
        tx.renew_if_needed(Duration::seconds(60)).expect("renew");
        assert_eq!(repo.calls().renew, 0);
        tx.renew_if_needed(Duration::minutes(20)).expect("renew");
        assert_eq!(repo.calls().renew, 1);
        tx.rollback().expect("rollback");
    }

    #[test]
    fn lapsed_lease_is_expired() {
        let repo = MemoryRepository::new();
        repo.set_lease(Duration::seconds(-1));
        let mut tx = Transaction::new(&repo);
        tx.begin().expect("begin");
        let err = tx.renew_if_needed(Duration::seconds(60)).unwrap_err();
        assert!(matches!(err, SyncError::TransactionExpired { .. }));
        assert_eq!(tx.state(), TxState::Expired);
        tx.rollback().expect("no-op");
        assert_eq!(repo.calls().rollback, 0);
    }

    #[test]
    fn conflict_is_a_typed_failure() {
        let repo = MemoryRepository::new();
        let mut tx = Transaction::new(&repo);
        tx.begin().expect("begin");
        repo.create_container("", &RequestOptions::new().slug("elsewhere"))
            .expect("outside change");
        let err = tx.commit().unwrap_err();
        assert!(matches!(err, SyncError::CommitConflict { .. }));
        assert_ne!(tx.state(), TxState::Committed);
    }

    #[test]
    fn rollback_happens_once_and_on_drop() {
        let repo = MemoryRepository::new();
        {
            let mut tx = Transaction::new(&repo);
            tx.begin().expect("begin");
            tx.rollback().expect("rollback");
            tx.rollback().expect("again");
        }
        assert_eq!(repo.calls().rollback, 1);
        {
            let mut tx = Transaction::new(&repo);
            tx.begin().expect("begin");
        }
        assert_eq!(repo.calls().rollback, 2);
        assert_eq!(repo.active_transactions(), 0);
    }
}
