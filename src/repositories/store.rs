use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, MutexGuard, OwnedMutexGuard};

use crate::models::ledger::LedgerEntry;
use crate::models::packages::Package;
use crate::models::tasks::{Task, TaskCompletion};
use crate::models::users::User;
use crate::models::withdrawals::Withdrawal;
use crate::repositories::RepositoryError;

/// In-process storage engine: the four durable collections plus the catalog
/// maps, and a per-user lock table.
///
/// Every balance-affecting operation (and the quota-check-then-start step)
/// runs with the owner's lock held, so check-then-mutate sequences are atomic
/// per user. Cross-user operations never hold two user locks at once.
pub struct Store {
    pub users: DashMap<String, User>,
    pub ledger: DashMap<String, LedgerEntry>,
    pub withdrawals: DashMap<String, Withdrawal>,
    pub completions: DashMap<String, TaskCompletion>,
    pub tasks: DashMap<String, Task>,
    pub packages: DashMap<String, Package>,
    user_locks: DashMap<String, Arc<Mutex<()>>>,
    registration_lock: Mutex<()>,
}

impl Store {
    pub fn new() -> Arc<Self> {
        Arc::new(Store {
            users: DashMap::new(),
            ledger: DashMap::new(),
            withdrawals: DashMap::new(),
            completions: DashMap::new(),
            tasks: DashMap::new(),
            packages: DashMap::new(),
            user_locks: DashMap::new(),
            registration_lock: Mutex::new(()),
        })
    }

    /// Acquire the mutation lock for one user. The guard is owned so it can
    /// be held across awaits inside a repository operation.
    pub async fn lock_user(&self, user_id: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .user_locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        lock.lock_owned().await
    }

    /// Serialises registration so the duplicate username/email scan and the
    /// insert form one atomic step.
    pub async fn lock_registration(&self) -> MutexGuard<'_, ()> {
        self.registration_lock.lock().await
    }

    pub fn get_user(&self, user_id: &str) -> Result<User, RepositoryError> {
        self.users
            .get(user_id)
            .map(|u| u.value().clone())
            .ok_or(RepositoryError::NotFound("user"))
    }

    pub fn ensure_admin(&self, user_id: &str) -> Result<(), RepositoryError> {
        let user = self.get_user(user_id)?;
        if user.is_admin {
            Ok(())
        } else {
            Err(RepositoryError::Unauthorized(
                "admin privileges required".to_string(),
            ))
        }
    }
}

pub fn new_id() -> String {
    uuid::Uuid::new_v4().hyphenated().to_string()
}

pub fn now() -> chrono::NaiveDateTime {
    chrono::Utc::now().naive_utc()
}
