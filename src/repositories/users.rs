use std::sync::Arc;

use uuid::Uuid;

use crate::models::ledger::{EntryKind, EntryStatus, NewEntry};
use crate::models::users::{NewUser, ReferralSummary, User, Wallet};
use crate::repositories::ledger::LedgerRepository;
use crate::repositories::store::{new_id, now, Store};
use crate::repositories::RepositoryError;

#[derive(Clone)]
pub struct UserRepository {
    store: Arc<Store>,
    ledger: LedgerRepository,
    referral_bonus_cents: i64,
}

impl UserRepository {
    pub fn new(store: Arc<Store>, referral_bonus_cents: i64) -> Self {
        let ledger = LedgerRepository::new(store.clone());

        UserRepository {
            store,
            ledger,
            referral_bonus_cents,
        }
    }

    /// Register a new user. A supplied referral code must resolve to an
    /// existing user or registration is rejected outright; on success the
    /// referrer is credited exactly once, under their own lock, with a
    /// matching completed ledger entry.
    pub async fn insert_user(&self, new: NewUser) -> Result<User, RepositoryError> {
        if new.username.trim().is_empty() || new.email.trim().is_empty() {
            return Err(RepositoryError::Validation(
                "username and email are required".to_string(),
            ));
        }

        let _registration = self.store.lock_registration().await;

        let duplicate = self
            .store
            .users
            .iter()
            .any(|u| u.username == new.username || u.email == new.email);
        if duplicate {
            return Err(RepositoryError::Conflict("user already exists".to_string()));
        }

        let referrer_id: Option<String> = match &new.referral_code {
            Some(code) => {
                let referrer = self
                    .store
                    .users
                    .iter()
                    .find(|u| u.referral_code == *code)
                    .map(|u| u.id.clone());
                match referrer {
                    Some(id) => Some(id),
                    None => {
                        return Err(RepositoryError::Validation(
                            "invalid referral code".to_string(),
                        ))
                    }
                }
            }
            None => None,
        };

        let user = User {
            id: new_id(),
            username: new.username.clone(),
            email: new.email,
            phone: new.phone,
            referral_code: self.unique_referral_code(),
            referred_by: referrer_id.clone(),
            wallet: Wallet::default(),
            current_package: None,
            package_purchase_date: None,
            tasks_completed: 0,
            referral_count: 0,
            is_active: true,
            is_admin: false,
            created_at: now(),
        };
        self.store.users.insert(user.id.clone(), user.clone());

        if let Some(referrer_id) = referrer_id {
            self.credit_referrer(&referrer_id, &new.username).await?;
        }

        Ok(user)
    }

    async fn credit_referrer(
        &self,
        referrer_id: &str,
        referred_username: &str,
    ) -> Result<(), RepositoryError> {
        let _guard = self.store.lock_user(referrer_id).await;

        {
            let mut referrer = self
                .store
                .users
                .get_mut(referrer_id)
                .ok_or(RepositoryError::NotFound("user"))?;

            referrer.wallet.balance_cents += self.referral_bonus_cents;
            referrer.wallet.referral_earnings_cents += self.referral_bonus_cents;
            referrer.referral_count += 1;
        }

        self.ledger.append(NewEntry::new(
            referrer_id,
            EntryKind::ReferralBonus,
            self.referral_bonus_cents,
            EntryStatus::Completed,
            format!("Referral bonus for inviting {}", referred_username),
        ));

        Ok(())
    }

    fn unique_referral_code(&self) -> String {
        loop {
            let code = format!(
                "REF{}",
                &Uuid::new_v4().simple().to_string()[..8].to_uppercase()
            );
            let taken = self.store.users.iter().any(|u| u.referral_code == code);
            if !taken {
                return code;
            }
        }
    }

    pub fn get_user(&self, user_id: &str) -> Result<User, RepositoryError> {
        self.store.get_user(user_id)
    }

    pub fn referrals_of(&self, user_id: &str) -> Vec<ReferralSummary> {
        let mut referred: Vec<ReferralSummary> = self
            .store
            .users
            .iter()
            .filter(|u| u.referred_by.as_deref() == Some(user_id))
            .map(|u| ReferralSummary {
                id: u.id.clone(),
                username: u.username.clone(),
                email: u.email.clone(),
                earnings_cents: u.wallet.earnings_cents,
                tasks_completed: u.tasks_completed,
                created_at: u.created_at,
            })
            .collect();

        referred.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        referred
    }

    pub fn set_active(&self, user_id: &str, active: bool) -> Result<User, RepositoryError> {
        let mut user = self
            .store
            .users
            .get_mut(user_id)
            .ok_or(RepositoryError::NotFound("user"))?;

        user.is_active = active;
        Ok(user.clone())
    }

    pub fn count_users(&self) -> i64 {
        self.store.users.iter().filter(|u| !u.is_admin).count() as i64
    }

    pub fn count_active_packages(&self) -> i64 {
        self.store
            .users
            .iter()
            .filter(|u| u.current_package.is_some())
            .count() as i64
    }
}
