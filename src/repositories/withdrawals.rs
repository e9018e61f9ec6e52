use std::sync::Arc;

use crate::models::ledger::{EntryKind, EntryStatus, NewEntry};
use crate::models::withdrawals::{NewWithdrawal, Withdrawal, WithdrawalStatus};
use crate::repositories::ledger::LedgerRepository;
use crate::repositories::store::{new_id, now, Store};
use crate::repositories::RepositoryError;

/// Half-up rounding on cents, matching `round(amount * pct / 100)`.
pub fn tax_for(amount_cents: i64, tax_percentage: u32) -> i64 {
    (amount_cents * tax_percentage as i64 + 50) / 100
}

#[derive(Clone)]
pub struct WithdrawalRepository {
    store: Arc<Store>,
    ledger: LedgerRepository,
    minimum_withdrawal_cents: i64,
    tax_percentage: u32,
}

impl WithdrawalRepository {
    pub fn new(store: Arc<Store>, minimum_withdrawal_cents: i64, tax_percentage: u32) -> Self {
        let ledger = LedgerRepository::new(store.clone());

        WithdrawalRepository {
            store,
            ledger,
            minimum_withdrawal_cents,
            tax_percentage,
        }
    }

    /// Create a pending withdrawal: optimistic debit of the full requested
    /// amount plus the paired net and tax ledger entries, all under the user
    /// lock. The debit is refunded if an admin later rejects.
    pub async fn request(
        &self,
        user_id: &str,
        new: NewWithdrawal,
    ) -> Result<(Withdrawal, i64), RepositoryError> {
        if new.amount_cents < self.minimum_withdrawal_cents {
            return Err(RepositoryError::Validation(format!(
                "minimum withdrawal amount is {} cents",
                self.minimum_withdrawal_cents
            )));
        }
        if new.account.account_name.trim().is_empty() {
            return Err(RepositoryError::Validation(
                "account name is required".to_string(),
            ));
        }

        let _guard = self.store.lock_user(user_id).await;

        let new_balance = {
            let mut user = self
                .store
                .users
                .get_mut(user_id)
                .ok_or(RepositoryError::NotFound("user"))?;

            if user.wallet.balance_cents < new.amount_cents {
                return Err(RepositoryError::Validation(
                    "insufficient balance".to_string(),
                ));
            }

            user.wallet.balance_cents -= new.amount_cents;
            user.wallet.balance_cents
        };

        let tax_amount = tax_for(new.amount_cents, self.tax_percentage);
        let net_amount = new.amount_cents - tax_amount;

        let withdrawal = Withdrawal {
            id: new_id(),
            user_id: user_id.to_string(),
            amount_cents: new.amount_cents,
            tax_percentage: self.tax_percentage,
            tax_amount_cents: tax_amount,
            net_amount_cents: net_amount,
            method: new.method,
            account: new.account,
            status: WithdrawalStatus::Pending,
            processed_at: None,
            remarks: None,
            created_at: now(),
        };
        self.store
            .withdrawals
            .insert(withdrawal.id.clone(), withdrawal.clone());

        let mut net_entry = NewEntry::new(
            user_id,
            EntryKind::Withdrawal,
            -net_amount,
            EntryStatus::Pending,
            format!("Withdrawal request via {:?}", withdrawal.method),
        );
        net_entry.related_withdrawal = Some(withdrawal.id.clone());
        self.ledger.append(net_entry);

        let mut tax_entry = NewEntry::new(
            user_id,
            EntryKind::Withdrawal,
            -tax_amount,
            EntryStatus::Pending,
            format!("Withdrawal tax ({}%)", self.tax_percentage),
        );
        tax_entry.related_withdrawal = Some(withdrawal.id.clone());
        self.ledger.append(tax_entry);

        Ok((withdrawal, new_balance))
    }

    pub fn list_for_user(&self, user_id: &str) -> Vec<Withdrawal> {
        let mut withdrawals: Vec<Withdrawal> = self
            .store
            .withdrawals
            .iter()
            .filter(|w| w.user_id == user_id)
            .map(|w| w.value().clone())
            .collect();

        withdrawals.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        withdrawals
    }

    pub fn list_all(&self, status: Option<WithdrawalStatus>) -> Vec<Withdrawal> {
        let mut withdrawals: Vec<Withdrawal> = self
            .store
            .withdrawals
            .iter()
            .filter(|w| status.map_or(true, |s| w.status == s))
            .map(|w| w.value().clone())
            .collect();

        withdrawals.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        withdrawals
    }

    /// Admin decision. Only a non-terminal withdrawal can transition, which
    /// makes duplicate clicks harmless: a rejection refunds exactly once.
    pub async fn decide(
        &self,
        withdrawal_id: &str,
        status: WithdrawalStatus,
        remarks: Option<String>,
    ) -> Result<Withdrawal, RepositoryError> {
        if status == WithdrawalStatus::Pending {
            return Err(RepositoryError::Validation(
                "cannot transition a withdrawal back to pending".to_string(),
            ));
        }

        let owner = self
            .store
            .withdrawals
            .get(withdrawal_id)
            .map(|w| w.user_id.clone())
            .ok_or(RepositoryError::NotFound("withdrawal"))?;

        let _guard = self.store.lock_user(&owner).await;

        let current = self
            .store
            .withdrawals
            .get(withdrawal_id)
            .map(|w| w.value().clone())
            .ok_or(RepositoryError::NotFound("withdrawal"))?;

        if current.status.is_terminal() {
            return Err(RepositoryError::Conflict(format!(
                "withdrawal already {:?}",
                current.status
            )));
        }

        if status == WithdrawalStatus::Rejected {
            let mut user = self
                .store
                .users
                .get_mut(&owner)
                .ok_or(RepositoryError::NotFound("user"))?;
            user.wallet.balance_cents += current.amount_cents;
        }

        let updated = {
            let mut withdrawal = self
                .store
                .withdrawals
                .get_mut(withdrawal_id)
                .ok_or(RepositoryError::NotFound("withdrawal"))?;

            withdrawal.status = status;
            withdrawal.remarks = remarks;
            if status.is_terminal() {
                withdrawal.processed_at = Some(now());
            }
            withdrawal.clone()
        };

        let entry_status = match status {
            WithdrawalStatus::Rejected => EntryStatus::Cancelled,
            WithdrawalStatus::Completed => EntryStatus::Completed,
            // Still in flight from the ledger's point of view.
            WithdrawalStatus::Processing | WithdrawalStatus::Pending => EntryStatus::Pending,
        };
        self.ledger
            .set_status_for_withdrawal(withdrawal_id, entry_status);

        log::info!(
            "withdrawal {} for user {} moved to {:?}",
            withdrawal_id,
            owner,
            status
        );

        Ok(updated)
    }

    pub fn count_pending(&self) -> i64 {
        self.store
            .withdrawals
            .iter()
            .filter(|w| w.status == WithdrawalStatus::Pending)
            .count() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ledger::EntryStatus;
    use crate::models::users::{User, Wallet};
    use crate::models::withdrawals::{AccountDetails, PayoutMethod};

    fn seed_user(store: &Arc<Store>, balance_cents: i64) -> String {
        let user = User {
            id: new_id(),
            username: "sami".to_string(),
            email: "sami@example.com".to_string(),
            phone: None,
            referral_code: "REFAAAA0001".to_string(),
            referred_by: None,
            wallet: Wallet {
                balance_cents,
                earnings_cents: balance_cents,
                referral_earnings_cents: 0,
            },
            current_package: None,
            package_purchase_date: None,
            tasks_completed: 0,
            referral_count: 0,
            is_active: true,
            is_admin: false,
            created_at: now(),
        };
        let id = user.id.clone();
        store.users.insert(id.clone(), user);
        id
    }

    fn withdrawal_of(amount_cents: i64) -> NewWithdrawal {
        NewWithdrawal {
            amount_cents,
            method: PayoutMethod::Easypaisa,
            account: AccountDetails {
                account_name: "Sami Ullah".to_string(),
                account_number: Some("03001234567".to_string()),
                bank_name: None,
                phone_number: None,
            },
        }
    }

    fn repo(store: &Arc<Store>) -> WithdrawalRepository {
        WithdrawalRepository::new(store.clone(), 30000, 12)
    }

    #[test]
    fn tax_rounds_half_up() {
        assert_eq!(tax_for(50000, 12), 6000);
        assert_eq!(tax_for(333, 12), 40); // 39.96 rounds up
        assert_eq!(tax_for(50, 1), 1); // exactly .5 rounds up
        assert_eq!(tax_for(100, 0), 0);
    }

    #[tokio::test]
    async fn request_debits_and_pairs_entries() {
        let store = Store::new();
        let user_id = seed_user(&store, 100_000);
        let repo = repo(&store);

        let (withdrawal, new_balance) = repo.request(&user_id, withdrawal_of(50_000)).await.unwrap();

        assert_eq!(withdrawal.tax_amount_cents, 6_000);
        assert_eq!(withdrawal.net_amount_cents, 44_000);
        assert_eq!(new_balance, 50_000);
        assert_eq!(store.get_user(&user_id).unwrap().wallet.balance_cents, 50_000);

        let pair: Vec<_> = store
            .ledger
            .iter()
            .filter(|e| e.related_withdrawal.as_deref() == Some(withdrawal.id.as_str()))
            .map(|e| e.value().clone())
            .collect();
        assert_eq!(pair.len(), 2);
        assert!(pair.iter().all(|e| e.status == EntryStatus::Pending));
        assert_eq!(pair.iter().map(|e| e.amount_cents).sum::<i64>(), -50_000);
    }

    #[tokio::test]
    async fn below_minimum_is_rejected_before_mutation() {
        let store = Store::new();
        let user_id = seed_user(&store, 100_000);
        let repo = repo(&store);

        let err = repo.request(&user_id, withdrawal_of(10_000)).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Validation(_)));
        assert_eq!(store.get_user(&user_id).unwrap().wallet.balance_cents, 100_000);
        assert!(store.ledger.is_empty());
    }

    #[tokio::test]
    async fn insufficient_balance_is_rejected_before_mutation() {
        let store = Store::new();
        let user_id = seed_user(&store, 40_000);
        let repo = repo(&store);

        let err = repo.request(&user_id, withdrawal_of(50_000)).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Validation(_)));
        assert_eq!(store.get_user(&user_id).unwrap().wallet.balance_cents, 40_000);
        assert!(store.ledger.is_empty());
    }

    #[tokio::test]
    async fn empty_account_name_is_rejected() {
        let store = Store::new();
        let user_id = seed_user(&store, 100_000);
        let repo = repo(&store);

        let mut new = withdrawal_of(50_000);
        new.account.account_name = "  ".to_string();
        let err = repo.request(&user_id, new).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Validation(_)));
    }

    #[tokio::test]
    async fn reject_refunds_exactly_once() {
        let store = Store::new();
        let user_id = seed_user(&store, 100_000);
        let repo = repo(&store);

        let (withdrawal, _) = repo.request(&user_id, withdrawal_of(50_000)).await.unwrap();

        let rejected = repo
            .decide(&withdrawal.id, WithdrawalStatus::Rejected, Some("bad IBAN".to_string()))
            .await
            .unwrap();
        assert_eq!(rejected.status, WithdrawalStatus::Rejected);
        assert!(rejected.processed_at.is_some());
        assert_eq!(store.get_user(&user_id).unwrap().wallet.balance_cents, 100_000);

        // Duplicate admin click: no second refund.
        let err = repo
            .decide(&withdrawal.id, WithdrawalStatus::Rejected, None)
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
        assert_eq!(store.get_user(&user_id).unwrap().wallet.balance_cents, 100_000);

        assert!(store
            .ledger
            .iter()
            .filter(|e| e.related_withdrawal.as_deref() == Some(withdrawal.id.as_str()))
            .all(|e| e.status == EntryStatus::Cancelled));
    }

    #[tokio::test]
    async fn processing_then_completed_moves_the_pair() {
        let store = Store::new();
        let user_id = seed_user(&store, 100_000);
        let repo = repo(&store);

        let (withdrawal, _) = repo.request(&user_id, withdrawal_of(50_000)).await.unwrap();

        let processing = repo
            .decide(&withdrawal.id, WithdrawalStatus::Processing, None)
            .await
            .unwrap();
        assert_eq!(processing.status, WithdrawalStatus::Processing);
        assert!(processing.processed_at.is_none());

        let completed = repo
            .decide(&withdrawal.id, WithdrawalStatus::Completed, None)
            .await
            .unwrap();
        assert!(completed.processed_at.is_some());

        // Balance stays debited and the pair is settled.
        assert_eq!(store.get_user(&user_id).unwrap().wallet.balance_cents, 50_000);
        assert!(store
            .ledger
            .iter()
            .filter(|e| e.related_withdrawal.as_deref() == Some(withdrawal.id.as_str()))
            .all(|e| e.status == EntryStatus::Completed));
    }

    #[tokio::test]
    async fn cannot_transition_back_to_pending() {
        let store = Store::new();
        let user_id = seed_user(&store, 100_000);
        let repo = repo(&store);

        let (withdrawal, _) = repo.request(&user_id, withdrawal_of(50_000)).await.unwrap();
        let err = repo
            .decide(&withdrawal.id, WithdrawalStatus::Pending, None)
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Validation(_)));
    }

    #[tokio::test]
    async fn parallel_requests_never_overdraw() {
        let store = Store::new();
        let user_id = seed_user(&store, 100_000);
        let repo = repo(&store);

        let mut handles = Vec::new();
        for _ in 0..5 {
            let repo = repo.clone();
            let user_id = user_id.clone();
            handles.push(tokio::spawn(async move {
                repo.request(&user_id, withdrawal_of(30_000)).await.is_ok()
            }));
        }

        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap() {
                successes += 1;
            }
        }

        assert!(successes <= 3);
        let balance = store.get_user(&user_id).unwrap().wallet.balance_cents;
        assert_eq!(balance, 100_000 - 30_000 * successes);
        assert!(balance >= 0);
    }
}
