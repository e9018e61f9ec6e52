use std::sync::Arc;

use crate::models::ledger::{
    EntryKind, EntryStatus, LedgerEntry, NewEntry, TransactionStats, WalletReconciliation,
};
use crate::repositories::store::{new_id, now, Store};
use crate::repositories::RepositoryError;

/// Append-only view over the ledger collection. Balance mutations themselves
/// happen in the owning repositories while the user lock is held; this
/// repository guarantees the entries they pair with land in the same locked
/// section and are never deleted afterwards.
#[derive(Clone)]
pub struct LedgerRepository {
    store: Arc<Store>,
}

impl LedgerRepository {
    pub fn new(store: Arc<Store>) -> Self {
        LedgerRepository { store }
    }

    pub fn append(&self, new: NewEntry) -> LedgerEntry {
        let entry = LedgerEntry {
            id: new_id(),
            user_id: new.user_id,
            kind: new.kind,
            amount_cents: new.amount_cents,
            status: new.status,
            description: new.description,
            related_task: new.related_task,
            related_package: new.related_package,
            related_withdrawal: new.related_withdrawal,
            payment_proof: new.payment_proof,
            external_ref: new.external_ref,
            created_at: now(),
        };

        self.store.ledger.insert(entry.id.clone(), entry.clone());
        entry
    }

    pub fn entries_for_user(
        &self,
        user_id: &str,
        kind: Option<EntryKind>,
        limit: usize,
    ) -> Vec<LedgerEntry> {
        let mut entries: Vec<LedgerEntry> = self
            .store
            .ledger
            .iter()
            .filter(|e| e.user_id == user_id)
            .filter(|e| kind.map_or(true, |k| e.kind == k))
            .map(|e| e.value().clone())
            .collect();

        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        entries.truncate(limit);
        entries
    }

    /// Flip both entries of a withdrawal pair. The explicit link replaces the
    /// reference system's ±1 second timestamp window, which misbehaves under
    /// clock skew or bursty concurrent requests.
    pub fn set_status_for_withdrawal(&self, withdrawal_id: &str, status: EntryStatus) {
        for mut entry in self.store.ledger.iter_mut() {
            if entry.related_withdrawal.as_deref() == Some(withdrawal_id) {
                entry.status = status;
            }
        }
    }

    pub fn pending_purchase_entry(&self, user_id: &str, package_id: &str) -> Option<LedgerEntry> {
        self.store
            .ledger
            .iter()
            .find(|e| {
                e.user_id == user_id
                    && e.kind == EntryKind::PackagePurchase
                    && e.status == EntryStatus::Pending
                    && e.related_package.as_deref() == Some(package_id)
            })
            .map(|e| e.value().clone())
    }

    pub fn set_status(&self, entry_id: &str, status: EntryStatus) -> Result<(), RepositoryError> {
        let mut entry = self
            .store
            .ledger
            .get_mut(entry_id)
            .ok_or(RepositoryError::NotFound("ledger entry"))?;

        entry.status = status;
        Ok(())
    }

    /// Per-kind totals over the user's non-cancelled entries. Cancelled
    /// entries are refunded withdrawals and must not count as spend.
    pub fn stats_for_user(&self, user_id: &str) -> TransactionStats {
        let mut stats = TransactionStats::default();

        for entry in self.store.ledger.iter() {
            if entry.user_id != user_id || entry.status == EntryStatus::Cancelled {
                continue;
            }

            let slot = match entry.kind {
                EntryKind::TaskReward => &mut stats.task_rewards,
                EntryKind::ReferralBonus => &mut stats.referral_bonus,
                EntryKind::PackagePurchase => &mut stats.package_purchases,
                EntryKind::Withdrawal => &mut stats.withdrawals,
            };
            slot.total_cents += entry.amount_cents;
            slot.count += 1;
        }

        stats
    }

    /// Rebuild the cached wallet counters from the ledger and overwrite them.
    ///
    /// Balance sums every live entry except package purchases, which never
    /// touch the balance (the debit is deferred to the payment-proof flow).
    /// Cancelled and failed entries are excluded, which is exactly the refund
    /// semantics of a rejected withdrawal.
    pub async fn reconcile_wallet(
        &self,
        user_id: &str,
    ) -> Result<WalletReconciliation, RepositoryError> {
        let _guard = self.store.lock_user(user_id).await;

        let mut balance = 0i64;
        let mut earnings = 0i64;
        let mut referral_earnings = 0i64;

        for entry in self.store.ledger.iter() {
            if entry.user_id != user_id {
                continue;
            }
            let live = entry.status != EntryStatus::Cancelled && entry.status != EntryStatus::Failed;
            if !live {
                continue;
            }

            match entry.kind {
                EntryKind::TaskReward => {
                    balance += entry.amount_cents;
                    earnings += entry.amount_cents;
                }
                EntryKind::ReferralBonus => {
                    balance += entry.amount_cents;
                    referral_earnings += entry.amount_cents;
                }
                EntryKind::Withdrawal => balance += entry.amount_cents,
                EntryKind::PackagePurchase => {}
            }
        }

        let mut user = self
            .store
            .users
            .get_mut(user_id)
            .ok_or(RepositoryError::NotFound("user"))?;

        let cached = user.wallet.balance_cents;
        let drifted = cached != balance
            || user.wallet.earnings_cents != earnings
            || user.wallet.referral_earnings_cents != referral_earnings;

        if drifted {
            log::warn!(
                "wallet drift for user {}: cached balance {} rebuilt {}",
                user_id,
                cached,
                balance
            );
        }

        user.wallet.balance_cents = balance;
        user.wallet.earnings_cents = earnings;
        user.wallet.referral_earnings_cents = referral_earnings;

        Ok(WalletReconciliation {
            user_id: user_id.to_string(),
            cached_balance_cents: cached,
            rebuilt_balance_cents: balance,
            rebuilt_earnings_cents: earnings,
            rebuilt_referral_earnings_cents: referral_earnings,
            drifted,
        })
    }

    pub fn total_task_rewards(&self) -> i64 {
        self.store
            .ledger
            .iter()
            .filter(|e| e.kind == EntryKind::TaskReward)
            .map(|e| e.amount_cents)
            .sum()
    }

    pub fn total_withdrawn(&self) -> i64 {
        self.store
            .ledger
            .iter()
            .filter(|e| e.kind == EntryKind::Withdrawal && e.status == EntryStatus::Completed)
            .map(|e| e.amount_cents.abs())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::users::{User, Wallet};

    fn seed_user(store: &Arc<Store>) -> String {
        let user = User {
            id: new_id(),
            username: "noor".to_string(),
            email: "noor@example.com".to_string(),
            phone: None,
            referral_code: "REFDDDD0004".to_string(),
            referred_by: None,
            wallet: Wallet::default(),
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

    fn entry(user_id: &str, kind: EntryKind, amount: i64, status: EntryStatus) -> NewEntry {
        NewEntry::new(user_id, kind, amount, status, "test entry")
    }

    #[tokio::test]
    async fn reconcile_rebuilds_a_drifted_wallet() {
        let store = Store::new();
        let user_id = seed_user(&store);
        let repo = LedgerRepository::new(store.clone());

        repo.append(entry(&user_id, EntryKind::TaskReward, 2_000, EntryStatus::Completed));
        repo.append(entry(&user_id, EntryKind::TaskReward, 2_000, EntryStatus::Completed));
        repo.append(entry(&user_id, EntryKind::ReferralBonus, 1_000, EntryStatus::Completed));
        // Live withdrawal pair: counts against the balance.
        repo.append(entry(&user_id, EntryKind::Withdrawal, -440, EntryStatus::Pending));
        repo.append(entry(&user_id, EntryKind::Withdrawal, -60, EntryStatus::Pending));
        // Cancelled pair from a rejected withdrawal: refunded, must not count.
        repo.append(entry(&user_id, EntryKind::Withdrawal, -880, EntryStatus::Cancelled));
        repo.append(entry(&user_id, EntryKind::Withdrawal, -120, EntryStatus::Cancelled));
        // Package purchases never touch the balance.
        repo.append(entry(&user_id, EntryKind::PackagePurchase, -150_000, EntryStatus::Pending));

        // Simulate cache drift.
        store.users.get_mut(&user_id).unwrap().wallet.balance_cents = 999;

        let report = repo.reconcile_wallet(&user_id).await.unwrap();
        assert!(report.drifted);
        assert_eq!(report.cached_balance_cents, 999);
        assert_eq!(report.rebuilt_balance_cents, 4_500);
        assert_eq!(report.rebuilt_earnings_cents, 4_000);
        assert_eq!(report.rebuilt_referral_earnings_cents, 1_000);

        let wallet = store.get_user(&user_id).unwrap().wallet;
        assert_eq!(wallet.balance_cents, 4_500);

        // A clean wallet reconciles without drift.
        let report = repo.reconcile_wallet(&user_id).await.unwrap();
        assert!(!report.drifted);
    }

    #[tokio::test]
    async fn stats_exclude_cancelled_entries() {
        let store = Store::new();
        let user_id = seed_user(&store);
        let repo = LedgerRepository::new(store.clone());

        repo.append(entry(&user_id, EntryKind::TaskReward, 2_000, EntryStatus::Completed));
        repo.append(entry(&user_id, EntryKind::Withdrawal, -440, EntryStatus::Completed));
        repo.append(entry(&user_id, EntryKind::Withdrawal, -60, EntryStatus::Completed));
        repo.append(entry(&user_id, EntryKind::Withdrawal, -500, EntryStatus::Cancelled));

        let stats = repo.stats_for_user(&user_id);
        assert_eq!(stats.task_rewards.total_cents, 2_000);
        assert_eq!(stats.task_rewards.count, 1);
        assert_eq!(stats.withdrawals.total_cents, -500);
        assert_eq!(stats.withdrawals.count, 2);
    }

    #[tokio::test]
    async fn pair_status_flips_together() {
        let store = Store::new();
        let user_id = seed_user(&store);
        let repo = LedgerRepository::new(store.clone());

        let mut net = entry(&user_id, EntryKind::Withdrawal, -440, EntryStatus::Pending);
        net.related_withdrawal = Some("w-1".to_string());
        repo.append(net);
        let mut tax = entry(&user_id, EntryKind::Withdrawal, -60, EntryStatus::Pending);
        tax.related_withdrawal = Some("w-1".to_string());
        repo.append(tax);
        // Another withdrawal in the same instant must be untouched.
        let mut other = entry(&user_id, EntryKind::Withdrawal, -300, EntryStatus::Pending);
        other.related_withdrawal = Some("w-2".to_string());
        repo.append(other);

        repo.set_status_for_withdrawal("w-1", EntryStatus::Cancelled);

        let by_withdrawal = |id: &str| {
            store
                .ledger
                .iter()
                .filter(|e| e.related_withdrawal.as_deref() == Some(id))
                .map(|e| e.status)
                .collect::<Vec<_>>()
        };
        assert_eq!(by_withdrawal("w-1"), vec![EntryStatus::Cancelled; 2]);
        assert_eq!(by_withdrawal("w-2"), vec![EntryStatus::Pending]);
    }
}
