use std::sync::Arc;

use crate::models::ledger::{EntryKind, EntryStatus, NewEntry};
use crate::models::packages::{NewPackage, Package, PackagePurchase, PendingPurchase};
use crate::repositories::ledger::LedgerRepository;
use crate::repositories::store::{new_id, now, Store};
use crate::repositories::RepositoryError;

#[derive(Clone)]
pub struct PackageRepository {
    store: Arc<Store>,
    ledger: LedgerRepository,
}

impl PackageRepository {
    pub fn new(store: Arc<Store>) -> Self {
        let ledger = LedgerRepository::new(store.clone());

        PackageRepository { store, ledger }
    }

    pub fn list_active(&self) -> Vec<Package> {
        let mut packages: Vec<Package> = self
            .store
            .packages
            .iter()
            .filter(|p| p.is_active)
            .map(|p| p.value().clone())
            .collect();

        packages.sort_by(|a, b| a.price_cents.cmp(&b.price_cents));
        packages
    }

    pub fn get(&self, package_id: &str) -> Result<Package, RepositoryError> {
        self.store
            .packages
            .get(package_id)
            .map(|p| p.value().clone())
            .ok_or(RepositoryError::NotFound("package"))
    }

    pub fn create(&self, new: NewPackage) -> Result<Package, RepositoryError> {
        if new.name.trim().is_empty() {
            return Err(RepositoryError::Validation(
                "package name is required".to_string(),
            ));
        }

        let total_earnings =
            new.tasks_per_day as i64 * new.reward_per_task_cents * new.total_days as i64;

        let package = Package {
            id: new_id(),
            name: new.name,
            price_cents: new.price_cents,
            description: new.description,
            tasks_per_day: new.tasks_per_day,
            reward_per_task_cents: new.reward_per_task_cents,
            total_days: new.total_days,
            total_earnings_cents: total_earnings,
            features: new.features,
            is_active: true,
            created_at: now(),
        };
        self.store
            .packages
            .insert(package.id.clone(), package.clone());

        Ok(package)
    }

    /// Assign the package and record the pending purchase debit. The balance
    /// is deliberately left untouched: payment happens out of band and the
    /// pending entry is the record the admin verifies against.
    pub async fn purchase(
        &self,
        user_id: &str,
        purchase: PackagePurchase,
    ) -> Result<Package, RepositoryError> {
        if purchase.payment_proof.is_none() && purchase.external_ref.is_none() {
            return Err(RepositoryError::Validation(
                "payment proof or transaction reference is required".to_string(),
            ));
        }

        let package = self.get(&purchase.package_id)?;
        if !package.is_active {
            return Err(RepositoryError::NotFound("package"));
        }

        let _guard = self.store.lock_user(user_id).await;

        {
            let mut user = self
                .store
                .users
                .get_mut(user_id)
                .ok_or(RepositoryError::NotFound("user"))?;
            user.current_package = Some(package.id.clone());
            user.package_purchase_date = Some(now());
        }

        let mut entry = NewEntry::new(
            user_id,
            EntryKind::PackagePurchase,
            -package.price_cents,
            EntryStatus::Pending,
            format!(
                "Purchased {} package via {}",
                package.name, purchase.payment_method
            ),
        );
        entry.related_package = Some(package.id.clone());
        entry.payment_proof = purchase.payment_proof;
        entry.external_ref = purchase.external_ref;
        self.ledger.append(entry);

        Ok(package)
    }

    /// Admin approval: flips the pending purchase entry to completed and
    /// re-asserts the package on the user. The wallet stays untouched either
    /// way.
    pub async fn approve(&self, user_id: &str, package_id: &str) -> Result<(), RepositoryError> {
        self.store.get_user(user_id)?;
        self.get(package_id)?;

        let entry = self
            .ledger
            .pending_purchase_entry(user_id, package_id)
            .ok_or(RepositoryError::NotFound("pending package purchase"))?;

        let _guard = self.store.lock_user(user_id).await;

        {
            let mut user = self
                .store
                .users
                .get_mut(user_id)
                .ok_or(RepositoryError::NotFound("user"))?;
            user.current_package = Some(package_id.to_string());
            user.package_purchase_date = Some(now());
        }

        self.ledger.set_status(&entry.id, EntryStatus::Completed)?;
        Ok(())
    }

    pub fn pending_purchases(&self) -> Vec<PendingPurchase> {
        let mut pending: Vec<PendingPurchase> = self
            .store
            .ledger
            .iter()
            .filter(|e| e.kind == EntryKind::PackagePurchase && e.status == EntryStatus::Pending)
            .filter_map(|e| {
                let package_id = e.related_package.clone()?;
                let package = self
                    .store
                    .packages
                    .get(&package_id)
                    .map(|p| p.value().clone())?;
                let username = self
                    .store
                    .users
                    .get(&e.user_id)
                    .map(|u| u.username.clone())?;

                Some(PendingPurchase {
                    entry_id: e.id.clone(),
                    user_id: e.user_id.clone(),
                    username,
                    package,
                    payment_proof: e.payment_proof.clone(),
                    external_ref: e.external_ref.clone(),
                    created_at: e.created_at,
                })
            })
            .collect();

        pending.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::users::{User, Wallet};

    fn seed_user(store: &Arc<Store>, balance_cents: i64) -> String {
        let user = User {
            id: new_id(),
            username: "hamza".to_string(),
            email: "hamza@example.com".to_string(),
            phone: None,
            referral_code: "REFCCCC0003".to_string(),
            referred_by: None,
            wallet: Wallet {
                balance_cents,
                earnings_cents: 0,
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

    fn silver() -> NewPackage {
        NewPackage {
            name: "Silver".to_string(),
            price_cents: 150_000,
            description: "entry tier".to_string(),
            tasks_per_day: 3,
            reward_per_task_cents: 2_000,
            total_days: 30,
            features: vec!["3 tasks per day".to_string()],
        }
    }

    fn purchase_of(package_id: &str) -> PackagePurchase {
        PackagePurchase {
            package_id: package_id.to_string(),
            payment_method: "easypaisa".to_string(),
            payment_proof: None,
            external_ref: Some("TXN-123".to_string()),
        }
    }

    #[tokio::test]
    async fn purchase_needs_proof() {
        let store = Store::new();
        let user_id = seed_user(&store, 0);
        let repo = PackageRepository::new(store.clone());
        let package = repo.create(silver()).unwrap();

        let mut purchase = purchase_of(&package.id);
        purchase.external_ref = None;
        let err = repo.purchase(&user_id, purchase).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Validation(_)));
    }

    #[tokio::test]
    async fn purchase_assigns_package_without_touching_balance() {
        let store = Store::new();
        let user_id = seed_user(&store, 40_000);
        let repo = PackageRepository::new(store.clone());
        let package = repo.create(silver()).unwrap();

        repo.purchase(&user_id, purchase_of(&package.id)).await.unwrap();

        let user = store.get_user(&user_id).unwrap();
        assert_eq!(user.current_package.as_deref(), Some(package.id.as_str()));
        assert!(user.package_purchase_date.is_some());
        // The debit is only a pending ledger entry; balance stays put.
        assert_eq!(user.wallet.balance_cents, 40_000);

        let entry = repo
            .ledger
            .pending_purchase_entry(&user_id, &package.id)
            .unwrap();
        assert_eq!(entry.amount_cents, -150_000);
        assert_eq!(entry.external_ref.as_deref(), Some("TXN-123"));
    }

    #[tokio::test]
    async fn approval_completes_the_entry_only() {
        let store = Store::new();
        let user_id = seed_user(&store, 40_000);
        let repo = PackageRepository::new(store.clone());
        let package = repo.create(silver()).unwrap();

        repo.purchase(&user_id, purchase_of(&package.id)).await.unwrap();
        repo.approve(&user_id, &package.id).await.unwrap();

        assert!(repo
            .ledger
            .pending_purchase_entry(&user_id, &package.id)
            .is_none());
        let entry = store
            .ledger
            .iter()
            .find(|e| e.kind == EntryKind::PackagePurchase)
            .map(|e| e.value().clone())
            .unwrap();
        assert_eq!(entry.status, EntryStatus::Completed);
        assert_eq!(store.get_user(&user_id).unwrap().wallet.balance_cents, 40_000);

        // Nothing left to approve.
        let err = repo.approve(&user_id, &package.id).await.unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound(_)));
    }

    #[tokio::test]
    async fn catalog_lists_active_by_price() {
        let store = Store::new();
        let repo = PackageRepository::new(store.clone());

        let mut gold = silver();
        gold.name = "Gold".to_string();
        gold.price_cents = 300_000;
        repo.create(gold).unwrap();
        repo.create(silver()).unwrap();

        let listed = repo.list_active();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].name, "Silver");
        assert_eq!(listed[1].name, "Gold");
    }
}
