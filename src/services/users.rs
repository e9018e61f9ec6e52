use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::oneshot;

use super::{RequestHandler, Service, ServiceError};
use crate::models::users::{DashboardStats, NewUser, ReferralSummary, User, UserProfile};
use crate::repositories::ledger::LedgerRepository;
use crate::repositories::packages::PackageRepository;
use crate::repositories::store::Store;
use crate::repositories::users::UserRepository;
use crate::repositories::withdrawals::WithdrawalRepository;
use crate::settings::Policy;

pub enum UserRequest {
    Register {
        new: NewUser,
        response: oneshot::Sender<Result<User, ServiceError>>,
    },
    GetProfile {
        user_id: String,
        response: oneshot::Sender<Result<UserProfile, ServiceError>>,
    },
    GetReferrals {
        user_id: String,
        response: oneshot::Sender<Result<Vec<ReferralSummary>, ServiceError>>,
    },
    SetUserActive {
        admin_id: String,
        user_id: String,
        active: bool,
        response: oneshot::Sender<Result<User, ServiceError>>,
    },
    DashboardStats {
        admin_id: String,
        response: oneshot::Sender<Result<DashboardStats, ServiceError>>,
    },
}

#[derive(Clone)]
pub struct UserRequestHandler {
    store: Arc<Store>,
    repository: UserRepository,
    ledger: LedgerRepository,
    packages: PackageRepository,
    withdrawals: WithdrawalRepository,
}

impl UserRequestHandler {
    pub fn new(store: Arc<Store>, policy: Policy) -> Self {
        let repository = UserRepository::new(store.clone(), policy.referral_bonus_cents);
        let ledger = LedgerRepository::new(store.clone());
        let packages = PackageRepository::new(store.clone());
        let withdrawals = WithdrawalRepository::new(
            store.clone(),
            policy.minimum_withdrawal_cents,
            policy.tax_percentage,
        );

        UserRequestHandler {
            store,
            repository,
            ledger,
            packages,
            withdrawals,
        }
    }

    async fn register(&self, new: NewUser) -> Result<User, ServiceError> {
        let user = self.repository.insert_user(new).await?;
        log::info!("registered user {} ({})", user.username, user.id);
        Ok(user)
    }

    fn profile(&self, user_id: &str) -> Result<UserProfile, ServiceError> {
        let user = self.repository.get_user(user_id)?;

        let mut current_package = None;
        let mut pending_package = None;
        let mut package_status = None;

        if let Some(package_id) = user.current_package.clone() {
            let package = self.packages.get(&package_id)?;
            if self
                .ledger
                .pending_purchase_entry(user_id, &package_id)
                .is_some()
            {
                package_status = Some("pending".to_string());
                pending_package = Some(package);
            } else {
                package_status = Some("approved".to_string());
                current_package = Some(package);
            }
        }

        Ok(UserProfile {
            user,
            current_package,
            pending_package,
            package_status,
        })
    }

    fn set_active(&self, admin_id: &str, user_id: &str, active: bool) -> Result<User, ServiceError> {
        self.store.ensure_admin(admin_id)?;
        Ok(self.repository.set_active(user_id, active)?)
    }

    fn dashboard_stats(&self, admin_id: &str) -> Result<DashboardStats, ServiceError> {
        self.store.ensure_admin(admin_id)?;

        Ok(DashboardStats {
            total_users: self.repository.count_users(),
            total_task_rewards_cents: self.ledger.total_task_rewards(),
            total_withdrawn_cents: self.ledger.total_withdrawn(),
            pending_withdrawals: self.withdrawals.count_pending(),
            active_packages: self.repository.count_active_packages(),
        })
    }
}

#[async_trait]
impl RequestHandler<UserRequest> for UserRequestHandler {
    async fn handle_request(&self, request: UserRequest) {
        match request {
            UserRequest::Register { new, response } => {
                let _ = response.send(self.register(new).await);
            }
            UserRequest::GetProfile { user_id, response } => {
                let _ = response.send(self.profile(&user_id));
            }
            UserRequest::GetReferrals { user_id, response } => {
                let _ = response.send(Ok(self.repository.referrals_of(&user_id)));
            }
            UserRequest::SetUserActive {
                admin_id,
                user_id,
                active,
                response,
            } => {
                let _ = response.send(self.set_active(&admin_id, &user_id, active));
            }
            UserRequest::DashboardStats { admin_id, response } => {
                let _ = response.send(self.dashboard_stats(&admin_id));
            }
        }
    }
}

pub struct UserService;

impl UserService {
    pub fn new() -> Self {
        UserService {}
    }
}

#[async_trait]
impl Service<UserRequest, UserRequestHandler> for UserService {}
