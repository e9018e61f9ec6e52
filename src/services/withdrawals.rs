use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::oneshot;

use super::{RequestHandler, Service, ServiceError};
use crate::models::withdrawals::{NewWithdrawal, Withdrawal, WithdrawalStatus};
use crate::repositories::store::Store;
use crate::repositories::withdrawals::WithdrawalRepository;
use crate::settings::Policy;

#[derive(Clone, Debug, Serialize)]
pub struct WithdrawalReceipt {
    pub withdrawal: Withdrawal,
    pub new_balance_cents: i64,
}

pub enum WithdrawalRequest {
    Request {
        user_id: String,
        new: NewWithdrawal,
        response: oneshot::Sender<Result<WithdrawalReceipt, ServiceError>>,
    },
    ListMine {
        user_id: String,
        response: oneshot::Sender<Result<Vec<Withdrawal>, ServiceError>>,
    },
    ListAll {
        admin_id: String,
        status: Option<WithdrawalStatus>,
        response: oneshot::Sender<Result<Vec<Withdrawal>, ServiceError>>,
    },
    Decide {
        admin_id: String,
        withdrawal_id: String,
        status: WithdrawalStatus,
        remarks: Option<String>,
        response: oneshot::Sender<Result<Withdrawal, ServiceError>>,
    },
}

#[derive(Clone)]
pub struct WithdrawalRequestHandler {
    store: Arc<Store>,
    repository: WithdrawalRepository,
}

impl WithdrawalRequestHandler {
    pub fn new(store: Arc<Store>, policy: Policy) -> Self {
        let repository = WithdrawalRepository::new(
            store.clone(),
            policy.minimum_withdrawal_cents,
            policy.tax_percentage,
        );

        WithdrawalRequestHandler { store, repository }
    }

    async fn request(
        &self,
        user_id: &str,
        new: NewWithdrawal,
    ) -> Result<WithdrawalReceipt, ServiceError> {
        let (withdrawal, new_balance) = self.repository.request(user_id, new).await?;

        log::info!(
            "user {} requested withdrawal {} of {} cents ({} net, {} tax)",
            user_id,
            withdrawal.id,
            withdrawal.amount_cents,
            withdrawal.net_amount_cents,
            withdrawal.tax_amount_cents
        );

        Ok(WithdrawalReceipt {
            withdrawal,
            new_balance_cents: new_balance,
        })
    }

    async fn decide(
        &self,
        admin_id: &str,
        withdrawal_id: &str,
        status: WithdrawalStatus,
        remarks: Option<String>,
    ) -> Result<Withdrawal, ServiceError> {
        self.store.ensure_admin(admin_id)?;
        Ok(self.repository.decide(withdrawal_id, status, remarks).await?)
    }
}

#[async_trait]
impl RequestHandler<WithdrawalRequest> for WithdrawalRequestHandler {
    async fn handle_request(&self, request: WithdrawalRequest) {
        match request {
            WithdrawalRequest::Request {
                user_id,
                new,
                response,
            } => {
                let _ = response.send(self.request(&user_id, new).await);
            }
            WithdrawalRequest::ListMine { user_id, response } => {
                let _ = response.send(Ok(self.repository.list_for_user(&user_id)));
            }
            WithdrawalRequest::ListAll {
                admin_id,
                status,
                response,
            } => {
                let result = self
                    .store
                    .ensure_admin(&admin_id)
                    .map(|_| self.repository.list_all(status))
                    .map_err(Into::into);
                let _ = response.send(result);
            }
            WithdrawalRequest::Decide {
                admin_id,
                withdrawal_id,
                status,
                remarks,
                response,
            } => {
                let _ = response.send(
                    self.decide(&admin_id, &withdrawal_id, status, remarks)
                        .await,
                );
            }
        }
    }
}

pub struct WithdrawalService;

impl WithdrawalService {
    pub fn new() -> Self {
        WithdrawalService {}
    }
}

#[async_trait]
impl Service<WithdrawalRequest, WithdrawalRequestHandler> for WithdrawalService {}
