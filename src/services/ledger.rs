use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::oneshot;

use super::{RequestHandler, Service, ServiceError};
use crate::models::ledger::{EntryKind, LedgerEntry, TransactionStats, WalletReconciliation};
use crate::repositories::ledger::LedgerRepository;
use crate::repositories::store::Store;

pub enum LedgerRequest {
    Transactions {
        user_id: String,
        kind: Option<EntryKind>,
        limit: usize,
        response: oneshot::Sender<Result<Vec<LedgerEntry>, ServiceError>>,
    },
    Stats {
        user_id: String,
        response: oneshot::Sender<Result<TransactionStats, ServiceError>>,
    },
    Reconcile {
        admin_id: String,
        user_id: String,
        response: oneshot::Sender<Result<WalletReconciliation, ServiceError>>,
    },
}

#[derive(Clone)]
pub struct LedgerRequestHandler {
    store: Arc<Store>,
    repository: LedgerRepository,
}

impl LedgerRequestHandler {
    pub fn new(store: Arc<Store>) -> Self {
        let repository = LedgerRepository::new(store.clone());

        LedgerRequestHandler { store, repository }
    }

    async fn reconcile(
        &self,
        admin_id: &str,
        user_id: &str,
    ) -> Result<WalletReconciliation, ServiceError> {
        self.store.ensure_admin(admin_id)?;
        Ok(self.repository.reconcile_wallet(user_id).await?)
    }
}

#[async_trait]
impl RequestHandler<LedgerRequest> for LedgerRequestHandler {
    async fn handle_request(&self, request: LedgerRequest) {
        match request {
            LedgerRequest::Transactions {
                user_id,
                kind,
                limit,
                response,
            } => {
                let _ = response.send(Ok(self.repository.entries_for_user(&user_id, kind, limit)));
            }
            LedgerRequest::Stats { user_id, response } => {
                let _ = response.send(Ok(self.repository.stats_for_user(&user_id)));
            }
            LedgerRequest::Reconcile {
                admin_id,
                user_id,
                response,
            } => {
                let _ = response.send(self.reconcile(&admin_id, &user_id).await);
            }
        }
    }
}

pub struct LedgerService;

impl LedgerService {
    pub fn new() -> Self {
        LedgerService {}
    }
}

#[async_trait]
impl Service<LedgerRequest, LedgerRequestHandler> for LedgerService {}
