use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::repositories::store::Store;
use crate::repositories::RepositoryError;
use crate::settings::Settings;

pub mod http;
pub mod ledger;
pub mod packages;
pub mod tasks;
pub mod users;
pub mod withdrawals;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Internal error: {0}")]
    Internal(String),
    #[error("Communication error: {0} - {1}")]
    Communication(String, String),
}

impl From<RepositoryError> for ServiceError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Validation(msg) => ServiceError::Validation(msg),
            RepositoryError::NotFound(what) => ServiceError::NotFound(what.to_string()),
            RepositoryError::Conflict(msg) => ServiceError::Conflict(msg),
            RepositoryError::Unauthorized(msg) => ServiceError::Unauthorized(msg),
        }
    }
}

#[async_trait]
pub trait RequestHandler<T>: Send + Sync + 'static
where
    T: Send + 'static,
{
    async fn handle_request(&self, request: T);
}

#[async_trait]
pub trait Service<T, H>: Send + Sync + 'static
where
    T: Send + 'static,
    H: RequestHandler<T> + Clone + Send,
{
    async fn run(&mut self, handler: H, receiver: &mut mpsc::Receiver<T>) {
        while let Some(request) = receiver.recv().await {
            let handler = handler.clone();

            tokio::spawn(async move {
                handler.handle_request(request).await;
            });
        }
    }
}

/// Senders for every running service, handed to the HTTP layer and to tests.
#[derive(Clone)]
pub struct ServiceChannels {
    pub users: mpsc::Sender<users::UserRequest>,
    pub tasks: mpsc::Sender<tasks::TaskRequest>,
    pub withdrawals: mpsc::Sender<withdrawals::WithdrawalRequest>,
    pub packages: mpsc::Sender<packages::PackageRequest>,
    pub ledger: mpsc::Sender<ledger::LedgerRequest>,
}

pub async fn start_services(
    store: Arc<Store>,
    settings: Settings,
) -> Result<ServiceChannels, anyhow::Error> {
    let (user_tx, mut user_rx) = mpsc::channel(512);
    let (task_tx, mut task_rx) = mpsc::channel(512);
    let (withdrawal_tx, mut withdrawal_rx) = mpsc::channel(512);
    let (package_tx, mut package_rx) = mpsc::channel(512);
    let (ledger_tx, mut ledger_rx) = mpsc::channel(512);

    let mut user_service = users::UserService::new();
    let mut task_service = tasks::TaskService::new();
    let mut withdrawal_service = withdrawals::WithdrawalService::new();
    let mut package_service = packages::PackageService::new();
    let mut ledger_service = ledger::LedgerService::new();

    log::info!("Starting user service.");
    let user_store = store.clone();
    let user_policy = settings.policy.clone();
    tokio::spawn(async move {
        user_service
            .run(
                users::UserRequestHandler::new(user_store, user_policy),
                &mut user_rx,
            )
            .await;
    });

    log::info!("Starting task service.");
    let task_store = store.clone();
    let task_policy = settings.policy.clone();
    tokio::spawn(async move {
        task_service
            .run(
                tasks::TaskRequestHandler::new(task_store, task_policy),
                &mut task_rx,
            )
            .await;
    });

    log::info!("Starting withdrawal service.");
    let withdrawal_store = store.clone();
    let withdrawal_policy = settings.policy.clone();
    tokio::spawn(async move {
        withdrawal_service
            .run(
                withdrawals::WithdrawalRequestHandler::new(withdrawal_store, withdrawal_policy),
                &mut withdrawal_rx,
            )
            .await;
    });

    log::info!("Starting package service.");
    let package_store = store.clone();
    tokio::spawn(async move {
        package_service
            .run(
                packages::PackageRequestHandler::new(package_store),
                &mut package_rx,
            )
            .await;
    });

    log::info!("Starting ledger service.");
    let ledger_store = store.clone();
    tokio::spawn(async move {
        ledger_service
            .run(
                ledger::LedgerRequestHandler::new(ledger_store),
                &mut ledger_rx,
            )
            .await;
    });

    Ok(ServiceChannels {
        users: user_tx,
        tasks: task_tx,
        withdrawals: withdrawal_tx,
        packages: package_tx,
        ledger: ledger_tx,
    })
}
