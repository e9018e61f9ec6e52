use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::oneshot;

use super::{RequestHandler, Service, ServiceError};
use crate::models::packages::{NewPackage, Package, PackagePurchase, PendingPurchase};
use crate::repositories::packages::PackageRepository;
use crate::repositories::store::Store;

pub enum PackageRequest {
    List {
        response: oneshot::Sender<Result<Vec<Package>, ServiceError>>,
    },
    Get {
        package_id: String,
        response: oneshot::Sender<Result<Package, ServiceError>>,
    },
    Create {
        admin_id: String,
        new: NewPackage,
        response: oneshot::Sender<Result<Package, ServiceError>>,
    },
    Purchase {
        user_id: String,
        purchase: PackagePurchase,
        response: oneshot::Sender<Result<Package, ServiceError>>,
    },
    Approve {
        admin_id: String,
        user_id: String,
        package_id: String,
        response: oneshot::Sender<Result<(), ServiceError>>,
    },
    PendingPurchases {
        admin_id: String,
        response: oneshot::Sender<Result<Vec<PendingPurchase>, ServiceError>>,
    },
}

#[derive(Clone)]
pub struct PackageRequestHandler {
    store: Arc<Store>,
    repository: PackageRepository,
}

impl PackageRequestHandler {
    pub fn new(store: Arc<Store>) -> Self {
        let repository = PackageRepository::new(store.clone());

        PackageRequestHandler { store, repository }
    }

    async fn purchase(
        &self,
        user_id: &str,
        purchase: PackagePurchase,
    ) -> Result<Package, ServiceError> {
        let package = self.repository.purchase(user_id, purchase).await?;
        log::info!("user {} initiated purchase of {} package", user_id, package.name);
        Ok(package)
    }

    async fn approve(
        &self,
        admin_id: &str,
        user_id: &str,
        package_id: &str,
    ) -> Result<(), ServiceError> {
        self.store.ensure_admin(admin_id)?;
        self.repository.approve(user_id, package_id).await?;
        log::info!("approved package {} for user {}", package_id, user_id);
        Ok(())
    }
}

#[async_trait]
impl RequestHandler<PackageRequest> for PackageRequestHandler {
    async fn handle_request(&self, request: PackageRequest) {
        match request {
            PackageRequest::List { response } => {
                let _ = response.send(Ok(self.repository.list_active()));
            }
            PackageRequest::Get {
                package_id,
                response,
            } => {
                let _ = response.send(self.repository.get(&package_id).map_err(Into::into));
            }
            PackageRequest::Create {
                admin_id,
                new,
                response,
            } => {
                let result = self
                    .store
                    .ensure_admin(&admin_id)
                    .and_then(|_| self.repository.create(new))
                    .map_err(Into::into);
                let _ = response.send(result);
            }
            PackageRequest::Purchase {
                user_id,
                purchase,
                response,
            } => {
                let _ = response.send(self.purchase(&user_id, purchase).await);
            }
            PackageRequest::Approve {
                admin_id,
                user_id,
                package_id,
                response,
            } => {
                let _ = response.send(self.approve(&admin_id, &user_id, &package_id).await);
            }
            PackageRequest::PendingPurchases { admin_id, response } => {
                let result = self
                    .store
                    .ensure_admin(&admin_id)
                    .map(|_| self.repository.pending_purchases())
                    .map_err(Into::into);
                let _ = response.send(result);
            }
        }
    }
}

pub struct PackageService;

impl PackageService {
    pub fn new() -> Self {
        PackageService {}
    }
}

#[async_trait]
impl Service<PackageRequest, PackageRequestHandler> for PackageService {}
