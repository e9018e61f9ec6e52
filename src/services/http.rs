use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::oneshot;
use tower_http::trace::TraceLayer;

use super::ledger::LedgerRequest;
use super::packages::PackageRequest;
use super::tasks::TaskRequest;
use super::users::UserRequest;
use super::withdrawals::WithdrawalRequest;
use super::{ServiceChannels, ServiceError};
use crate::models::ledger::EntryKind;
use crate::models::packages::{NewPackage, PackagePurchase};
use crate::models::tasks::{NewTask, TaskUpdate};
use crate::models::users::NewUser;
use crate::models::withdrawals::{NewWithdrawal, WithdrawalStatus};

#[derive(Clone)]
struct AppState {
    channels: ServiceChannels,
}

type ApiResponse = (StatusCode, Json<Value>);

/// Identity arrives from the auth collaborator as a trusted header.
fn auth_user(headers: &HeaderMap) -> Result<String, ApiResponse> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
        .ok_or((
            StatusCode::UNAUTHORIZED,
            Json(json!({"description": "missing x-user-id header"})),
        ))
}

fn error_status(err: &ServiceError) -> StatusCode {
    match err {
        ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
        ServiceError::Unauthorized(_) => StatusCode::FORBIDDEN,
        ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
        ServiceError::Conflict(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: ServiceError) -> ApiResponse {
    (
        error_status(&err),
        Json(json!({"description": err.to_string()})),
    )
}

fn channel_error(detail: String) -> ApiResponse {
    error_response(ServiceError::Communication(
        "service channel closed".to_string(),
        detail,
    ))
}

async fn respond<T: Serialize>(
    rx: oneshot::Receiver<Result<T, ServiceError>>,
    ok: StatusCode,
) -> ApiResponse {
    match rx.await {
        Ok(Ok(value)) => (ok, Json(json!(value))),
        Ok(Err(err)) => error_response(err),
        Err(e) => error_response(ServiceError::Internal(format!(
            "response channel dropped: {}",
            e
        ))),
    }
}

async fn register(State(state): State<AppState>, Json(req): Json<NewUser>) -> impl IntoResponse {
    let (tx, rx) = oneshot::channel();
    if let Err(e) = state
        .channels
        .users
        .send(UserRequest::Register {
            new: req,
            response: tx,
        })
        .await
    {
        return channel_error(e.to_string());
    }
    respond(rx, StatusCode::CREATED).await
}

async fn profile(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let user_id = match auth_user(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let (tx, rx) = oneshot::channel();
    if let Err(e) = state
        .channels
        .users
        .send(UserRequest::GetProfile {
            user_id,
            response: tx,
        })
        .await
    {
        return channel_error(e.to_string());
    }
    respond(rx, StatusCode::OK).await
}

async fn referrals(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let user_id = match auth_user(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let (tx, rx) = oneshot::channel();
    if let Err(e) = state
        .channels
        .users
        .send(UserRequest::GetReferrals {
            user_id,
            response: tx,
        })
        .await
    {
        return channel_error(e.to_string());
    }
    respond(rx, StatusCode::OK).await
}

async fn list_packages(State(state): State<AppState>) -> impl IntoResponse {
    let (tx, rx) = oneshot::channel();
    if let Err(e) = state
        .channels
        .packages
        .send(PackageRequest::List { response: tx })
        .await
    {
        return channel_error(e.to_string());
    }
    respond(rx, StatusCode::OK).await
}

async fn get_package(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    let (tx, rx) = oneshot::channel();
    if let Err(e) = state
        .channels
        .packages
        .send(PackageRequest::Get {
            package_id: id,
            response: tx,
        })
        .await
    {
        return channel_error(e.to_string());
    }
    respond(rx, StatusCode::OK).await
}

async fn create_package(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<NewPackage>,
) -> impl IntoResponse {
    let admin_id = match auth_user(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let (tx, rx) = oneshot::channel();
    if let Err(e) = state
        .channels
        .packages
        .send(PackageRequest::Create {
            admin_id,
            new: req,
            response: tx,
        })
        .await
    {
        return channel_error(e.to_string());
    }
    respond(rx, StatusCode::CREATED).await
}

async fn purchase_package(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<PackagePurchase>,
) -> impl IntoResponse {
    let user_id = match auth_user(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let (tx, rx) = oneshot::channel();
    if let Err(e) = state
        .channels
        .packages
        .send(PackageRequest::Purchase {
            user_id,
            purchase: req,
            response: tx,
        })
        .await
    {
        return channel_error(e.to_string());
    }
    respond(rx, StatusCode::OK).await
}

#[derive(Deserialize)]
struct ApprovePurchaseBody {
    user_id: String,
    package_id: String,
}

async fn approve_purchase(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ApprovePurchaseBody>,
) -> impl IntoResponse {
    let admin_id = match auth_user(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let (tx, rx) = oneshot::channel();
    if let Err(e) = state
        .channels
        .packages
        .send(PackageRequest::Approve {
            admin_id,
            user_id: req.user_id,
            package_id: req.package_id,
            response: tx,
        })
        .await
    {
        return channel_error(e.to_string());
    }
    respond(rx, StatusCode::OK).await
}

async fn pending_purchases(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let admin_id = match auth_user(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let (tx, rx) = oneshot::channel();
    if let Err(e) = state
        .channels
        .packages
        .send(PackageRequest::PendingPurchases {
            admin_id,
            response: tx,
        })
        .await
    {
        return channel_error(e.to_string());
    }
    respond(rx, StatusCode::OK).await
}

async fn available_tasks(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let user_id = match auth_user(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let (tx, rx) = oneshot::channel();
    if let Err(e) = state
        .channels
        .tasks
        .send(TaskRequest::Available {
            user_id,
            response: tx,
        })
        .await
    {
        return channel_error(e.to_string());
    }
    respond(rx, StatusCode::OK).await
}

#[derive(Deserialize)]
struct StartTaskBody {
    task_id: String,
}

async fn start_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<StartTaskBody>,
) -> impl IntoResponse {
    let user_id = match auth_user(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let (tx, rx) = oneshot::channel();
    if let Err(e) = state
        .channels
        .tasks
        .send(TaskRequest::Start {
            user_id,
            task_id: req.task_id,
            response: tx,
        })
        .await
    {
        return channel_error(e.to_string());
    }
    respond(rx, StatusCode::OK).await
}

#[derive(Deserialize)]
struct CompleteTaskBody {
    completion_id: String,
}

async fn complete_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CompleteTaskBody>,
) -> impl IntoResponse {
    let user_id = match auth_user(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let (tx, rx) = oneshot::channel();
    if let Err(e) = state
        .channels
        .tasks
        .send(TaskRequest::Complete {
            user_id,
            completion_id: req.completion_id,
            response: tx,
        })
        .await
    {
        return channel_error(e.to_string());
    }
    respond(rx, StatusCode::OK).await
}

async fn task_history(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let user_id = match auth_user(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let (tx, rx) = oneshot::channel();
    if let Err(e) = state
        .channels
        .tasks
        .send(TaskRequest::History {
            user_id,
            response: tx,
        })
        .await
    {
        return channel_error(e.to_string());
    }
    respond(rx, StatusCode::OK).await
}

async fn create_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<NewTask>,
) -> impl IntoResponse {
    let admin_id = match auth_user(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let (tx, rx) = oneshot::channel();
    if let Err(e) = state
        .channels
        .tasks
        .send(TaskRequest::Create {
            admin_id,
            new: req,
            response: tx,
        })
        .await
    {
        return channel_error(e.to_string());
    }
    respond(rx, StatusCode::CREATED).await
}

async fn all_tasks(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let admin_id = match auth_user(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let (tx, rx) = oneshot::channel();
    if let Err(e) = state
        .channels
        .tasks
        .send(TaskRequest::ListAll {
            admin_id,
            response: tx,
        })
        .await
    {
        return channel_error(e.to_string());
    }
    respond(rx, StatusCode::OK).await
}

async fn update_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<TaskUpdate>,
) -> impl IntoResponse {
    let admin_id = match auth_user(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let (tx, rx) = oneshot::channel();
    if let Err(e) = state
        .channels
        .tasks
        .send(TaskRequest::Update {
            admin_id,
            task_id: id,
            update: req,
            response: tx,
        })
        .await
    {
        return channel_error(e.to_string());
    }
    respond(rx, StatusCode::OK).await
}

async fn delete_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let admin_id = match auth_user(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let (tx, rx) = oneshot::channel();
    if let Err(e) = state
        .channels
        .tasks
        .send(TaskRequest::Delete {
            admin_id,
            task_id: id,
            response: tx,
        })
        .await
    {
        return channel_error(e.to_string());
    }
    respond(rx, StatusCode::OK).await
}

async fn toggle_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let admin_id = match auth_user(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let (tx, rx) = oneshot::channel();
    if let Err(e) = state
        .channels
        .tasks
        .send(TaskRequest::Toggle {
            admin_id,
            task_id: id,
            response: tx,
        })
        .await
    {
        return channel_error(e.to_string());
    }
    respond(rx, StatusCode::OK).await
}

async fn request_withdrawal(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<NewWithdrawal>,
) -> impl IntoResponse {
    let user_id = match auth_user(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let (tx, rx) = oneshot::channel();
    if let Err(e) = state
        .channels
        .withdrawals
        .send(WithdrawalRequest::Request {
            user_id,
            new: req,
            response: tx,
        })
        .await
    {
        return channel_error(e.to_string());
    }
    respond(rx, StatusCode::CREATED).await
}

async fn my_withdrawals(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let user_id = match auth_user(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let (tx, rx) = oneshot::channel();
    if let Err(e) = state
        .channels
        .withdrawals
        .send(WithdrawalRequest::ListMine {
            user_id,
            response: tx,
        })
        .await
    {
        return channel_error(e.to_string());
    }
    respond(rx, StatusCode::OK).await
}

#[derive(Deserialize)]
struct WithdrawalFilter {
    status: Option<WithdrawalStatus>,
}

async fn all_withdrawals(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(filter): Query<WithdrawalFilter>,
) -> impl IntoResponse {
    let admin_id = match auth_user(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let (tx, rx) = oneshot::channel();
    if let Err(e) = state
        .channels
        .withdrawals
        .send(WithdrawalRequest::ListAll {
            admin_id,
            status: filter.status,
            response: tx,
        })
        .await
    {
        return channel_error(e.to_string());
    }
    respond(rx, StatusCode::OK).await
}

#[derive(Deserialize)]
struct DecideWithdrawalBody {
    withdrawal_id: String,
    status: WithdrawalStatus,
    remarks: Option<String>,
}

async fn decide_withdrawal(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<DecideWithdrawalBody>,
) -> impl IntoResponse {
    let admin_id = match auth_user(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let (tx, rx) = oneshot::channel();
    if let Err(e) = state
        .channels
        .withdrawals
        .send(WithdrawalRequest::Decide {
            admin_id,
            withdrawal_id: req.withdrawal_id,
            status: req.status,
            remarks: req.remarks,
            response: tx,
        })
        .await
    {
        return channel_error(e.to_string());
    }
    respond(rx, StatusCode::OK).await
}

#[derive(Deserialize)]
struct TransactionFilter {
    kind: Option<EntryKind>,
    limit: Option<usize>,
}

async fn transactions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(filter): Query<TransactionFilter>,
) -> impl IntoResponse {
    let user_id = match auth_user(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let (tx, rx) = oneshot::channel();
    if let Err(e) = state
        .channels
        .ledger
        .send(LedgerRequest::Transactions {
            user_id,
            kind: filter.kind,
            limit: filter.limit.unwrap_or(50),
            response: tx,
        })
        .await
    {
        return channel_error(e.to_string());
    }
    respond(rx, StatusCode::OK).await
}

async fn transaction_stats(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let user_id = match auth_user(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let (tx, rx) = oneshot::channel();
    if let Err(e) = state
        .channels
        .ledger
        .send(LedgerRequest::Stats {
            user_id,
            response: tx,
        })
        .await
    {
        return channel_error(e.to_string());
    }
    respond(rx, StatusCode::OK).await
}

async fn reconcile_wallet(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let admin_id = match auth_user(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let (tx, rx) = oneshot::channel();
    if let Err(e) = state
        .channels
        .ledger
        .send(LedgerRequest::Reconcile {
            admin_id,
            user_id: id,
            response: tx,
        })
        .await
    {
        return channel_error(e.to_string());
    }
    respond(rx, StatusCode::OK).await
}

#[derive(Deserialize)]
struct SetUserStatusBody {
    user_id: String,
    active: bool,
}

async fn set_user_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SetUserStatusBody>,
) -> impl IntoResponse {
    let admin_id = match auth_user(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let (tx, rx) = oneshot::channel();
    if let Err(e) = state
        .channels
        .users
        .send(UserRequest::SetUserActive {
            admin_id,
            user_id: req.user_id,
            active: req.active,
            response: tx,
        })
        .await
    {
        return channel_error(e.to_string());
    }
    respond(rx, StatusCode::OK).await
}

async fn dashboard_stats(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let admin_id = match auth_user(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let (tx, rx) = oneshot::channel();
    if let Err(e) = state
        .channels
        .users
        .send(UserRequest::DashboardStats {
            admin_id,
            response: tx,
        })
        .await
    {
        return channel_error(e.to_string());
    }
    respond(rx, StatusCode::OK).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_statuses_follow_the_taxonomy() {
        assert_eq!(
            error_status(&ServiceError::Validation("x".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            error_status(&ServiceError::Unauthorized("x".to_string())),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            error_status(&ServiceError::NotFound("x".to_string())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            error_status(&ServiceError::Conflict("x".to_string())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            error_status(&ServiceError::Internal("x".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            error_status(&ServiceError::Communication(
                "a".to_string(),
                "b".to_string()
            )),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn channel_failures_become_internal_errors() {
        let (status, _) = channel_error("receiver dropped".to_string());
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}

pub async fn start_http_server(
    channels: ServiceChannels,
    listen: &str,
) -> Result<(), anyhow::Error> {
    let app_state = AppState { channels };

    let app = Router::new()
        .route("/auth/register", post(register))
        .route("/auth/profile", get(profile))
        .route("/auth/referrals", get(referrals))
        .route("/packages", get(list_packages).post(create_package))
        .route("/packages/purchase", post(purchase_package))
        .route("/packages/{id}", get(get_package))
        .route("/tasks/available", get(available_tasks))
        .route("/tasks/start", post(start_task))
        .route("/tasks/complete", post(complete_task))
        .route("/tasks/history", get(task_history))
        .route("/withdrawals", get(my_withdrawals).post(request_withdrawal))
        .route("/transactions", get(transactions))
        .route("/transactions/stats", get(transaction_stats))
        .route("/admin/stats", get(dashboard_stats))
        .route("/admin/users/status", put(set_user_status))
        .route("/admin/users/{id}/reconcile", post(reconcile_wallet))
        .route(
            "/admin/withdrawals",
            get(all_withdrawals).put(decide_withdrawal),
        )
        .route("/admin/packages/approve", post(approve_purchase))
        .route("/admin/packages/pending", get(pending_purchases))
        .route("/admin/tasks", get(all_tasks).post(create_task))
        .route("/admin/tasks/{id}", put(update_task).delete(delete_task))
        .route("/admin/tasks/{id}/toggle", put(toggle_task))
        .route("/health", get(|| async { "OK" }))
        .with_state(app_state)
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(listen).await?;
    log::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
