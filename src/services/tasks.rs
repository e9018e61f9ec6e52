use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::oneshot;

use super::{RequestHandler, Service, ServiceError};
use crate::models::tasks::{AvailableTasks, NewTask, Task, TaskCompletion, TaskUpdate};
use crate::repositories::store::Store;
use crate::repositories::tasks::TaskRepository;
use crate::settings::Policy;

#[derive(Clone, Debug, Serialize)]
pub struct StartedTask {
    pub completion: TaskCompletion,
    pub task: Task,
    pub reward_cents: i64,
}

#[derive(Clone, Debug, Serialize)]
pub struct CompletedTask {
    pub completion: TaskCompletion,
    pub reward_cents: i64,
    pub new_balance_cents: i64,
}

pub enum TaskRequest {
    Available {
        user_id: String,
        response: oneshot::Sender<Result<AvailableTasks, ServiceError>>,
    },
    Start {
        user_id: String,
        task_id: String,
        response: oneshot::Sender<Result<StartedTask, ServiceError>>,
    },
    Complete {
        user_id: String,
        completion_id: String,
        response: oneshot::Sender<Result<CompletedTask, ServiceError>>,
    },
    History {
        user_id: String,
        response: oneshot::Sender<Result<Vec<TaskCompletion>, ServiceError>>,
    },
    Create {
        admin_id: String,
        new: NewTask,
        response: oneshot::Sender<Result<Task, ServiceError>>,
    },
    ListAll {
        admin_id: String,
        response: oneshot::Sender<Result<Vec<Task>, ServiceError>>,
    },
    Update {
        admin_id: String,
        task_id: String,
        update: TaskUpdate,
        response: oneshot::Sender<Result<Task, ServiceError>>,
    },
    Delete {
        admin_id: String,
        task_id: String,
        response: oneshot::Sender<Result<(), ServiceError>>,
    },
    Toggle {
        admin_id: String,
        task_id: String,
        response: oneshot::Sender<Result<Task, ServiceError>>,
    },
}

#[derive(Clone)]
pub struct TaskRequestHandler {
    store: Arc<Store>,
    repository: TaskRepository,
}

impl TaskRequestHandler {
    pub fn new(store: Arc<Store>, policy: Policy) -> Self {
        let repository = TaskRepository::new(store.clone(), policy.utc_offset_minutes);

        TaskRequestHandler { store, repository }
    }

    async fn start(&self, user_id: &str, task_id: &str) -> Result<StartedTask, ServiceError> {
        let (completion, task) = self.repository.start_task(user_id, task_id).await?;
        let reward_cents = completion.reward_cents;

        Ok(StartedTask {
            completion,
            task,
            reward_cents,
        })
    }

    async fn complete(
        &self,
        user_id: &str,
        completion_id: &str,
    ) -> Result<CompletedTask, ServiceError> {
        let (completion, new_balance) =
            self.repository.complete_task(user_id, completion_id).await?;

        log::info!(
            "user {} completed task {} for {} cents",
            user_id,
            completion.task_id,
            completion.reward_cents
        );

        Ok(CompletedTask {
            reward_cents: completion.reward_cents,
            new_balance_cents: new_balance,
            completion,
        })
    }
}

#[async_trait]
impl RequestHandler<TaskRequest> for TaskRequestHandler {
    async fn handle_request(&self, request: TaskRequest) {
        match request {
            TaskRequest::Available { user_id, response } => {
                let _ = response.send(self.repository.available_tasks(&user_id).map_err(Into::into));
            }
            TaskRequest::Start {
                user_id,
                task_id,
                response,
            } => {
                let _ = response.send(self.start(&user_id, &task_id).await);
            }
            TaskRequest::Complete {
                user_id,
                completion_id,
                response,
            } => {
                let _ = response.send(self.complete(&user_id, &completion_id).await);
            }
            TaskRequest::History { user_id, response } => {
                let _ = response.send(Ok(self.repository.history(&user_id, 50)));
            }
            TaskRequest::Create {
                admin_id,
                new,
                response,
            } => {
                let result = self
                    .store
                    .ensure_admin(&admin_id)
                    .and_then(|_| self.repository.create_task(new))
                    .map_err(Into::into);
                let _ = response.send(result);
            }
            TaskRequest::ListAll { admin_id, response } => {
                let result = self
                    .store
                    .ensure_admin(&admin_id)
                    .map(|_| self.repository.all_tasks())
                    .map_err(Into::into);
                let _ = response.send(result);
            }
            TaskRequest::Update {
                admin_id,
                task_id,
                update,
                response,
            } => {
                let result = self
                    .store
                    .ensure_admin(&admin_id)
                    .and_then(|_| self.repository.update_task(&task_id, update))
                    .map_err(Into::into);
                let _ = response.send(result);
            }
            TaskRequest::Delete {
                admin_id,
                task_id,
                response,
            } => {
                let result = self
                    .store
                    .ensure_admin(&admin_id)
                    .and_then(|_| self.repository.delete_task(&task_id))
                    .map_err(Into::into);
                let _ = response.send(result);
            }
            TaskRequest::Toggle {
                admin_id,
                task_id,
                response,
            } => {
                let result = self
                    .store
                    .ensure_admin(&admin_id)
                    .and_then(|_| self.repository.toggle_task(&task_id))
                    .map_err(Into::into);
                let _ = response.send(result);
            }
        }
    }
}

pub struct TaskService;

impl TaskService {
    pub fn new() -> Self {
        TaskService {}
    }
}

#[async_trait]
impl Service<TaskRequest, TaskRequestHandler> for TaskService {}
