use std::sync::Arc;

use chrono::NaiveTime;

use crate::models::ledger::{EntryKind, EntryStatus, NewEntry};
use crate::models::packages::Package;
use crate::models::tasks::{
    AvailableTasks, CompletionStatus, NewTask, Task, TaskCompletion, TaskUpdate,
};
use crate::models::users::User;
use crate::repositories::ledger::LedgerRepository;
use crate::repositories::store::{new_id, now, Store};
use crate::repositories::RepositoryError;

#[derive(Clone)]
pub struct TaskRepository {
    store: Arc<Store>,
    ledger: LedgerRepository,
    utc_offset_minutes: i32,
}

impl TaskRepository {
    pub fn new(store: Arc<Store>, utc_offset_minutes: i32) -> Self {
        let ledger = LedgerRepository::new(store.clone());

        TaskRepository {
            store,
            ledger,
            utc_offset_minutes,
        }
    }

    /// UTC instant of the most recent local midnight. Quotas reset here, not
    /// on a rolling 24h window.
    fn day_start(&self) -> chrono::NaiveDateTime {
        let offset = chrono::Duration::minutes(self.utc_offset_minutes as i64);
        let local = now() + offset;
        local.date().and_time(NaiveTime::MIN) - offset
    }

    fn completed_today(&self, user_id: &str, day_start: chrono::NaiveDateTime) -> u32 {
        self.store
            .completions
            .iter()
            .filter(|c| {
                c.user_id == user_id
                    && c.status == CompletionStatus::Completed
                    && c.completed_at.map_or(false, |at| at >= day_start)
            })
            .count() as u32
    }

    fn attempted_today(&self, user_id: &str, day_start: chrono::NaiveDateTime) -> Vec<String> {
        self.store
            .completions
            .iter()
            .filter(|c| c.user_id == user_id && c.started_at >= day_start)
            .map(|c| c.task_id.clone())
            .collect()
    }

    fn current_package(&self, user: &User) -> Result<Package, RepositoryError> {
        let package_id = user.current_package.as_deref().ok_or_else(|| {
            RepositoryError::Validation("purchase a package to access tasks".to_string())
        })?;

        self.store
            .packages
            .get(package_id)
            .map(|p| p.value().clone())
            .ok_or(RepositoryError::NotFound("package"))
    }

    pub fn available_tasks(&self, user_id: &str) -> Result<AvailableTasks, RepositoryError> {
        let user = self.store.get_user(user_id)?;
        let package = self.current_package(&user)?;

        let day_start = self.day_start();
        let completed_today = self.completed_today(user_id, day_start);
        let attempted = self.attempted_today(user_id, day_start);
        // Starts reserve slots, so remaining counts every attempt today.
        let remaining = package.tasks_per_day.saturating_sub(attempted.len() as u32);

        let tasks = if remaining == 0 {
            Vec::new()
        } else {
            let mut tasks: Vec<Task> = self
                .store
                .tasks
                .iter()
                .filter(|t| t.is_active && !attempted.contains(&t.id))
                .map(|t| t.value().clone())
                .collect();
            tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at));
            tasks
        };

        Ok(AvailableTasks {
            tasks,
            tasks_completed_today: completed_today,
            tasks_allowed: package.tasks_per_day,
            tasks_remaining: remaining,
            reward_per_task_cents: package.reward_per_task_cents,
        })
    }

    /// Reserve a task slot for today. A start consumes a slot immediately, so
    /// in-progress attempts count against the quota alongside completions.
    /// Quota check, duplicate check and the record insert all happen under
    /// the user lock so parallel starts cannot exceed the package quota.
    pub async fn start_task(
        &self,
        user_id: &str,
        task_id: &str,
    ) -> Result<(TaskCompletion, Task), RepositoryError> {
        let _guard = self.store.lock_user(user_id).await;

        let user = self.store.get_user(user_id)?;
        let package = self.current_package(&user)?;

        let task = self
            .store
            .tasks
            .get(task_id)
            .map(|t| t.value().clone())
            .filter(|t| t.is_active)
            .ok_or(RepositoryError::NotFound("task"))?;

        let day_start = self.day_start();
        let attempted = self.attempted_today(user_id, day_start);
        if attempted.len() as u32 >= package.tasks_per_day {
            return Err(RepositoryError::Conflict(
                "daily task limit reached".to_string(),
            ));
        }

        if attempted.contains(&task.id) {
            return Err(RepositoryError::Conflict(
                "task already started or completed today".to_string(),
            ));
        }

        let completion = TaskCompletion {
            id: new_id(),
            user_id: user_id.to_string(),
            task_id: task.id.clone(),
            status: CompletionStatus::InProgress,
            reward_cents: package.reward_per_task_cents,
            started_at: now(),
            completed_at: None,
        };
        self.store
            .completions
            .insert(completion.id.clone(), completion.clone());

        Ok((completion, task))
    }

    /// Credit the completion reward: flips the record, bumps balance and
    /// earnings, bumps the completed counter and appends the reward entry,
    /// all inside one locked section.
    pub async fn complete_task(
        &self,
        user_id: &str,
        completion_id: &str,
    ) -> Result<(TaskCompletion, i64), RepositoryError> {
        let _guard = self.store.lock_user(user_id).await;

        let completion = self
            .store
            .completions
            .get(completion_id)
            .map(|c| c.value().clone())
            .ok_or(RepositoryError::NotFound("task"))?;

        if completion.user_id != user_id {
            return Err(RepositoryError::Unauthorized(
                "task belongs to another user".to_string(),
            ));
        }
        if completion.status == CompletionStatus::Completed {
            return Err(RepositoryError::Conflict(
                "task already completed".to_string(),
            ));
        }

        let completed = {
            let mut record = self
                .store
                .completions
                .get_mut(completion_id)
                .ok_or(RepositoryError::NotFound("task"))?;
            record.status = CompletionStatus::Completed;
            record.completed_at = Some(now());
            record.clone()
        };

        let new_balance = {
            let mut user = self
                .store
                .users
                .get_mut(user_id)
                .ok_or(RepositoryError::NotFound("user"))?;
            user.wallet.balance_cents += completed.reward_cents;
            user.wallet.earnings_cents += completed.reward_cents;
            user.tasks_completed += 1;
            user.wallet.balance_cents
        };

        let title = self
            .store
            .tasks
            .get(&completed.task_id)
            .map(|t| t.title.clone())
            .unwrap_or_else(|| completed.task_id.clone());

        let mut entry = NewEntry::new(
            user_id,
            EntryKind::TaskReward,
            completed.reward_cents,
            EntryStatus::Completed,
            format!("Reward for completing: {}", title),
        );
        entry.related_task = Some(completed.task_id.clone());
        self.ledger.append(entry);

        Ok((completed, new_balance))
    }

    pub fn history(&self, user_id: &str, limit: usize) -> Vec<TaskCompletion> {
        let mut completions: Vec<TaskCompletion> = self
            .store
            .completions
            .iter()
            .filter(|c| c.user_id == user_id)
            .map(|c| c.value().clone())
            .collect();

        completions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        completions.truncate(limit);
        completions
    }

    pub fn create_task(&self, new: NewTask) -> Result<Task, RepositoryError> {
        if new.title.trim().is_empty() || new.description.trim().is_empty() {
            return Err(RepositoryError::Validation(
                "title and description are required".to_string(),
            ));
        }

        let task = Task {
            id: new_id(),
            title: new.title,
            description: new.description,
            kind: new.kind,
            url: new.url,
            duration_secs: new.duration_secs,
            is_active: new.is_active.unwrap_or(true),
            created_at: now(),
        };
        self.store.tasks.insert(task.id.clone(), task.clone());

        Ok(task)
    }

    pub fn all_tasks(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.store.tasks.iter().map(|t| t.value().clone()).collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        tasks
    }

    pub fn update_task(&self, task_id: &str, update: TaskUpdate) -> Result<Task, RepositoryError> {
        let mut task = self
            .store
            .tasks
            .get_mut(task_id)
            .ok_or(RepositoryError::NotFound("task"))?;

        if let Some(title) = update.title {
            if title.trim().is_empty() {
                return Err(RepositoryError::Validation(
                    "title cannot be empty".to_string(),
                ));
            }
            task.title = title;
        }
        if let Some(description) = update.description {
            if description.trim().is_empty() {
                return Err(RepositoryError::Validation(
                    "description cannot be empty".to_string(),
                ));
            }
            task.description = description;
        }
        if let Some(kind) = update.kind {
            task.kind = kind;
        }
        if update.url.is_some() {
            task.url = update.url;
        }
        if update.duration_secs.is_some() {
            task.duration_secs = update.duration_secs;
        }
        if let Some(active) = update.is_active {
            task.is_active = active;
        }

        Ok(task.clone())
    }

    pub fn delete_task(&self, task_id: &str) -> Result<(), RepositoryError> {
        self.store
            .tasks
            .remove(task_id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound("task"))
    }

    pub fn toggle_task(&self, task_id: &str) -> Result<Task, RepositoryError> {
        let mut task = self
            .store
            .tasks
            .get_mut(task_id)
            .ok_or(RepositoryError::NotFound("task"))?;

        task.is_active = !task.is_active;
        Ok(task.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::users::{User, Wallet};

    fn seed_user(store: &Arc<Store>, package_id: Option<String>) -> String {
        let user = User {
            id: new_id(),
            username: "ayesha".to_string(),
            email: "ayesha@example.com".to_string(),
            phone: None,
            referral_code: "REFBBBB0002".to_string(),
            referred_by: None,
            wallet: Wallet::default(),
            current_package: package_id,
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

    fn seed_package(store: &Arc<Store>, tasks_per_day: u32, reward_cents: i64) -> String {
        let package = crate::models::packages::Package {
            id: new_id(),
            name: "Silver".to_string(),
            price_cents: 100_000,
            description: "entry tier".to_string(),
            tasks_per_day,
            reward_per_task_cents: reward_cents,
            total_days: 30,
            total_earnings_cents: tasks_per_day as i64 * reward_cents * 30,
            features: vec![],
            is_active: true,
            created_at: now(),
        };
        let id = package.id.clone();
        store.packages.insert(id.clone(), package);
        id
    }

    fn seed_task(store: &Arc<Store>, title: &str) -> String {
        let task = Task {
            id: new_id(),
            title: title.to_string(),
            description: "watch the clip".to_string(),
            kind: "video".to_string(),
            url: None,
            duration_secs: Some(30),
            is_active: true,
            created_at: now(),
        };
        let id = task.id.clone();
        store.tasks.insert(id.clone(), task);
        id
    }

    fn repo(store: &Arc<Store>) -> TaskRepository {
        TaskRepository::new(store.clone(), 0)
    }

    async fn run_task(repo: &TaskRepository, user_id: &str, task_id: &str) -> i64 {
        let (completion, _) = repo.start_task(user_id, task_id).await.unwrap();
        let (_, balance) = repo.complete_task(user_id, &completion.id).await.unwrap();
        balance
    }

    #[tokio::test]
    async fn completion_credits_wallet_and_ledger_agree() {
        let store = Store::new();
        let package_id = seed_package(&store, 5, 2_500);
        let user_id = seed_user(&store, Some(package_id));
        let repo = repo(&store);

        for i in 0..3 {
            let task_id = seed_task(&store, &format!("task {}", i));
            run_task(&repo, &user_id, &task_id).await;
        }

        let user = store.get_user(&user_id).unwrap();
        assert_eq!(user.wallet.balance_cents, 7_500);
        assert_eq!(user.wallet.earnings_cents, 7_500);
        assert_eq!(user.tasks_completed, 3);

        let rewards: Vec<_> = store
            .ledger
            .iter()
            .filter(|e| {
                e.user_id == user_id
                    && e.kind == EntryKind::TaskReward
                    && e.status == EntryStatus::Completed
            })
            .map(|e| e.amount_cents)
            .collect();
        assert_eq!(rewards.len(), 3);
        assert_eq!(rewards.iter().sum::<i64>(), 7_500);
    }

    #[tokio::test]
    async fn quota_boundary_blocks_fourth_start() {
        let store = Store::new();
        let package_id = seed_package(&store, 3, 1_000);
        let user_id = seed_user(&store, Some(package_id));
        let repo = repo(&store);

        for i in 0..3 {
            let task_id = seed_task(&store, &format!("task {}", i));
            run_task(&repo, &user_id, &task_id).await;
        }

        let extra = seed_task(&store, "one too many");
        let err = repo.start_task(&user_id, &extra).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn same_task_cannot_start_twice_in_a_day() {
        let store = Store::new();
        let package_id = seed_package(&store, 3, 1_000);
        let user_id = seed_user(&store, Some(package_id));
        let repo = repo(&store);

        let task_id = seed_task(&store, "survey");
        repo.start_task(&user_id, &task_id).await.unwrap();

        // First attempt is still in progress.
        let err = repo.start_task(&user_id, &task_id).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn double_completion_is_a_conflict() {
        let store = Store::new();
        let package_id = seed_package(&store, 3, 1_000);
        let user_id = seed_user(&store, Some(package_id));
        let repo = repo(&store);

        let task_id = seed_task(&store, "survey");
        let (completion, _) = repo.start_task(&user_id, &task_id).await.unwrap();
        repo.complete_task(&user_id, &completion.id).await.unwrap();

        let err = repo.complete_task(&user_id, &completion.id).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
        assert_eq!(store.get_user(&user_id).unwrap().wallet.balance_cents, 1_000);
    }

    #[tokio::test]
    async fn completing_anothers_task_is_unauthorized() {
        let store = Store::new();
        let package_id = seed_package(&store, 3, 1_000);
        let owner = seed_user(&store, Some(package_id.clone()));
        let intruder = {
            let mut user = store.get_user(&owner).unwrap();
            user.id = new_id();
            user.username = "other".to_string();
            user.email = "other@example.com".to_string();
            let id = user.id.clone();
            store.users.insert(id.clone(), user);
            id
        };
        let repo = repo(&store);

        let task_id = seed_task(&store, "survey");
        let (completion, _) = repo.start_task(&owner, &task_id).await.unwrap();

        let err = repo.complete_task(&intruder, &completion.id).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn no_package_means_no_tasks() {
        let store = Store::new();
        let user_id = seed_user(&store, None);
        let repo = repo(&store);

        let err = repo.available_tasks(&user_id).unwrap_err();
        assert!(matches!(err, RepositoryError::Validation(_)));
    }

    #[tokio::test]
    async fn starts_reserve_slots_before_any_completion() {
        let store = Store::new();
        let package_id = seed_package(&store, 3, 1_000);
        let user_id = seed_user(&store, Some(package_id));
        let repo = repo(&store);

        // Three distinct starts fill the quota even though nothing is
        // completed yet.
        let mut started = Vec::new();
        for i in 0..3 {
            let task_id = seed_task(&store, &format!("task {}", i));
            let (completion, _) = repo.start_task(&user_id, &task_id).await.unwrap();
            started.push(completion.id);
        }

        let extra = seed_task(&store, "one too many");
        let err = repo.start_task(&user_id, &extra).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));

        // Completing the reserved slots never pays out more than the quota.
        for completion_id in &started {
            repo.complete_task(&user_id, completion_id).await.unwrap();
        }
        assert_eq!(store.get_user(&user_id).unwrap().wallet.balance_cents, 3_000);

        let err = repo.start_task(&user_id, &extra).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn parallel_starts_respect_quota() {
        let store = Store::new();
        let package_id = seed_package(&store, 3, 1_000);
        let user_id = seed_user(&store, Some(package_id));
        let repo = repo(&store);

        // Fill the quota first so every further start must lose the race.
        for i in 0..3 {
            let task_id = seed_task(&store, &format!("task {}", i));
            run_task(&repo, &user_id, &task_id).await;
        }

        let mut handles = Vec::new();
        for i in 0..4 {
            let repo = repo.clone();
            let user_id = user_id.clone();
            let task_id = seed_task(&store, &format!("extra {}", i));
            handles.push(tokio::spawn(async move {
                repo.start_task(&user_id, &task_id).await.is_ok()
            }));
        }

        for handle in handles {
            assert!(!handle.await.unwrap());
        }
    }
}
