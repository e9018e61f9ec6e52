use serde::{Deserialize, Serialize};

use crate::models::packages::Package;

/// Cached balance/earnings counters. The ledger is ground truth; every write
/// path touching these must append matching ledger entries in the same locked
/// section.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Wallet {
    pub balance_cents: i64,
    pub earnings_cents: i64,
    pub referral_earnings_cents: i64,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub phone: Option<String>,
    pub referral_code: String,
    pub referred_by: Option<String>,
    pub wallet: Wallet,
    pub current_package: Option<String>,
    pub package_purchase_date: Option<chrono::NaiveDateTime>,
    pub tasks_completed: i64,
    pub referral_count: i64,
    pub is_active: bool,
    pub is_admin: bool,
    pub created_at: chrono::NaiveDateTime,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub phone: Option<String>,
    pub referral_code: Option<String>,
}

/// Profile view. A package whose purchase entry is still pending is reported
/// under `pending_package`, not `current_package`.
#[derive(Clone, Debug, Serialize)]
pub struct UserProfile {
    pub user: User,
    pub current_package: Option<Package>,
    pub pending_package: Option<Package>,
    pub package_status: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ReferralSummary {
    pub id: String,
    pub username: String,
    pub email: String,
    pub earnings_cents: i64,
    pub tasks_completed: i64,
    pub created_at: chrono::NaiveDateTime,
}

#[derive(Clone, Debug, Serialize)]
pub struct DashboardStats {
    pub total_users: i64,
    pub total_task_rewards_cents: i64,
    pub total_withdrawn_cents: i64,
    pub pending_withdrawals: i64,
    pub active_packages: i64,
}
