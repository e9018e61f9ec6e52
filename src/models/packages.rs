use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Package {
    pub id: String,
    pub name: String,
    pub price_cents: i64,
    pub description: String,
    pub tasks_per_day: u32,
    pub reward_per_task_cents: i64,
    pub total_days: u32,
    pub total_earnings_cents: i64,
    pub features: Vec<String>,
    pub is_active: bool,
    pub created_at: chrono::NaiveDateTime,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewPackage {
    pub name: String,
    pub price_cents: i64,
    pub description: String,
    pub tasks_per_day: u32,
    pub reward_per_task_cents: i64,
    pub total_days: u32,
    pub features: Vec<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct PackagePurchase {
    pub package_id: String,
    pub payment_method: String,
    pub payment_proof: Option<String>,
    pub external_ref: Option<String>,
}

/// A pending purchase awaiting admin approval, joined for the admin view.
#[derive(Clone, Debug, Serialize)]
pub struct PendingPurchase {
    pub entry_id: String,
    pub user_id: String,
    pub username: String,
    pub package: Package,
    pub payment_proof: Option<String>,
    pub external_ref: Option<String>,
    pub created_at: chrono::NaiveDateTime,
}
