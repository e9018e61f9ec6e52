use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    TaskReward,
    ReferralBonus,
    PackagePurchase,
    Withdrawal,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

/// Append-only record of a balance-affecting event. Immutable after creation
/// except for `status`, which moves only through the withdrawal lifecycle or
/// package approval.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct LedgerEntry {
    pub id: String,
    pub user_id: String,
    pub kind: EntryKind,
    /// Credits positive, debits negative.
    pub amount_cents: i64,
    pub status: EntryStatus,
    pub description: String,
    pub related_task: Option<String>,
    pub related_package: Option<String>,
    /// Explicit link to the withdrawal this entry belongs to. Both entries of
    /// a withdrawal pair carry the same id so they transition together.
    pub related_withdrawal: Option<String>,
    pub payment_proof: Option<String>,
    pub external_ref: Option<String>,
    pub created_at: chrono::NaiveDateTime,
}

/// Fields of an entry about to be appended; id and timestamp are assigned by
/// the ledger repository.
#[derive(Clone, Debug)]
pub struct NewEntry {
    pub user_id: String,
    pub kind: EntryKind,
    pub amount_cents: i64,
    pub status: EntryStatus,
    pub description: String,
    pub related_task: Option<String>,
    pub related_package: Option<String>,
    pub related_withdrawal: Option<String>,
    pub payment_proof: Option<String>,
    pub external_ref: Option<String>,
}

impl NewEntry {
    pub fn new(
        user_id: impl Into<String>,
        kind: EntryKind,
        amount_cents: i64,
        status: EntryStatus,
        description: impl Into<String>,
    ) -> Self {
        NewEntry {
            user_id: user_id.into(),
            kind,
            amount_cents,
            status,
            description: description.into(),
            related_task: None,
            related_package: None,
            related_withdrawal: None,
            payment_proof: None,
            external_ref: None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct KindStats {
    pub total_cents: i64,
    pub count: i64,
}

/// Per-kind totals over non-cancelled entries.
#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct TransactionStats {
    pub task_rewards: KindStats,
    pub referral_bonus: KindStats,
    pub package_purchases: KindStats,
    pub withdrawals: KindStats,
}

/// Outcome of rebuilding a wallet from the ledger.
#[derive(Clone, Debug, Serialize)]
pub struct WalletReconciliation {
    pub user_id: String,
    pub cached_balance_cents: i64,
    pub rebuilt_balance_cents: i64,
    pub rebuilt_earnings_cents: i64,
    pub rebuilt_referral_earnings_cents: i64,
    pub drifted: bool,
}
