use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalStatus {
    Pending,
    Processing,
    Completed,
    Rejected,
}

impl WithdrawalStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WithdrawalStatus::Completed | WithdrawalStatus::Rejected)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutMethod {
    Nayapay,
    Jazzcash,
    Easypaisa,
    Raast,
    Zindigi,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AccountDetails {
    pub account_name: String,
    pub account_number: Option<String>,
    pub bank_name: Option<String>,
    pub phone_number: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Withdrawal {
    pub id: String,
    pub user_id: String,
    /// Amount debited from the wallet at creation. Tax comes out of this, it
    /// is not added on top.
    pub amount_cents: i64,
    pub tax_percentage: u32,
    pub tax_amount_cents: i64,
    pub net_amount_cents: i64,
    pub method: PayoutMethod,
    pub account: AccountDetails,
    pub status: WithdrawalStatus,
    pub processed_at: Option<chrono::NaiveDateTime>,
    pub remarks: Option<String>,
    pub created_at: chrono::NaiveDateTime,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewWithdrawal {
    pub amount_cents: i64,
    pub method: PayoutMethod,
    pub account: AccountDetails,
}
