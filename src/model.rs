use serde::{Deserialize, Serialize};

/// Approval state of an account. `Pending` is the only initial state;
/// redemption moves a record to `Approved` or `Rejected` and the store
/// refuses any transition back to `Pending`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Pending,
    Approved,
    Rejected,
}

impl AccountStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AccountStatus::Pending => "pending",
            AccountStatus::Approved => "approved",
            AccountStatus::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccountRecord {
    pub id: i64,

    /// Unique, stored trimmed and lowercased.
    pub email: String,

    /// Stored as given. This tool trusts its single local operator;
    /// hashing credentials is explicitly out of scope.
    pub secret: String,

    pub name: String,
    pub status: AccountStatus,
    pub created_at: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Organization {
    pub id: i64,
    pub name: String,
    pub contact_person: String,
    pub email: String,
    pub created_at: String,
    pub account_id: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FoodOrder {
    pub id: i64,
    pub organization_id: i64,
    pub people_served: u32,
    pub food_items: Vec<String>,
    pub total_cost: f64,
    pub order_date: String,
    pub account_id: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Paid,
    Pending,
}

impl std::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Pending => "pending",
        })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Invoice {
    pub id: i64,
    pub organization_id: i64,
    pub order_id: i64,
    pub amount: f64,
    pub status: InvoiceStatus,
    pub created_at: String,
    pub account_id: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Expense {
    pub id: i64,
    pub description: String,
    pub amount: f64,
    pub category: String,
    pub date: String,
    pub account_id: i64,
}
