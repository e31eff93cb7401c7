use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconciliationStatus {
    Draft,
    Finalized,
}

impl ReconciliationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Finalized => "finalized",
        }
    }
}

impl TryFrom<String> for ReconciliationStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "draft" => Ok(Self::Draft),
            "finalized" => Ok(Self::Finalized),
            other => Err(format!("unknown reconciliation status: {}", other)),
        }
    }
}

/// A reconciliation session for one bank account at one date.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct BankReconciliation {
    pub id: i64,
    pub tenant_id: i64,
    pub bank_account_id: i64,
    pub reconciliation_date: NaiveDate,
    pub book_balance: BigDecimal,
    pub bank_balance: BigDecimal,
    #[sqlx(try_from = "String")]
    pub status: ReconciliationStatus,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub finalized_at: Option<DateTime<Utc>>,
    pub finalized_by: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationItemKind {
    /// Recorded in the books, not yet on the statement.
    OutstandingDeposit,
    OutstandingCheck,
    /// On the statement, not yet in the books.
    BankCharge,
    Interest,
}

impl ReconciliationItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OutstandingDeposit => "outstanding_deposit",
            Self::OutstandingCheck => "outstanding_check",
            Self::BankCharge => "bank_charge",
            Self::Interest => "interest",
        }
    }
}

impl TryFrom<String> for ReconciliationItemKind {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "outstanding_deposit" => Ok(Self::OutstandingDeposit),
            "outstanding_check" => Ok(Self::OutstandingCheck),
            "bank_charge" => Ok(Self::BankCharge),
            "interest" => Ok(Self::Interest),
            other => Err(format!("unknown reconciliation item type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct BankReconciliationItem {
    pub id: i64,
    pub reconciliation_id: i64,
    #[sqlx(try_from = "String")]
    pub item_type: ReconciliationItemKind,
    pub amount: BigDecimal,
    pub description: Option<String>,
}

/// Adjusted balances of a session, derived from its items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationTotals {
    pub outstanding_deposits: BigDecimal,
    pub outstanding_checks: BigDecimal,
    pub bank_charges: BigDecimal,
    pub interest: BigDecimal,
    pub adjusted_bank_balance: BigDecimal,
    pub adjusted_book_balance: BigDecimal,
    pub difference: BigDecimal,
    pub is_balanced: bool,
}

impl ReconciliationTotals {
    pub fn compute(
        book_balance: &BigDecimal,
        bank_balance: &BigDecimal,
        items: &[BankReconciliationItem],
    ) -> Self {
        let mut outstanding_deposits = BigDecimal::zero();
        let mut outstanding_checks = BigDecimal::zero();
        let mut bank_charges = BigDecimal::zero();
        let mut interest = BigDecimal::zero();

        for item in items {
            match item.item_type {
                ReconciliationItemKind::OutstandingDeposit => outstanding_deposits += &item.amount,
                ReconciliationItemKind::OutstandingCheck => outstanding_checks += &item.amount,
                ReconciliationItemKind::BankCharge => bank_charges += &item.amount,
                ReconciliationItemKind::Interest => interest += &item.amount,
            }
        }

        let adjusted_bank_balance = bank_balance + &outstanding_deposits - &outstanding_checks;
        let adjusted_book_balance = book_balance - &bank_charges + &interest;
        let difference = &adjusted_book_balance - &adjusted_bank_balance;
        let is_balanced = difference.is_zero();

        Self {
            outstanding_deposits,
            outstanding_checks,
            bank_charges,
            interest,
            adjusted_bank_balance,
            adjusted_book_balance,
            difference,
            is_balanced,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationSummary {
    pub reconciliation: BankReconciliation,
    pub items: Vec<BankReconciliationItem>,
    pub totals: ReconciliationTotals,
}
