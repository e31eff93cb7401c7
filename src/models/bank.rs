use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One imported bank-statement line.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct BankTransaction {
    pub id: i64,
    pub tenant_id: i64,
    pub bank_account_id: i64,
    pub statement_id: i64,
    pub transaction_date: NaiveDate,
    pub description: String,
    pub reference_number: Option<String>,
    pub debit_amount: BigDecimal,
    pub credit_amount: BigDecimal,
    pub balance_after: Option<BigDecimal>,
    pub counterparty_name: Option<String>,
    pub is_matched: bool,
    pub matched_transaction_id: Option<i64>,
    pub matched_date: Option<DateTime<Utc>>,
    pub matched_by: Option<String>,
    pub match_confidence: Option<f64>,
    /// Written by match, cleared by unmatch. `notes` belongs to the statement line.
    pub match_notes: Option<String>,
    pub notes: Option<String>,
}

impl BankTransaction {
    /// Whichever of debit/credit is nonzero.
    pub fn absolute_amount(&self) -> BigDecimal {
        if !self.debit_amount.is_zero() {
            self.debit_amount.abs()
        } else {
            self.credit_amount.abs()
        }
    }

    pub fn is_credit(&self) -> bool {
        self.credit_amount > BigDecimal::zero()
    }

    pub fn is_debit(&self) -> bool {
        self.debit_amount > BigDecimal::zero()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookTransactionType {
    Payment,
    Receipt,
}

impl BookTransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Payment => "payment",
            Self::Receipt => "receipt",
        }
    }
}

impl TryFrom<String> for BookTransactionType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "payment" => Ok(Self::Payment),
            "receipt" => Ok(Self::Receipt),
            other => Err(format!("unsupported book transaction type: {}", other)),
        }
    }
}

/// A payment or receipt recorded in the books, with the linked
/// customer's name loaded eagerly.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct BookTransaction {
    pub id: i64,
    pub tenant_id: i64,
    pub amount: BigDecimal,
    pub transaction_date: NaiveDate,
    pub reference_number: Option<String>,
    #[sqlx(try_from = "String")]
    pub transaction_type: BookTransactionType,
    pub customer_name: Option<String>,
}

/// Computed per scoring pass, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchSuggestion {
    pub bank_transaction_id: i64,
    pub book_transaction_id: i64,
    pub confidence_score: f64,
    pub match_reasons: Vec<String>,
    pub amount_difference: BigDecimal,
    pub date_difference_days: i64,
}

/// Values written onto a bank transaction when it is matched.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchRecord {
    pub book_transaction_id: i64,
    pub matched_by: String,
    pub matched_date: DateTime<Utc>,
    pub confidence: f64,
    pub notes: Option<String>,
}

impl MatchRecord {
    /// Manual matches always carry full confidence.
    pub fn manual(
        book_transaction_id: i64,
        user: &str,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            book_transaction_id,
            matched_by: user.to_string(),
            matched_date: now,
            confidence: 1.0,
            notes,
        }
    }

    pub fn automatic(suggestion: &MatchSuggestion, user: &str, now: DateTime<Utc>) -> Self {
        Self {
            book_transaction_id: suggestion.book_transaction_id,
            matched_by: user.to_string(),
            matched_date: now,
            confidence: suggestion.confidence_score,
            notes: Some(format!(
                "Auto-matched with {:.1}% confidence",
                suggestion.confidence_score * 100.0
            )),
        }
    }
}

/// Statistics of one auto-match run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoMatchResult {
    pub total_bank_transactions: usize,
    pub total_book_transactions: usize,
    pub matched_count: usize,
    pub skipped_count: usize,
    pub match_rate: f64,
    pub high_confidence_matches: usize,
    pub medium_confidence_matches: usize,
    pub low_confidence_matches: usize,
    pub processing_time_ms: u64,
    pub top_matches: Vec<MatchSuggestion>,
}

/// A statement line that passed parsing and is ready for insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct NewBankTransaction {
    pub transaction_date: NaiveDate,
    pub description: String,
    pub reference_number: Option<String>,
    pub debit_amount: BigDecimal,
    pub credit_amount: BigDecimal,
    pub balance_after: Option<BigDecimal>,
    pub counterparty_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportRowError {
    pub row: usize,
    pub message: String,
}

/// Best effort: failed rows are listed, not fatal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportResult {
    pub statement_id: i64,
    pub imported_count: usize,
    pub failed_count: usize,
    pub errors: Vec<ImportRowError>,
}
