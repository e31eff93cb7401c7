//! Best-effort CSV statement ingestion.
//!
//! Header: `date,description,reference,debit,credit,balance,counterparty`.
//! A bad row is reported and skipped; it never aborts the import.

use crate::db::bank_queries;
use crate::error::{AppError, AppResult};
use crate::models::{ImportResult, ImportRowError, NewBankTransaction};
use bigdecimal::{BigDecimal, Zero};
use chrono::NaiveDate;
use csv::{ReaderBuilder, Trim};
use sqlx::PgPool;
use std::str::FromStr;

const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%Y/%m/%d"];
const REQUIRED_COLUMNS: [&str; 4] = ["date", "description", "debit", "credit"];

#[derive(Debug, serde::Deserialize)]
struct StatementRow {
    date: String,
    description: Option<String>,
    reference: Option<String>,
    debit: Option<String>,
    credit: Option<String>,
    balance: Option<String>,
    counterparty: Option<String>,
}

fn parse_date(value: &str) -> Result<NaiveDate, String> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
        .ok_or_else(|| format!("invalid date '{}'", value))
}

/// Empty cells are zero; thousands separators are ignored.
fn parse_amount(field: &str, value: Option<&str>) -> Result<BigDecimal, String> {
    let raw = match value.map(str::trim) {
        None | Some("") => return Ok(BigDecimal::zero()),
        Some(v) => v.replace(',', ""),
    };
    let amount =
        BigDecimal::from_str(&raw).map_err(|_| format!("invalid {} amount '{}'", field, raw))?;
    if amount < BigDecimal::zero() {
        return Err(format!("{} amount cannot be negative", field));
    }
    Ok(amount)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl StatementRow {
    fn into_transaction(self) -> Result<NewBankTransaction, String> {
        let transaction_date = parse_date(self.date.trim())?;
        let debit_amount = parse_amount("debit", self.debit.as_deref())?;
        let credit_amount = parse_amount("credit", self.credit.as_deref())?;

        match (debit_amount.is_zero(), credit_amount.is_zero()) {
            (true, true) => return Err("row has neither a debit nor a credit amount".to_string()),
            (false, false) => return Err("row has both a debit and a credit amount".to_string()),
            _ => {}
        }

        let balance_after = match self.balance.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(v) => Some(
                BigDecimal::from_str(&v.replace(',', ""))
                    .map_err(|_| format!("invalid balance '{}'", v))?,
            ),
        };

        Ok(NewBankTransaction {
            transaction_date,
            description: self.description.unwrap_or_default(),
            reference_number: non_empty(self.reference),
            debit_amount,
            credit_amount,
            balance_after,
            counterparty_name: non_empty(self.counterparty),
        })
    }
}

/// Parses every data row independently. Only an unreadable header is fatal.
/// Row numbers in the error list are 1-based and exclude the header.
pub fn parse_statement_csv(
    text: &str,
) -> AppResult<(Vec<NewBankTransaction>, Vec<ImportRowError>)> {
    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers: csv::StringRecord = rdr
        .headers()?
        .iter()
        .map(|h| h.to_ascii_lowercase())
        .collect();
    rdr.set_headers(headers.clone());
    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|col| !headers.iter().any(|h| h.eq_ignore_ascii_case(col)))
        .collect();
    if !missing.is_empty() {
        return Err(AppError::validation(format!(
            "Statement is missing required columns: {}",
            missing.join(", ")
        )));
    }

    let mut rows = Vec::new();
    let mut errors = Vec::new();

    for (idx, record) in rdr.deserialize::<StatementRow>().enumerate() {
        let row = idx + 1;
        let parsed = record
            .map_err(|e| format!("unreadable row: {}", e))
            .and_then(StatementRow::into_transaction);
        match parsed {
            Ok(tx) => rows.push(tx),
            Err(message) => {
                tracing::warn!(row, "skipping statement row: {}", message);
                errors.push(ImportRowError { row, message });
            }
        }
    }

    Ok((rows, errors))
}

pub struct StatementImporter {
    pool: PgPool,
}

impl StatementImporter {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Records the statement even when no row survives parsing.
    pub async fn import_statement(
        &self,
        tenant_id: i64,
        bank_account_id: i64,
        statement_date: NaiveDate,
        csv_text: &str,
    ) -> AppResult<ImportResult> {
        let result: AppResult<_> = async {
            let (rows, errors) = parse_statement_csv(csv_text)?;

            let mut tx = self.pool.begin().await?;
            let statement_id =
                bank_queries::create_statement(&mut tx, tenant_id, bank_account_id, statement_date)
                    .await?;
            let inserted = bank_queries::insert_bank_transactions(
                &mut tx,
                tenant_id,
                bank_account_id,
                statement_id,
                &rows,
            )
            .await?;
            bank_queries::update_statement_counts(
                &mut tx,
                statement_id,
                inserted as i32,
                errors.len() as i32,
            )
            .await?;
            tx.commit().await?;

            tracing::info!(
                tenant_id,
                bank_account_id,
                statement_id,
                "statement imported: {} rows, {} failed",
                inserted,
                errors.len()
            );

            Ok(ImportResult {
                statement_id,
                imported_count: inserted as usize,
                failed_count: errors.len(),
                errors,
            })
        }
        .await;

        result.map_err(|e| e.logged("import_statement"))
    }
}
