#![allow(dead_code)]

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use hesaab_core::run_migrations;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::str::FromStr;

/// Pool against `TEST_DATABASE_URL` with migrations applied, or `None` when
/// the variable is unset.
pub async fn test_pool() -> Option<PgPool> {
    let url = match std::env::var("TEST_DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("TEST_DATABASE_URL not set, skipping");
            return None;
        }
    };
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .expect("connect to test database");
    run_migrations(&pool).await.expect("apply migrations");
    Some(pool)
}

/// A tenant id no earlier run has used.
pub fn fresh_tenant() -> i64 {
    chrono::Utc::now().timestamp_micros()
}

pub fn dec(s: &str) -> BigDecimal {
    BigDecimal::from_str(s).unwrap()
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub async fn insert_customer(pool: &PgPool, tenant_id: i64, name: &str) -> i64 {
    sqlx::query_scalar("INSERT INTO customers (tenant_id, name) VALUES ($1, $2) RETURNING id")
        .bind(tenant_id)
        .bind(name)
        .fetch_one(pool)
        .await
        .unwrap()
}

pub async fn insert_book_transaction(
    pool: &PgPool,
    tenant_id: i64,
    amount: &str,
    on: NaiveDate,
    reference: Option<&str>,
    kind: &str,
    customer_id: Option<i64>,
) -> i64 {
    sqlx::query_scalar(
        r#"
        INSERT INTO book_transactions
            (tenant_id, amount, transaction_date, reference_number, transaction_type, customer_id)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id
        "#,
    )
    .bind(tenant_id)
    .bind(dec(amount))
    .bind(on)
    .bind(reference)
    .bind(kind)
    .bind(customer_id)
    .fetch_one(pool)
    .await
    .unwrap()
}

pub async fn insert_statement(pool: &PgPool, tenant_id: i64, bank_account_id: i64) -> i64 {
    sqlx::query_scalar(
        r#"
        INSERT INTO bank_statements (tenant_id, bank_account_id, statement_date)
        VALUES ($1, $2, CURRENT_DATE)
        RETURNING id
        "#,
    )
    .bind(tenant_id)
    .bind(bank_account_id)
    .fetch_one(pool)
    .await
    .unwrap()
}

pub async fn insert_bank_transaction(
    pool: &PgPool,
    tenant_id: i64,
    bank_account_id: i64,
    statement_id: i64,
    debit: &str,
    credit: &str,
    on: NaiveDate,
    reference: Option<&str>,
) -> i64 {
    sqlx::query_scalar(
        r#"
        INSERT INTO bank_transactions
            (tenant_id, bank_account_id, statement_id, transaction_date, description,
             reference_number, debit_amount, credit_amount)
        VALUES ($1, $2, $3, $4, 'test line', $5, $6, $7)
        RETURNING id
        "#,
    )
    .bind(tenant_id)
    .bind(bank_account_id)
    .bind(statement_id)
    .bind(on)
    .bind(reference)
    .bind(dec(debit))
    .bind(dec(credit))
    .fetch_one(pool)
    .await
    .unwrap()
}

pub async fn insert_gold_invoice(pool: &PgPool, tenant_id: i64, total_weight: &str) -> i64 {
    sqlx::query_scalar(
        r#"
        INSERT INTO invoices
            (tenant_id, invoice_number, invoice_type, status, total_amount, total_gold_weight)
        VALUES ($1, $2, 'gold', 'sent', 0, $3)
        RETURNING id
        "#,
    )
    .bind(tenant_id)
    .bind(format!("INV-G-{}", tenant_id))
    .bind(dec(total_weight))
    .fetch_one(pool)
    .await
    .unwrap()
}

/// `(status, gold_weight_paid, amount_paid, gold_price_at_payment, notes)`.
pub type InstallmentRow = (String, BigDecimal, BigDecimal, Option<BigDecimal>, Option<String>);

pub async fn installment_row(pool: &PgPool, installment_id: i64) -> InstallmentRow {
    sqlx::query_as(
        r#"
        SELECT status, gold_weight_paid, amount_paid, gold_price_at_payment, notes
        FROM installments
        WHERE id = $1
        "#,
    )
    .bind(installment_id)
    .fetch_one(pool)
    .await
    .unwrap()
}

/// `(status, paid_amount, remaining_gold_weight)`.
pub type InvoiceRow = (String, BigDecimal, Option<BigDecimal>);

pub async fn invoice_row(pool: &PgPool, invoice_id: i64) -> InvoiceRow {
    sqlx::query_as(
        "SELECT status, paid_amount, remaining_gold_weight FROM invoices WHERE id = $1",
    )
    .bind(invoice_id)
    .fetch_one(pool)
    .await
    .unwrap()
}
