use crate::models::{
    BankReconciliation, BankReconciliationItem, ReconciliationItemKind, ReconciliationStatus,
};
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgConnection;

const RECONCILIATION_COLUMNS: &str = r#"
    id, tenant_id, bank_account_id, reconciliation_date, book_balance, bank_balance,
    status, created_by, created_at, finalized_at, finalized_by
"#;

pub async fn insert_reconciliation(
    conn: &mut PgConnection,
    tenant_id: i64,
    bank_account_id: i64,
    reconciliation_date: NaiveDate,
    book_balance: &BigDecimal,
    bank_balance: &BigDecimal,
    created_by: &str,
) -> Result<BankReconciliation, sqlx::Error> {
    let sql = format!(
        r#"
        INSERT INTO bank_reconciliations
            (tenant_id, bank_account_id, reconciliation_date, book_balance, bank_balance,
             status, created_by)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING {RECONCILIATION_COLUMNS}
        "#
    );
    sqlx::query_as::<_, BankReconciliation>(&sql)
        .bind(tenant_id)
        .bind(bank_account_id)
        .bind(reconciliation_date)
        .bind(book_balance)
        .bind(bank_balance)
        .bind(ReconciliationStatus::Draft.as_str())
        .bind(created_by)
        .fetch_one(conn)
        .await
}

pub async fn get_reconciliation(
    conn: &mut PgConnection,
    tenant_id: i64,
    reconciliation_id: i64,
) -> Result<Option<BankReconciliation>, sqlx::Error> {
    let sql = format!(
        r#"
        SELECT {RECONCILIATION_COLUMNS}
        FROM bank_reconciliations
        WHERE id = $1 AND tenant_id = $2
        "#
    );
    sqlx::query_as::<_, BankReconciliation>(&sql)
        .bind(reconciliation_id)
        .bind(tenant_id)
        .fetch_optional(conn)
        .await
}

pub async fn lock_reconciliation(
    conn: &mut PgConnection,
    tenant_id: i64,
    reconciliation_id: i64,
) -> Result<Option<BankReconciliation>, sqlx::Error> {
    let sql = format!(
        r#"
        SELECT {RECONCILIATION_COLUMNS}
        FROM bank_reconciliations
        WHERE id = $1 AND tenant_id = $2
        FOR UPDATE
        "#
    );
    sqlx::query_as::<_, BankReconciliation>(&sql)
        .bind(reconciliation_id)
        .bind(tenant_id)
        .fetch_optional(conn)
        .await
}

pub async fn list_items(
    conn: &mut PgConnection,
    reconciliation_id: i64,
) -> Result<Vec<BankReconciliationItem>, sqlx::Error> {
    sqlx::query_as::<_, BankReconciliationItem>(
        r#"
        SELECT id, reconciliation_id, item_type, amount, description
        FROM bank_reconciliation_items
        WHERE reconciliation_id = $1
        ORDER BY id
        "#,
    )
    .bind(reconciliation_id)
    .fetch_all(conn)
    .await
}

pub async fn insert_item(
    conn: &mut PgConnection,
    reconciliation_id: i64,
    kind: ReconciliationItemKind,
    amount: &BigDecimal,
    description: Option<&str>,
) -> Result<BankReconciliationItem, sqlx::Error> {
    sqlx::query_as::<_, BankReconciliationItem>(
        r#"
        INSERT INTO bank_reconciliation_items (reconciliation_id, item_type, amount, description)
        VALUES ($1, $2, $3, $4)
        RETURNING id, reconciliation_id, item_type, amount, description
        "#,
    )
    .bind(reconciliation_id)
    .bind(kind.as_str())
    .bind(amount)
    .bind(description)
    .fetch_one(conn)
    .await
}

/// Draft → finalized, at most once.
pub async fn mark_finalized(
    conn: &mut PgConnection,
    reconciliation_id: i64,
    finalized_by: &str,
    finalized_at: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE bank_reconciliations
        SET status = $2, finalized_at = $3, finalized_by = $4
        WHERE id = $1 AND status = $5
        "#,
    )
    .bind(reconciliation_id)
    .bind(ReconciliationStatus::Finalized.as_str())
    .bind(finalized_at)
    .bind(finalized_by)
    .bind(ReconciliationStatus::Draft.as_str())
    .execute(conn)
    .await?;

    Ok(result.rows_affected())
}
