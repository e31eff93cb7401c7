use crate::models::{BankTransaction, BookTransaction, MatchRecord, NewBankTransaction};
use chrono::NaiveDate;
use sqlx::PgConnection;

const BANK_TRANSACTION_COLUMNS: &str = r#"
    id, tenant_id, bank_account_id, statement_id, transaction_date, description,
    reference_number, debit_amount, credit_amount, balance_after, counterparty_name,
    is_matched, matched_transaction_id, matched_date, matched_by, match_confidence,
    match_notes, notes
"#;

/// Unmatched statement lines of one bank account
pub async fn list_unmatched_bank_transactions(
    conn: &mut PgConnection,
    tenant_id: i64,
    bank_account_id: i64,
) -> Result<Vec<BankTransaction>, sqlx::Error> {
    let sql = format!(
        r#"
        SELECT {BANK_TRANSACTION_COLUMNS}
        FROM bank_transactions
        WHERE tenant_id = $1
          AND bank_account_id = $2
          AND NOT is_matched
        ORDER BY transaction_date, id
        "#
    );
    sqlx::query_as::<_, BankTransaction>(&sql)
        .bind(tenant_id)
        .bind(bank_account_id)
        .fetch_all(conn)
        .await
}

/// Payments and receipts not yet claimed by any bank transaction
pub async fn list_unmatched_book_transactions(
    conn: &mut PgConnection,
    tenant_id: i64,
) -> Result<Vec<BookTransaction>, sqlx::Error> {
    sqlx::query_as::<_, BookTransaction>(
        r#"
        SELECT bt.id, bt.tenant_id, bt.amount, bt.transaction_date, bt.reference_number,
               bt.transaction_type, c.name AS customer_name
        FROM book_transactions bt
        LEFT JOIN customers c ON c.id = bt.customer_id
        WHERE bt.tenant_id = $1
          AND bt.transaction_type IN ('payment', 'receipt')
          AND NOT EXISTS (
              SELECT 1 FROM bank_transactions m
              WHERE m.is_matched AND m.matched_transaction_id = bt.id
          )
        ORDER BY bt.transaction_date, bt.id
        "#,
    )
    .bind(tenant_id)
    .fetch_all(conn)
    .await
}

pub async fn get_bank_transaction(
    conn: &mut PgConnection,
    tenant_id: i64,
    bank_transaction_id: i64,
) -> Result<Option<BankTransaction>, sqlx::Error> {
    let sql = format!(
        r#"
        SELECT {BANK_TRANSACTION_COLUMNS}
        FROM bank_transactions
        WHERE id = $1 AND tenant_id = $2
        "#
    );
    sqlx::query_as::<_, BankTransaction>(&sql)
        .bind(bank_transaction_id)
        .bind(tenant_id)
        .fetch_optional(conn)
        .await
}

/// Locks the row until the surrounding transaction ends.
pub async fn lock_bank_transaction(
    conn: &mut PgConnection,
    tenant_id: i64,
    bank_transaction_id: i64,
) -> Result<Option<BankTransaction>, sqlx::Error> {
    let sql = format!(
        r#"
        SELECT {BANK_TRANSACTION_COLUMNS}
        FROM bank_transactions
        WHERE id = $1 AND tenant_id = $2
        FOR UPDATE
        "#
    );
    sqlx::query_as::<_, BankTransaction>(&sql)
        .bind(bank_transaction_id)
        .bind(tenant_id)
        .fetch_optional(conn)
        .await
}

pub async fn get_book_transaction(
    conn: &mut PgConnection,
    tenant_id: i64,
    book_transaction_id: i64,
) -> Result<Option<BookTransaction>, sqlx::Error> {
    sqlx::query_as::<_, BookTransaction>(
        r#"
        SELECT bt.id, bt.tenant_id, bt.amount, bt.transaction_date, bt.reference_number,
               bt.transaction_type, c.name AS customer_name
        FROM book_transactions bt
        LEFT JOIN customers c ON c.id = bt.customer_id
        WHERE bt.id = $1 AND bt.tenant_id = $2
        "#,
    )
    .bind(book_transaction_id)
    .bind(tenant_id)
    .fetch_optional(conn)
    .await
}

/// Whether some bank transaction other than `except_bank_id` already claims
/// the book transaction.
pub async fn is_book_transaction_claimed(
    conn: &mut PgConnection,
    book_transaction_id: i64,
    except_bank_id: i64,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM bank_transactions
            WHERE is_matched
              AND matched_transaction_id = $1
              AND id <> $2
        )
        "#,
    )
    .bind(book_transaction_id)
    .bind(except_bank_id)
    .fetch_one(conn)
    .await
}

/// Conditional write: only succeeds while the bank transaction is unmatched
/// and the book transaction is unclaimed. Returns the affected row count.
pub async fn apply_match(
    conn: &mut PgConnection,
    tenant_id: i64,
    bank_transaction_id: i64,
    record: &MatchRecord,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE bank_transactions
        SET is_matched = TRUE,
            matched_transaction_id = $3,
            matched_date = $4,
            matched_by = $5,
            match_confidence = $6,
            match_notes = $7
        WHERE id = $1
          AND tenant_id = $2
          AND NOT is_matched
          AND NOT EXISTS (
              SELECT 1 FROM bank_transactions other
              WHERE other.is_matched AND other.matched_transaction_id = $3
          )
        "#,
    )
    .bind(bank_transaction_id)
    .bind(tenant_id)
    .bind(record.book_transaction_id)
    .bind(record.matched_date)
    .bind(&record.matched_by)
    .bind(record.confidence)
    .bind(&record.notes)
    .execute(conn)
    .await?;

    Ok(result.rows_affected())
}

pub async fn clear_match(
    conn: &mut PgConnection,
    tenant_id: i64,
    bank_transaction_id: i64,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE bank_transactions
        SET is_matched = FALSE,
            matched_transaction_id = NULL,
            matched_date = NULL,
            matched_by = NULL,
            match_confidence = NULL,
            match_notes = NULL
        WHERE id = $1 AND tenant_id = $2 AND is_matched
        "#,
    )
    .bind(bank_transaction_id)
    .bind(tenant_id)
    .execute(conn)
    .await?;

    Ok(result.rows_affected())
}

pub async fn create_statement(
    conn: &mut PgConnection,
    tenant_id: i64,
    bank_account_id: i64,
    statement_date: NaiveDate,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO bank_statements (tenant_id, bank_account_id, statement_date)
        VALUES ($1, $2, $3)
        RETURNING id
        "#,
    )
    .bind(tenant_id)
    .bind(bank_account_id)
    .bind(statement_date)
    .fetch_one(conn)
    .await
}

pub async fn update_statement_counts(
    conn: &mut PgConnection,
    statement_id: i64,
    imported_rows: i32,
    failed_rows: i32,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE bank_statements
        SET imported_rows = $2, failed_rows = $3
        WHERE id = $1
        "#,
    )
    .bind(statement_id)
    .bind(imported_rows)
    .bind(failed_rows)
    .execute(conn)
    .await?;
    Ok(())
}

/// Bulk insert of parsed statement lines
pub async fn insert_bank_transactions(
    conn: &mut PgConnection,
    tenant_id: i64,
    bank_account_id: i64,
    statement_id: i64,
    rows: &[NewBankTransaction],
) -> Result<u64, sqlx::Error> {
    if rows.is_empty() {
        return Ok(0);
    }

    tracing::debug!("building bulk insert for {} statement lines", rows.len());
    let start_time = std::time::Instant::now();

    let mut query_builder = sqlx::QueryBuilder::new(
        "INSERT INTO bank_transactions (
            tenant_id, bank_account_id, statement_id, transaction_date, description,
            reference_number, debit_amount, credit_amount, balance_after, counterparty_name
        ) ",
    );

    query_builder.push_values(rows, |mut b, row| {
        b.push_bind(tenant_id)
            .push_bind(bank_account_id)
            .push_bind(statement_id)
            .push_bind(row.transaction_date)
            .push_bind(&row.description)
            .push_bind(&row.reference_number)
            .push_bind(row.debit_amount.clone())
            .push_bind(row.credit_amount.clone())
            .push_bind(row.balance_after.clone())
            .push_bind(&row.counterparty_name);
    });

    let result = query_builder.build().execute(conn).await?;
    tracing::info!(
        "inserted {} statement lines in {:?}",
        result.rows_affected(),
        start_time.elapsed()
    );
    Ok(result.rows_affected())
}
