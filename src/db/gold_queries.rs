use crate::models::{
    GoldInvoice, GoldPrice, Installment, InstallmentStatus, InstallmentType, OverdueFilter,
    OverdueInstallmentRow,
};
use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use sqlx::PgConnection;

const INVOICE_COLUMNS: &str = r#"
    id, tenant_id, customer_id, invoice_number, invoice_type, status, is_active,
    is_installment, installment_type, total_amount, paid_amount,
    total_gold_weight, remaining_gold_weight
"#;

const INSTALLMENT_COLUMNS: &str = r#"
    i.id, i.invoice_id, i.installment_number, i.installment_type, i.gold_weight_due,
    i.gold_weight_paid, i.gold_purity, i.amount_paid, i.due_date, i.status,
    i.gold_price_at_payment, i.payment_date, i.payment_method, i.payment_reference, i.notes
"#;

/// Loads and locks the invoice row.
pub async fn lock_invoice(
    conn: &mut PgConnection,
    tenant_id: i64,
    invoice_id: i64,
) -> Result<Option<GoldInvoice>, sqlx::Error> {
    let sql = format!(
        r#"
        SELECT {INVOICE_COLUMNS}
        FROM invoices
        WHERE id = $1 AND tenant_id = $2
        FOR UPDATE
        "#
    );
    sqlx::query_as::<_, GoldInvoice>(&sql)
        .bind(invoice_id)
        .bind(tenant_id)
        .fetch_optional(conn)
        .await
}

pub async fn get_invoice(
    conn: &mut PgConnection,
    tenant_id: i64,
    invoice_id: i64,
) -> Result<Option<GoldInvoice>, sqlx::Error> {
    let sql = format!(
        r#"
        SELECT {INVOICE_COLUMNS}
        FROM invoices
        WHERE id = $1 AND tenant_id = $2
        "#
    );
    sqlx::query_as::<_, GoldInvoice>(&sql)
        .bind(invoice_id)
        .bind(tenant_id)
        .fetch_optional(conn)
        .await
}

pub async fn count_installments(
    conn: &mut PgConnection,
    invoice_id: i64,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT count(*) FROM installments WHERE invoice_id = $1")
        .bind(invoice_id)
        .fetch_one(conn)
        .await
}

pub async fn insert_gold_installment(
    conn: &mut PgConnection,
    invoice_id: i64,
    installment_number: i32,
    gold_weight_due: &BigDecimal,
    gold_purity: &BigDecimal,
    due_date: NaiveDate,
    created_by: &str,
) -> Result<Installment, sqlx::Error> {
    let sql = format!(
        r#"
        INSERT INTO installments AS i
            (invoice_id, installment_number, installment_type, gold_weight_due,
             gold_weight_paid, gold_purity, due_date, status, created_by)
        VALUES ($1, $2, $3, $4, 0, $5, $6, $7, $8)
        RETURNING {INSTALLMENT_COLUMNS}
        "#
    );
    sqlx::query_as::<_, Installment>(&sql)
        .bind(invoice_id)
        .bind(installment_number)
        .bind(InstallmentType::Gold.as_str())
        .bind(gold_weight_due)
        .bind(gold_purity)
        .bind(due_date)
        .bind(InstallmentStatus::Pending.as_str())
        .bind(created_by)
        .fetch_one(conn)
        .await
}

pub async fn mark_invoice_gold_installment(
    conn: &mut PgConnection,
    invoice_id: i64,
    total_gold_weight: &BigDecimal,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE invoices
        SET is_installment = TRUE,
            installment_type = 'gold',
            remaining_gold_weight = $2
        WHERE id = $1
        "#,
    )
    .bind(invoice_id)
    .bind(total_gold_weight)
    .execute(conn)
    .await?;
    Ok(())
}

/// Installment resolved through its invoice's tenant, locked for update.
pub async fn lock_installment(
    conn: &mut PgConnection,
    tenant_id: i64,
    installment_id: i64,
) -> Result<Option<Installment>, sqlx::Error> {
    let sql = format!(
        r#"
        SELECT {INSTALLMENT_COLUMNS}
        FROM installments i
        INNER JOIN invoices inv ON inv.id = i.invoice_id
        WHERE i.id = $1 AND inv.tenant_id = $2
        FOR UPDATE OF i
        "#
    );
    sqlx::query_as::<_, Installment>(&sql)
        .bind(installment_id)
        .bind(tenant_id)
        .fetch_optional(conn)
        .await
}

pub async fn list_installments(
    conn: &mut PgConnection,
    invoice_id: i64,
) -> Result<Vec<Installment>, sqlx::Error> {
    let sql = format!(
        r#"
        SELECT {INSTALLMENT_COLUMNS}
        FROM installments i
        WHERE i.invoice_id = $1
        ORDER BY i.installment_number
        "#
    );
    sqlx::query_as::<_, Installment>(&sql)
        .bind(invoice_id)
        .fetch_all(conn)
        .await
}

/// Writes back the payment-related fields of an installment.
pub async fn save_installment_payment(
    conn: &mut PgConnection,
    installment: &Installment,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE installments
        SET gold_weight_paid = $2,
            amount_paid = $3,
            gold_price_at_payment = $4,
            payment_date = $5,
            payment_method = $6,
            payment_reference = $7,
            notes = $8,
            status = $9
        WHERE id = $1
        "#,
    )
    .bind(installment.id)
    .bind(&installment.gold_weight_paid)
    .bind(&installment.amount_paid)
    .bind(&installment.gold_price_at_payment)
    .bind(installment.payment_date)
    .bind(&installment.payment_method)
    .bind(&installment.payment_reference)
    .bind(&installment.notes)
    .bind(installment.status.as_str())
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn set_installment_status(
    conn: &mut PgConnection,
    installment_id: i64,
    status: InstallmentStatus,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE installments SET status = $2 WHERE id = $1")
        .bind(installment_id)
        .bind(status.as_str())
        .execute(conn)
        .await?;
    Ok(())
}

/// Decrements the invoice's remaining weight, never below zero.
pub async fn reduce_invoice_gold_weight(
    conn: &mut PgConnection,
    invoice_id: i64,
    weight: &BigDecimal,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE invoices
        SET remaining_gold_weight = GREATEST(COALESCE(remaining_gold_weight, 0) - $2, 0)
        WHERE id = $1
        "#,
    )
    .bind(invoice_id)
    .bind(weight)
    .execute(conn)
    .await?;
    Ok(())
}

/// The invoice's own payment bookkeeping: accumulate the currency amount.
pub async fn add_invoice_payment(
    conn: &mut PgConnection,
    invoice_id: i64,
    amount: &BigDecimal,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE invoices
        SET paid_amount = paid_amount + $2,
            status = CASE WHEN status = 'paid' THEN status ELSE 'partially_paid' END
        WHERE id = $1
        "#,
    )
    .bind(invoice_id)
    .bind(amount)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn count_unsettled_installments(
    conn: &mut PgConnection,
    invoice_id: i64,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        r#"
        SELECT count(*)
        FROM installments
        WHERE invoice_id = $1 AND gold_weight_paid < gold_weight_due
        "#,
    )
    .bind(invoice_id)
    .fetch_one(conn)
    .await
}

/// Closes the invoice out: status paid, remaining weight exactly zero.
pub async fn mark_invoice_paid(
    conn: &mut PgConnection,
    invoice_id: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE invoices
        SET status = 'paid', remaining_gold_weight = 0
        WHERE id = $1
        "#,
    )
    .bind(invoice_id)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn list_overdue_installments(
    conn: &mut PgConnection,
    tenant_id: i64,
    filter: &OverdueFilter,
    today: NaiveDate,
) -> Result<Vec<OverdueInstallmentRow>, sqlx::Error> {
    sqlx::query_as::<_, OverdueInstallmentRow>(
        r#"
        SELECT i.id, i.invoice_id, inv.invoice_number, inv.customer_id, i.installment_number,
               i.gold_weight_due, i.gold_weight_paid, i.due_date, i.status
        FROM installments i
        INNER JOIN invoices inv ON inv.id = i.invoice_id
        WHERE inv.tenant_id = $1
          AND i.status IN ('pending', 'overdue')
          AND i.due_date < $2
          AND i.gold_weight_paid < i.gold_weight_due
          AND ($3::BIGINT IS NULL OR inv.customer_id = $3)
          AND ($4::BIGINT IS NULL OR i.due_date <= $2 - $4::INTEGER)
        ORDER BY i.due_date, i.invoice_id, i.installment_number
        "#,
    )
    .bind(tenant_id)
    .bind(today)
    .bind(filter.customer_id)
    .bind(filter.days_overdue)
    .fetch_all(conn)
    .await
}

pub async fn price_for_date(
    conn: &mut PgConnection,
    tenant_id: i64,
    purity: &BigDecimal,
    price_date: NaiveDate,
) -> Result<Option<GoldPrice>, sqlx::Error> {
    sqlx::query_as::<_, GoldPrice>(
        r#"
        SELECT id, tenant_id, purity, price_date, price_per_gram, is_current
        FROM gold_prices
        WHERE tenant_id = $1 AND purity = $2 AND price_date = $3
        "#,
    )
    .bind(tenant_id)
    .bind(purity)
    .bind(price_date)
    .fetch_optional(conn)
    .await
}

pub async fn current_price(
    conn: &mut PgConnection,
    tenant_id: i64,
    purity: &BigDecimal,
) -> Result<Option<GoldPrice>, sqlx::Error> {
    sqlx::query_as::<_, GoldPrice>(
        r#"
        SELECT id, tenant_id, purity, price_date, price_per_gram, is_current
        FROM gold_prices
        WHERE tenant_id = $1 AND purity = $2 AND is_current
        "#,
    )
    .bind(tenant_id)
    .bind(purity)
    .fetch_optional(conn)
    .await
}

pub async fn unset_current_price(
    conn: &mut PgConnection,
    tenant_id: i64,
    purity: &BigDecimal,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE gold_prices
        SET is_current = FALSE
        WHERE tenant_id = $1 AND purity = $2 AND is_current
        "#,
    )
    .bind(tenant_id)
    .bind(purity)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

pub async fn upsert_price(
    conn: &mut PgConnection,
    tenant_id: i64,
    purity: &BigDecimal,
    price_date: NaiveDate,
    price_per_gram: &BigDecimal,
    is_current: bool,
) -> Result<GoldPrice, sqlx::Error> {
    sqlx::query_as::<_, GoldPrice>(
        r#"
        INSERT INTO gold_prices (tenant_id, purity, price_date, price_per_gram, is_current)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (tenant_id, purity, price_date)
        DO UPDATE SET price_per_gram = EXCLUDED.price_per_gram,
                      is_current = EXCLUDED.is_current OR gold_prices.is_current
        RETURNING id, tenant_id, purity, price_date, price_per_gram, is_current
        "#,
    )
    .bind(tenant_id)
    .bind(purity)
    .bind(price_date)
    .bind(price_per_gram)
    .bind(is_current)
    .fetch_one(conn)
    .await
}
