use crate::db::reconciliation_queries;
use crate::error::{AppError, AppResult};
use crate::models::{
    BankReconciliation, BankReconciliationItem, ReconciliationItemKind, ReconciliationStatus,
    ReconciliationSummary, ReconciliationTotals,
};
use bigdecimal::{BigDecimal, Zero};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use sqlx::{PgConnection, PgPool};

#[derive(Debug, Clone, Deserialize)]
pub struct NewReconciliation {
    pub bank_account_id: i64,
    pub reconciliation_date: NaiveDate,
    pub book_balance: BigDecimal,
    pub bank_balance: BigDecimal,
    pub user: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewReconciliationItem {
    pub item_type: ReconciliationItemKind,
    pub amount: BigDecimal,
    pub description: Option<String>,
}

/// Reconciliation sessions: adjusting items, balance check, finalization.
pub struct ReconciliationService {
    pool: PgPool,
}

impl ReconciliationService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_summary(
        conn: &mut PgConnection,
        reconciliation: BankReconciliation,
    ) -> AppResult<ReconciliationSummary> {
        let items = reconciliation_queries::list_items(conn, reconciliation.id).await?;
        let totals = ReconciliationTotals::compute(
            &reconciliation.book_balance,
            &reconciliation.bank_balance,
            &items,
        );
        Ok(ReconciliationSummary {
            reconciliation,
            items,
            totals,
        })
    }

    pub async fn create_reconciliation(
        &self,
        tenant_id: i64,
        request: &NewReconciliation,
    ) -> AppResult<BankReconciliation> {
        let result: AppResult<_> = async {
            let mut conn = self.pool.acquire().await?;
            let created = reconciliation_queries::insert_reconciliation(
                &mut conn,
                tenant_id,
                request.bank_account_id,
                request.reconciliation_date,
                &request.book_balance,
                &request.bank_balance,
                &request.user,
            )
            .await?;

            tracing::info!(
                tenant_id,
                reconciliation_id = created.id,
                bank_account_id = request.bank_account_id,
                "reconciliation session created"
            );
            Ok(created)
        }
        .await;

        result.map_err(|e| e.logged("create_reconciliation"))
    }

    pub async fn add_item(
        &self,
        tenant_id: i64,
        reconciliation_id: i64,
        item: &NewReconciliationItem,
    ) -> AppResult<BankReconciliationItem> {
        let result: AppResult<_> = async {
            let mut tx = self.pool.begin().await?;

            let reconciliation =
                reconciliation_queries::lock_reconciliation(&mut tx, tenant_id, reconciliation_id)
                    .await?
                    .ok_or_else(|| {
                        AppError::not_found(format!(
                            "Reconciliation {} not found",
                            reconciliation_id
                        ))
                    })?;
            if item.amount <= BigDecimal::zero() {
                return Err(AppError::validation("Item amount must be positive"));
            }
            if reconciliation.status != ReconciliationStatus::Draft {
                return Err(AppError::business(format!(
                    "Reconciliation {} is already finalized",
                    reconciliation_id
                )));
            }

            let created = reconciliation_queries::insert_item(
                &mut tx,
                reconciliation_id,
                item.item_type,
                &item.amount,
                item.description.as_deref(),
            )
            .await?;
            tx.commit().await?;

            tracing::debug!(
                tenant_id,
                reconciliation_id,
                item_type = item.item_type.as_str(),
                "reconciliation item added"
            );
            Ok(created)
        }
        .await;

        result.map_err(|e| e.logged("add_reconciliation_item"))
    }

    pub async fn reconciliation_summary(
        &self,
        tenant_id: i64,
        reconciliation_id: i64,
    ) -> AppResult<ReconciliationSummary> {
        let result: AppResult<_> = async {
            let mut conn = self.pool.acquire().await?;
            let reconciliation =
                reconciliation_queries::get_reconciliation(&mut conn, tenant_id, reconciliation_id)
                    .await?
                    .ok_or_else(|| {
                        AppError::not_found(format!(
                            "Reconciliation {} not found",
                            reconciliation_id
                        ))
                    })?;
            Self::load_summary(&mut conn, reconciliation).await
        }
        .await;

        result.map_err(|e| e.logged("reconciliation_summary"))
    }

    /// Draft → finalized, only when adjusted balances agree.
    pub async fn finalize(
        &self,
        tenant_id: i64,
        reconciliation_id: i64,
        user: &str,
    ) -> AppResult<ReconciliationSummary> {
        let result: AppResult<_> = async {
            let mut tx = self.pool.begin().await?;

            let reconciliation =
                reconciliation_queries::lock_reconciliation(&mut tx, tenant_id, reconciliation_id)
                    .await?
                    .ok_or_else(|| {
                        AppError::not_found(format!(
                            "Reconciliation {} not found",
                            reconciliation_id
                        ))
                    })?;
            if reconciliation.status == ReconciliationStatus::Finalized {
                return Err(AppError::business(format!(
                    "Reconciliation {} is already finalized",
                    reconciliation_id
                )));
            }

            let summary = Self::load_summary(&mut tx, reconciliation).await?;
            if !summary.totals.is_balanced {
                return Err(AppError::business(format!(
                    "Reconciliation {} is not balanced (difference {})",
                    reconciliation_id, summary.totals.difference
                )));
            }

            let updated =
                reconciliation_queries::mark_finalized(&mut tx, reconciliation_id, user, Utc::now())
                    .await?;
            if updated == 0 {
                return Err(AppError::business(format!(
                    "Reconciliation {} is already finalized",
                    reconciliation_id
                )));
            }

            let finalized =
                reconciliation_queries::get_reconciliation(&mut tx, tenant_id, reconciliation_id)
                    .await?
                    .ok_or_else(|| {
                        AppError::not_found(format!(
                            "Reconciliation {} not found",
                            reconciliation_id
                        ))
                    })?;
            tx.commit().await?;

            tracing::info!(tenant_id, reconciliation_id, user, "reconciliation finalized");
            Ok(ReconciliationSummary {
                reconciliation: finalized,
                ..summary
            })
        }
        .await;

        result.map_err(|e| e.logged("finalize_reconciliation"))
    }
}
