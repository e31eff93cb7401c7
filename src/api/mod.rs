pub mod handlers;

pub use handlers::*;

use crate::config::MatchingConfig;
use crate::service::{GoldLedger, ReconciliationMatcher, ReconciliationService, StatementImporter};
use axum::{
    routing::{get, post, put},
    Router,
};
use sqlx::PgPool;
use std::sync::Arc;

/// All HTTP routes. Each service family carries its own state and the
/// routers are merged.
pub fn router(pool: PgPool, matching: MatchingConfig) -> Router {
    let matching_state = MatchingState {
        matcher: Arc::new(ReconciliationMatcher::new(pool.clone())),
        importer: Arc::new(StatementImporter::new(pool.clone())),
        defaults: matching,
    };
    let reconciliation_service = Arc::new(ReconciliationService::new(pool.clone()));
    let gold_ledger = Arc::new(GoldLedger::new(pool));

    let matching_routes = Router::new()
        .route(
            "/api/tenants/:tenant_id/bank-accounts/:bank_account_id/match-suggestions",
            get(match_suggestions),
        )
        .route(
            "/api/tenants/:tenant_id/bank-accounts/:bank_account_id/auto-match",
            post(auto_match),
        )
        .route(
            "/api/tenants/:tenant_id/bank-accounts/:bank_account_id/statements",
            post(import_statement),
        )
        .route(
            "/api/tenants/:tenant_id/bank-transactions/:bank_transaction_id/match",
            post(match_transaction),
        )
        .route(
            "/api/tenants/:tenant_id/bank-transactions/:bank_transaction_id/unmatch",
            post(unmatch_transaction),
        )
        .with_state(matching_state);

    let reconciliation_routes = Router::new()
        .route(
            "/api/tenants/:tenant_id/reconciliations",
            post(create_reconciliation),
        )
        .route(
            "/api/tenants/:tenant_id/reconciliations/:reconciliation_id",
            get(reconciliation_summary),
        )
        .route(
            "/api/tenants/:tenant_id/reconciliations/:reconciliation_id/items",
            post(add_reconciliation_item),
        )
        .route(
            "/api/tenants/:tenant_id/reconciliations/:reconciliation_id/finalize",
            post(finalize_reconciliation),
        )
        .with_state(reconciliation_service);

    let gold_routes = Router::new()
        .route("/api/tenants/:tenant_id/gold/plans", post(create_gold_plan))
        .route(
            "/api/tenants/:tenant_id/gold/installments/:installment_id/payments",
            post(record_gold_payment),
        )
        .route(
            "/api/tenants/:tenant_id/gold/installments/:installment_id/cancel",
            post(cancel_installment),
        )
        .route(
            "/api/tenants/:tenant_id/gold/invoices/:invoice_id/summary",
            get(gold_weight_summary),
        )
        .route("/api/tenants/:tenant_id/gold/overdue", get(overdue_installments))
        .route("/api/tenants/:tenant_id/gold/prices", put(set_gold_price))
        .route(
            "/api/tenants/:tenant_id/gold/prices/current",
            get(current_gold_price),
        )
        .route(
            "/api/tenants/:tenant_id/gold/prices/:price_date",
            get(gold_price_for_date),
        )
        .route(
            "/api/tenants/:tenant_id/gold/conversions/weight",
            get(convert_amount_to_weight),
        )
        .route(
            "/api/tenants/:tenant_id/gold/conversions/amount",
            get(convert_weight_to_amount),
        )
        .with_state(gold_ledger);

    Router::new()
        .route("/health", get(health_check))
        .merge(matching_routes)
        .merge(reconciliation_routes)
        .merge(gold_routes)
}
