use crate::config::MatchingConfig;
use crate::error::AppError;
use crate::models::{
    AutoMatchResult, BankReconciliation, BankReconciliationItem, BankTransaction, GoldPrice,
    GoldWeightSummary, ImportResult, Installment, MatchSuggestion, OverdueFilter,
    OverdueInstallment, ReconciliationSummary,
};
use crate::service::{
    CreateGoldPlan, GoldLedger, GoldPaymentOutcome, GoldPaymentRequest, MatchTolerances,
    NewReconciliation, NewReconciliationItem, ReconciliationMatcher, ReconciliationService,
    SetGoldPrice, StatementImporter,
};
use axum::extract::{Json, Path, Query, State};
use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// State of the matching routes: matcher, importer and request defaults.
#[derive(Clone)]
pub struct MatchingState {
    pub matcher: Arc<ReconciliationMatcher>,
    pub importer: Arc<StatementImporter>,
    pub defaults: MatchingConfig,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

fn ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        success: true,
        data,
    })
}

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, AppError>;

pub async fn health_check() -> &'static str {
    "OK"
}

// ---- matching ----

#[derive(Debug, Default, Deserialize)]
pub struct SuggestionParams {
    pub amount_tolerance: Option<BigDecimal>,
    pub date_tolerance_days: Option<i64>,
}

pub async fn match_suggestions(
    State(state): State<MatchingState>,
    Path((tenant_id, bank_account_id)): Path<(i64, i64)>,
    Query(params): Query<SuggestionParams>,
) -> ApiResult<Vec<MatchSuggestion>> {
    let tolerances = MatchTolerances {
        amount_tolerance: params
            .amount_tolerance
            .unwrap_or_else(|| state.defaults.amount_tolerance.clone()),
        date_tolerance_days: params
            .date_tolerance_days
            .unwrap_or(state.defaults.date_tolerance_days),
    };
    let suggestions = state
        .matcher
        .find_matches(tenant_id, bank_account_id, &tolerances)
        .await?;
    Ok(ok(suggestions))
}

#[derive(Debug, Deserialize)]
pub struct MatchRequest {
    pub book_transaction_id: i64,
    pub user: String,
    pub notes: Option<String>,
}

pub async fn match_transaction(
    State(state): State<MatchingState>,
    Path((tenant_id, bank_transaction_id)): Path<(i64, i64)>,
    Json(req): Json<MatchRequest>,
) -> ApiResult<BankTransaction> {
    let matched = state
        .matcher
        .match_transactions(
            tenant_id,
            bank_transaction_id,
            req.book_transaction_id,
            &req.user,
            req.notes,
        )
        .await?;
    Ok(ok(matched))
}

#[derive(Debug, Deserialize)]
pub struct ActorRequest {
    pub user: String,
}

pub async fn unmatch_transaction(
    State(state): State<MatchingState>,
    Path((tenant_id, bank_transaction_id)): Path<(i64, i64)>,
    Json(req): Json<ActorRequest>,
) -> ApiResult<BankTransaction> {
    let unmatched = state
        .matcher
        .unmatch(tenant_id, bank_transaction_id, &req.user)
        .await?;
    Ok(ok(unmatched))
}

#[derive(Debug, Deserialize)]
pub struct AutoMatchRequest {
    pub min_confidence: Option<f64>,
    pub user: String,
}

pub async fn auto_match(
    State(state): State<MatchingState>,
    Path((tenant_id, bank_account_id)): Path<(i64, i64)>,
    Json(req): Json<AutoMatchRequest>,
) -> ApiResult<AutoMatchResult> {
    let min_confidence = req
        .min_confidence
        .unwrap_or(state.defaults.auto_match_min_confidence);
    let result = state
        .matcher
        .auto_match(tenant_id, bank_account_id, min_confidence, &req.user)
        .await?;
    Ok(ok(result))
}

#[derive(Debug, Deserialize)]
pub struct ImportStatementRequest {
    pub statement_date: NaiveDate,
    pub csv: String,
}

pub async fn import_statement(
    State(state): State<MatchingState>,
    Path((tenant_id, bank_account_id)): Path<(i64, i64)>,
    Json(req): Json<ImportStatementRequest>,
) -> ApiResult<ImportResult> {
    let result = state
        .importer
        .import_statement(tenant_id, bank_account_id, req.statement_date, &req.csv)
        .await?;
    Ok(ok(result))
}

// ---- reconciliation sessions ----

pub async fn create_reconciliation(
    State(service): State<Arc<ReconciliationService>>,
    Path(tenant_id): Path<i64>,
    Json(req): Json<NewReconciliation>,
) -> ApiResult<BankReconciliation> {
    Ok(ok(service.create_reconciliation(tenant_id, &req).await?))
}

pub async fn add_reconciliation_item(
    State(service): State<Arc<ReconciliationService>>,
    Path((tenant_id, reconciliation_id)): Path<(i64, i64)>,
    Json(req): Json<NewReconciliationItem>,
) -> ApiResult<BankReconciliationItem> {
    Ok(ok(service.add_item(tenant_id, reconciliation_id, &req).await?))
}

pub async fn reconciliation_summary(
    State(service): State<Arc<ReconciliationService>>,
    Path((tenant_id, reconciliation_id)): Path<(i64, i64)>,
) -> ApiResult<ReconciliationSummary> {
    Ok(ok(service
        .reconciliation_summary(tenant_id, reconciliation_id)
        .await?))
}

pub async fn finalize_reconciliation(
    State(service): State<Arc<ReconciliationService>>,
    Path((tenant_id, reconciliation_id)): Path<(i64, i64)>,
    Json(req): Json<ActorRequest>,
) -> ApiResult<ReconciliationSummary> {
    Ok(ok(service
        .finalize(tenant_id, reconciliation_id, &req.user)
        .await?))
}

// ---- gold ledger ----

pub async fn create_gold_plan(
    State(ledger): State<Arc<GoldLedger>>,
    Path(tenant_id): Path<i64>,
    Json(req): Json<CreateGoldPlan>,
) -> ApiResult<Vec<Installment>> {
    Ok(ok(ledger.create_plan(tenant_id, &req).await?))
}

pub async fn record_gold_payment(
    State(ledger): State<Arc<GoldLedger>>,
    Path((tenant_id, installment_id)): Path<(i64, i64)>,
    Json(req): Json<GoldPaymentRequest>,
) -> ApiResult<GoldPaymentOutcome> {
    Ok(ok(ledger
        .record_payment(tenant_id, installment_id, &req)
        .await?))
}

pub async fn gold_weight_summary(
    State(ledger): State<Arc<GoldLedger>>,
    Path((tenant_id, invoice_id)): Path<(i64, i64)>,
) -> ApiResult<GoldWeightSummary> {
    Ok(ok(ledger
        .remaining_weight_summary(tenant_id, invoice_id)
        .await?))
}

/// Listing also persists newly detected `pending → overdue` transitions.
pub async fn overdue_installments(
    State(ledger): State<Arc<GoldLedger>>,
    Path(tenant_id): Path<i64>,
    Query(filter): Query<OverdueFilter>,
) -> ApiResult<Vec<OverdueInstallment>> {
    Ok(ok(ledger.refresh_overdue(tenant_id, &filter).await?))
}

pub async fn cancel_installment(
    State(ledger): State<Arc<GoldLedger>>,
    Path((tenant_id, installment_id)): Path<(i64, i64)>,
    Json(req): Json<ActorRequest>,
) -> ApiResult<Installment> {
    Ok(ok(ledger
        .cancel_installment(tenant_id, installment_id, &req.user)
        .await?))
}

pub async fn set_gold_price(
    State(ledger): State<Arc<GoldLedger>>,
    Path(tenant_id): Path<i64>,
    Json(req): Json<SetGoldPrice>,
) -> ApiResult<GoldPrice> {
    Ok(ok(ledger.set_gold_price(tenant_id, &req).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct PurityParams {
    pub purity: Option<BigDecimal>,
}

pub async fn current_gold_price(
    State(ledger): State<Arc<GoldLedger>>,
    Path(tenant_id): Path<i64>,
    Query(params): Query<PurityParams>,
) -> ApiResult<GoldPrice> {
    Ok(ok(ledger.current_price(tenant_id, params.purity).await?))
}

pub async fn gold_price_for_date(
    State(ledger): State<Arc<GoldLedger>>,
    Path((tenant_id, price_date)): Path<(i64, NaiveDate)>,
    Query(params): Query<PurityParams>,
) -> ApiResult<GoldPrice> {
    Ok(ok(ledger
        .price_for_date(tenant_id, params.purity, price_date)
        .await?))
}

#[derive(Debug, Deserialize)]
pub struct ConversionParams {
    pub value: BigDecimal,
    pub date: NaiveDate,
    pub purity: Option<BigDecimal>,
}

#[derive(Debug, Serialize)]
pub struct ConversionResponse {
    pub input: BigDecimal,
    pub result: BigDecimal,
    pub date: NaiveDate,
}

/// Currency amount → grams at the price of `date`.
pub async fn convert_amount_to_weight(
    State(ledger): State<Arc<GoldLedger>>,
    Path(tenant_id): Path<i64>,
    Query(params): Query<ConversionParams>,
) -> ApiResult<ConversionResponse> {
    let weight = ledger
        .weight_for_payment(tenant_id, &params.value, params.date, params.purity)
        .await?;
    Ok(ok(ConversionResponse {
        input: params.value,
        result: weight,
        date: params.date,
    }))
}

/// Grams → currency amount at the price of `date`.
pub async fn convert_weight_to_amount(
    State(ledger): State<Arc<GoldLedger>>,
    Path(tenant_id): Path<i64>,
    Query(params): Query<ConversionParams>,
) -> ApiResult<ConversionResponse> {
    let amount = ledger
        .payment_for_weight(tenant_id, &params.value, params.date, params.purity)
        .await?;
    Ok(ok(ConversionResponse {
        input: params.value,
        result: amount,
        date: params.date,
    }))
}
