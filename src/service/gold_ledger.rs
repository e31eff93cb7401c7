use crate::db::gold_queries;
use crate::error::{AppError, AppResult};
use crate::models::gold::{
    amount_for_weight, default_gold_purity, distribute_gold_weight, schedule_due_dates,
    validate_gold_price, weight_for_amount, DEFAULT_INTERVAL_DAYS,
};
use crate::models::{
    GoldPrice, GoldWeightSummary, Installment, InstallmentStatus, OverdueFilter,
    OverdueInstallment, SettledPayment,
};
use bigdecimal::{BigDecimal, Zero};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};

#[derive(Debug, Clone, Deserialize)]
pub struct CreateGoldPlan {
    pub invoice_id: i64,
    pub installments: u32,
    pub start_date: Option<NaiveDate>,
    pub interval_days: Option<i64>,
    pub purity: Option<BigDecimal>,
    pub user: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GoldPaymentRequest {
    pub amount: BigDecimal,
    pub payment_date: Option<NaiveDate>,
    /// Used instead of the stored price for the payment date.
    pub price_override: Option<BigDecimal>,
    pub payment_method: Option<String>,
    pub payment_reference: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GoldPaymentOutcome {
    pub installment: Installment,
    pub weight_settled: BigDecimal,
    pub price_per_gram: BigDecimal,
    pub invoice_completed: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetGoldPrice {
    pub purity: Option<BigDecimal>,
    pub price_date: NaiveDate,
    pub price_per_gram: BigDecimal,
    #[serde(default)]
    pub set_as_current: bool,
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn missing_price(date: NaiveDate) -> AppError {
    AppError::business(format!("No gold price found for date {}", date))
}

/// Weight-denominated installment plans for gold invoices.
pub struct GoldLedger {
    pool: PgPool,
}

impl GoldLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn required_price(
        conn: &mut PgConnection,
        tenant_id: i64,
        purity: &BigDecimal,
        date: NaiveDate,
    ) -> AppResult<BigDecimal> {
        gold_queries::price_for_date(conn, tenant_id, purity, date)
            .await?
            .map(|p| p.price_per_gram)
            .ok_or_else(|| missing_price(date))
    }

    pub async fn create_plan(
        &self,
        tenant_id: i64,
        request: &CreateGoldPlan,
    ) -> AppResult<Vec<Installment>> {
        let result: AppResult<_> = async {
            let interval_days = request.interval_days.unwrap_or(DEFAULT_INTERVAL_DAYS);
            if interval_days <= 0 {
                return Err(AppError::validation("Installment interval must be positive"));
            }
            let purity = request.purity.clone().unwrap_or_else(default_gold_purity);
            if purity <= BigDecimal::zero() {
                return Err(AppError::validation("Gold purity must be positive"));
            }

            let mut tx = self.pool.begin().await?;

            let invoice = gold_queries::lock_invoice(&mut tx, tenant_id, request.invoice_id)
                .await?
                .ok_or_else(|| {
                    AppError::not_found(format!("Invoice {} not found", request.invoice_id))
                })?;
            let existing = gold_queries::count_installments(&mut tx, invoice.id).await?;
            let total_weight = invoice.ensure_can_create_gold_plan(existing)?;

            let weights = distribute_gold_weight(&total_weight, request.installments)?;
            let start_date = request.start_date.unwrap_or_else(today);
            let due_dates = schedule_due_dates(start_date, request.installments, interval_days);

            let mut installments = Vec::with_capacity(weights.len());
            for (idx, (weight, due_date)) in weights.iter().zip(due_dates).enumerate() {
                let installment = gold_queries::insert_gold_installment(
                    &mut tx,
                    invoice.id,
                    idx as i32 + 1,
                    weight,
                    &purity,
                    due_date,
                    &request.user,
                )
                .await?;
                installments.push(installment);
            }

            gold_queries::mark_invoice_gold_installment(&mut tx, invoice.id, &total_weight).await?;
            tx.commit().await?;

            tracing::info!(
                tenant_id,
                invoice_id = invoice.id,
                "gold plan created: {} installments for {} g",
                installments.len(),
                total_weight
            );
            Ok(installments)
        }
        .await;

        result.map_err(|e| e.logged("create_gold_plan"))
    }

    /// Converts a currency payment to weight at the price of the payment date
    /// and settles it against the installment.
    pub async fn record_payment(
        &self,
        tenant_id: i64,
        installment_id: i64,
        request: &GoldPaymentRequest,
    ) -> AppResult<GoldPaymentOutcome> {
        let result: AppResult<_> = async {
            let mut tx = self.pool.begin().await?;

            let mut installment =
                gold_queries::lock_installment(&mut tx, tenant_id, installment_id)
                    .await?
                    .ok_or_else(|| {
                        AppError::not_found(format!("Installment {} not found", installment_id))
                    })?;
            installment.ensure_payable()?;
            if request.amount <= BigDecimal::zero() {
                return Err(AppError::validation("Payment amount must be positive"));
            }

            let payment_date = request.payment_date.unwrap_or_else(today);
            let price_per_gram = match &request.price_override {
                Some(price) => {
                    validate_gold_price(price)?;
                    price.clone()
                }
                None => {
                    Self::required_price(&mut tx, tenant_id, &default_gold_purity(), payment_date)
                        .await?
                }
            };

            let weight = weight_for_amount(&request.amount, &price_per_gram)?;
            if weight.is_zero() {
                return Err(AppError::validation(format!(
                    "Payment of {} is too small to settle any gold at {}/g",
                    request.amount, price_per_gram
                )));
            }

            installment.apply_payment(&SettledPayment {
                amount: request.amount.clone(),
                price_per_gram: price_per_gram.clone(),
                weight: weight.clone(),
                payment_date,
                payment_method: request.payment_method.clone(),
                payment_reference: request.payment_reference.clone(),
                note: request.notes.clone(),
            })?;

            gold_queries::save_installment_payment(&mut tx, &installment).await?;
            gold_queries::reduce_invoice_gold_weight(&mut tx, installment.invoice_id, &weight)
                .await?;
            gold_queries::add_invoice_payment(&mut tx, installment.invoice_id, &request.amount)
                .await?;

            let unsettled =
                gold_queries::count_unsettled_installments(&mut tx, installment.invoice_id).await?;
            let invoice_completed = unsettled == 0;
            if invoice_completed {
                gold_queries::mark_invoice_paid(&mut tx, installment.invoice_id).await?;
            }

            tx.commit().await?;

            tracing::info!(
                tenant_id,
                installment_id,
                invoice_id = installment.invoice_id,
                "gold payment of {} settled {} g at {}/g",
                request.amount,
                weight,
                price_per_gram
            );
            if invoice_completed {
                tracing::info!(
                    tenant_id,
                    invoice_id = installment.invoice_id,
                    "invoice fully paid in gold"
                );
            }

            Ok(GoldPaymentOutcome {
                installment,
                weight_settled: weight,
                price_per_gram,
                invoice_completed,
            })
        }
        .await;

        result.map_err(|e| e.logged("record_gold_payment"))
    }

    /// Recomputed from live installment rows, never from the invoice's cache.
    pub async fn remaining_weight_summary(
        &self,
        tenant_id: i64,
        invoice_id: i64,
    ) -> AppResult<GoldWeightSummary> {
        let result: AppResult<_> = async {
            let mut conn = self.pool.acquire().await?;

            let invoice = gold_queries::get_invoice(&mut conn, tenant_id, invoice_id)
                .await?
                .ok_or_else(|| AppError::not_found(format!("Invoice {} not found", invoice_id)))?;
            let installments = gold_queries::list_installments(&mut conn, invoice.id).await?;

            let purity = installments
                .first()
                .map(|i| i.gold_purity.clone())
                .unwrap_or_else(default_gold_purity);
            let current = gold_queries::current_price(&mut conn, tenant_id, &purity)
                .await?
                .map(|p| p.price_per_gram);

            Ok(GoldWeightSummary::from_installments(
                invoice.id,
                &installments,
                current,
            ))
        }
        .await;

        result.map_err(|e| e.logged("remaining_weight_summary"))
    }

    /// Past-due installments with their effective status. Nothing is written.
    pub async fn overdue(
        &self,
        tenant_id: i64,
        filter: &OverdueFilter,
    ) -> AppResult<Vec<OverdueInstallment>> {
        let result: AppResult<_> = async {
            let mut conn = self.pool.acquire().await?;
            let today = today();
            let rows =
                gold_queries::list_overdue_installments(&mut conn, tenant_id, filter, today).await?;
            Ok(rows
                .into_iter()
                .map(|row| OverdueInstallment::evaluate(row, today))
                .collect())
        }
        .await;

        result.map_err(|e| e.logged("overdue_installments"))
    }

    /// Same rows as [`GoldLedger::overdue`], persisting `pending → overdue`.
    pub async fn refresh_overdue(
        &self,
        tenant_id: i64,
        filter: &OverdueFilter,
    ) -> AppResult<Vec<OverdueInstallment>> {
        let result: AppResult<_> = async {
            let mut tx = self.pool.begin().await?;
            let today = today();
            let rows =
                gold_queries::list_overdue_installments(&mut tx, tenant_id, filter, today).await?;

            let evaluated: Vec<OverdueInstallment> = rows
                .into_iter()
                .map(|row| OverdueInstallment::evaluate(row, today))
                .collect();

            let mut upgraded = 0usize;
            for item in evaluated.iter().filter(|i| i.newly_overdue) {
                gold_queries::set_installment_status(&mut tx, item.installment_id, item.status)
                    .await?;
                upgraded += 1;
            }
            tx.commit().await?;

            if upgraded > 0 {
                tracing::info!(tenant_id, "{} installments moved to overdue", upgraded);
            }
            Ok(evaluated)
        }
        .await;

        result.map_err(|e| e.logged("refresh_overdue"))
    }

    pub async fn cancel_installment(
        &self,
        tenant_id: i64,
        installment_id: i64,
        user: &str,
    ) -> AppResult<Installment> {
        let result: AppResult<_> = async {
            let mut tx = self.pool.begin().await?;

            let mut installment =
                gold_queries::lock_installment(&mut tx, tenant_id, installment_id)
                    .await?
                    .ok_or_else(|| {
                        AppError::not_found(format!("Installment {} not found", installment_id))
                    })?;
            match installment.status {
                InstallmentStatus::Paid => {
                    return Err(AppError::business(format!(
                        "Installment {} is already paid and cannot be cancelled",
                        installment_id
                    )));
                }
                InstallmentStatus::Cancelled => return Ok(installment),
                InstallmentStatus::Pending | InstallmentStatus::Overdue => {}
            }

            gold_queries::set_installment_status(
                &mut tx,
                installment.id,
                InstallmentStatus::Cancelled,
            )
            .await?;
            tx.commit().await?;
            installment.status = InstallmentStatus::Cancelled;

            tracing::info!(tenant_id, installment_id, user, "installment cancelled");
            Ok(installment)
        }
        .await;

        result.map_err(|e| e.logged("cancel_installment"))
    }

    /// Upserts the price for tenant+purity+date. A current price replaces the
    /// previous current one in the same transaction.
    pub async fn set_gold_price(
        &self,
        tenant_id: i64,
        request: &SetGoldPrice,
    ) -> AppResult<GoldPrice> {
        let result: AppResult<_> = async {
            validate_gold_price(&request.price_per_gram)?;
            let purity = request.purity.clone().unwrap_or_else(default_gold_purity);

            let mut tx = self.pool.begin().await?;
            if request.set_as_current {
                gold_queries::unset_current_price(&mut tx, tenant_id, &purity).await?;
            }
            let price = gold_queries::upsert_price(
                &mut tx,
                tenant_id,
                &purity,
                request.price_date,
                &request.price_per_gram,
                request.set_as_current,
            )
            .await?;
            tx.commit().await?;

            tracing::info!(
                tenant_id,
                price_date = %request.price_date,
                is_current = price.is_current,
                "gold price set: {}/g at purity {}",
                price.price_per_gram,
                price.purity
            );
            Ok(price)
        }
        .await;

        result.map_err(|e| e.logged("set_gold_price"))
    }

    pub async fn price_for_date(
        &self,
        tenant_id: i64,
        purity: Option<BigDecimal>,
        date: NaiveDate,
    ) -> AppResult<GoldPrice> {
        let result: AppResult<_> = async {
            let purity = purity.unwrap_or_else(default_gold_purity);
            let mut conn = self.pool.acquire().await?;
            gold_queries::price_for_date(&mut conn, tenant_id, &purity, date)
                .await?
                .ok_or_else(|| missing_price(date))
        }
        .await;

        result.map_err(|e| e.logged("gold_price_for_date"))
    }

    pub async fn current_price(
        &self,
        tenant_id: i64,
        purity: Option<BigDecimal>,
    ) -> AppResult<GoldPrice> {
        let result: AppResult<_> = async {
            let purity = purity.unwrap_or_else(default_gold_purity);
            let mut conn = self.pool.acquire().await?;
            gold_queries::current_price(&mut conn, tenant_id, &purity)
                .await?
                .ok_or_else(|| {
                    AppError::not_found(format!("No current gold price for purity {}", purity))
                })
        }
        .await;

        result.map_err(|e| e.logged("current_gold_price"))
    }

    /// `amount / price` at the stored price for `date`.
    pub async fn weight_for_payment(
        &self,
        tenant_id: i64,
        amount: &BigDecimal,
        date: NaiveDate,
        purity: Option<BigDecimal>,
    ) -> AppResult<BigDecimal> {
        let result: AppResult<_> = async {
            if *amount <= BigDecimal::zero() {
                return Err(AppError::validation("Payment amount must be positive"));
            }
            let purity = purity.unwrap_or_else(default_gold_purity);
            let mut conn = self.pool.acquire().await?;
            let price = Self::required_price(&mut conn, tenant_id, &purity, date).await?;
            weight_for_amount(amount, &price)
        }
        .await;

        result.map_err(|e| e.logged("weight_for_payment"))
    }

    /// `weight * price` at the stored price for `date`.
    pub async fn payment_for_weight(
        &self,
        tenant_id: i64,
        weight: &BigDecimal,
        date: NaiveDate,
        purity: Option<BigDecimal>,
    ) -> AppResult<BigDecimal> {
        let result: AppResult<_> = async {
            if *weight <= BigDecimal::zero() {
                return Err(AppError::validation("Gold weight must be positive"));
            }
            let purity = purity.unwrap_or_else(default_gold_purity);
            let mut conn = self.pool.acquire().await?;
            let price = Self::required_price(&mut conn, tenant_id, &purity, date).await?;
            amount_for_weight(weight, &price)
        }
        .await;

        result.map_err(|e| e.logged("payment_for_weight"))
    }
}
