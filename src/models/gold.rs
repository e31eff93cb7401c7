use crate::error::{AppError, AppResult};
use bigdecimal::{BigDecimal, Zero};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Weights are tracked in grams with three decimals.
pub const GOLD_WEIGHT_SCALE: i64 = 3;
pub const MIN_INSTALLMENTS: u32 = 2;
pub const MAX_INSTALLMENTS: u32 = 60;
pub const DEFAULT_INTERVAL_DAYS: i64 = 30;
/// Gold prices are stored per gram with two decimals.
pub const GOLD_PRICE_SCALE: i64 = 2;

/// 18 karat, the purity prices are quoted at unless stated otherwise.
pub fn default_gold_purity() -> BigDecimal {
    BigDecimal::from(18)
}

/// Truncates to milligram precision. Callers only pass non-negative weights.
pub fn floor_to_3_decimals(value: &BigDecimal) -> BigDecimal {
    value.with_scale(GOLD_WEIGHT_SCALE)
}

pub fn round_to_3_decimals(value: &BigDecimal) -> BigDecimal {
    value.round(GOLD_WEIGHT_SCALE).with_scale(GOLD_WEIGHT_SCALE)
}

/// Splits `total` into `n` weights; the last one absorbs the rounding
/// remainder so the parts always sum to `total` exactly.
pub fn distribute_gold_weight(total: &BigDecimal, n: u32) -> AppResult<Vec<BigDecimal>> {
    if !(MIN_INSTALLMENTS..=MAX_INSTALLMENTS).contains(&n) {
        return Err(AppError::validation(format!(
            "Number of installments must be between {} and {}",
            MIN_INSTALLMENTS, MAX_INSTALLMENTS
        )));
    }
    if *total <= BigDecimal::zero() {
        return Err(AppError::business("Invoice has no gold weight to distribute"));
    }

    let count = BigDecimal::from(n);
    let base = floor_to_3_decimals(&(total / &count));
    if base.is_zero() {
        return Err(AppError::business(format!(
            "Gold weight {} g is too small to split into {} installments",
            total, n
        )));
    }
    let remainder = total - &(&base * &count);

    let mut weights = vec![base.clone(); n as usize];
    if let Some(last) = weights.last_mut() {
        *last = &base + &remainder;
    }
    Ok(weights)
}

/// Evenly spaced due dates starting at `start`.
pub fn schedule_due_dates(start: NaiveDate, n: u32, interval_days: i64) -> Vec<NaiveDate> {
    (0..i64::from(n))
        .map(|i| start + Duration::days(i * interval_days))
        .collect()
}

/// Rejects prices the price and installment columns would round on write.
pub fn validate_gold_price(price_per_gram: &BigDecimal) -> AppResult<()> {
    if *price_per_gram <= BigDecimal::zero() {
        return Err(AppError::validation("Gold price must be positive"));
    }
    if price_per_gram.with_scale(GOLD_PRICE_SCALE) != *price_per_gram {
        return Err(AppError::validation(format!(
            "Gold price {} has more than {} decimals",
            price_per_gram, GOLD_PRICE_SCALE
        )));
    }
    Ok(())
}

/// `amount / price`, rounded to three decimals.
pub fn weight_for_amount(
    amount: &BigDecimal,
    price_per_gram: &BigDecimal,
) -> AppResult<BigDecimal> {
    if *price_per_gram <= BigDecimal::zero() {
        return Err(AppError::validation("Gold price must be positive"));
    }
    Ok(round_to_3_decimals(&(amount / price_per_gram)))
}

pub fn amount_for_weight(
    weight: &BigDecimal,
    price_per_gram: &BigDecimal,
) -> AppResult<BigDecimal> {
    if *price_per_gram <= BigDecimal::zero() {
        return Err(AppError::validation("Gold price must be positive"));
    }
    Ok(weight * price_per_gram)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallmentStatus {
    Pending,
    Paid,
    Overdue,
    Cancelled,
}

impl InstallmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Overdue => "overdue",
            Self::Cancelled => "cancelled",
        }
    }

    /// `pending → overdue` once the due date has passed with weight still owed.
    /// Every other state is left alone.
    pub fn transition_if_overdue(
        self,
        due_date: NaiveDate,
        remaining_weight: &BigDecimal,
        today: NaiveDate,
    ) -> Self {
        match self {
            Self::Pending if due_date < today && *remaining_weight > BigDecimal::zero() => {
                Self::Overdue
            }
            other => other,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::Overdue)
    }
}

impl TryFrom<String> for InstallmentStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "overdue" => Ok(Self::Overdue),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown installment status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallmentType {
    Gold,
    General,
}

impl InstallmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gold => "gold",
            Self::General => "general",
        }
    }
}

impl TryFrom<String> for InstallmentType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "gold" => Ok(Self::Gold),
            "general" => Ok(Self::General),
            other => Err(format!("unknown installment type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Installment {
    pub id: i64,
    pub invoice_id: i64,
    pub installment_number: i32,
    #[sqlx(try_from = "String")]
    pub installment_type: InstallmentType,
    pub gold_weight_due: BigDecimal,
    pub gold_weight_paid: BigDecimal,
    pub gold_purity: BigDecimal,
    pub amount_paid: BigDecimal,
    pub due_date: NaiveDate,
    #[sqlx(try_from = "String")]
    pub status: InstallmentStatus,
    pub gold_price_at_payment: Option<BigDecimal>,
    pub payment_date: Option<NaiveDate>,
    pub payment_method: Option<String>,
    pub payment_reference: Option<String>,
    pub notes: Option<String>,
}

/// A currency payment already converted to weight.
#[derive(Debug, Clone)]
pub struct SettledPayment {
    pub amount: BigDecimal,
    pub price_per_gram: BigDecimal,
    pub weight: BigDecimal,
    pub payment_date: NaiveDate,
    pub payment_method: Option<String>,
    pub payment_reference: Option<String>,
    pub note: Option<String>,
}

impl Installment {
    pub fn remaining_gold_weight(&self) -> BigDecimal {
        let remaining = &self.gold_weight_due - &self.gold_weight_paid;
        if remaining < BigDecimal::zero() {
            BigDecimal::zero()
        } else {
            remaining
        }
    }

    pub fn is_fully_paid(&self) -> bool {
        self.gold_weight_paid >= self.gold_weight_due
    }

    /// Rejects payments against non-gold, paid or cancelled installments.
    pub fn ensure_payable(&self) -> AppResult<()> {
        if self.installment_type != InstallmentType::Gold {
            return Err(AppError::business(format!(
                "Installment {} is not a gold installment",
                self.id
            )));
        }
        match self.status {
            InstallmentStatus::Paid => Err(AppError::business(format!(
                "Installment {} is already paid",
                self.id
            ))),
            InstallmentStatus::Cancelled => Err(AppError::business(format!(
                "Installment {} is cancelled",
                self.id
            ))),
            _ => Ok(()),
        }
    }

    /// Applies a converted payment. Nothing is mutated when the settled weight
    /// exceeds what is still owed.
    pub fn apply_payment(&mut self, payment: &SettledPayment) -> AppResult<()> {
        let remaining = self.remaining_gold_weight();
        if payment.weight > remaining {
            return Err(AppError::validation(format!(
                "Payment settles {} g of gold but only {} g remains on installment {}",
                payment.weight, remaining, self.id
            )));
        }

        self.gold_weight_paid = &self.gold_weight_paid + &payment.weight;
        self.amount_paid = &self.amount_paid + &payment.amount;
        self.gold_price_at_payment = Some(payment.price_per_gram.clone());
        self.payment_date = Some(payment.payment_date);
        if payment.payment_method.is_some() {
            self.payment_method = payment.payment_method.clone();
        }
        if payment.payment_reference.is_some() {
            self.payment_reference = payment.payment_reference.clone();
        }

        if let Some(note) = payment.note.as_deref() {
            let line = format!(
                "[{}] {} | paid {} at {}/g, settled {} g",
                payment.payment_date, note, payment.amount, payment.price_per_gram, payment.weight
            );
            self.notes = Some(match self.notes.take() {
                Some(existing) if !existing.is_empty() => format!("{}\n{}", existing, line),
                _ => line,
            });
        }

        if self.is_fully_paid() {
            self.status = InstallmentStatus::Paid;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct GoldPrice {
    pub id: i64,
    pub tenant_id: i64,
    pub purity: BigDecimal,
    pub price_date: NaiveDate,
    pub price_per_gram: BigDecimal,
    pub is_current: bool,
}

pub const INVOICE_TYPE_GOLD: &str = "gold";
pub const INVOICE_STATUS_PAID: &str = "paid";

/// The gold-related slice of an invoice.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct GoldInvoice {
    pub id: i64,
    pub tenant_id: i64,
    pub customer_id: Option<i64>,
    pub invoice_number: String,
    pub invoice_type: String,
    pub status: String,
    pub is_active: bool,
    pub is_installment: bool,
    pub installment_type: Option<String>,
    pub total_amount: BigDecimal,
    pub paid_amount: BigDecimal,
    pub total_gold_weight: Option<BigDecimal>,
    pub remaining_gold_weight: Option<BigDecimal>,
}

impl GoldInvoice {
    /// Returns the total weight to schedule.
    pub fn ensure_can_create_gold_plan(&self, existing_installments: i64) -> AppResult<BigDecimal> {
        if !self.is_active {
            return Err(AppError::business(format!(
                "Invoice {} is not active",
                self.invoice_number
            )));
        }
        if self.invoice_type != INVOICE_TYPE_GOLD {
            return Err(AppError::business(format!(
                "Invoice {} is not a gold invoice",
                self.invoice_number
            )));
        }
        if self.status == INVOICE_STATUS_PAID {
            return Err(AppError::business(format!(
                "Invoice {} is already fully paid",
                self.invoice_number
            )));
        }
        if self.is_installment || existing_installments > 0 {
            return Err(AppError::business(format!(
                "Invoice {} already has installments",
                self.invoice_number
            )));
        }
        match &self.total_gold_weight {
            Some(weight) if *weight > BigDecimal::zero() => Ok(weight.clone()),
            _ => Err(AppError::business(format!(
                "Invoice {} has no gold weight",
                self.invoice_number
            ))),
        }
    }
}

/// Remaining-weight view of an invoice, recomputed from its installments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoldWeightSummary {
    pub invoice_id: i64,
    pub total_due: BigDecimal,
    pub total_paid: BigDecimal,
    pub remaining: BigDecimal,
    pub current_price_per_gram: Option<BigDecimal>,
    pub remaining_value: Option<BigDecimal>,
    pub pending_count: usize,
    pub paid_count: usize,
    pub overdue_count: usize,
    pub cancelled_count: usize,
    pub next_due: Option<Installment>,
}

impl GoldWeightSummary {
    pub fn from_installments(
        invoice_id: i64,
        installments: &[Installment],
        current_price_per_gram: Option<BigDecimal>,
    ) -> Self {
        let mut total_due = BigDecimal::zero();
        let mut total_paid = BigDecimal::zero();
        let (mut pending, mut paid, mut overdue, mut cancelled) = (0, 0, 0, 0);

        for inst in installments {
            total_due += &inst.gold_weight_due;
            total_paid += &inst.gold_weight_paid;
            match inst.status {
                InstallmentStatus::Pending => pending += 1,
                InstallmentStatus::Paid => paid += 1,
                InstallmentStatus::Overdue => overdue += 1,
                InstallmentStatus::Cancelled => cancelled += 1,
            }
        }

        let remaining = &total_due - &total_paid;
        let remaining_value = current_price_per_gram.as_ref().map(|p| &remaining * p);

        let mut ordered: Vec<&Installment> = installments.iter().collect();
        ordered.sort_by_key(|i| i.installment_number);
        let next_due = ordered
            .into_iter()
            .find(|i| i.status.is_open() && i.remaining_gold_weight() > BigDecimal::zero())
            .cloned();

        Self {
            invoice_id,
            total_due,
            total_paid,
            remaining,
            current_price_per_gram,
            remaining_value,
            pending_count: pending,
            paid_count: paid,
            overdue_count: overdue,
            cancelled_count: cancelled,
            next_due,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OverdueFilter {
    pub customer_id: Option<i64>,
    /// Only installments at least this many days past due.
    pub days_overdue: Option<i64>,
}

#[derive(Debug, Clone, FromRow)]
pub struct OverdueInstallmentRow {
    pub id: i64,
    pub invoice_id: i64,
    pub invoice_number: String,
    pub customer_id: Option<i64>,
    pub installment_number: i32,
    pub gold_weight_due: BigDecimal,
    pub gold_weight_paid: BigDecimal,
    pub due_date: NaiveDate,
    #[sqlx(try_from = "String")]
    pub status: InstallmentStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverdueInstallment {
    pub installment_id: i64,
    pub invoice_id: i64,
    pub invoice_number: String,
    pub customer_id: Option<i64>,
    pub installment_number: i32,
    pub due_date: NaiveDate,
    pub days_overdue: i64,
    pub remaining_gold_weight: BigDecimal,
    pub status: InstallmentStatus,
    /// True when this read changed the status from pending.
    pub newly_overdue: bool,
}

impl OverdueInstallment {
    pub fn evaluate(row: OverdueInstallmentRow, today: NaiveDate) -> Self {
        let remaining = &row.gold_weight_due - &row.gold_weight_paid;
        let status = row.status.transition_if_overdue(row.due_date, &remaining, today);
        Self {
            installment_id: row.id,
            invoice_id: row.invoice_id,
            invoice_number: row.invoice_number,
            customer_id: row.customer_id,
            installment_number: row.installment_number,
            due_date: row.due_date,
            days_overdue: (today - row.due_date).num_days(),
            remaining_gold_weight: remaining,
            newly_overdue: status != row.status,
            status,
        }
    }
}
