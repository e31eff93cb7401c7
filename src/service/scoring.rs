//! Bank/book pair scoring.
//!
//! Scores are accumulated in basis points (1/10000) so component sums are
//! exact; `confidence()` converts to the [0, 1] range at the edge.

use crate::models::{BankTransaction, BookTransaction, BookTransactionType, MatchSuggestion};
use bigdecimal::{BigDecimal, Zero};
use rayon::prelude::*;

/// Pairs scoring below this are never suggested.
pub const MIN_SUGGESTION_SCORE: f64 = 0.50;
/// Lower bound of the medium tier in auto-matching.
pub const MEDIUM_CONFIDENCE: f64 = 0.70;

const FULL_SCORE_BP: u32 = 10_000;

const EXACT_AMOUNT_BP: u32 = 4_000;
const CLOSE_AMOUNT_BP: u32 = 3_000;
const APPROX_AMOUNT_BP: u32 = 2_000;

const SAME_DATE_BP: u32 = 3_000;
const NEXT_DAY_BP: u32 = 2_500;
const WITHIN_TOLERANCE_BP: u32 = 2_000;
const WITHIN_WEEK_BP: u32 = 1_000;

const REFERENCE_MATCH_BP: u32 = 2_000;
const PARTIAL_REFERENCE_BP: u32 = 1_000;

const COUNTERPARTY_BP: u32 = 1_000;
const TYPE_CONSISTENCY_BP: u32 = 500;

#[derive(Debug, Clone)]
pub struct MatchTolerances {
    pub amount_tolerance: BigDecimal,
    pub date_tolerance_days: i64,
}

impl Default for MatchTolerances {
    fn default() -> Self {
        Self {
            amount_tolerance: BigDecimal::from(1) / BigDecimal::from(100),
            date_tolerance_days: 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PairScore {
    pub score_bp: u32,
    pub reasons: Vec<String>,
    pub amount_difference: BigDecimal,
    pub date_difference_days: i64,
}

impl PairScore {
    pub fn confidence(&self) -> f64 {
        f64::from(self.score_bp) / f64::from(FULL_SCORE_BP)
    }
}

fn non_empty_lower(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_lowercase)
}

pub fn score_pair(
    bank: &BankTransaction,
    book: &BookTransaction,
    tolerances: &MatchTolerances,
) -> PairScore {
    let mut score_bp = 0u32;
    let mut reasons = Vec::new();

    // 1. amount
    let book_amount = book.amount.abs();
    let amount_difference = (bank.absolute_amount() - &book_amount).abs();
    if amount_difference <= tolerances.amount_tolerance {
        score_bp += EXACT_AMOUNT_BP;
        reasons.push("Exact amount match".to_string());
    } else if !book_amount.is_zero() {
        let pct = &amount_difference / &book_amount;
        if pct <= BigDecimal::from(5) / BigDecimal::from(100) {
            score_bp += CLOSE_AMOUNT_BP;
            reasons.push("Close amount match (within 5%)".to_string());
        } else if pct <= BigDecimal::from(10) / BigDecimal::from(100) {
            score_bp += APPROX_AMOUNT_BP;
            reasons.push("Approximate amount match (within 10%)".to_string());
        }
    }

    // 2. date
    let date_difference_days = (bank.transaction_date - book.transaction_date)
        .num_days()
        .abs();
    if date_difference_days == 0 {
        score_bp += SAME_DATE_BP;
        reasons.push("Same date".to_string());
    } else if date_difference_days == 1 {
        score_bp += NEXT_DAY_BP;
        reasons.push("Next day".to_string());
    } else if date_difference_days <= tolerances.date_tolerance_days {
        score_bp += WITHIN_TOLERANCE_BP;
        reasons.push(format!("Within {} days", tolerances.date_tolerance_days));
    } else if date_difference_days <= 7 {
        score_bp += WITHIN_WEEK_BP;
        reasons.push("Within a week".to_string());
    }

    // 3. reference number
    if let (Some(bank_ref), Some(book_ref)) = (
        non_empty_lower(bank.reference_number.as_deref()),
        non_empty_lower(book.reference_number.as_deref()),
    ) {
        if bank_ref == book_ref {
            score_bp += REFERENCE_MATCH_BP;
            reasons.push("Reference number match".to_string());
        } else if bank_ref.contains(&book_ref) || book_ref.contains(&bank_ref) {
            score_bp += PARTIAL_REFERENCE_BP;
            reasons.push("Partial reference match".to_string());
        }
    }

    // 4. counterparty vs. customer
    if let (Some(counterparty), Some(customer)) = (
        non_empty_lower(bank.counterparty_name.as_deref()),
        non_empty_lower(book.customer_name.as_deref()),
    ) {
        if customer.contains(&counterparty) || counterparty.contains(&customer) {
            score_bp += COUNTERPARTY_BP;
            reasons.push("Counterparty matches customer name".to_string());
        }
    }

    // 5. direction
    match book.transaction_type {
        BookTransactionType::Receipt if bank.is_credit() => {
            score_bp += TYPE_CONSISTENCY_BP;
            reasons.push("Credit matches receipt".to_string());
        }
        BookTransactionType::Payment if bank.is_debit() => {
            score_bp += TYPE_CONSISTENCY_BP;
            reasons.push("Debit matches payment".to_string());
        }
        _ => {}
    }

    PairScore {
        score_bp: score_bp.min(FULL_SCORE_BP),
        reasons,
        amount_difference,
        date_difference_days,
    }
}

/// Scores every bank × book pair and keeps those at or above the suggestion
/// threshold, best first. Equal scores keep bank-then-book input order.
pub fn rank_suggestions(
    bank_transactions: &[BankTransaction],
    book_transactions: &[BookTransaction],
    tolerances: &MatchTolerances,
) -> Vec<MatchSuggestion> {
    let mut scored: Vec<(u32, MatchSuggestion)> = bank_transactions
        .par_iter()
        .flat_map_iter(|bank| {
            book_transactions.iter().filter_map(move |book| {
                let score = score_pair(bank, book, tolerances);
                let confidence = score.confidence();
                if confidence < MIN_SUGGESTION_SCORE {
                    return None;
                }
                Some((
                    score.score_bp,
                    MatchSuggestion {
                        bank_transaction_id: bank.id,
                        book_transaction_id: book.id,
                        confidence_score: confidence,
                        match_reasons: score.reasons,
                        amount_difference: score.amount_difference,
                        date_difference_days: score.date_difference_days,
                    },
                ))
            })
        })
        .collect();

    // stable: ties keep input order
    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored.into_iter().map(|(_, s)| s).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::str::FromStr;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn bank(
        id: i64,
        debit: &str,
        credit: &str,
        on: NaiveDate,
        reference: Option<&str>,
    ) -> BankTransaction {
        BankTransaction {
            id,
            tenant_id: 1,
            bank_account_id: 1,
            statement_id: 1,
            transaction_date: on,
            description: String::new(),
            reference_number: reference.map(str::to_string),
            debit_amount: dec(debit),
            credit_amount: dec(credit),
            balance_after: None,
            counterparty_name: None,
            is_matched: false,
            matched_transaction_id: None,
            matched_date: None,
            matched_by: None,
            match_confidence: None,
            match_notes: None,
            notes: None,
        }
    }

    fn book(
        id: i64,
        amount: &str,
        on: NaiveDate,
        reference: Option<&str>,
        kind: BookTransactionType,
    ) -> BookTransaction {
        BookTransaction {
            id,
            tenant_id: 1,
            amount: dec(amount),
            transaction_date: on,
            reference_number: reference.map(str::to_string),
            transaction_type: kind,
            customer_name: None,
        }
    }

    #[test]
    fn exact_amount_same_date_and_reference() {
        let b = bank(1, "100.00", "0", date(2024, 1, 10), Some("INV-5"));
        let k = book(2, "100.00", date(2024, 1, 10), Some("INV-5"), BookTransactionType::Receipt);

        let score = score_pair(&b, &k, &MatchTolerances::default());
        assert_eq!(score.score_bp, 9_000);
        assert_eq!(score.confidence(), 0.90);
        assert_eq!(
            score.reasons,
            vec!["Exact amount match", "Same date", "Reference number match"]
        );
    }

    #[test]
    fn ten_days_apart_without_reference_is_not_suggested() {
        let b = bank(1, "100.00", "0", date(2024, 1, 10), None);
        let k = book(2, "100.00", date(2024, 1, 20), None, BookTransactionType::Receipt);

        let score = score_pair(&b, &k, &MatchTolerances::default());
        assert_eq!(score.score_bp, 4_000);
        assert_eq!(score.date_difference_days, 10);

        let ranked = rank_suggestions(&[b], &[k], &MatchTolerances::default());
        assert!(ranked.is_empty());
    }

    #[test]
    fn amount_tiers() {
        let on = date(2024, 3, 1);
        let tol = MatchTolerances::default();
        let k = book(2, "1000", on, None, BookTransactionType::Receipt);

        let close = score_pair(&bank(1, "960", "0", on, None), &k, &tol);
        assert!(close.reasons.contains(&"Close amount match (within 5%)".to_string()));
        assert_eq!(close.score_bp, 3_000 + 3_000);

        let approx = score_pair(&bank(1, "1090", "0", on, None), &k, &tol);
        assert!(approx.reasons.contains(&"Approximate amount match (within 10%)".to_string()));

        let far = score_pair(&bank(1, "1200", "0", on, None), &k, &tol);
        assert_eq!(far.score_bp, 3_000);
    }

    #[test]
    fn zero_book_amount_only_matches_exactly() {
        let on = date(2024, 3, 1);
        let k = book(2, "0", on, None, BookTransactionType::Payment);
        let score = score_pair(&bank(1, "5", "0", on, None), &k, &MatchTolerances::default());
        assert!(!score.reasons.iter().any(|r| r.contains("amount")));
    }

    #[test]
    fn date_tiers() {
        let tol = MatchTolerances::default();
        let k = book(2, "50", date(2024, 5, 10), None, BookTransactionType::Receipt);
        let reasons =
            |d: u32| score_pair(&bank(1, "0", "1", date(2024, 5, d), None), &k, &tol).reasons;

        assert!(reasons(11).contains(&"Next day".to_string()));
        assert!(reasons(13).contains(&"Within 3 days".to_string()));
        assert!(reasons(16).contains(&"Within a week".to_string()));
        assert!(!reasons(18).iter().any(|r| r.starts_with("Within")));
    }

    #[test]
    fn reference_is_case_insensitive_and_partial() {
        let on = date(2024, 1, 1);
        let tol = MatchTolerances::default();
        let k = book(2, "10", on, Some("inv-77"), BookTransactionType::Receipt);

        let exact = score_pair(&bank(1, "0", "10", on, Some("INV-77")), &k, &tol);
        assert!(exact.reasons.contains(&"Reference number match".to_string()));

        let partial = score_pair(&bank(1, "0", "10", on, Some("TRF INV-77 JAN")), &k, &tol);
        assert!(partial.reasons.contains(&"Partial reference match".to_string()));

        let blank = score_pair(&bank(1, "0", "10", on, Some("  ")), &k, &tol);
        assert!(!blank.reasons.iter().any(|r| r.to_lowercase().contains("reference")));
    }

    #[test]
    fn everything_matching_is_capped_at_one() {
        let on = date(2024, 1, 1);
        let mut b = bank(1, "0", "250", on, Some("R-1"));
        b.counterparty_name = Some("Ali Rezaei".to_string());
        let mut k = book(2, "250", on, Some("r-1"), BookTransactionType::Receipt);
        k.customer_name = Some("ALI REZAEI TRADING".to_string());

        let score = score_pair(&b, &k, &MatchTolerances::default());
        assert_eq!(score.reasons.len(), 5);
        assert_eq!(score.score_bp, 10_000);
        assert_eq!(score.confidence(), 1.0);
    }

    #[test]
    fn scores_stay_within_bounds() {
        let tol = MatchTolerances::default();
        let base = date(2024, 6, 15);
        for (i, amount) in ["0", "1", "99.99", "100", "104", "109", "500"].iter().enumerate() {
            for offset in 0..10 {
                let on = base + chrono::Duration::days(offset);
                let b = bank(i as i64, "0", amount, on, Some("X"));
                let k = book(1, "100", base, Some("x"), BookTransactionType::Receipt);
                let c = score_pair(&b, &k, &tol).confidence();
                assert!((0.0..=1.0).contains(&c));
            }
        }
    }

    #[test]
    fn ranking_is_descending_and_thresholded() {
        let on = date(2024, 1, 10);
        let banks = vec![
            bank(1, "100", "0", on, None),
            bank(2, "100", "0", on, Some("INV-9")),
        ];
        let books = vec![
            book(10, "100", on, Some("INV-9"), BookTransactionType::Payment),
            book(11, "100", on + chrono::Duration::days(12), None, BookTransactionType::Receipt),
        ];

        let ranked = rank_suggestions(&banks, &books, &MatchTolerances::default());
        assert!(ranked.iter().all(|s| s.confidence_score >= MIN_SUGGESTION_SCORE));
        assert!(ranked
            .windows(2)
            .all(|w| w[0].confidence_score >= w[1].confidence_score));
        assert_eq!(
            (ranked[0].bank_transaction_id, ranked[0].book_transaction_id),
            (2, 10)
        );
        assert_eq!(ranked.len(), 2);
    }
}
