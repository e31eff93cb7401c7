use crate::db::bank_queries;
use crate::error::{AppError, AppResult};
use crate::models::{
    AutoMatchResult, BankTransaction, BookTransaction, MatchRecord, MatchSuggestion,
};
use crate::service::scoring::{self, MatchTolerances, MEDIUM_CONFIDENCE};
use chrono::Utc;
use indexmap::IndexSet;
use sqlx::{Connection, PgConnection, PgPool};
use std::time::Instant;

/// How many applied matches an auto-match run reports back.
const TOP_MATCHES_SHOWN: usize = 10;

/// Bank reconciliation matching: suggestions, manual match/unmatch, auto-match.
pub struct ReconciliationMatcher {
    pool: PgPool,
}

/// A concurrent claim on the same book transaction, surfaced by the
/// partial unique index once the other transaction commits.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map(|db| db.is_unique_violation())
        .unwrap_or(false)
}

fn claim_conflict(err: sqlx::Error, book_transaction_id: i64) -> AppError {
    if is_unique_violation(&err) {
        AppError::validation(format!(
            "Book transaction {} is already matched",
            book_transaction_id
        ))
    } else {
        AppError::Database(err)
    }
}

impl ReconciliationMatcher {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_candidates(
        conn: &mut PgConnection,
        tenant_id: i64,
        bank_account_id: i64,
    ) -> AppResult<(Vec<BankTransaction>, Vec<BookTransaction>)> {
        let bank =
            bank_queries::list_unmatched_bank_transactions(&mut *conn, tenant_id, bank_account_id)
                .await?;
        let book = bank_queries::list_unmatched_book_transactions(&mut *conn, tenant_id).await?;
        Ok((bank, book))
    }

    /// Ranked suggestions for the account's unmatched statement lines.
    pub async fn find_matches(
        &self,
        tenant_id: i64,
        bank_account_id: i64,
        tolerances: &MatchTolerances,
    ) -> AppResult<Vec<MatchSuggestion>> {
        let result: AppResult<_> = async {
            if tolerances.date_tolerance_days < 0 {
                return Err(AppError::validation("Date tolerance cannot be negative"));
            }
            let mut conn = self.pool.acquire().await?;
            let (bank, book) = Self::load_candidates(&mut conn, tenant_id, bank_account_id).await?;

            let suggestions = scoring::rank_suggestions(&bank, &book, tolerances);
            tracing::info!(
                tenant_id,
                bank_account_id,
                "scored {} x {} pairs, {} suggestions",
                bank.len(),
                book.len(),
                suggestions.len()
            );
            Ok(suggestions)
        }
        .await;

        result.map_err(|e| e.logged("find_matches"))
    }

    /// Manual match, always at full confidence.
    pub async fn match_transactions(
        &self,
        tenant_id: i64,
        bank_transaction_id: i64,
        book_transaction_id: i64,
        user: &str,
        notes: Option<String>,
    ) -> AppResult<BankTransaction> {
        let result: AppResult<_> = async {
            let mut tx = self.pool.begin().await?;

            let bank = bank_queries::lock_bank_transaction(&mut tx, tenant_id, bank_transaction_id)
                .await?
                .filter(|b| !b.is_matched);
            if bank.is_none() {
                return Err(AppError::not_found(format!(
                    "Bank transaction {} not found or already matched",
                    bank_transaction_id
                )));
            }

            if bank_queries::get_book_transaction(&mut tx, tenant_id, book_transaction_id)
                .await?
                .is_none()
            {
                return Err(AppError::not_found(format!(
                    "Book transaction {} not found",
                    book_transaction_id
                )));
            }

            // last check before the write, inside the same transaction
            if bank_queries::is_book_transaction_claimed(
                &mut tx,
                book_transaction_id,
                bank_transaction_id,
            )
            .await?
            {
                return Err(AppError::validation(format!(
                    "Book transaction {} is already matched",
                    book_transaction_id
                )));
            }

            let record = MatchRecord::manual(book_transaction_id, user, notes, Utc::now());
            let updated =
                bank_queries::apply_match(&mut tx, tenant_id, bank_transaction_id, &record)
                    .await
                    .map_err(|e| claim_conflict(e, book_transaction_id))?;
            if updated == 0 {
                return Err(AppError::validation(format!(
                    "Book transaction {} is already matched",
                    book_transaction_id
                )));
            }

            let matched =
                bank_queries::get_bank_transaction(&mut tx, tenant_id, bank_transaction_id)
                    .await?
                    .ok_or_else(|| {
                        AppError::not_found(format!(
                            "Bank transaction {} not found",
                            bank_transaction_id
                        ))
                    })?;
            tx.commit().await?;

            tracing::info!(
                tenant_id,
                bank_transaction_id,
                book_transaction_id,
                user,
                "bank transaction matched manually"
            );
            Ok(matched)
        }
        .await;

        result.map_err(|e| e.logged("match_transactions"))
    }

    pub async fn unmatch(
        &self,
        tenant_id: i64,
        bank_transaction_id: i64,
        user: &str,
    ) -> AppResult<BankTransaction> {
        let result: AppResult<_> = async {
            let mut tx = self.pool.begin().await?;

            let cleared =
                bank_queries::clear_match(&mut tx, tenant_id, bank_transaction_id).await?;
            if cleared == 0 {
                return Err(AppError::not_found(format!(
                    "Matched bank transaction {} not found",
                    bank_transaction_id
                )));
            }

            let unmatched =
                bank_queries::get_bank_transaction(&mut tx, tenant_id, bank_transaction_id)
                    .await?
                    .ok_or_else(|| {
                        AppError::not_found(format!(
                            "Bank transaction {} not found",
                            bank_transaction_id
                        ))
                    })?;
            tx.commit().await?;

            tracing::info!(tenant_id, bank_transaction_id, user, "bank transaction unmatched");
            Ok(unmatched)
        }
        .await;

        result.map_err(|e| e.logged("unmatch"))
    }

    /// Applies every suggestion at or above `min_confidence`, re-validating
    /// availability per suggestion. One commit for the whole batch.
    pub async fn auto_match(
        &self,
        tenant_id: i64,
        bank_account_id: i64,
        min_confidence: f64,
        user: &str,
    ) -> AppResult<AutoMatchResult> {
        let result: AppResult<_> = async {
            if !(0.0..=1.0).contains(&min_confidence) {
                return Err(AppError::validation("Minimum confidence must be between 0 and 1"));
            }

            let start_time = Instant::now();
            let mut tx = self.pool.begin().await?;

            let (bank, book) = Self::load_candidates(&mut tx, tenant_id, bank_account_id).await?;
            let suggestions =
                scoring::rank_suggestions(&bank, &book, &MatchTolerances::default());

            let (high, rest): (Vec<_>, Vec<_>) = suggestions
                .into_iter()
                .partition(|s| s.confidence_score >= min_confidence);
            let medium = rest
                .iter()
                .filter(|s| s.confidence_score >= MEDIUM_CONFIDENCE)
                .count();
            let low = rest.len() - medium;

            // claimed within this pass
            let mut used_bank: IndexSet<i64> = IndexSet::new();
            let mut used_book: IndexSet<i64> = IndexSet::new();
            let mut applied: Vec<MatchSuggestion> = Vec::new();
            let mut skipped = 0usize;

            for suggestion in &high {
                if used_bank.contains(&suggestion.bank_transaction_id)
                    || used_book.contains(&suggestion.book_transaction_id)
                {
                    skipped += 1;
                    continue;
                }

                let still_open = bank_queries::lock_bank_transaction(
                    &mut tx,
                    tenant_id,
                    suggestion.bank_transaction_id,
                )
                .await?
                .map(|b| !b.is_matched)
                .unwrap_or(false);
                if !still_open
                    || bank_queries::is_book_transaction_claimed(
                        &mut tx,
                        suggestion.book_transaction_id,
                        suggestion.bank_transaction_id,
                    )
                    .await?
                {
                    tracing::warn!(
                        tenant_id,
                        bank_transaction_id = suggestion.bank_transaction_id,
                        book_transaction_id = suggestion.book_transaction_id,
                        "suggestion no longer available, skipping"
                    );
                    skipped += 1;
                    continue;
                }

                // savepoint: a lost race undoes this write only
                let record = MatchRecord::automatic(suggestion, user, Utc::now());
                let mut savepoint = Connection::begin(&mut *tx).await?;
                let applied_here = match bank_queries::apply_match(
                    &mut savepoint,
                    tenant_id,
                    suggestion.bank_transaction_id,
                    &record,
                )
                .await
                {
                    Ok(updated) => updated > 0,
                    Err(err) if is_unique_violation(&err) => false,
                    Err(err) => return Err(err.into()),
                };
                if !applied_here {
                    savepoint.rollback().await?;
                    tracing::warn!(
                        tenant_id,
                        bank_transaction_id = suggestion.bank_transaction_id,
                        book_transaction_id = suggestion.book_transaction_id,
                        "book transaction claimed concurrently, skipping"
                    );
                    skipped += 1;
                    continue;
                }
                savepoint.commit().await?;

                used_bank.insert(suggestion.bank_transaction_id);
                used_book.insert(suggestion.book_transaction_id);
                applied.push(suggestion.clone());
            }

            tx.commit().await?;

            let matched_count = applied.len();
            let match_rate = if bank.is_empty() {
                0.0
            } else {
                matched_count as f64 / bank.len() as f64
            };

            let result = AutoMatchResult {
                total_bank_transactions: bank.len(),
                total_book_transactions: book.len(),
                matched_count,
                skipped_count: skipped,
                match_rate,
                high_confidence_matches: high.len(),
                medium_confidence_matches: medium,
                low_confidence_matches: low,
                processing_time_ms: start_time.elapsed().as_millis() as u64,
                top_matches: applied.into_iter().take(TOP_MATCHES_SHOWN).collect(),
            };

            tracing::info!(
                tenant_id,
                bank_account_id,
                "auto-match done: {}/{} matched, {} skipped, {:?}",
                result.matched_count,
                result.total_bank_transactions,
                result.skipped_count,
                start_time.elapsed()
            );
            Ok(result)
        }
        .await;

        result.map_err(|e| e.logged("auto_match"))
    }
}
