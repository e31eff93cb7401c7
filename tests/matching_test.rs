mod common;

use common::*;
use hesaab_core::service::MatchTolerances;
use hesaab_core::{AppError, ReconciliationMatcher, StatementImporter};
use serial_test::serial;
use sqlx::PgPool;
use std::time::Duration;

const ACCOUNT: i64 = 7;

async fn is_matched(pool: &PgPool, bank_transaction_id: i64) -> bool {
    sqlx::query_scalar("SELECT is_matched FROM bank_transactions WHERE id = $1")
        .bind(bank_transaction_id)
        .fetch_one(pool)
        .await
        .unwrap()
}

async fn notes_of(pool: &PgPool, bank_transaction_id: i64) -> (Option<String>, Option<String>) {
    sqlx::query_as("SELECT notes, match_notes FROM bank_transactions WHERE id = $1")
        .bind(bank_transaction_id)
        .fetch_one(pool)
        .await
        .unwrap()
}

#[tokio::test]
#[serial]
async fn exact_pair_is_suggested_first() {
    let Some(pool) = test_pool().await else { return };
    let tenant = fresh_tenant();
    let on = date(2024, 1, 10);

    let statement = insert_statement(&pool, tenant, ACCOUNT).await;
    let bank =
        insert_bank_transaction(&pool, tenant, ACCOUNT, statement, "0", "100.00", on, Some("INV-5"))
            .await;
    let book =
        insert_book_transaction(&pool, tenant, "100.00", on, Some("INV-5"), "receipt", None).await;
    insert_book_transaction(&pool, tenant, "100.00", date(2024, 1, 20), None, "receipt", None)
        .await;

    let matcher = ReconciliationMatcher::new(pool.clone());
    let suggestions = matcher
        .find_matches(tenant, ACCOUNT, &MatchTolerances::default())
        .await
        .unwrap();

    assert_eq!(suggestions.len(), 1);
    assert_eq!(suggestions[0].bank_transaction_id, bank);
    assert_eq!(suggestions[0].book_transaction_id, book);
    assert!(suggestions[0].confidence_score >= 0.90);
}

#[tokio::test]
#[serial]
async fn book_transaction_cannot_be_claimed_twice() {
    let Some(pool) = test_pool().await else { return };
    let tenant = fresh_tenant();
    let on = date(2024, 2, 1);

    let statement = insert_statement(&pool, tenant, ACCOUNT).await;
    let first =
        insert_bank_transaction(&pool, tenant, ACCOUNT, statement, "50", "0", on, None).await;
    let second =
        insert_bank_transaction(&pool, tenant, ACCOUNT, statement, "50", "0", on, None).await;
    let book = insert_book_transaction(&pool, tenant, "50", on, None, "payment", None).await;

    let matcher = ReconciliationMatcher::new(pool.clone());
    let matched = matcher
        .match_transactions(tenant, first, book, "alice", Some("checked".to_string()))
        .await
        .unwrap();
    assert!(matched.is_matched);
    assert_eq!(matched.matched_transaction_id, Some(book));
    assert_eq!(matched.match_confidence, Some(1.0));
    assert_eq!(matched.matched_by.as_deref(), Some("alice"));
    assert_eq!(matched.match_notes.as_deref(), Some("checked"));

    let err = matcher
        .match_transactions(tenant, second, book, "bob", None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(ref m) if m.contains("already matched")));
    assert!(!is_matched(&pool, second).await);
}

#[tokio::test]
#[serial]
async fn unmatch_restores_both_sides() {
    let Some(pool) = test_pool().await else { return };
    let tenant = fresh_tenant();
    let on = date(2024, 3, 5);

    let statement = insert_statement(&pool, tenant, ACCOUNT).await;
    let first =
        insert_bank_transaction(&pool, tenant, ACCOUNT, statement, "0", "75", on, None).await;
    let second =
        insert_bank_transaction(&pool, tenant, ACCOUNT, statement, "0", "75", on, None).await;
    let book = insert_book_transaction(&pool, tenant, "75", on, None, "receipt", None).await;
    sqlx::query("UPDATE bank_transactions SET notes = 'from statement' WHERE id = $1")
        .bind(first)
        .execute(&pool)
        .await
        .unwrap();

    let matcher = ReconciliationMatcher::new(pool.clone());
    matcher
        .match_transactions(tenant, first, book, "alice", Some("checked".to_string()))
        .await
        .unwrap();

    let restored = matcher.unmatch(tenant, first, "alice").await.unwrap();
    assert!(!restored.is_matched);
    assert!(restored.matched_transaction_id.is_none());
    assert!(restored.matched_date.is_none());
    assert!(restored.matched_by.is_none());
    assert!(restored.match_confidence.is_none());
    assert!(restored.match_notes.is_none());
    assert_eq!(restored.notes.as_deref(), Some("from statement"));

    // book side is free again
    matcher.match_transactions(tenant, second, book, "bob", None).await.unwrap();

    let err = matcher.unmatch(tenant, first, "alice").await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    // auto-match annotations go away on unmatch too
    matcher.unmatch(tenant, second, "bob").await.unwrap();
    let result = matcher.auto_match(tenant, ACCOUNT, 0.70, "system").await.unwrap();
    assert_eq!(result.matched_count, 1);
    let auto_matched = result.top_matches[0].bank_transaction_id;
    let (_, match_notes) = notes_of(&pool, auto_matched).await;
    assert!(match_notes.is_some());

    matcher.unmatch(tenant, auto_matched, "system").await.unwrap();
    let (notes, match_notes) = notes_of(&pool, auto_matched).await;
    assert!(match_notes.is_none());
    let expected = (auto_matched == first).then(|| "from statement".to_string());
    assert_eq!(notes, expected);
}

#[tokio::test]
#[serial]
async fn other_tenants_rows_are_invisible() {
    let Some(pool) = test_pool().await else { return };
    let tenant = fresh_tenant();
    let on = date(2024, 3, 5);

    let statement = insert_statement(&pool, tenant, ACCOUNT).await;
    let bank =
        insert_bank_transaction(&pool, tenant, ACCOUNT, statement, "0", "75", on, None).await;
    let book = insert_book_transaction(&pool, tenant, "75", on, None, "receipt", None).await;

    let matcher = ReconciliationMatcher::new(pool.clone());
    let err = matcher
        .match_transactions(tenant + 1, bank, book, "mallory", None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
#[serial]
async fn auto_match_applies_high_confidence_pairs_once() {
    let Some(pool) = test_pool().await else { return };
    let tenant = fresh_tenant();
    let on = date(2024, 4, 1);

    let statement = insert_statement(&pool, tenant, ACCOUNT).await;
    let b1 =
        insert_bank_transaction(&pool, tenant, ACCOUNT, statement, "0", "300", on, Some("INV-1"))
            .await;
    let b2 =
        insert_bank_transaction(&pool, tenant, ACCOUNT, statement, "0", "300", on, Some("INV-1"))
            .await;
    let k1 =
        insert_book_transaction(&pool, tenant, "300", on, Some("INV-1"), "receipt", None).await;

    let matcher = ReconciliationMatcher::new(pool.clone());
    let result = matcher.auto_match(tenant, ACCOUNT, 0.90, "system").await.unwrap();

    assert_eq!(result.total_bank_transactions, 2);
    assert_eq!(result.total_book_transactions, 1);
    assert_eq!(result.high_confidence_matches, 2);
    assert_eq!(result.matched_count, 1);
    assert_eq!(result.skipped_count, 1);
    assert!((result.match_rate - 0.5).abs() < f64::EPSILON);
    assert_eq!(result.top_matches.len(), 1);
    assert_eq!(result.top_matches[0].bank_transaction_id, b1);

    let (confidence, match_notes): (Option<f64>, Option<String>) = sqlx::query_as(
        "SELECT match_confidence, match_notes FROM bank_transactions WHERE id = $1",
    )
    .bind(b1)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(confidence, Some(0.95));
    assert_eq!(match_notes.as_deref(), Some("Auto-matched with 95.0% confidence"));

    let claims: i64 = sqlx::query_scalar(
        "SELECT count(*) FROM bank_transactions WHERE is_matched AND matched_transaction_id = $1",
    )
    .bind(k1)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(claims, 1);
    assert!(!is_matched(&pool, b2).await);
}

#[tokio::test]
#[serial]
async fn auto_match_counts_tiers_below_threshold_without_applying() {
    let Some(pool) = test_pool().await else { return };
    let tenant = fresh_tenant();
    let june = date(2024, 6, 1);
    let july = date(2024, 7, 1);

    let statement = insert_statement(&pool, tenant, ACCOUNT).await;
    // exact amount + same date + receipt direction: 0.75
    let medium =
        insert_bank_transaction(&pool, tenant, ACCOUNT, statement, "0", "400", june, None).await;
    insert_book_transaction(&pool, tenant, "400", june, None, "receipt", None).await;
    // exact amount + five days apart + receipt direction: 0.55
    let low =
        insert_bank_transaction(&pool, tenant, ACCOUNT, statement, "0", "900", july, None).await;
    insert_book_transaction(&pool, tenant, "900", date(2024, 7, 6), None, "receipt", None).await;

    let matcher = ReconciliationMatcher::new(pool.clone());
    let result = matcher.auto_match(tenant, ACCOUNT, 0.90, "system").await.unwrap();

    assert_eq!(result.high_confidence_matches, 0);
    assert_eq!(result.medium_confidence_matches, 1);
    assert_eq!(result.low_confidence_matches, 1);
    assert_eq!(result.matched_count, 0);
    assert_eq!(result.skipped_count, 0);
    assert!(result.top_matches.is_empty());
    assert!(!is_matched(&pool, medium).await);
    assert!(!is_matched(&pool, low).await);
}

#[tokio::test]
#[serial]
async fn auto_match_skips_book_claimed_by_open_transaction() {
    let Some(pool) = test_pool().await else { return };
    let tenant = fresh_tenant();
    let on = date(2024, 8, 1);

    let statement = insert_statement(&pool, tenant, ACCOUNT).await;
    let candidate =
        insert_bank_transaction(&pool, tenant, ACCOUNT, statement, "0", "640", on, Some("R-9"))
            .await;
    let other_statement = insert_statement(&pool, tenant, ACCOUNT + 1).await;
    let rival =
        insert_bank_transaction(&pool, tenant, ACCOUNT + 1, other_statement, "0", "640", on, None)
            .await;
    let clear =
        insert_bank_transaction(&pool, tenant, ACCOUNT, statement, "25", "0", on, Some("R-10"))
            .await;
    let book =
        insert_book_transaction(&pool, tenant, "640", on, Some("R-9"), "receipt", None).await;
    let free_book =
        insert_book_transaction(&pool, tenant, "25", on, Some("R-10"), "payment", None).await;

    // uncommitted claim on `book` from another session
    let mut rival_tx = pool.begin().await.unwrap();
    sqlx::query(
        r#"
        UPDATE bank_transactions
        SET is_matched = TRUE, matched_transaction_id = $2, match_confidence = 1.0
        WHERE id = $1
        "#,
    )
    .bind(rival)
    .bind(book)
    .execute(&mut *rival_tx)
    .await
    .unwrap();

    let matcher = ReconciliationMatcher::new(pool.clone());
    let run =
        tokio::spawn(async move { matcher.auto_match(tenant, ACCOUNT, 0.90, "system").await });

    tokio::time::sleep(Duration::from_millis(1000)).await;
    rival_tx.commit().await.unwrap();

    let result = run.await.unwrap().unwrap();
    assert_eq!(result.matched_count, 1);
    assert_eq!(result.skipped_count, 1);
    assert_eq!(result.top_matches[0].bank_transaction_id, clear);
    assert_eq!(result.top_matches[0].book_transaction_id, free_book);
    assert!(!is_matched(&pool, candidate).await);
    assert!(is_matched(&pool, clear).await);
}

#[tokio::test]
#[serial]
async fn statement_import_keeps_good_rows() {
    let Some(pool) = test_pool().await else { return };
    let tenant = fresh_tenant();

    let csv = "date,description,reference,debit,credit,balance,counterparty\n\
               2024-05-01,Deposit,R-1,,1000,1000,Rezaei\n\
               2024-05-02,Broken,,abc,,,\n\
               2024-05-03,Fee,,12.50,,987.50,\n";

    let importer = StatementImporter::new(pool.clone());
    let result = importer
        .import_statement(tenant, ACCOUNT, date(2024, 5, 31), csv)
        .await
        .unwrap();
    assert_eq!(result.imported_count, 2);
    assert_eq!(result.failed_count, 1);
    assert_eq!(result.errors[0].row, 2);

    let stored: i64 = sqlx::query_scalar(
        "SELECT count(*) FROM bank_transactions WHERE tenant_id = $1 AND statement_id = $2",
    )
    .bind(tenant)
    .bind(result.statement_id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(stored, 2);
}
