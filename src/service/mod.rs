pub mod gold_ledger;
pub mod matcher;
pub mod reconciliation;
pub mod scoring;
pub mod statement_import;

pub use gold_ledger::{
    CreateGoldPlan, GoldLedger, GoldPaymentOutcome, GoldPaymentRequest, SetGoldPrice,
};
pub use matcher::ReconciliationMatcher;
pub use reconciliation::{NewReconciliation, NewReconciliationItem, ReconciliationService};
pub use scoring::MatchTolerances;
pub use statement_import::StatementImporter;
