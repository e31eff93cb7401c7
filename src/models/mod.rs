pub mod bank;
pub mod gold;
pub mod reconciliation;

pub use bank::{
    AutoMatchResult, BankTransaction, BookTransaction, BookTransactionType, ImportResult,
    ImportRowError, MatchRecord, MatchSuggestion, NewBankTransaction,
};
pub use gold::{
    GoldInvoice, GoldPrice, GoldWeightSummary, Installment, InstallmentStatus, InstallmentType,
    OverdueFilter, OverdueInstallment, OverdueInstallmentRow, SettledPayment,
};
pub use reconciliation::{
    BankReconciliation, BankReconciliationItem, ReconciliationItemKind, ReconciliationStatus,
    ReconciliationSummary, ReconciliationTotals,
};
