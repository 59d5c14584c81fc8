//! Wallet Ledger (spec.md §4.3): balance-credit/debit with an append-only
//! transaction journal. Grounded on the guarded-update pattern of
//! `coordinator/src/domain/competitions/store.rs::get_and_reserve_ticket`.

pub mod service;
pub mod store;

pub use service::{BalanceView, DepositInvoice, DepositStatusView, WalletService};
pub use store::{Transaction, Wallet, WalletStore};
