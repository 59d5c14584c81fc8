//! Whitelist (spec.md §3, §4.8): the LNURL-auth gate. Grounded on
//! `domain/users/store.rs`'s CRUD shape — manual `FromRow`, parameterized
//! queries, `NotFound` mapping — applied to the `whitelist` table instead of
//! `users`.

pub mod store;

pub use store::{WhitelistEntry, WhitelistStore};
