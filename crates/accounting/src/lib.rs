//! Accounting module: an event-sourced bank account.
//!
//! Pure domain logic only: no IO, no HTTP, no persistence concerns.

pub mod account;
pub mod money;

pub use account::{
    Account, AccountError, AccountEvent, Opened, OverdraftLimitSet, TransactionAppended, register,
};
pub use money::Money;
