//! Application layer: the order-accrual reconciliation engine.
//!
//! `LoyaltyService` accepts orders and hands each one to the `Dispatcher`,
//! which runs one task per order. A task polls the accrual service through
//! `AccrualClient` until it gets a final answer and commits that answer with
//! `LedgerUpdater`. Cancellation flows from the dispatcher's
//! `CancellationSignal` into every poll and sleep.

pub mod accrual;
pub mod cancellation;
pub mod dispatcher;
pub mod service;
pub mod updater;
