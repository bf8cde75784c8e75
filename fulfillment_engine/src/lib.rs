//! Sofra Fulfillment Engine
//!
//! The fulfillment engine decides how a marketplace order gets delivered and priced, whether a status transition is
//! legal, whether a payment is genuinely settled, and how transactional notifications get delivered despite flaky
//! third-party channels. It is transport-agnostic; the HTTP surface lives in the `fulfillment_server` crate.
//!
//! The crate is divided into these main sections:
//! 1. Database management and control ([`mod@db`]). Sqlite is the supported backend. You should never need to access
//!    the database directly; use the public APIs instead. The exception is the data types, which are defined in the
//!    `db_types` module and are public.
//! 2. The engine public API ([`mod@sfe_api`]): order lifecycle and payment reconciliation. Backends implement the
//!    traits in [`mod@traits`] to drive these APIs.
//! 3. Delivery matching ([`mod@matching`]): pure geo classification plus vendor eligibility.
//! 4. The notification dispatcher ([`mod@dispatcher`]): write-ahead records, a bounded work queue, retries with
//!    backoff and dead-letter capture.
//!
//! The engine also emits events when orders are created, change status, or settle payment. A simple actor framework
//! lets you hook into these events; the server wires the notification orchestrator and audit trail through them.
mod db;

pub mod db_types;
pub mod dispatcher;
pub mod events;
pub mod helpers;
pub mod matching;
mod sfe_api;
pub mod traits;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

#[cfg(feature = "sqlite")]
pub use db::sqlite::SqliteDatabase;
pub use sfe_api::{
    errors::{CallbackRejection, OrderFlowError, PaymentsApiError},
    order_flow_api::{OrderFlowApi, PlaceOrderRequest},
    payments_api::{CallbackHeaders, CallbackOutcome, PaymentSession, PaymentsApi, ReconcilerConfig, VerifyClaim, VerifyOutcome},
};
