//! Gopher protocol implementation.
//!
//! - **`selector`**: the closed set of selector types served
//! - **`parser`**: frames a request line out of the read buffer
//! - **`resolver`**: maps a selector onto a file inside the served root
//! - **`response`**: document terminator and error lines
//! - **`writer`**: scatter list with partial-write bookkeeping
//! - **`connection`**: one client's lifecycle
//!
//! # Connection State Machine
//!
//! ```text
//!        ┌─────────────────┐
//!        │      Idle       │ ← free slot
//!        └────────┬────────┘
//!                 │ accepted
//!                 ▼
//!        ┌─────────────────┐
//!        │ AwaitingRequest │ ← read until a full line
//!        └────────┬────────┘
//!                 │ selector line
//!                 ▼
//!        ┌─────────────────┐
//!        │    Resolving    │ ← open inside the root
//!        └────────┬────────┘
//!                 │ file opened
//!                 ▼
//!        ┌─────────────────┐
//!        │  AwaitingBody   │ ← lease a mapping from the cache
//!        └────────┬────────┘
//!                 │ segments queued
//!                 ▼
//!        ┌─────────────────┐
//!        │     Writing     │ ← scatter write until drained
//!        └────────┬────────┘
//!                 │ done, error or timeout
//!                 ▼
//!        ┌─────────────────┐
//!        │     Closed      │ → Idle
//!        └─────────────────┘
//! ```
//!
//! Any state may jump to `Closed`; the status it closes with decides the
//! error line the client gets and what the hit log records.

pub mod connection;
pub mod parser;
pub mod resolver;
pub mod response;
pub mod selector;
pub mod writer;
