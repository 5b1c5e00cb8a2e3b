//! Core domain types
//!
//! These types describe the work the executor schedules. They are shared
//! between the server (which queues and tracks them), the runner backends
//! (which launch them) and the client (which inspects them).

pub mod batch;
pub mod repository;
