//! Data Transfer Objects for the executor API
//!
//! Payloads served by the executor's HTTP API and consumed by the client.

pub mod hook;
pub mod jobs;
