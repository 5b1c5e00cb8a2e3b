//! Renex Core
//!
//! Core types shared by the Renovate executor crates.
//!
//! This crate contains:
//! - Domain types: repositories, batches, work classes and batch identity
//! - DTOs: payloads exchanged over the executor's HTTP API

pub mod domain;
pub mod dto;

pub use domain::batch::{Batch, BatchError, BatchId, WorkClass, batch_id};
pub use domain::repository::Repository;
