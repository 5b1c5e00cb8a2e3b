//! Producers
//!
//! Turn repositories into batches and hand them to the scheduler:
//! - [`cron`]: sweep over every discovered repository on a cron schedule
//! - [`hook`]: one batch per accepted webhook

pub mod cron;
pub mod hook;

pub use self::cron::{CronProducer, parse_schedule};
pub use self::hook::HookProducer;
