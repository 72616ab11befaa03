//! Retention cleanup for business-process engines.
//!
//! [`cleaner::RetentionCleaner`] purges process instances through an engine's
//! repository, execution and task services, either wholesale by process key
//! or selectively by task age. [`retention`] applies configured policies on a
//! schedule.

pub mod cleaner;
pub mod config;
pub mod engine;
pub mod observability;
pub mod retention;
