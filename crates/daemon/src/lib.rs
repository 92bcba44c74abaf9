//! Scheduled notification daemon: a poll -> queue -> worker pipeline that
//! finds due event reminders, resolves event metadata from the content API,
//! delivers them over Web Push, and records the outcome.

pub mod payload;
pub mod poller;
pub mod resolver;
pub mod tents;
pub mod worker;
