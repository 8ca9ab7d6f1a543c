//! Enhancement appliers.

mod journal_applier;

pub use journal_applier::{JOURNAL_KEY, JournalApplier};
