pub mod dispatcher;
pub mod guard;
pub mod memory;
pub mod records;
pub mod store;

pub use dispatcher::{
    DispatchOutcome, DispatchSummary, NotificationDispatcher, RecipientSkip, SkipReason,
    SkippedRecipient,
};
