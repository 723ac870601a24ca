pub mod message_retention;

pub use message_retention::MessageRetentionWorker;
