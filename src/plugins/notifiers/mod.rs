// Notifier implementations
pub mod log;

pub use log::{LogNotifier, MemoryNotifier};
