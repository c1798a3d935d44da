pub mod notifier;
pub mod strategy;

pub use notifier::Notifier;
pub use strategy::{CandidateSet, Confidence, LocatorContext, LocatorStrategy};

#[cfg(test)]
pub use notifier::MockNotifier;
