pub mod notifiers;
pub mod strategies;
pub mod traits;

pub use traits::{LocatorStrategy, Notifier};
