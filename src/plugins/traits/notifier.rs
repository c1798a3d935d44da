/// User-facing notification sink. Fire-and-forget: implementations swallow
/// their own failures.
#[cfg_attr(test, mockall::automock)]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    fn notify(&self, message: &str);
}
