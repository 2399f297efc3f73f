//! Notification port trait.

pub trait Notifier {
    /// Deliver `text` to `recipient`. Returns whether delivery succeeded;
    /// delivery failures never abort the caller.
    fn send(&self, recipient: &str, text: &str) -> bool;
}
