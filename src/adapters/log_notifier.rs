//! Notifier that writes messages to the log instead of a chat service.

use crate::ports::notifier_port::Notifier;

#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(&self, recipient: &str, text: &str) -> bool {
        log::info!("notification for {}:\n{}", recipient, text);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn always_delivers() {
        assert!(LogNotifier.send("me", "[BUY signal]"));
    }
}
