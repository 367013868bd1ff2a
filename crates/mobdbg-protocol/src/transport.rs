//! The seam between the dispatcher and the socket owner.

use std::sync::Mutex;

use crate::error::ServerError;
use crate::listener::lock;

/// Receives a length-prefixed body once it has been read.
pub type BodyCallback = Box<dyn FnOnce(String) + Send>;

/// Line-oriented outbound channel with on-demand body reads (real or mock).
pub trait Transport: Send + Sync {
    /// Queue one command line. The newline is added by the transport.
    fn send(&self, line: &str);

    /// Read exactly `len` bytes following the current line and hand them to
    /// `on_body`. Only one body read may be pending at a time.
    fn request_body(&self, len: usize, on_body: BodyCallback) -> Result<(), ServerError>;
}

/// Mock transport for testing: records every line and lets the test
/// deliver bodies by hand.
#[derive(Default)]
pub struct MockTransport {
    sent: Mutex<Vec<String>>,
    body: Mutex<Option<(usize, BodyCallback)>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every line sent so far, each with its trailing newline.
    pub fn sent(&self) -> Vec<String> {
        lock(&self.sent).clone()
    }

    /// Drain the recorded lines.
    pub fn take_sent(&self) -> Vec<String> {
        std::mem::take(&mut *lock(&self.sent))
    }

    /// Length of the body currently requested, if any.
    pub fn pending_body_len(&self) -> Option<usize> {
        lock(&self.body).as_ref().map(|(len, _)| *len)
    }

    /// Complete the pending body read. Returns `false` if none was pending.
    pub fn deliver_body(&self, body: &str) -> bool {
        let pending = lock(&self.body).take();
        match pending {
            Some((_, callback)) => {
                callback(body.to_string());
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("sent", &self.sent())
            .field("pending_body_len", &self.pending_body_len())
            .finish()
    }
}

impl Transport for MockTransport {
    fn send(&self, line: &str) {
        lock(&self.sent).push(format!("{line}\n"));
    }

    fn request_body(&self, len: usize, on_body: BodyCallback) -> Result<(), ServerError> {
        let mut body = lock(&self.body);
        if body.is_some() {
            return Err(ServerError::BodyAlreadyRequested);
        }
        *body = Some((len, on_body));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn mock_records_lines_with_newline() {
        let mock = MockTransport::new();
        mock.send("RUN");
        mock.send("STEP");
        assert_eq!(mock.sent(), vec!["RUN\n", "STEP\n"]);
        assert_eq!(mock.take_sent().len(), 2);
        assert!(mock.sent().is_empty());
    }

    #[test]
    fn mock_delivers_requested_body() {
        let mock = MockTransport::new();
        let received = Arc::new(Mutex::new(None));
        let slot = received.clone();
        mock.request_body(2, Box::new(move |body| *lock(&slot) = Some(body)))
            .unwrap();
        assert_eq!(mock.pending_body_len(), Some(2));
        assert!(mock.deliver_body("42"));
        assert_eq!(lock(&received).as_deref(), Some("42"));
        assert!(!mock.deliver_body("again"));
    }

    #[test]
    fn mock_rejects_second_body_request() {
        let mock = MockTransport::new();
        mock.request_body(1, Box::new(|_| {})).unwrap();
        let err = mock.request_body(1, Box::new(|_| {})).unwrap_err();
        assert!(matches!(err, ServerError::BodyAlreadyRequested));
    }
}
