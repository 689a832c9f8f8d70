//! # Resolution Tickets
//!
//! Every resolution holds a monotonically increasing serial. Issuing a new
//! ticket cancels the previous one's token, and only the holder of the
//! current serial may commit its result; everything older is stale and its
//! outcome is discarded, success or failure alike.

use tokio_util::sync::CancellationToken;

/// Handle for one in-flight resolution.
pub(crate) struct Ticket {
    pub serial: u64,
    pub cancel: CancellationToken,
}

/// Issues tickets and tracks which serial is current.
#[derive(Default)]
pub(crate) struct SequenceGuard {
    last_issued: u64,
    current_cancel: Option<CancellationToken>,
}

impl SequenceGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue the next ticket, cancelling the predecessor's token.
    pub fn issue(&mut self) -> Ticket {
        if let Some(previous) = self.current_cancel.take() {
            previous.cancel();
        }
        self.last_issued += 1;
        let cancel = CancellationToken::new();
        self.current_cancel = Some(cancel.clone());
        Ticket {
            serial: self.last_issued,
            cancel,
        }
    }

    /// Whether `serial` is still the newest issued ticket.
    pub fn is_current(&self, serial: u64) -> bool {
        serial == self.last_issued
    }
}
