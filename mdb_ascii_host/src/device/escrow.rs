use std::sync::Mutex;
use std::time::Instant;

use tokio::sync::oneshot;
use tracing::{debug, trace};

/// One banknote held in escrow, with the slot its decision arrives on.
#[derive(Debug)]
struct OpenTicket {
    amount: u32,
    opened_at: Instant,
    decision: oneshot::Sender<bool>,
}

/// The banknote escrow decision slot.
///
/// At most one ticket is open at any time. The poll task opens a ticket
/// when the validator reports a note in escrow and awaits the decision
/// receiver; UI-side callers lodge `true` (stack) or `false` (return)
/// through [`decide`](BanknoteEscrow::decide), which is a no-op when no
/// ticket is open.
#[derive(Debug, Default)]
pub struct BanknoteEscrow {
    slot: Mutex<Option<OpenTicket>>,
}

impl BanknoteEscrow {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a ticket for a note of `amount` minor units.
    ///
    /// Returns the receiver the decision will arrive on, or `None` when a
    /// ticket is already open.
    #[must_use]
    pub fn open(&self, amount: u32) -> Option<oneshot::Receiver<bool>> {
        let mut slot = self.slot.lock().expect("escrow slot not poisoned");
        if slot.is_some() {
            return None;
        }

        let (decision, receiver) = oneshot::channel();
        *slot = Some(OpenTicket {
            amount,
            opened_at: Instant::now(),
            decision,
        });
        Some(receiver)
    }

    /// Lodges a decision for the open ticket.
    ///
    /// Returns `true` when a ticket consumed the decision; lodging with
    /// no open ticket is a silent no-op.
    pub fn decide(&self, accept: bool) -> bool {
        let ticket = self.slot.lock().expect("escrow slot not poisoned").take();
        match ticket {
            Some(ticket) => {
                debug!(
                    amount = ticket.amount,
                    accept,
                    waited_ms = ticket.opened_at.elapsed().as_millis() as u64,
                    "escrow decision lodged"
                );
                ticket.decision.send(accept).is_ok()
            }
            None => {
                trace!(accept, "escrow decision ignored, no open ticket");
                false
            }
        }
    }

    /// Clears the ticket after its deadline elapsed or on shutdown.
    pub fn close(&self) {
        if let Some(ticket) = self.slot.lock().expect("escrow slot not poisoned").take() {
            debug!(amount = ticket.amount, "escrow ticket closed undecided");
        }
    }

    /// `true` while a ticket is open and undecided.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.slot.lock().expect("escrow slot not poisoned").is_some()
    }
}
