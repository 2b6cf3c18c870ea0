use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Mutex;
use std::time::Instant;

use mdb_ascii_core::mdb::{coin_payout, is_ack, plan_change, COIN_POLL};
use tokio::sync::oneshot;
use tracing::{debug, info, instrument, trace, warn};

use crate::device::controller::Shared;
use crate::device::error::ControllerError;

/// Completion slot for one in-flight coin payout.
#[derive(Debug)]
struct Waiter {
    respond_to: oneshot::Sender<()>,
    created_at: Instant,
}

/// Denomination-keyed table of in-flight payout confirmations.
///
/// The payout task registers a waiter before issuing the payout command;
/// the coin handler resolves it when the matching "dispensed" frame
/// arrives. At most one waiter exists per denomination.
#[derive(Debug, Default)]
pub struct DispenseWaiters {
    inner: Mutex<HashMap<u32, Waiter>>,
}

impl DispenseWaiters {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a waiter for `denomination`.
    ///
    /// Returns the confirmation receiver, or `None` when a dispense of
    /// this denomination is already awaiting confirmation.
    #[must_use]
    pub fn register(&self, denomination: u32) -> Option<oneshot::Receiver<()>> {
        let mut waiters = self.inner.lock().expect("waiters not poisoned");
        if waiters.contains_key(&denomination) {
            return None;
        }

        let (respond_to, receiver) = oneshot::channel();
        waiters.insert(
            denomination,
            Waiter {
                respond_to,
                created_at: Instant::now(),
            },
        );
        Some(receiver)
    }

    /// Resolves the waiter for `denomination`, if one exists.
    pub fn resolve(&self, denomination: u32) -> bool {
        let waiter = self
            .inner
            .lock()
            .expect("waiters not poisoned")
            .remove(&denomination);
        match waiter {
            Some(waiter) => {
                trace!(
                    denomination,
                    waited_ms = waiter.created_at.elapsed().as_millis() as u64,
                    "dispense waiter resolved"
                );
                waiter.respond_to.send(()).is_ok()
            }
            None => false,
        }
    }

    /// Drops the waiter for `denomination`; its receiver fails.
    pub fn remove(&self, denomination: u32) {
        self.inner
            .lock()
            .expect("waiters not poisoned")
            .remove(&denomination);
    }

    /// Drops every waiter; pending receivers fail.
    pub fn clear(&self) {
        let mut waiters = self.inner.lock().expect("waiters not poisoned");
        if !waiters.is_empty() {
            debug!(pending = waiters.len(), "clearing unresolved dispense waiters");
        }
        waiters.clear();
    }
}

/// Clears the payout state on every exit path.
struct PayoutGuard<'a> {
    shared: &'a Shared,
}

impl Drop for PayoutGuard<'_> {
    fn drop(&mut self) {
        self.shared.waiters.clear();
        self.shared.payout_busy.store(false, Ordering::Release);
    }
}

/// Dispenses `amount` in coins against the live tube inventory.
///
/// Pauses the poller, fetches the tube status, runs the greedy planner
/// and pays out coin by coin, each one confirmed by its "dispensed"
/// frame before the next is requested.
#[instrument(skip(shared), fields(amount))]
pub(crate) async fn run_dispense(shared: &Shared, amount: u32) -> Result<(), ControllerError> {
    if amount == 0 {
        return Ok(());
    }
    if shared.payout_busy.swap(true, Ordering::AcqRel) {
        return Err(ControllerError::PayoutBusy);
    }
    let _guard = PayoutGuard { shared };

    let tubes = shared.fetch_tube_status().await?;
    let (plan, shortfall) = plan_change(amount, &tubes);
    if shortfall > 0 {
        warn!(amount, shortfall, "tube inventory cannot cover change");
        return Err(ControllerError::InsufficientChange {
            requested: amount,
            shortfall,
        });
    }

    info!(amount, ?plan, "dispensing change");
    for (denomination, count) in plan {
        for _ in 0..count {
            dispense_one(shared, denomination).await?;
        }
    }

    info!(amount, "change dispensed");
    Ok(())
}

/// Pays out a single coin and drives its confirmation.
async fn dispense_one(shared: &Shared, denomination: u32) -> Result<(), ControllerError> {
    let type_index = {
        let table = shared.coin_table.lock().expect("coin table not poisoned");
        table
            .index_of(denomination)
            .ok_or(ControllerError::UnknownDenomination(denomination))?
    };

    let mut confirmation = shared
        .waiters
        .register(denomination)
        .ok_or(ControllerError::DispenseConflict(denomination))?;

    let response = shared.exchange(&coin_payout(type_index)).await?;
    if !is_ack(&response) {
        shared.waiters.remove(denomination);
        warn!(denomination, response, "payout command refused");
        return Err(ControllerError::DispenseRefused { denomination });
    }

    // Drive the confirmation ourselves: the poller is paused, so the
    // "dispensed" frame only arrives through these polls.
    let outcome = tokio::time::timeout(shared.config.dispense_timeout, async {
        loop {
            let line = shared.exchange(COIN_POLL).await?;
            shared.coin_handler.handle_poll_line(&line);

            match confirmation.try_recv() {
                Ok(()) => return Ok(()),
                Err(oneshot::error::TryRecvError::Empty) => {}
                Err(oneshot::error::TryRecvError::Closed) => {
                    return Err(ControllerError::Cancelled);
                }
            }

            tokio::time::sleep(shared.config.dispense_poll_interval).await;
        }
    })
    .await;

    match outcome {
        Ok(Ok(())) => {
            debug!(denomination, "coin dispense confirmed");
            Ok(())
        }
        Ok(Err(error)) => Err(error),
        Err(_) => {
            shared.waiters.remove(denomination);
            warn!(denomination, "dispense confirmation timeout");
            Err(ControllerError::DispenseTimeout { denomination })
        }
    }
}
