use std::sync::atomic::Ordering;

use mdb_ascii_core::mdb::{
    cashless_vend_request, display_text, is_ack, parse_cashless_poll, parse_setup, CashlessPoll,
    CASHLESS_ENABLE, CASHLESS_POLL, CASHLESS_RESET, CASHLESS_RESET_DIAGNOSTIC, CASHLESS_SETUP,
};
use tracing::{debug, info, instrument, trace, warn};

use crate::device::controller::Shared;
use crate::device::error::ControllerError;
use crate::device::event::DeviceEvent;

/// Decimal places assumed when the setup response is unusable.
const FALLBACK_DECIMAL_PLACES: u8 = 2;
/// Largest plausible decimal-places value; guards the scaling divisor.
const MAX_DECIMAL_PLACES: u8 = 4;
/// Reads attempted for the setup block after `C,61`.
const SETUP_READ_ATTEMPTS: usize = 5;

/// Protocol phase of the cashless reader session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CashlessSessionState {
    #[default]
    Idle,
    Enabling,
    Resetting,
    SettingUp,
    VendRequested,
    AwaitingOutcome,
    Closing,
}

/// Returns the session to idle on every exit path.
struct SessionGuard<'a> {
    shared: &'a Shared,
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.shared.set_cashless_state(CashlessSessionState::Idle);
        self.shared.cashless_busy.store(false, Ordering::Release);
    }
}

/// Drives one cashless vend session for `amount` minor units.
///
/// Single-flight: a second session while one is live fails fast without
/// touching the link. Returns `Ok(true)` on approval, `Ok(false)` on
/// denial.
#[instrument(skip(shared), fields(amount))]
pub(crate) async fn run_session(shared: &Shared, amount: u32) -> Result<bool, ControllerError> {
    if shared.cashless_busy.swap(true, Ordering::AcqRel) {
        return Err(ControllerError::CashlessBusy);
    }
    let _guard = SessionGuard { shared };

    info!(amount, "cashless session starting");

    // Enable the reader, retrying until it acknowledges.
    shared.set_cashless_state(CashlessSessionState::Enabling);
    let mut enabled = false;
    for attempt in 1..=shared.config.cashless_enable_retries {
        let response = shared.exchange(CASHLESS_ENABLE).await?;
        if is_ack(&response) {
            enabled = true;
            break;
        }
        debug!(attempt, response, "cashless enable not acknowledged");
    }
    if !enabled {
        warn!("cashless enable exhausted its retries");
        return Err(ControllerError::EnableNotAcknowledged);
    }
    tokio::time::sleep(shared.config.cashless_enable_settle).await;

    // Reset, then poll until the reader reports reset completion.
    shared.set_cashless_state(CashlessSessionState::Resetting);
    let _ = shared.exchange(CASHLESS_RESET).await?;
    let reset = tokio::time::timeout(shared.config.cashless_reset_timeout, async {
        loop {
            let line = shared.exchange(CASHLESS_POLL).await?;
            if line.starts_with(CASHLESS_RESET_DIAGNOSTIC) {
                return Ok::<(), ControllerError>(());
            }
            tokio::time::sleep(shared.config.cashless_reset_poll_interval).await;
        }
    })
    .await;
    match reset {
        Ok(Ok(())) => debug!("cashless reader reset complete"),
        Ok(Err(error)) => return Err(error),
        Err(_) => return Err(ControllerError::ResetTimeout),
    }

    // Setup: the decimal places scale the vend amount.
    shared.set_cashless_state(CashlessSessionState::SettingUp);
    let decimal_places = read_setup_block(shared).await?;
    debug!(decimal_places, "cashless setup decoded");

    // Best-effort display; the reader not acknowledging is tolerated.
    let display = display_text(&shared.config.cashless_display_text);
    match shared.exchange(&display).await {
        Ok(response) if is_ack(&response) => trace!("display text acknowledged"),
        Ok(response) => debug!(response, "display text not acknowledged"),
        Err(error) => debug!(%error, "display text failed"),
    }

    // Vend request for the scaled amount.
    shared.set_cashless_state(CashlessSessionState::VendRequested);
    let scaled = scale_amount(amount, decimal_places);
    let response = shared.exchange(&cashless_vend_request(scaled)).await?;
    if !is_ack(&response) {
        warn!(response, "vend request refused");
        return Err(ControllerError::VendNotAcknowledged);
    }
    shared
        .events
        .emit(DeviceEvent::CashlessSessionStarted { amount });

    // Poll for the outcome.
    shared.set_cashless_state(CashlessSessionState::AwaitingOutcome);
    let outcome = tokio::time::timeout(shared.config.cashless_approval_timeout, async {
        loop {
            let line = shared.exchange(CASHLESS_POLL).await?;
            match parse_cashless_poll(&line) {
                CashlessPoll::Approved => return Ok::<bool, ControllerError>(true),
                CashlessPoll::Denied => return Ok(false),
                CashlessPoll::Pending => {
                    tokio::time::sleep(shared.config.cashless_outcome_poll_interval).await;
                }
            }
        }
    })
    .await;

    shared.set_cashless_state(CashlessSessionState::Closing);
    match outcome {
        Ok(Ok(true)) => {
            info!(amount, "cashless vend approved");
            shared
                .events
                .emit(DeviceEvent::CashlessVendApproved { amount });
            Ok(true)
        }
        Ok(Ok(false)) => {
            info!(amount, "cashless vend denied");
            shared
                .events
                .emit(DeviceEvent::CashlessVendDenied { amount });
            Ok(false)
        }
        Ok(Err(error)) => Err(error),
        Err(_) => Err(ControllerError::ApprovalTimeout),
    }
}

/// Sends `C,61` and reads past ACKs and empty lines to the setup block.
async fn read_setup_block(shared: &Shared) -> Result<u8, ControllerError> {
    let io = shared.io.lock().await;
    let link = io.as_ref().ok_or(ControllerError::NotRunning)?;

    link.write_line(CASHLESS_SETUP).await?;
    for _ in 0..SETUP_READ_ATTEMPTS {
        let line = link.read_line().await?;
        if line.is_empty() || is_ack(&line) {
            continue;
        }
        return Ok(parse_setup(&line).unwrap_or(FALLBACK_DECIMAL_PLACES));
    }

    debug!("no setup block received, assuming two decimal places");
    Ok(FALLBACK_DECIMAL_PLACES)
}

fn scale_amount(amount: u32, decimal_places: u8) -> u16 {
    let divisor = 10u32.pow(u32::from(decimal_places.min(MAX_DECIMAL_PLACES)));
    u16::try_from(amount / divisor).unwrap_or(u16::MAX)
}
