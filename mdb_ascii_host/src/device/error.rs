use mdb_ascii_core::mdb::CodecError;
use thiserror::Error;

use crate::transport::serial_link::LinkError;

/// Errors surfaced by the peripheral controller and its sub-operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControllerError {
    /// The controller has not been started or was stopped.
    #[error("device is not running")]
    NotRunning,

    /// `start` was called while a device session is already open.
    #[error("device is already running")]
    AlreadyRunning,

    /// Opening the port or running the init sequence failed.
    #[error("startup failed: {0}")]
    Startup(String),

    /// The serial link failed mid-operation.
    #[error("serial link error: {0}")]
    Link(#[from] LinkError),

    /// A well-formed response with unusable semantics.
    #[error("protocol violation: {0}")]
    Protocol(#[from] CodecError),

    /// No decision arrived for the escrowed banknote in time.
    #[error("escrow timeout")]
    EscrowTimeout,

    /// A payout is already in progress.
    #[error("payout already in progress")]
    PayoutBusy,

    /// The tube inventory cannot cover the requested change.
    #[error("cannot make change for {requested}: short by {shortfall}")]
    InsufficientChange { requested: u32, shortfall: u32 },

    /// The coin table has no type index for the planned denomination.
    #[error("no coin type dispenses denomination {0}")]
    UnknownDenomination(u32),

    /// A dispense for this denomination is already awaiting confirmation.
    #[error("a dispense of {0} is already awaiting confirmation")]
    DispenseConflict(u32),

    /// The payout command was not acknowledged.
    #[error("payout of {denomination} refused by device")]
    DispenseRefused { denomination: u32 },

    /// No dispense confirmation frame arrived in time.
    #[error("dispense confirmation timeout for {denomination}")]
    DispenseTimeout { denomination: u32 },

    /// A cashless session is already active.
    #[error("cashless session already active")]
    CashlessBusy,

    /// The cashless reader never acknowledged the enable command.
    #[error("cashless enable not acknowledged")]
    EnableNotAcknowledged,

    /// The cashless reader never reported reset completion.
    #[error("cashless reset timeout")]
    ResetTimeout,

    /// The vend request was not acknowledged.
    #[error("cashless vend request not acknowledged")]
    VendNotAcknowledged,

    /// The reader reached no outcome within the approval deadline.
    #[error("cashless approval timeout")]
    ApprovalTimeout,

    /// The operation was aborted by a controller shutdown.
    #[error("operation cancelled")]
    Cancelled,
}
