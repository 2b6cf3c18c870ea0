use std::time::Duration;

use derive_builder::Builder;
use mdb_ascii_core::BillTable;

use crate::transport::serial_link::{DEFAULT_BAUD, DEFAULT_READ_TIMEOUT};

/// Period of the background banknote/coin polling loop.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);
/// How long an escrowed banknote waits for an accept/return decision.
pub const DEFAULT_ESCROW_TIMEOUT: Duration = Duration::from_secs(5);
/// How long a payout waits for the "dispensed" confirmation frame.
pub const DEFAULT_DISPENSE_TIMEOUT: Duration = Duration::from_secs(5);
/// Re-poll period while driving a dispense confirmation.
pub const DEFAULT_DISPENSE_POLL_INTERVAL: Duration = Duration::from_millis(80);
/// Attempts to get the cashless enable command acknowledged.
pub const DEFAULT_CASHLESS_ENABLE_RETRIES: u32 = 5;
/// Settle time between cashless enable and reset.
pub const DEFAULT_CASHLESS_ENABLE_SETTLE: Duration = Duration::from_millis(300);
/// Re-poll period while waiting for the reader's reset diagnostic.
pub const DEFAULT_CASHLESS_RESET_POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Deadline for the reader's reset diagnostic.
pub const DEFAULT_CASHLESS_RESET_TIMEOUT: Duration = Duration::from_secs(5);
/// Re-poll period while waiting for the vend outcome.
pub const DEFAULT_CASHLESS_OUTCOME_POLL_INTERVAL: Duration = Duration::from_millis(200);
/// Deadline for the vend outcome.
pub const DEFAULT_CASHLESS_APPROVAL_TIMEOUT: Duration = Duration::from_secs(30);

fn default_display_text() -> String {
    "CARD PAYMENT".to_string()
}

/// Controller configuration.
///
/// Defaults match the bridge firmware's expected cadence; build one with
/// [`ControllerConfigBuilder`] to override individual values:
///
/// ```
/// use mdb_ascii_host::device::config::ControllerConfigBuilder;
/// use std::time::Duration;
///
/// let config = ControllerConfigBuilder::default()
///     .poll_interval(Duration::from_millis(100))
///     .build()
///     .expect("valid configuration");
/// assert_eq!(config.baud, 115_200);
/// ```
#[derive(Debug, Clone, Builder)]
#[builder(setter(into))]
pub struct ControllerConfig {
    /// Serial line speed.
    #[builder(default = "DEFAULT_BAUD")]
    pub baud: u32,

    /// Serial read timeout; an expired read yields the empty line.
    #[builder(default = "DEFAULT_READ_TIMEOUT")]
    pub read_timeout: Duration,

    /// Banknote denomination table by validator channel.
    #[builder(default)]
    pub bill_table: BillTable,

    #[builder(default = "DEFAULT_POLL_INTERVAL")]
    pub poll_interval: Duration,

    #[builder(default = "DEFAULT_ESCROW_TIMEOUT")]
    pub escrow_timeout: Duration,

    #[builder(default = "DEFAULT_DISPENSE_TIMEOUT")]
    pub dispense_timeout: Duration,

    #[builder(default = "DEFAULT_DISPENSE_POLL_INTERVAL")]
    pub dispense_poll_interval: Duration,

    #[builder(default = "DEFAULT_CASHLESS_ENABLE_RETRIES")]
    pub cashless_enable_retries: u32,

    #[builder(default = "DEFAULT_CASHLESS_ENABLE_SETTLE")]
    pub cashless_enable_settle: Duration,

    #[builder(default = "DEFAULT_CASHLESS_RESET_POLL_INTERVAL")]
    pub cashless_reset_poll_interval: Duration,

    #[builder(default = "DEFAULT_CASHLESS_RESET_TIMEOUT")]
    pub cashless_reset_timeout: Duration,

    #[builder(default = "DEFAULT_CASHLESS_OUTCOME_POLL_INTERVAL")]
    pub cashless_outcome_poll_interval: Duration,

    #[builder(default = "DEFAULT_CASHLESS_APPROVAL_TIMEOUT")]
    pub cashless_approval_timeout: Duration,

    /// Text shown on the reader display while a vend session opens.
    #[builder(default = "default_display_text()")]
    pub cashless_display_text: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        ControllerConfigBuilder::default()
            .build()
            .expect("default configuration is complete")
    }
}
