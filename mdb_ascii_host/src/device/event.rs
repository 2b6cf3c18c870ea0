use tokio::sync::broadcast;
use tracing::debug;

/// How many events a slow observer may fall behind before it starts
/// losing the oldest ones.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Payment family an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentType {
    Cash,
    Cashless,
}

/// Physical cash holder an event touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CashHolder {
    /// The banknote stacker.
    BillStacker,
    /// The payable coin tubes.
    CoinTubes,
    /// The non-payable coin cashbox.
    Cashbox,
}

/// Outbound device event stream.
///
/// Amounts are minor currency units. Inventory updates are committed
/// before the corresponding event is published, so observers that query
/// the inventory snapshot on receipt see the post-update view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    /// Init sequence completed, polling started.
    Initialized,
    /// A banknote is held in escrow awaiting an accept/return decision.
    CashEscrowRequested { amount: u32 },
    /// The escrowed banknote was stacked (`accepted`) or returned.
    CashProcessed { amount: u32, accepted: bool },
    /// A coin was accepted into a payout tube.
    CoinReceived { amount: u32 },
    /// A coin was paid out of a tube.
    CoinDispensed { amount: u32 },
    /// A coin was accepted but diverted to the cashbox.
    CoinToCashbox { amount: u32 },
    /// A cashless vend request was accepted by the reader.
    CashlessSessionStarted { amount: u32 },
    /// The cashless reader approved the vend.
    CashlessVendApproved { amount: u32 },
    /// The cashless reader denied the vend.
    CashlessVendDenied { amount: u32 },
    /// A failure the observer should surface.
    Error { message: String },
}

impl DeviceEvent {
    /// Payment family, `None` for events outside a payment flow.
    #[must_use]
    pub const fn payment_type(&self) -> Option<PaymentType> {
        match self {
            Self::CashEscrowRequested { .. }
            | Self::CashProcessed { .. }
            | Self::CoinReceived { .. }
            | Self::CoinDispensed { .. }
            | Self::CoinToCashbox { .. } => Some(PaymentType::Cash),
            Self::CashlessSessionStarted { .. }
            | Self::CashlessVendApproved { .. }
            | Self::CashlessVendDenied { .. } => Some(PaymentType::Cashless),
            Self::Initialized | Self::Error { .. } => None,
        }
    }

    /// Cash holder the event touched, if any.
    #[must_use]
    pub const fn target_cash_holder(&self) -> Option<CashHolder> {
        match self {
            Self::CashEscrowRequested { .. } | Self::CashProcessed { .. } => {
                Some(CashHolder::BillStacker)
            }
            Self::CoinReceived { .. } | Self::CoinDispensed { .. } => Some(CashHolder::CoinTubes),
            Self::CoinToCashbox { .. } => Some(CashHolder::Cashbox),
            _ => None,
        }
    }

    /// Amount carried by the event, if any.
    #[must_use]
    pub const fn amount(&self) -> Option<u32> {
        match self {
            Self::CashEscrowRequested { amount }
            | Self::CashProcessed { amount, .. }
            | Self::CoinReceived { amount }
            | Self::CoinDispensed { amount }
            | Self::CoinToCashbox { amount }
            | Self::CashlessSessionStarted { amount }
            | Self::CashlessVendApproved { amount }
            | Self::CashlessVendDenied { amount } => Some(*amount),
            Self::Initialized | Self::Error { .. } => None,
        }
    }
}

/// Single-producer, many-observer event channel.
///
/// Observers subscribe at any time and receive every event from that
/// point on; a lagging observer loses the oldest events rather than
/// blocking the producer.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<DeviceEvent>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Registers a new observer.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.sender.subscribe()
    }

    /// Publishes an event. Events without observers are dropped silently.
    pub fn emit(&self, event: DeviceEvent) {
        debug!(?event, "device event");
        let _ = self.sender.send(event);
    }

    /// Publishes an [`DeviceEvent::Error`].
    pub fn emit_error(&self, message: impl Into<String>) {
        self.emit(DeviceEvent::Error {
            message: message.into(),
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
