use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use mdb_ascii_core::mdb::{
    bill_route, is_ack, parse_bill, parse_coin_type_config, parse_tube_status, CoinTypeTable,
    BILL_POLL, BILL_RESET, BILL_SETUP, BILL_TYPES_ENABLE, COIN_POLL, COIN_RESET,
    COIN_TYPES_ENABLE, COIN_TYPE_QUERY, MASTER_DISABLE, MASTER_ENABLE, TUBE_STATUS,
};
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::device::cashless::{self, CashlessSessionState};
use crate::device::coin_handler::CoinHandler;
use crate::device::config::ControllerConfig;
use crate::device::error::ControllerError;
use crate::device::escrow::BanknoteEscrow;
use crate::device::event::{DeviceEvent, EventBus};
use crate::device::payout::{self, DispenseWaiters};
use crate::inventory::store::InventoryStore;
use crate::transport::serial_link::SerialLink;

/// State shared between the controller handle, the polling task and the
/// payout/cashless drivers.
pub(crate) struct Shared {
    pub(crate) config: ControllerConfig,
    /// The serial link, present while the device session is open. One
    /// lock acquisition spans each (write, read*) exchange, making the
    /// exchange atomic relative to every other sender.
    pub(crate) io: Mutex<Option<SerialLink>>,
    pub(crate) events: EventBus,
    pub(crate) inventory: Arc<InventoryStore>,
    pub(crate) coin_table: Arc<StdMutex<CoinTypeTable>>,
    pub(crate) escrow: BanknoteEscrow,
    pub(crate) waiters: Arc<DispenseWaiters>,
    pub(crate) coin_handler: CoinHandler,
    /// Pause flags the poller consults at the top of each cycle.
    pub(crate) payout_busy: AtomicBool,
    pub(crate) cashless_busy: AtomicBool,
    cashless_state: StdMutex<CashlessSessionState>,
    running: AtomicBool,
    verbose: AtomicBool,
    cancel: StdMutex<Option<watch::Sender<bool>>>,
    poll_task: StdMutex<Option<JoinHandle<()>>>,
}

impl Shared {
    /// One half-duplex exchange under the I/O mutex.
    pub(crate) async fn exchange(&self, command: &str) -> Result<String, ControllerError> {
        let io = self.io.lock().await;
        let link = io.as_ref().ok_or(ControllerError::NotRunning)?;
        self.exchange_on(link, command).await
    }

    /// One exchange on an already-locked link.
    pub(crate) async fn exchange_on(
        &self,
        link: &SerialLink,
        command: &str,
    ) -> Result<String, ControllerError> {
        link.write_line(command).await?;
        let response = link.read_line().await?;
        if self.verbose.load(Ordering::Relaxed) {
            info!(command, response, "exchange");
        } else {
            trace!(command, response, "exchange");
        }
        Ok(response)
    }

    /// Fetches and decodes the live tube status.
    pub(crate) async fn fetch_tube_status(&self) -> Result<BTreeMap<u32, u32>, ControllerError> {
        let line = self.exchange(TUBE_STATUS).await?;
        let table = self
            .coin_table
            .lock()
            .expect("coin table not poisoned")
            .clone();
        Ok(parse_tube_status(&line, &table)?)
    }

    pub(crate) fn set_cashless_state(&self, state: CashlessSessionState) {
        *self
            .cashless_state
            .lock()
            .expect("cashless state not poisoned") = state;
    }

    /// Device init: master enable, banknote side, coin side. Each command
    /// is answered by exactly one line; only the coin type response is
    /// decoded, everything else is logged and discarded.
    async fn run_init_sequence(&self) -> Result<(), ControllerError> {
        let io = self.io.lock().await;
        let link = io.as_ref().ok_or(ControllerError::NotRunning)?;

        let bill_return = bill_route(false);
        let banknote_init = [
            MASTER_ENABLE,
            BILL_RESET,
            BILL_SETUP,
            BILL_TYPES_ENABLE,
            bill_return.as_str(),
            COIN_RESET,
        ];
        for command in banknote_init {
            let response = self.exchange_on(link, command).await?;
            debug!(command, response, "init exchange");
        }

        let type_line = self.exchange_on(link, COIN_TYPE_QUERY).await?;
        match parse_coin_type_config(&type_line) {
            Some(table) => {
                info!(
                    types = table.iter().count(),
                    scaling = table.scaling(),
                    decimal_places = table.decimal_places(),
                    "coin type table discovered"
                );
                *self.coin_table.lock().expect("coin table not poisoned") = table;
            }
            None => {
                warn!(
                    line = %type_line,
                    "coin type response not decodable, coin frames will be dropped"
                );
            }
        }

        let response = self.exchange_on(link, COIN_TYPES_ENABLE).await?;
        debug!(command = COIN_TYPES_ENABLE, response, "init exchange");
        Ok(())
    }

    /// One polling cycle: poll bills, poll coins, dispatch both.
    async fn poll_cycle(&self) -> Result<(), ControllerError> {
        let (bill_line, coin_line) = {
            let io = self.io.lock().await;
            let link = io.as_ref().ok_or(ControllerError::NotRunning)?;
            let bills = self.exchange_on(link, BILL_POLL).await?;
            let coins = self.exchange_on(link, COIN_POLL).await?;
            (bills, coins)
        };

        // Parsing and dispatch happen outside the I/O mutex.
        self.handle_bill_line(&bill_line).await;
        self.coin_handler.handle_poll_line(&coin_line);
        Ok(())
    }

    /// Escrow state machine for one bill poll response.
    async fn handle_bill_line(&self, line: &str) {
        let Some(bill) = parse_bill(line, &self.config.bill_table) else {
            return;
        };
        let amount = bill.denomination;

        if self.escrow.is_open() {
            // A second note cannot be held; return it without touching
            // the open ticket.
            warn!(amount, "escrow frame while a ticket is open, returning note");
            if let Err(error) = self.exchange(&bill_route(false)).await {
                warn!(%error, "failed to return second escrow note");
            }
            return;
        }
        let Some(decision) = self.escrow.open(amount) else {
            return;
        };

        info!(amount, bill_type = bill.bill_type, "banknote in escrow");
        self.events.emit(DeviceEvent::CashEscrowRequested { amount });

        let accepted = match tokio::time::timeout(self.config.escrow_timeout, decision).await {
            Ok(Ok(accept)) => accept,
            Ok(Err(_)) => {
                debug!(amount, "escrow ticket dropped, returning note");
                false
            }
            Err(_) => {
                self.escrow.close();
                warn!(amount, "escrow timeout, returning note");
                self.events.emit_error("escrow timeout");
                false
            }
        };

        match self.exchange(&bill_route(accepted)).await {
            Ok(response) => trace!(accepted, response, "bill routed"),
            Err(error) => {
                warn!(%error, "bill routing command failed");
                self.events
                    .emit_error(format!("bill routing failed: {error}"));
            }
        }

        if accepted {
            self.inventory.register_banknote_accepted(amount);
        }
        self.events
            .emit(DeviceEvent::CashProcessed { amount, accepted });
    }
}

async fn poll_loop(shared: Arc<Shared>, mut cancel: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(shared.config.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    debug!(
        period_ms = shared.config.poll_interval.as_millis() as u64,
        "polling task started"
    );

    loop {
        tokio::select! {
            _ = cancel.changed() => break,
            _ = ticker.tick() => {}
        }

        if shared.payout_busy.load(Ordering::Acquire) || shared.cashless_busy.load(Ordering::Acquire)
        {
            trace!("polling suspended");
            continue;
        }

        tokio::select! {
            _ = cancel.changed() => break,
            result = shared.poll_cycle() => match result {
                Ok(()) => {}
                Err(ControllerError::NotRunning) => break,
                Err(error) => {
                    warn!(%error, "poll cycle failed");
                    shared.events.emit_error(format!("poll failed: {error}"));
                }
            }
        }
    }

    debug!("polling task stopped");
}

/// The peripheral controller: owns the serial link, polls the banknote
/// validator and coin changer, mediates escrow decisions, dispenses
/// change, drives cashless sessions and publishes the device event
/// stream.
///
/// Cloning is cheap and shares the underlying device session.
#[derive(Clone)]
pub struct PeripheralController {
    shared: Arc<Shared>,
}

impl PeripheralController {
    #[must_use]
    pub fn new(config: ControllerConfig, inventory: Arc<InventoryStore>) -> Self {
        let events = EventBus::new();
        let coin_table = Arc::new(StdMutex::new(CoinTypeTable::default()));
        let waiters = Arc::new(DispenseWaiters::new());
        let coin_handler = CoinHandler::new(
            Arc::clone(&inventory),
            Arc::clone(&waiters),
            events.clone(),
            Arc::clone(&coin_table),
        );

        Self {
            shared: Arc::new(Shared {
                config,
                io: Mutex::new(None),
                events,
                inventory,
                coin_table,
                escrow: BanknoteEscrow::new(),
                waiters,
                coin_handler,
                payout_busy: AtomicBool::new(false),
                cashless_busy: AtomicBool::new(false),
                cashless_state: StdMutex::new(CashlessSessionState::Idle),
                running: AtomicBool::new(false),
                verbose: AtomicBool::new(false),
                cancel: StdMutex::new(None),
                poll_task: StdMutex::new(None),
            }),
        }
    }

    /// Registers a new observer of the device event stream.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.shared.events.subscribe()
    }

    /// The inventory mirror this controller updates.
    #[must_use]
    pub fn inventory(&self) -> Arc<InventoryStore> {
        Arc::clone(&self.shared.inventory)
    }

    /// `true` while the device session is open and polling.
    #[must_use]
    pub fn device_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Current cashless session phase.
    #[must_use]
    pub fn cashless_state(&self) -> CashlessSessionState {
        *self
            .shared
            .cashless_state
            .lock()
            .expect("cashless state not poisoned")
    }

    /// Logs every exchange at `info` instead of `trace`.
    pub fn enable_verbose_logging(&self, enabled: bool) {
        self.shared.verbose.store(enabled, Ordering::Relaxed);
        info!(enabled, "verbose exchange logging");
    }

    /// Opens `port` and starts the device session.
    ///
    /// # Errors
    ///
    /// [`ControllerError::Startup`] when the port cannot be opened or the
    /// init sequence fails, [`ControllerError::AlreadyRunning`] when a
    /// session is open.
    #[instrument(skip(self))]
    pub async fn start(&self, port: &str) -> Result<(), ControllerError> {
        let link = SerialLink::open(
            port,
            self.shared.config.baud,
            self.shared.config.read_timeout,
        )
        .map_err(|error| {
            error!(%error, port, "serial open failed");
            self.shared
                .events
                .emit_error(format!("startup failed: {error}"));
            ControllerError::Startup(error.to_string())
        })?;

        self.start_with_link(link).await
    }

    /// Starts the device session on an already-open link. Tests and
    /// alternate transports enter here; [`start`](Self::start) wraps it.
    ///
    /// # Errors
    ///
    /// As for [`start`](Self::start).
    pub async fn start_with_link(&self, link: SerialLink) -> Result<(), ControllerError> {
        {
            let mut io = self.shared.io.lock().await;
            if io.is_some() {
                return Err(ControllerError::AlreadyRunning);
            }
            *io = Some(link);
        }

        if let Err(error) = self.shared.run_init_sequence().await {
            error!(%error, "device initialisation failed");
            self.shared
                .events
                .emit_error(format!("startup failed: {error}"));
            if let Some(link) = self.shared.io.lock().await.take() {
                link.close().await;
            }
            return Err(ControllerError::Startup(error.to_string()));
        }

        let (cancel_tx, cancel_rx) = watch::channel(false);
        *self.shared.cancel.lock().expect("cancel not poisoned") = Some(cancel_tx);

        let shared = Arc::clone(&self.shared);
        let task = tokio::spawn(poll_loop(shared, cancel_rx));
        *self.shared.poll_task.lock().expect("poll task not poisoned") = Some(task);

        self.shared.running.store(true, Ordering::Release);
        self.shared.events.emit(DeviceEvent::Initialized);
        info!("peripheral controller running");
        Ok(())
    }

    /// Stops polling, disables the master best-effort and closes the
    /// link. Idempotent.
    #[instrument(skip(self))]
    pub async fn stop(&self) {
        let cancel = self.shared.cancel.lock().expect("cancel not poisoned").take();
        if let Some(cancel) = cancel {
            let _ = cancel.send(true);
        }

        let task = self
            .shared
            .poll_task
            .lock()
            .expect("poll task not poisoned")
            .take();
        if let Some(task) = task {
            let _ = task.await;
        }

        self.shared.escrow.close();
        self.shared.waiters.clear();

        let link = self.shared.io.lock().await.take();
        if let Some(link) = link {
            match link.exchange(MASTER_DISABLE).await {
                Ok(_) => debug!("master disable sent"),
                Err(error) => debug!(%error, "master disable failed"),
            }
            link.close().await;
        }

        self.shared.running.store(false, Ordering::Release);
        info!("peripheral controller stopped");
    }

    /// Stacks the banknote currently in escrow. A call with no open
    /// escrow is a silent no-op.
    pub fn accept(&self) {
        self.shared.escrow.decide(true);
    }

    /// Returns the banknote currently in escrow. A call with no open
    /// escrow is a silent no-op.
    pub fn return_note(&self) {
        self.shared.escrow.decide(false);
    }

    /// Dispenses `amount` in coins. Returns `true` only when every coin
    /// of the plan was confirmed dispensed; failures surface on the
    /// event stream.
    #[instrument(skip(self))]
    pub async fn dispense_change(&self, amount: u32) -> bool {
        match payout::run_dispense(&self.shared, amount).await {
            Ok(()) => true,
            Err(error) => {
                warn!(%error, amount, "dispense change failed");
                self.shared.events.emit_error(error.to_string());
                false
            }
        }
    }

    /// Runs a cashless vend session for `amount` minor units. Returns
    /// `true` on approval; a session started while another is live
    /// returns `false` without touching the link.
    #[instrument(skip(self))]
    pub async fn start_cashless_payment(&self, amount: u32) -> bool {
        match cashless::run_session(&self.shared, amount).await {
            Ok(approved) => approved,
            Err(ControllerError::CashlessBusy) => {
                warn!("cashless session already active");
                false
            }
            Err(error) => {
                warn!(%error, amount, "cashless session failed");
                self.shared.events.emit_error(error.to_string());
                false
            }
        }
    }

    /// Fetches, logs and returns the live tube status.
    #[instrument(skip(self))]
    pub async fn show_tube_status(&self) -> Option<BTreeMap<u32, u32>> {
        match self.shared.fetch_tube_status().await {
            Ok(tubes) => {
                info!(?tubes, "tube status");
                Some(tubes)
            }
            Err(error) => {
                warn!(%error, "tube status failed");
                self.shared.events.emit_error(error.to_string());
                None
            }
        }
    }

    /// Shows `text` on the cashless reader display, best-effort.
    pub async fn send_display_text(&self, text: &str) -> bool {
        let command = mdb_ascii_core::mdb::display_text(text);
        match self.shared.exchange(&command).await {
            Ok(response) => is_ack(&response),
            Err(error) => {
                debug!(%error, "display text failed");
                false
            }
        }
    }

    /// Sends an arbitrary bridge command and returns the response line.
    /// Diagnostic passthrough; the poller is not paused.
    ///
    /// # Errors
    ///
    /// [`ControllerError::NotRunning`] without an open session, link
    /// errors otherwise.
    pub async fn send_raw(&self, command: &str) -> Result<String, ControllerError> {
        self.shared.exchange(command).await
    }
}
