use std::sync::{Arc, Mutex};

use mdb_ascii_core::mdb::{parse_coin_stream, CoinFrame, CoinRoute, CoinTypeTable};
use tracing::{debug, info, warn};

use crate::device::event::{DeviceEvent, EventBus};
use crate::device::payout::DispenseWaiters;
use crate::inventory::store::InventoryStore;

/// Routes every coin frame of a poll response.
///
/// Credits update the inventory before the corresponding event is
/// published; a `Dispensed` frame additionally resolves the payout
/// waiter registered for that denomination. Frames with unknown coin
/// types or routing nibbles are logged and dropped, never credited.
#[derive(Debug, Clone)]
pub struct CoinHandler {
    inventory: Arc<InventoryStore>,
    waiters: Arc<DispenseWaiters>,
    events: EventBus,
    coin_table: Arc<Mutex<CoinTypeTable>>,
}

impl CoinHandler {
    pub(crate) fn new(
        inventory: Arc<InventoryStore>,
        waiters: Arc<DispenseWaiters>,
        events: EventBus,
        coin_table: Arc<Mutex<CoinTypeTable>>,
    ) -> Self {
        Self {
            inventory,
            waiters,
            events,
            coin_table,
        }
    }

    /// Decodes and dispatches every coin frame in a poll response line.
    pub fn handle_poll_line(&self, line: &str) {
        for frame in parse_coin_stream(line) {
            self.handle_frame(frame);
        }
    }

    fn handle_frame(&self, frame: CoinFrame) {
        let denomination = {
            let table = self.coin_table.lock().expect("coin table not poisoned");
            table.denomination(frame.coin_type)
        };
        let Some(denomination) = denomination else {
            warn!(
                coin_type = frame.coin_type,
                raw = format_args!("{:#06X}", frame.raw),
                "coin frame for unknown coin type dropped"
            );
            return;
        };

        match frame.route {
            CoinRoute::ToTube => {
                self.inventory.register_coin_accepted(denomination);
                info!(denomination, "coin accepted into tube");
                self.events.emit(DeviceEvent::CoinReceived {
                    amount: denomination,
                });
            }
            CoinRoute::ToCashbox => {
                self.inventory.register_coin_to_cashbox_accepted(denomination);
                info!(denomination, "coin accepted into cashbox");
                self.events.emit(DeviceEvent::CoinToCashbox {
                    amount: denomination,
                });
            }
            CoinRoute::Dispensed => {
                self.inventory.register_coin_dispensed(denomination);
                info!(denomination, "coin dispensed from tube");
                self.events.emit(DeviceEvent::CoinDispensed {
                    amount: denomination,
                });
                if self.waiters.resolve(denomination) {
                    debug!(denomination, "dispense confirmation delivered");
                }
            }
            CoinRoute::Unknown(nibble) => {
                warn!(
                    nibble,
                    raw = format_args!("{:#06X}", frame.raw),
                    "coin frame with unknown routing dropped"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn handler() -> (CoinHandler, Arc<InventoryStore>, EventBus) {
        let inventory = Arc::new(InventoryStore::ephemeral());
        let waiters = Arc::new(DispenseWaiters::new());
        let events = EventBus::new();

        let mut table = CoinTypeTable::new(10, 2);
        table.set(0, 10);
        table.set(1, 20);
        table.set(2, 50);

        let handler = CoinHandler::new(
            Arc::clone(&inventory),
            waiters,
            events.clone(),
            Arc::new(Mutex::new(table)),
        );
        (handler, inventory, events)
    }

    #[tokio::test]
    async fn tube_credit_updates_inventory_then_emits() {
        let (handler, inventory, events) = handler();
        let mut observer = events.subscribe();

        handler.handle_poll_line("p,5112");

        assert_eq!(
            observer.recv().await.expect("event"),
            DeviceEvent::CoinReceived { amount: 20 }
        );
        assert_eq!(inventory.snapshot().coins, BTreeMap::from([(20, 1)]));
    }

    #[tokio::test]
    async fn cashbox_credit_goes_to_cashbox_table() {
        let (handler, inventory, events) = handler();
        let mut observer = events.subscribe();

        handler.handle_poll_line("p,4205");

        assert_eq!(
            observer.recv().await.expect("event"),
            DeviceEvent::CoinToCashbox { amount: 50 }
        );
        let snapshot = inventory.snapshot();
        assert!(snapshot.coins.is_empty());
        assert_eq!(snapshot.coins_in_cashbox, BTreeMap::from([(50, 1)]));
    }

    #[tokio::test]
    async fn dispense_decrements_and_resolves_waiter() {
        let (handler, inventory, events) = handler();
        let mut observer = events.subscribe();

        handler.handle_poll_line("p,5112");
        let confirmation = handler
            .waiters
            .register(20)
            .expect("waiter registers");

        handler.handle_poll_line("p,9112");

        assert_eq!(
            observer.recv().await.expect("event"),
            DeviceEvent::CoinReceived { amount: 20 }
        );
        assert_eq!(
            observer.recv().await.expect("event"),
            DeviceEvent::CoinDispensed { amount: 20 }
        );
        assert!(inventory.snapshot().coins.is_empty());
        assert!(confirmation.await.is_ok());
    }

    #[tokio::test]
    async fn frames_in_one_response_surface_in_decoded_order() {
        let (handler, _, events) = handler();
        let mut observer = events.subscribe();

        handler.handle_poll_line("p,51129112");

        assert_eq!(
            observer.recv().await.expect("event"),
            DeviceEvent::CoinReceived { amount: 20 }
        );
        assert_eq!(
            observer.recv().await.expect("event"),
            DeviceEvent::CoinDispensed { amount: 20 }
        );
    }

    #[tokio::test]
    async fn unknown_coin_type_is_dropped() {
        let (handler, inventory, events) = handler();
        let mut observer = events.subscribe();

        handler.handle_poll_line("p,5F12");
        handler.handle_poll_line("p,5112");

        // only the known frame surfaces
        assert_eq!(
            observer.recv().await.expect("event"),
            DeviceEvent::CoinReceived { amount: 20 }
        );
        assert_eq!(inventory.snapshot().coins, BTreeMap::from([(20, 1)]));
    }

    #[tokio::test]
    async fn unknown_route_is_dropped() {
        let (handler, inventory, _) = handler();

        handler.handle_poll_line("p,7112");

        let snapshot = inventory.snapshot();
        assert!(snapshot.coins.is_empty());
        assert!(snapshot.coins_in_cashbox.is_empty());
    }
}
