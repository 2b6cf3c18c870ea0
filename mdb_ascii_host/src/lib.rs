//! Tokio host for vending-machine cash peripherals behind an MDB ASCII
//! serial bridge.
//!
//! The [`device::controller::PeripheralController`] owns the serial link,
//! polls the banknote validator and coin changer, mediates banknote
//! escrow decisions, dispenses change against the coin-tube inventory,
//! drives cashless vend sessions and publishes a single
//! [`device::event::DeviceEvent`] stream. Cash movements are mirrored
//! into a persistent [`inventory::store::InventoryStore`].

pub mod device;
pub mod inventory;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;
