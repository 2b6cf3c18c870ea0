pub mod cashless;
pub mod coin_handler;
pub mod config;
pub mod controller;
pub mod error;
pub mod escrow;
pub mod event;
pub mod payout;
