//! Protocol primitives for the MDB ASCII serial bridge.
//!
//! The bridge exposes a vending-machine cash peripheral set (banknote
//! validator, coin changer, optional cashless reader) as a line-oriented
//! ASCII protocol: commands such as `R,33` go out, responses such as
//! `p,90` come back. This crate holds everything that can be expressed
//! without I/O: the response-line codec, the coin/bill denomination
//! tables, the routing-nibble decoding and the greedy change planner.
//!
//! The host side (polling, escrow, payout, cashless sessions) lives in
//! `mdb_ascii_host`.

mod codec;
mod commands;
mod common;

pub use common::bill_table::BillTable;
pub use common::coin_table::CoinTypeTable;
pub use common::route::CoinRoute;

pub use codec::bill::BillEscrow;
pub use codec::coin::CoinFrame;
pub use codec::line::ResponseLine;

/// Flat re-export of the full protocol surface.
pub mod mdb {
    pub use crate::codec::bill::*;
    pub use crate::codec::cashless::*;
    pub use crate::codec::coin::*;
    pub use crate::codec::line::*;
    pub use crate::codec::setup::*;
    pub use crate::codec::tube::*;

    pub use crate::commands::*;

    pub use crate::common::bill_table::*;
    pub use crate::common::change::*;
    pub use crate::common::coin_table::*;
    pub use crate::common::route::*;
}
