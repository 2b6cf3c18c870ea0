pub mod bill_table;
pub mod change;
pub mod coin_table;
pub mod route;
