//! Domain types and the storage ports the engines are written against.

pub mod account;
pub mod ledger;
pub mod money;
pub mod ports;
