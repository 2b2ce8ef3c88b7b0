//! Application layer: the account and transfer engines.
//!
//! Both engines are written against the storage ports in
//! [`crate::domain::ports`] and never see a concrete backend.

pub mod accounts;
pub mod transfer;
