//! CSV batch interface: reads operations, writes balance and ledger reports.

pub mod operation_reader;
pub mod report_writer;
