//! Ledger ingestion — fetches the spreadsheet-backed lead/payment source and
//! normalizes it into typed records, exactly once, at this boundary.

pub mod normalize;
pub mod reader;
pub mod source;

pub use reader::LedgerReader;
pub use source::{FixtureSource, HttpLedgerSource, LedgerSource, RawRow};
