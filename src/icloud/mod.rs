//! CloudKit private database access: wire types, the error domain and the
//! `RecordStore` seam the sync controller talks to.

pub mod cloudkit;
pub mod database;
pub mod error;
#[cfg(test)]
pub mod memory;

pub use cloudkit::Record;
pub use database::{CloudKitDatabase, RecordStore, SavePolicy};
pub use error::{CloudKitError, ErrorCode, ICloudError};
