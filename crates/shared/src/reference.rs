//! Payment reference generation
//!
//! The provider accepts references of at most 35 characters drawn from
//! `[A-Za-z0-9-]`. `AF-` plus a 32-character hex UUID lands exactly on the
//! limit and stays unique without a database round trip.

use uuid::Uuid;

/// Generate a fresh payment reference.
pub fn new_payment_reference() -> String {
    format!("AF-{}", Uuid::new_v4().simple()).to_uppercase()
}
