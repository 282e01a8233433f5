pub mod customerdb;
pub mod db;
pub mod eventdb;
pub mod memory;
pub mod referraldb;

use thiserror::Error;

pub use customerdb::CustomerExt;
pub use db::DBClient;
pub use eventdb::EventLogExt;
pub use memory::MemoryStore;
pub use referraldb::ReferralExt;

pub const CUSTOMER_EXTERNAL_ID_KEY: &str = "customers_external_id_key";
pub const CUSTOMER_SLUG_KEY: &str = "customers_slug_key";
pub const CUSTOMER_PHONE_KEY: &str = "customers_phone_key";
pub const REFERRAL_REFERRER_PHONE_KEY: &str = "referrals_referrer_phone_key";

#[derive(Error, Debug)]
pub enum StoreError {
    /// A unique constraint rejected the write; carries the constraint name.
    #[error("Unique constraint violated: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),
}

impl StoreError {
    pub fn is_conflict_on(&self, constraint: &str) -> bool {
        matches!(self, StoreError::Conflict(name) if name == constraint)
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                let constraint = db_err.constraint().unwrap_or("unique").to_string();
                return StoreError::Conflict(constraint);
            }
        }
        StoreError::Database(err)
    }
}

/// Everything the engine needs from persistence.
pub trait ReferralStore: CustomerExt + ReferralExt + EventLogExt + Send + Sync {}

impl<T> ReferralStore for T where T: CustomerExt + ReferralExt + EventLogExt + Send + Sync {}
