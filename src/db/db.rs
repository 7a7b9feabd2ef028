// db/db.rs
use sqlx::{Pool, Postgres};

use super::{badgedb::BadgeExt, labourdb::LabourExt, verificationdb::VerificationExt};

/// Everything the services need from persistence.
pub trait Store: LabourExt + VerificationExt + BadgeExt + std::fmt::Debug {}

impl<T> Store for T where T: LabourExt + VerificationExt + BadgeExt + std::fmt::Debug {}

#[derive(Clone)]
pub struct DBClient {
    pub pool: Pool<Postgres>,
}

impl std::fmt::Debug for DBClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DBClient")
            .field("pool", &"Pool<Postgres>")
            .field("size", &self.pool.size())
            .finish()
    }
}

impl DBClient {
    pub fn new(pool: Pool<Postgres>) -> Self {
        DBClient { pool }
    }
}
