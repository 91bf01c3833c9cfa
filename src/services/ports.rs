//! Narrow views of users and businesses consumed by the agenda and
//! appointment engines. Only existence, the enabled flag, roles and ownership
//! are visible through them.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::db::models::Role;
use crate::db::{BusinessStore, StoreResult, Tx, UserStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSummary {
    pub id: Uuid,
    pub enabled: bool,
    pub roles: Vec<Role>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusinessSummary {
    pub id: Uuid,
    pub owner_id: Uuid,
}

#[async_trait]
pub trait UserPort: Send + Sync {
    fn with_transaction(&self, tx: &Tx) -> Arc<dyn UserPort>;
    async fn query_by_id(&self, id: Uuid) -> StoreResult<UserSummary>;
}

#[async_trait]
pub trait BusinessPort: Send + Sync {
    fn with_transaction(&self, tx: &Tx) -> Arc<dyn BusinessPort>;
    async fn query_by_id(&self, id: Uuid) -> StoreResult<BusinessSummary>;
}

/// [`UserPort`] backed by the user store.
pub struct UserDirectory(pub Arc<dyn UserStore>);

#[async_trait]
impl UserPort for UserDirectory {
    fn with_transaction(&self, tx: &Tx) -> Arc<dyn UserPort> {
        Arc::new(UserDirectory(self.0.with_transaction(tx)))
    }

    async fn query_by_id(&self, id: Uuid) -> StoreResult<UserSummary> {
        let user = self.0.query_by_id(id).await?;
        Ok(UserSummary {
            id: user.id,
            enabled: user.enabled,
            roles: user.roles,
        })
    }
}

/// [`BusinessPort`] backed by the business store.
pub struct BusinessDirectory(pub Arc<dyn BusinessStore>);

#[async_trait]
impl BusinessPort for BusinessDirectory {
    fn with_transaction(&self, tx: &Tx) -> Arc<dyn BusinessPort> {
        Arc::new(BusinessDirectory(self.0.with_transaction(tx)))
    }

    async fn query_by_id(&self, id: Uuid) -> StoreResult<BusinessSummary> {
        let business = self.0.query_by_id(id).await?;
        Ok(BusinessSummary {
            id: business.id,
            owner_id: business.owner_id,
        })
    }
}
