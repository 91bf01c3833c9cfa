use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::db::models::*;
use crate::db::{BusinessStore, Tx};
use crate::error::{AppError, AppResult, FieldErrors};
use crate::query::{OrderBy, Page};
use crate::services::auth::Claims;
use crate::services::map_not_found;

pub const MAX_NAME_LENGTH: usize = 200;

pub struct BusinessService {
    store: Arc<dyn BusinessStore>,
}

fn check_name(name: &str, errors: &mut FieldErrors) {
    let name = name.trim();
    if name.is_empty() {
        errors.insert("name", "must not be empty".to_string());
    } else if name.chars().count() > MAX_NAME_LENGTH {
        errors.insert("name", format!("must be at most {MAX_NAME_LENGTH} characters"));
    }
}

fn ensure_owner(claims: &Claims, business: &Business) -> AppResult<()> {
    if business.owner_id == claims.sub {
        Ok(())
    } else {
        tracing::debug!(
            "Subject {} is not the owner of business {}",
            claims.sub,
            business.id
        );
        Err(AppError::PermissionDenied)
    }
}

impl BusinessService {
    pub fn new(store: Arc<dyn BusinessStore>) -> Self {
        BusinessService { store }
    }

    pub fn with_transaction(&self, tx: &Tx) -> BusinessService {
        BusinessService {
            store: self.store.with_transaction(tx),
        }
    }

    /// The caller becomes the owner.
    pub async fn create(
        &self,
        claims: &Claims,
        new: NewBusiness,
        now: DateTime<Utc>,
    ) -> AppResult<Business> {
        let mut errors = FieldErrors::new();
        check_name(&new.name, &mut errors);
        if !errors.is_empty() {
            return Err(AppError::Validation(errors));
        }

        let business = Business {
            id: Uuid::new_v4(),
            owner_id: claims.sub,
            name: new.name.trim().to_string(),
            description: new.description,
            date_created: now,
            date_updated: now,
        };
        self.store.create(&business).await?;

        tracing::info!("Created business {} for {}", business.id, business.owner_id);
        Ok(business)
    }

    pub async fn update(
        &self,
        claims: &Claims,
        existing: Business,
        patch: UpdateBusiness,
        now: DateTime<Utc>,
    ) -> AppResult<Business> {
        ensure_owner(claims, &existing)?;

        if let Some(name) = &patch.name {
            let mut errors = FieldErrors::new();
            check_name(name, &mut errors);
            if !errors.is_empty() {
                return Err(AppError::Validation(errors));
            }
        }

        let business = Business {
            name: patch
                .name
                .map(|name| name.trim().to_string())
                .unwrap_or(existing.name),
            description: patch.description.unwrap_or(existing.description),
            date_updated: now,
            ..existing
        };
        self.store
            .update(&business)
            .await
            .map_err(|e| map_not_found(e, AppError::BusinessNotFound))?;
        Ok(business)
    }

    pub async fn delete(&self, claims: &Claims, existing: &Business) -> AppResult<()> {
        ensure_owner(claims, existing)?;
        self.store
            .delete(existing.id)
            .await
            .map_err(|e| map_not_found(e, AppError::BusinessNotFound))?;
        tracing::info!("Deleted business {}", existing.id);
        Ok(())
    }

    pub async fn query(
        &self,
        filter: &BusinessFilter,
        order: OrderBy,
        page: Page,
    ) -> AppResult<Vec<Business>> {
        Ok(self.store.query(filter, order, page).await?)
    }

    pub async fn count(&self, filter: &BusinessFilter) -> AppResult<i64> {
        Ok(self.store.count(filter).await?)
    }

    pub async fn query_by_id(&self, id: Uuid) -> AppResult<Business> {
        self.store
            .query_by_id(id)
            .await
            .map_err(|e| map_not_found(e, AppError::BusinessNotFound))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::testing::seed_user;
    use crate::db::repository::BusinessRepository;
    use crate::db::testing::memory_pool;
    use crate::query::Direction;

    fn claims(sub: Uuid) -> Claims {
        Claims {
            sub,
            roles: vec![Role::User],
            iss: "test".to_string(),
            iat: 0,
            exp: 0,
        }
    }

    #[tokio::test]
    async fn owners_manage_their_businesses() {
        let pool = memory_pool().await;
        let owner = seed_user(&pool, "owner@example.com", "+14155550100").await;
        let other = seed_user(&pool, "other@example.com", "+14155550101").await;
        let businesses = BusinessService::new(Arc::new(BusinessRepository::new(pool)));

        let created = businesses
            .create(
                &claims(owner.id),
                NewBusiness {
                    name: "  Barber Shop ".to_string(),
                    description: "Cuts".to_string(),
                },
                Utc::now(),
            )
            .await
            .unwrap();
        assert_eq!(created.name, "Barber Shop");
        assert_eq!(created.owner_id, owner.id);

        let rename = UpdateBusiness {
            name: Some("Salon".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            businesses
                .update(&claims(other.id), created.clone(), rename.clone(), Utc::now())
                .await,
            Err(AppError::PermissionDenied)
        ));
        let renamed = businesses
            .update(&claims(owner.id), created.clone(), rename, Utc::now())
            .await
            .unwrap();
        assert_eq!(renamed.name, "Salon");
        assert_eq!(renamed.description, "Cuts");

        let filter = BusinessFilter {
            owner_id: Some(owner.id),
            ..Default::default()
        };
        assert_eq!(businesses.count(&filter).await.unwrap(), 1);
        let listed = businesses
            .query(&filter, OrderBy::new("name", Direction::Asc), Page::first(10))
            .await
            .unwrap();
        assert_eq!(listed, vec![renamed.clone()]);

        assert!(matches!(
            businesses
                .create(
                    &claims(owner.id),
                    NewBusiness {
                        name: " ".to_string(),
                        description: String::new(),
                    },
                    Utc::now(),
                )
                .await,
            Err(AppError::Validation(_))
        ));

        assert!(businesses.delete(&claims(other.id), &renamed).await.is_err());
        businesses.delete(&claims(owner.id), &renamed).await.unwrap();
        assert!(matches!(
            businesses.query_by_id(renamed.id).await,
            Err(AppError::BusinessNotFound)
        ));
    }
}
