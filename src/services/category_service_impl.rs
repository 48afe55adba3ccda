//! `SeaORM` implementation of the `CategoryService` trait.

use async_trait::async_trait;
use tracing::info;

use crate::db::Store;
use crate::domain::{Action, Actor, AuditAction, Resource, TargetType, validation};
use crate::services::audit::AuditRecorder;
use crate::services::category_service::{
    Category, CategoryError, CategoryInput, CategoryPatch, CategoryService,
};
use crate::services::policy;

pub struct SeaOrmCategoryService {
    store: Store,
    audit: AuditRecorder,
}

impl SeaOrmCategoryService {
    #[must_use]
    pub const fn new(store: Store, audit: AuditRecorder) -> Self {
        Self { store, audit }
    }

    fn require(actor: &Actor, action: Action) -> Result<(), CategoryError> {
        if policy::authorize(actor, action, Resource::Category) {
            Ok(())
        } else {
            Err(CategoryError::Forbidden)
        }
    }

    async fn ensure_name_free(&self, name: &str, exclude: Option<i32>) -> Result<(), CategoryError> {
        if self
            .store
            .category_repo()
            .find_by_name(name, exclude)
            .await?
            .is_some()
        {
            return Err(CategoryError::Validation(
                "A category with this name already exists".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl CategoryService for SeaOrmCategoryService {
    async fn list(&self) -> Result<Vec<Category>, CategoryError> {
        let categories = self.store.category_repo().list().await?;
        Ok(categories.into_iter().map(Category::from).collect())
    }

    async fn get(&self, id: i32) -> Result<Category, CategoryError> {
        self.store
            .category_repo()
            .get_by_id(id)
            .await?
            .map(Category::from)
            .ok_or(CategoryError::NotFound(id))
    }

    async fn create(
        &self,
        actor: &Actor,
        input: CategoryInput,
    ) -> Result<Category, CategoryError> {
        Self::require(actor, Action::Create)?;

        let name = validation::validate_category_name(&input.name)?;
        let description = validation::validate_category_description(input.description.as_deref())?;
        self.ensure_name_free(&name, None).await?;

        let category = self.store.category_repo().create(name, description).await?;

        info!(user_id = actor.id, category_id = category.id, "Category created");
        self.audit
            .record(
                AuditAction::Create,
                TargetType::Category,
                Some(category.id),
                Some(actor.id),
            )
            .await;

        Ok(Category::from(category))
    }

    async fn update(
        &self,
        actor: &Actor,
        id: i32,
        patch: CategoryPatch,
    ) -> Result<Category, CategoryError> {
        Self::require(actor, Action::Update)?;

        let existing = self
            .store
            .category_repo()
            .get_by_id(id)
            .await?
            .ok_or(CategoryError::NotFound(id))?;

        let name = match patch.name.as_deref() {
            Some(raw) => {
                let name = validation::validate_category_name(raw)?;
                self.ensure_name_free(&name, Some(id)).await?;
                Some(name)
            }
            None => None,
        };

        let description = match patch.description.as_deref() {
            Some(raw) => Some(validation::validate_category_description(Some(raw))?),
            None => None,
        };

        let category = self
            .store
            .category_repo()
            .update(existing, name, description)
            .await?;

        info!(user_id = actor.id, category_id = id, "Category updated");
        self.audit
            .record(
                AuditAction::Update,
                TargetType::Category,
                Some(id),
                Some(actor.id),
            )
            .await;

        Ok(Category::from(category))
    }

    async fn delete(&self, actor: &Actor, id: i32) -> Result<(), CategoryError> {
        Self::require(actor, Action::Delete)?;

        let repo = self.store.category_repo();
        if repo.get_by_id(id).await?.is_none() {
            return Err(CategoryError::NotFound(id));
        }

        if repo.count_incidents(id).await? > 0 {
            return Err(CategoryError::Validation(
                "Cannot delete a category that is currently in use by incidents".to_string(),
            ));
        }

        if !repo.delete(id).await? {
            return Err(CategoryError::NotFound(id));
        }

        info!(user_id = actor.id, category_id = id, "Category deleted");
        // The id is recorded even though the row is gone
        self.audit
            .record(
                AuditAction::Delete,
                TargetType::Category,
                Some(id),
                Some(actor.id),
            )
            .await;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Role;

    const ADMIN: Actor = Actor::new(1, Role::Admin);
    const REGULAR: Actor = Actor::new(2, Role::Regular);

    async fn service() -> (SeaOrmCategoryService, Store, std::path::PathBuf) {
        let path =
            std::env::temp_dir().join(format!("incidentry-category-{}.db", uuid::Uuid::new_v4()));
        let store = Store::new(&format!("sqlite:{}", path.display()))
            .await
            .unwrap();
        let service = SeaOrmCategoryService::new(store.clone(), AuditRecorder::new(store.clone()));
        (service, store, path)
    }

    fn input(name: &str) -> CategoryInput {
        CategoryInput {
            name: name.to_string(),
            description: Some("Things that break".to_string()),
        }
    }

    #[tokio::test]
    async fn test_create_is_audited_and_unique() {
        let (service, store, path) = service().await;

        let created = service.create(&ADMIN, input(" Network ")).await.unwrap();
        assert_eq!(created.name, "Network");

        let entries = store.recent_audit_entries(10).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, "create");
        assert_eq!(entries[0].target_type, "Category");
        assert_eq!(entries[0].target_id, Some(created.id));
        assert_eq!(entries[0].user_id, Some(ADMIN.id));

        let dup = service.create(&ADMIN, input("network")).await;
        assert!(matches!(dup, Err(CategoryError::Validation(_))));
        assert_eq!(store.audit_repo().count().await.unwrap(), 1);
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn test_regular_user_cannot_mutate() {
        let (service, store, path) = service().await;
        let created = service.create(&ADMIN, input("Hardware")).await.unwrap();

        assert!(matches!(
            service.create(&REGULAR, input("Software")).await,
            Err(CategoryError::Forbidden)
        ));
        assert!(matches!(
            service
                .update(&REGULAR, created.id, CategoryPatch::default())
                .await,
            Err(CategoryError::Forbidden)
        ));
        assert!(matches!(
            service.delete(&REGULAR, created.id).await,
            Err(CategoryError::Forbidden)
        ));

        assert_eq!(store.category_repo().count().await.unwrap(), 1);
        assert_eq!(store.audit_repo().count().await.unwrap(), 1);
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let (service, store, path) = service().await;
        let a = service.create(&ADMIN, input("Alpha")).await.unwrap();
        service.create(&ADMIN, input("Beta")).await.unwrap();

        let renamed_to_taken = service
            .update(
                &ADMIN,
                a.id,
                CategoryPatch {
                    name: Some("beta".to_string()),
                    description: None,
                },
            )
            .await;
        assert!(matches!(renamed_to_taken, Err(CategoryError::Validation(_))));

        let updated = service
            .update(
                &ADMIN,
                a.id,
                CategoryPatch {
                    name: Some("Alpha".to_string()),
                    description: Some(String::new()),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.description, None);

        service.delete(&ADMIN, a.id).await.unwrap();
        assert!(matches!(
            service.get(a.id).await,
            Err(CategoryError::NotFound(_))
        ));
        assert!(matches!(
            service.delete(&ADMIN, a.id).await,
            Err(CategoryError::NotFound(_))
        ));

        let entries = store.recent_audit_entries(10).await.unwrap();
        assert_eq!(entries[0].action, "delete");
        assert_eq!(entries[0].target_id, Some(a.id));
        let _ = std::fs::remove_file(path);
    }
}
