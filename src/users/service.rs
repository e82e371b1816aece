use bson::{DateTime, Document, doc};
use thiserror::Error;

use super::dto::{CreateUserDto, UpdateUserDto, UserResponseDto, ValidationError};
use super::model::{USERS_COLLECTION, User};
use crate::context::QueryContext;
use crate::error_tracker::{Layer, track, track_with_details};
use crate::errors::{RepositoryError, StoreError};
use crate::filter::FilterBuilder;
use crate::pagination::{PaginateOptions, PaginateResult};
use crate::query::{FindOneAndUpdateOptions, FindOptions, ReturnDocument, SortSpec};
use crate::repository::{BaseRepository, parse_object_id};
use crate::store::MemoryStore;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("email already registered: {0}")]
    EmailTaken(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl ServiceError {
    /// HTTP-style status for the failure.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) | Self::EmailTaken(_) => 400,
            Self::Repository(RepositoryError::NotFound { .. } | RepositoryError::InvalidIdentifier(_)) => 400,
            Self::Repository(RepositoryError::Persistence(_)) => 500,
        }
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Repository(RepositoryError::NotFound { .. }))
    }
}

fn name_search(search: Option<&str>) -> Document {
    let mut fb = FilterBuilder::new();
    if let Some(s) = search.map(str::trim).filter(|s| !s.is_empty()) {
        fb.regex("name", &regex::escape(s));
    }
    fb.build()
}

fn newest_first() -> FindOptions {
    FindOptions::new().sort(SortSpec::desc("created_at"))
}

/// User operations on top of the generic repository.
#[derive(Debug, Clone)]
pub struct UserService {
    repo: BaseRepository,
}

impl UserService {
    #[must_use]
    pub const fn new(repo: BaseRepository) -> Self {
        Self { repo }
    }

    #[must_use]
    pub const fn repository(&self) -> &BaseRepository {
        &self.repo
    }

    /// Creates the unique `email` index.
    ///
    /// # Errors
    /// When stored users already share an email.
    pub fn ensure_indexes(store: &MemoryStore) -> Result<(), StoreError> {
        store.create_unique_index(USERS_COLLECTION, "email")
    }

    /// Users whose name contains `search` (case-insensitive), newest first.
    ///
    /// # Errors
    /// Store failures.
    pub fn list(&self, ctx: &QueryContext, search: Option<&str>) -> Result<Vec<UserResponseDto>, ServiceError> {
        let users = self
            .repo
            .find::<User>(ctx, name_search(search), &newest_first())
            .inspect_err(|e| {
                track(Layer::Service, "list users", e);
            })?;
        Ok(users.iter().map(UserResponseDto::from).collect())
    }

    /// # Errors
    /// `Validation` for a bad body, `EmailTaken` when the email is in use.
    pub fn create(&self, ctx: &QueryContext, mut dto: CreateUserDto) -> Result<UserResponseDto, ServiceError> {
        dto.validate().inspect_err(|e| {
            track(Layer::Dto, "create user body", e);
        })?;
        if self.repo.count_documents::<User>(ctx, doc! { "email": dto.email.as_str() })? > 0 {
            return Err(ServiceError::EmailTaken(dto.email));
        }
        let email = dto.email.clone();
        let mut user = User::from(dto);
        match self.repo.save(ctx, &mut user) {
            Ok(()) => {
                log::info!("created user {}", user.id.map(|id| id.to_hex()).unwrap_or_default());
                Ok(UserResponseDto::from(&user))
            }
            // lost a race with a concurrent create
            Err(RepositoryError::Persistence(StoreError::DuplicateKey { .. })) => {
                Err(ServiceError::EmailTaken(email))
            }
            Err(e) => {
                track_with_details(Layer::Service, "create user", &e, &[("email", &email)]);
                Err(e.into())
            }
        }
    }

    /// # Errors
    /// `InvalidIdentifier` or `NotFound` wrapped in `Repository`.
    pub fn find_by_id(&self, ctx: &QueryContext, id: &str) -> Result<UserResponseDto, ServiceError> {
        let user = self.repo.find_by_id::<User>(ctx, id)?;
        Ok(UserResponseDto::from(user))
    }

    /// # Errors
    /// `NotFound` wrapped in `Repository` when no user has the email.
    pub fn find_by_email(&self, ctx: &QueryContext, email: &str) -> Result<UserResponseDto, ServiceError> {
        let email = email.trim().to_lowercase();
        let user = self.repo.find_one::<User>(ctx, FilterBuilder::new().eq("email", email).build(), None)?;
        Ok(UserResponseDto::from(user))
    }

    /// Applies the present fields and refreshes `updated_at`; returns the updated user.
    ///
    /// # Errors
    /// `Validation`, `EmailTaken`, or `InvalidIdentifier`/`NotFound` wrapped in `Repository`.
    pub fn update(
        &self,
        ctx: &QueryContext,
        id: &str,
        mut dto: UpdateUserDto,
    ) -> Result<UserResponseDto, ServiceError> {
        let oid = parse_object_id(id)?;
        dto.validate()?;
        if let Some(email) = &dto.email {
            let taken = doc! { "email": email.as_str(), "_id": { "$ne": oid } };
            if self.repo.count_documents::<User>(ctx, taken)? > 0 {
                return Err(ServiceError::EmailTaken(email.clone()));
            }
        }
        let opts = FindOneAndUpdateOptions { return_document: ReturnDocument::After, ..Default::default() };
        let user = self
            .repo
            .find_one_and_update::<User>(ctx, doc! { "_id": oid }, dto.to_update(DateTime::now()), &opts)
            .inspect_err(|e| {
                if e.is_persistence() {
                    track_with_details(Layer::Service, "update user", e, &[("id", &id)]);
                }
            })?;
        Ok(UserResponseDto::from(user))
    }

    /// # Errors
    /// `InvalidIdentifier`, or `NotFound` when nothing was deleted.
    pub fn delete(&self, ctx: &QueryContext, id: &str) -> Result<(), ServiceError> {
        let oid = parse_object_id(id)?;
        let res = self.repo.delete_one::<User>(ctx, doc! { "_id": oid })?;
        if res.deleted_count == 0 {
            return Err(RepositoryError::not_found(USERS_COLLECTION).into());
        }
        log::info!("deleted user {id}");
        Ok(())
    }

    /// # Errors
    /// Store failures.
    pub fn count(&self, ctx: &QueryContext, filter: Document) -> Result<u64, ServiceError> {
        Ok(self.repo.count_documents::<User>(ctx, filter)?)
    }

    /// One page of users matching `search`, in insertion order.
    ///
    /// # Errors
    /// Store failures.
    pub fn list_paginated(
        &self,
        ctx: &QueryContext,
        search: Option<&str>,
        page: i64,
        limit: i64,
    ) -> Result<PaginateResult<UserResponseDto>, ServiceError> {
        let page = self
            .repo
            .find_with_pagination::<User>(ctx, name_search(search), PaginateOptions::new(page, limit))?;
        Ok(page.map(UserResponseDto::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::memory_repo;

    fn service() -> UserService {
        let (store, repo) = memory_repo("test");
        UserService::ensure_indexes(&store).unwrap();
        UserService::new(repo)
    }

    #[test]
    fn create_then_lookup() {
        let svc = service();
        let ctx = QueryContext::background();
        let created = svc.create(&ctx, CreateUserDto::new("Aman", "Aman@x.io")).unwrap();
        assert_eq!(created.email, "aman@x.io");
        assert_eq!(svc.find_by_id(&ctx, &created.id).unwrap(), created);
        assert_eq!(svc.find_by_email(&ctx, " AMAN@x.io").unwrap().id, created.id);
    }

    #[test]
    fn duplicate_email_is_rejected() {
        let svc = service();
        let ctx = QueryContext::background();
        svc.create(&ctx, CreateUserDto::new("a", "a@x.io")).unwrap();
        let err = svc.create(&ctx, CreateUserDto::new("b", "A@x.io")).unwrap_err();
        assert!(matches!(err, ServiceError::EmailTaken(ref e) if e == "a@x.io"));
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn search_escapes_regex_metacharacters() {
        let svc = service();
        let ctx = QueryContext::background();
        svc.create(&ctx, CreateUserDto::new("a.b", "1@x.io")).unwrap();
        svc.create(&ctx, CreateUserDto::new("axb", "2@x.io")).unwrap();
        let hits = svc.list(&ctx, Some("A.B")).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "a.b");
        assert_eq!(svc.list(&ctx, None).unwrap().len(), 2);
    }

    #[test]
    fn update_and_delete() {
        let svc = service();
        let ctx = QueryContext::background();
        let u = svc.create(&ctx, CreateUserDto::new("a", "a@x.io")).unwrap();
        let upd = UpdateUserDto { name: Some("Zed".into()), email: None };
        let after = svc.update(&ctx, &u.id, upd).unwrap();
        assert_eq!(after.name, "Zed");
        assert_eq!(after.created_at, u.created_at);

        svc.delete(&ctx, &u.id).unwrap();
        let err = svc.delete(&ctx, &u.id).unwrap_err();
        assert!(err.is_not_found());
        let bad = svc.find_by_id(&ctx, "nope").unwrap_err();
        assert!(matches!(bad, ServiceError::Repository(RepositoryError::InvalidIdentifier(_))));
    }

    #[test]
    fn paginated_listing() {
        let svc = service();
        let ctx = QueryContext::background();
        for i in 0..5 {
            svc.create(&ctx, CreateUserDto::new(&format!("user{i}"), &format!("u{i}@x.io"))).unwrap();
        }
        let page = svc.list_paginated(&ctx, Some("user"), 2, 2).unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.data.len(), 2);
        assert_eq!(page.total_page, 3);
        assert_eq!(page.next_page, 3);
        assert_eq!(svc.count(&ctx, doc! {}).unwrap(), 5);
    }
}
