use bson::Document;
use fake::Fake;
use fake::faker::internet::en::SafeEmail;
use fake::faker::name::en::Name;
use serde::Serialize;
use serde_json::json;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use super::command::Command;
use crate::errors::StoreError;
use crate::pagination::{DEFAULT_LIMIT, DEFAULT_PAGE, PaginateOptions};
use crate::query::{json_to_document, json_to_pipeline};
use crate::repository::BaseRepository;
use crate::response::Responses;
use crate::store::{DocumentStore, MemoryStore};
use crate::users::{CreateUserDto, ServiceError, UpdateUserDto, User, UserService};

type BoxError = Box<dyn std::error::Error>;

/// Everything a command needs: the store, the users service and localized responses.
#[derive(Debug)]
pub struct App {
    store: Arc<MemoryStore>,
    users: UserService,
    responses: Responses,
}

impl App {
    /// Wires the service over `store` and creates the user indexes.
    ///
    /// # Errors
    /// When stored users already violate the unique email index.
    pub fn new(store: Arc<MemoryStore>, responses: Responses, timeout: Option<Duration>) -> Result<Self, StoreError> {
        UserService::ensure_indexes(&store)?;
        let backend: Arc<dyn DocumentStore> = store.clone();
        let mut repo = BaseRepository::new(backend);
        if let Some(t) = timeout {
            repo = repo.with_default_timeout(t);
        }
        Ok(Self { store, users: UserService::new(repo), responses })
    }

    #[must_use]
    pub const fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    #[must_use]
    pub const fn users(&self) -> &UserService {
        &self.users
    }
}

/// Result of one command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub status_code: u16,
    /// A write command that succeeded; the caller should persist the store.
    pub wrote: bool,
}

fn write_json<T: Serialize>(out: &mut dyn Write, body: &T) -> Result<u16, BoxError> {
    let value = serde_json::to_value(body)?;
    serde_json::to_writer_pretty(&mut *out, &value)?;
    writeln!(out)?;
    let status = value.get("statusCode").and_then(serde_json::Value::as_u64).and_then(|c| u16::try_from(c).ok());
    Ok(status.unwrap_or(200))
}

fn respond<T: Serialize>(
    out: &mut dyn Write,
    responses: &Responses,
    res: Result<T, ServiceError>,
) -> Result<u16, BoxError> {
    match res {
        Ok(body) => write_json(out, &body),
        Err(e) => {
            log::debug!("command failed: {e}");
            write_json(out, &responses.from_error(&e))
        }
    }
}

fn parse_input<T>(out: &mut dyn Write, responses: &Responses, res: Result<T, StoreError>) -> Result<Option<T>, BoxError> {
    match res {
        Ok(v) => Ok(Some(v)),
        Err(e) => {
            write_json(out, &responses.error(&e.to_string(), None))?;
            Ok(None)
        }
    }
}

/// Executes `cmd` and writes its JSON envelope to `out`.
///
/// Service failures become error envelopes with a 4xx/5xx status; only
/// output failures are returned as `Err`.
///
/// # Errors
/// When writing to `out` fails.
pub fn run(app: &App, cmd: Command, out: &mut dyn Write) -> Result<Outcome, BoxError> {
    let ctx = app.users.repository().context();
    let r = &app.responses;
    let is_write = cmd.is_write();
    let status_code = match cmd {
        Command::UsersList { search, page: None, limit: None } => {
            respond(out, r, app.users.list(&ctx, search.as_deref()).map(|v| r.list(v)))?
        }
        Command::UsersList { search, page, limit } => {
            let res = app.users.list_paginated(
                &ctx,
                search.as_deref(),
                page.unwrap_or(DEFAULT_PAGE),
                limit.unwrap_or(DEFAULT_LIMIT),
            );
            respond(out, r, res.map(|p| r.list_paginated(p)))?
        }
        Command::UsersCreate { name, email } => {
            let res = app.users.create(&ctx, CreateUserDto { name, email });
            respond(out, r, res.map(|u| r.signup(u)))?
        }
        Command::UsersGet { id } => respond(out, r, app.users.find_by_id(&ctx, &id).map(|u| r.profile(u)))?,
        Command::UsersFindByEmail { email } => {
            respond(out, r, app.users.find_by_email(&ctx, &email).map(|u| r.profile(u)))?
        }
        Command::UsersUpdate { id, name, email } => {
            let res = app.users.update(&ctx, &id, UpdateUserDto { name, email });
            respond(out, r, res.map(|u| r.details(u)))?
        }
        Command::UsersDelete { id } => respond(out, r, app.users.delete(&ctx, &id).map(|()| r.default_ok()))?,
        Command::UsersCount { filter_json } => {
            let filter = match filter_json {
                Some(raw) => parse_input(out, r, json_to_document(&raw))?,
                None => Some(Document::new()),
            };
            match filter {
                Some(f) => respond(out, r, app.users.count(&ctx, f).map(|n| r.details(json!({ "count": n }))))?,
                None => 400,
            }
        }
        Command::Aggregate { pipeline_json, page, limit } => match parse_input(out, r, json_to_pipeline(&pipeline_json))? {
            None => 400,
            Some(pipeline) => {
                let repo = app.users.repository();
                if page.is_some() || limit.is_some() {
                    let opts = PaginateOptions::new(page.unwrap_or(DEFAULT_PAGE), limit.unwrap_or(DEFAULT_LIMIT));
                    let res = repo.paginate::<User>(&ctx, &pipeline, opts).map_err(ServiceError::from);
                    respond(out, r, res.map(|p| r.details(p)))?
                } else {
                    let res = repo.aggregate::<User>(&ctx, &pipeline).map_err(ServiceError::from);
                    respond(out, r, res.map(|docs| r.list(docs)))?
                }
            }
        },
        Command::Seed { count } => {
            let (created, skipped) = seed(&app.users, &ctx, count);
            write_json(out, &r.details(json!({ "created": created, "skipped": skipped })))?
        }
        Command::Collections => write_json(out, &r.list(app.store.list_collection_names()))?,
    };
    Ok(Outcome { status_code, wrote: is_write && status_code < 400 })
}

/// Inserts `count` generated users; generated emails that collide are skipped.
fn seed(users: &UserService, ctx: &crate::context::QueryContext, count: usize) -> (usize, usize) {
    let mut created = 0usize;
    let mut skipped = 0usize;
    for _ in 0..count {
        let dto = CreateUserDto { name: Name().fake(), email: SafeEmail().fake() };
        match users.create(ctx, dto) {
            Ok(_) => created += 1,
            Err(ServiceError::EmailTaken(email)) => {
                log::debug!("seed skipped duplicate {email}");
                skipped += 1;
            }
            Err(e) => {
                log::warn!("seed stopped: {e}");
                break;
            }
        }
    }
    log::info!("seeded {created} users");
    (created, skipped)
}
