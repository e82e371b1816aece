/// A front-end command. Collections other than `users` are reachable only
/// through [`Command::Collections`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    UsersList { search: Option<String>, page: Option<i64>, limit: Option<i64> },
    UsersCreate { name: String, email: String },
    UsersGet { id: String },
    UsersFindByEmail { email: String },
    UsersUpdate { id: String, name: Option<String>, email: Option<String> },
    UsersDelete { id: String },
    /// `filter_json` defaults to every user.
    UsersCount { filter_json: Option<String> },
    /// Runs a pipeline over `users`; with a page or limit the result is paginated.
    Aggregate { pipeline_json: String, page: Option<i64>, limit: Option<i64> },
    Seed { count: usize },
    Collections,
}

impl Command {
    /// Whether the command can change stored data.
    #[must_use]
    pub const fn is_write(&self) -> bool {
        matches!(
            self,
            Self::UsersCreate { .. } | Self::UsersUpdate { .. } | Self::UsersDelete { .. } | Self::Seed { .. }
        )
    }
}
