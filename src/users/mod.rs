//! Users: model, request/response shapes and the service layer.

mod dto;
mod model;
mod service;

pub use dto::{CreateUserDto, UpdateUserDto, UserResponseDto, ValidationError};
pub use model::{USERS_COLLECTION, User};
pub use service::{ServiceError, UserService};
