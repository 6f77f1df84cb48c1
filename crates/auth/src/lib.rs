//! `housebank-auth`: principal identity records (users, sessions).
//!
//! This crate is intentionally decoupled from HTTP, token signing and storage.

pub mod session;
pub mod task;
pub mod user;

pub use session::{CreateSessionParams, Session};
pub use task::SendVerifyEmail;
pub use user::{ChangePasswordParams, CreateUserParams, UpdateUserParams, User};
