//! User collection: models and the store adapter.

mod models;
mod store;

pub use models::{NewUser, ProviderDefaults, Role, User, UserInfo};
pub use store::{SqliteUserStore, UserStore, normalize_email};
