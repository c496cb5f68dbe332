pub mod comments;
pub mod follows;
pub mod notifications;
pub mod posts;
pub mod shares;
pub mod users;

pub use crate::error::{ServiceError, ServiceResult};

pub trait Svc: Clone + Send + Sync + 'static {}
