pub mod comment;
pub mod follow;
pub mod notification;
pub mod post;
pub mod save;
pub mod share;
pub mod user;
