pub mod auth;
pub mod documents;
pub mod watch;
