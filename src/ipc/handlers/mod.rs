pub mod analytics;
pub mod attendance;
pub mod auth;
pub mod core;
pub mod dashboard;
pub mod search;
pub mod students;
