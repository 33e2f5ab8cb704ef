pub mod admin;
pub mod auth;
pub mod communities;
pub mod error;
pub mod health;
pub mod mailer;
pub mod media;
pub mod middleware;
pub mod notifications;
pub mod notifier;
pub mod pois;
pub mod posts;
pub mod profile;
pub mod reports;
pub mod search;
pub mod state;
pub mod trips;
pub mod upload;
