pub mod api;
pub mod domain;
pub mod notify;
pub mod ts;
