mod admins;
mod communities;
mod pois;
mod posts;
mod reports;
mod tokens;
mod trips;
mod users;

pub use pois::PoiLikeOutcome;
pub use posts::{CommentOutcome, LikeOutcome};
pub use users::ProfileUpdate;
