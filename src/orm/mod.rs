pub mod post_comments;
pub mod post_likes;
pub mod posts;
pub mod sessions;
pub mod user_follows;
pub mod users;
