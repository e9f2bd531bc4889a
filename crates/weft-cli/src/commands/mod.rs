pub mod follow;
pub mod sessions;
