pub mod ai;
pub mod classifier;
pub mod conversation;
pub mod datetime;
pub mod store;
pub mod title;
