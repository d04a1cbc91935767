pub mod account;
pub mod follow;
pub mod ingredient;
pub mod pagination;
pub mod recipe;
pub mod tag;
