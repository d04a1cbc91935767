pub mod media;
pub mod routes;
pub mod settings;
pub mod store;
pub mod types;
