pub mod api;
pub mod config;
pub mod loader;
pub mod model;
pub mod normalize;
pub mod query;
pub mod source;
pub mod store;
pub mod tracker;
