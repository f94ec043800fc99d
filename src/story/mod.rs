pub mod api_types;
pub mod client;
pub mod sync;
pub mod types;
