pub mod connectivity;
pub mod error_reporter;
pub mod key_value_store;
pub mod remote_post_api;
pub mod repositories;
