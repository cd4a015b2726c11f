pub mod dto;
pub mod error;
pub mod http_post_api;

pub use error::HttpApiError;
pub use http_post_api::HttpPostApi;
