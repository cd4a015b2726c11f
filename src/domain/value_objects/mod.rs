pub mod connectivity_status;
pub mod operation_id;
pub mod page_request;
pub mod post_id;

pub use connectivity_status::ConnectivityStatus;
pub use operation_id::PendingOperationId;
pub use page_request::PageRequest;
pub use post_id::{LocalPostId, PostId};
