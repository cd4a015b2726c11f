pub mod cache_entry;
pub mod comment;
pub mod fetched;
pub mod pending_operation;
pub mod post;
pub mod sync_report;

pub use cache_entry::CacheEntry;
pub use comment::Comment;
pub use fetched::{DataSource, Fetched};
pub use pending_operation::{PendingOperation, PendingOperationKind, PendingPayload};
pub use post::{Post, PostDraft};
pub use sync_report::SyncReport;
