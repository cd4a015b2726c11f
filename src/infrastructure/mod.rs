pub mod cache;
pub mod network;
pub mod remote;
pub mod reporting;
pub mod storage;

pub use reporting::TracingErrorReporter;
