pub mod fake_remote;
pub mod recording_reporter;

pub use fake_remote::*;
pub use recording_reporter::*;
