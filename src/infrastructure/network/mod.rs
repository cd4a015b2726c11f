pub mod http_probe;
pub mod manual_source;

pub use http_probe::HttpProbeConnectivitySource;
pub use manual_source::ManualConnectivitySource;
