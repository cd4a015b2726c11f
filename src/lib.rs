pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod shared;
pub mod state;

pub use application::ports::repositories::{PostRepository, PostSyncEvent};
pub use shared::{AppConfig, AppError, Result};
pub use state::{AppComponents, AppState};

/// ログ設定の初期化。RUST_LOG が無ければ `mini_feed=debug,info`。
pub fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mini_feed=debug,mini_feed_lib=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
