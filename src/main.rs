use corona_dashboard::orm::{Db, auto_migrate};
use corona_dashboard::router::AppState;
use corona_dashboard::settings::Settings;
use corona_dashboard::template::set_display_logs;
use corona_dashboard::views::app_router;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// `RUST_LOG` wins; otherwise debug mode logs SQL and template activity.
fn init_logging(settings: &Settings) {
    let default_level = if settings.debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let settings = Settings::default();
    init_logging(&settings);
    set_display_logs(settings.template.debug);

    let db = Arc::new(Db::connect(&settings.database_url).await?);
    auto_migrate(db.clone()).await?;

    let router = app_router(AppState {
        db,
        settings: settings.clone(),
    });
    router.run(settings).await
}
