use std::net::TcpListener;

use anyhow::Context;

use sqlx::PgPool;

use waitlist::app;
use waitlist::service::WaitlistService;
use waitlist::settings::Settings;
use waitlist::telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = telemetry::create_subscriber("info".into(), std::io::stdout);
    telemetry::set_subscriber(subscriber)?;

    let settings = Settings::load().expect("Failed to load settings");

    // Lazy pool: demo mode must be able to serve without a reachable
    // database, so connections are only opened on first use
    let pool = PgPool::connect_lazy_with(settings.database.with_db());

    let listener = TcpListener::bind(settings.app.addr())?;

    let service = WaitlistService::new(pool.clone(), settings.waitlist.demo_mode());
    service.initialize().await;

    app::run(listener, pool, service)?
        .await
        .context("Failed to run app")
}
