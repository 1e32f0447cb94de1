mod config;

use std::time::Duration;

use msg_gateway::{Broker, Gateway, MemoryBroker, StreamSpec, SubjectRoutes};
use msg_gateway_nats::NatsBroker;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let test_mode = std::env::var("TEST_MODE").map(|v| v == "1" || v == "true").unwrap_or(false);

    let config = if test_mode {
        tracing::info!("🧪 Running in TEST MODE - in-memory broker, no NATS required");
        AppConfig::test_config()
    } else {
        AppConfig::load()?
    };

    tracing::info!(
        instance_id = %config.server.instance_id,
        urls = ?config.nats.urls,
        stream = %config.stream.name,
        test_mode = test_mode,
        "Gateway starting"
    );

    if test_mode {
        run_gateway(MemoryBroker::new(), &config).await
    } else {
        let broker = NatsBroker::connect(&config.nats.urls).await?;
        run_gateway(broker, &config).await
    }
}

async fn run_gateway<B: Broker>(broker: B, config: &AppConfig) -> anyhow::Result<()> {
    let mut stream = StreamSpec::new(&config.stream.name, config.stream.subjects.clone());
    if let Some(max) = config.stream.max_messages {
        stream = stream.with_max_messages(max);
    }

    let routes = SubjectRoutes::new(
        &config.subjects.stream_publish,
        &config.subjects.publish,
        &config.subjects.request,
    )
    .with_responder(&config.subjects.responder_pattern)
    .with_watch(&config.subjects.watch);

    Gateway::builder()
        .port(config.server.port)
        .broker(broker)
        .stream(stream)
        .routes(routes)
        .request_timeout(Duration::from_millis(config.nats.request_timeout_ms))
        .build()?
        .run()
        .await
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gateway=info,msg_gateway=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}
