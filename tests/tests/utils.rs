use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use mock_service::MockService;
use std::sync::OnceLock;
use tracing::error;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

struct Env {
    mock: MockService,
    metrics: PrometheusHandle,
}

fn env() -> &'static Env {
    static ENV: OnceLock<Env> = OnceLock::new();

    ENV.get_or_init(|| {
        let default_panic = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            default_panic(info);
            error!("Panic occurred: {info:?}");
        }));

        let _ = FmtSubscriber::builder()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                    EnvFilter::new("stampede=debug,homepage_test=info,mock_service=info")
                }),
            )
            .try_init();

        let metrics = PrometheusBuilder::new()
            .install_recorder()
            .expect("Failed to install Prometheus recorder");

        let mock = mock_service::spawn().expect("Failed to start mock service");

        Env { mock, metrics }
    })
}

/// Shared mock service for this test binary.
#[allow(unused)]
pub fn mock() -> &'static MockService {
    &env().mock
}

#[allow(unused)]
pub fn url(path: &str) -> String {
    mock().url(path)
}

/// Prometheus rendering of everything forwarded to the `metrics` facade so far.
#[allow(unused)]
pub fn rendered_metrics() -> String {
    env().metrics.render()
}
