//! Fakes and helpers shared by the agent's integration tests.

pub mod builders;
pub mod fake_backend;
pub mod fake_transport;

use std::future::Future;
use std::sync::Once;
use std::time::Duration;

use tracing_subscriber::{EnvFilter, fmt};

pub use builders::{TaskCommandBuilder, telemetry_sample};
pub use fake_backend::RecordingBackend;
pub use fake_transport::FakeTransport;

static TRACING: Once = Once::new();

/// Route agent logs into the test harness.
///
/// Output is captured per test and only shown for failures (or with
/// `--nocapture`). `RUST_LOG` overrides the default of debug-level agent logs.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("warn,fleet_agent=debug"));
        fmt().with_env_filter(filter).with_test_writer().init();
    });
}

/// Await `fut`, failing the test after five seconds.
pub async fn with_timeout<F: Future>(fut: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(5), fut)
        .await
        .expect("test step timed out after 5s")
}
