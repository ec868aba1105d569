// Test support for the topcast pipeline: in-memory collaborators plus
// a fully wired world for end-to-end scenarios.
pub mod mocks;
pub mod world;

pub use mocks::{MemoryQueue, RecordingTransport, StaticKeySource};
pub use world::{Session, TestWorld};

/// Route tracing output through the test writer, honoring RUST_LOG.
/// Safe to call from every test; only the first call installs.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init()
        .ok();
}
