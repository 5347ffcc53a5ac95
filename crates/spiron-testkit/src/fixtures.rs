//! Common fixtures

use spiron_client::PeerAddress;
use spiron_core::EddyState;
use tracing_subscriber::EnvFilter;

/// Valid eddy state with a `dimension`-long vector and energy 1.0
pub fn eddy(id: &str, dimension: usize) -> EddyState {
    let vector: Vec<f64> = (1..=dimension).map(|i| i as f64 / 10.0).collect();
    EddyState::new(id, vector, 1.0).expect("fixture eddy state is valid")
}

/// `n` distinct peer addresses, `peer-0:8081`, `peer-1:8082`, ...
pub fn addresses(n: usize) -> Vec<PeerAddress> {
    (0..n)
        .map(|i| {
            let port = 8081 + u16::try_from(i).expect("fixture peer count fits a port");
            PeerAddress::new(format!("peer-{i}"), port).expect("fixture address is valid")
        })
        .collect()
}

/// Route `tracing` output to the test harness; honours `RUST_LOG`
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
