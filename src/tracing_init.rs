//! Log setup for the binaries.  Filtering follows RUST_LOG, e.g. `RUST_LOG=e1_quicksync=debug` for one line per
//! dwell or `RUST_LOG=e1_quicksync::gnss::acquisition::search=trace` for one line per Doppler bin.

use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_FILTER:&str = "e1_quicksync=info";

/// Installs the global subscriber.  Logs go to stderr so stdout stays free for results.
pub fn init_tracing() {
	let filter = EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

	fmt()
		.with_env_filter(filter)
		.with_target(true)
		.with_writer(std::io::stderr)
		.init();
}
