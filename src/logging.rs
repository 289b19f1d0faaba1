use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter directives in this variable override the verbosity flag.
const FILTER_ENV: &str = "PBS_MPIRUN_LOG";

/// Initialize the logger. Output goes to stderr so it never mixes with a dry-run report.
pub fn init(verbosity: u8) {
    let l = fmt::layer()
        .compact()
        .without_time()
        .with_writer(std::io::stderr)
        .with_filter(filters(verbosity));
    // A second call (from tests) keeps the first subscriber
    let _ = tracing_subscriber::registry().with(l).try_init();
}

fn default_level(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        _ => LevelFilter::DEBUG,
    }
}

fn filters(verbosity: u8) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(default_level(verbosity).into())
        .with_env_var(FILTER_ENV)
        .from_env_lossy()
}
