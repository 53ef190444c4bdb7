use tracing::warn;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Install the global subscriber. An unparsable filter falls back to `info`
/// and is reported once the subscriber is up.
pub fn init_tracing(filter: &str) {
    let (env_filter, rejected) = match EnvFilter::try_new(filter) {
        Ok(env_filter) => (env_filter, None),
        Err(err) => (EnvFilter::new("info"), Some(err)),
    };
    let fmt_layer = fmt::layer().with_target(false);
    Registry::default().with(env_filter).with(fmt_layer).init();
    if let Some(err) = rejected {
        warn!(filter, %err, "invalid log filter, using info");
    }
}
