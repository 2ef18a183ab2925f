//! Tracing subscriber setup for the CLI.
//!
//! Logs go to stderr so stdout stays parseable. `RUST_LOG` wins when set;
//! otherwise `-v` flags raise the default level from `warn`.

use tracing_subscriber::EnvFilter;

pub fn init(verbosity: u8) {
    let default = match verbosity {
        0 => "warn",
        1 => "info,sqlx=warn",
        2 => "debug,sqlx=warn,hyper=info",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
