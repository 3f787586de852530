//! Process-wide tracing setup shared by the server and the CLI.

use tracing_subscriber::{fmt::MakeWriter, EnvFilter};

fn wants_json(format: Option<&str>) -> bool {
    format.is_some_and(|v| v.trim().eq_ignore_ascii_case("json"))
}

/// `RUST_LOG` filter (default `info`); `RUST_LOG_FORMAT=json` switches to JSON lines
pub fn init_tracing<W>(writer: W)
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let format = std::env::var("RUST_LOG_FORMAT").ok();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_writer(writer).with_env_filter(filter);
    if wants_json(format.as_deref()) {
        builder.json().init();
    } else {
        builder.init();
    }
}
