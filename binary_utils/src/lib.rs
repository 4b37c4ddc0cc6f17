use std::io::{self, IsTerminal as _};

use anyhow::Result;
use chrono::{Local, SecondsFormat};
use log::error;
use logging::debug_with_status;
use rayon::ThreadPoolBuilder;
use tracing_subscriber::{
    filter::LevelFilter,
    fmt::{format::Writer, time::FormatTime},
    EnvFilter,
};

const CRATES_LOGGING_AT_INFO: &[&str] = &[
    "batch_verifier",
    "binary_utils",
    "helper_functions",
    "operation_pools",
    "p2p",
    "prometheus_metrics",
    "runtime",
];

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> core::fmt::Result {
        write!(
            w,
            "[{}]",
            Local::now().to_rfc3339_opts(SecondsFormat::Millis, true)
        )
    }
}

/// Installs the global `tracing` subscriber.
///
/// Records emitted through the `log` facade are forwarded to it.
/// Directives in `RUST_LOG` are applied on top of the defaults.
pub fn initialize_logger(module_path: &str, always_write_style: bool) -> Result<()> {
    let mut filter = EnvFilter::default().add_directive(LevelFilter::OFF.into());

    for crate_name in CRATES_LOGGING_AT_INFO {
        filter = filter.add_directive(format!("{crate_name}=info").parse()?);
    }

    filter = filter.add_directive(format!("{module_path}=info").parse()?);

    if let Ok(env_filter) = EnvFilter::try_from_default_env() {
        for directive in env_filter.to_string().split(',') {
            filter = filter.add_directive(directive.parse()?);
        }
    }

    tracing_subscriber::fmt()
        .compact()
        .with_env_filter(filter)
        .with_thread_ids(false)
        .with_target(true)
        .with_line_number(true)
        .with_timer(LocalTimer)
        .with_ansi(always_write_style || io::stdout().is_terminal())
        .try_init()
        .map_err(anyhow::Error::msg)?;

    debug_with_status!("logger initialized");

    Ok(())
}

pub fn initialize_rayon() -> Result<()> {
    ThreadPoolBuilder::new()
        .thread_name(|index| format!("rayon-{index}"))
        .panic_handler(|payload| {
            let message = payload
                .downcast_ref::<&str>()
                .copied()
                .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
                .unwrap_or("unknown panic payload");

            error!("rayon task panicked: {message}");
        })
        .build_global()
        .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_directives_parse() -> Result<()> {
        for crate_name in CRATES_LOGGING_AT_INFO {
            format!("{crate_name}=info").parse::<tracing_subscriber::filter::Directive>()?;
        }

        Ok(())
    }
}
