//! Tracing subscriber setup for processes embedding the flow manager.

use crate::error::{FlowError, FlowResult};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Installs a global fmt subscriber.
///
/// `filter` uses `RUST_LOG` syntax; when `None`, `RUST_LOG` is consulted
/// and `info` is used if it is unset. `log` records from the store crate
/// are forwarded to the same subscriber.
pub fn init(filter: Option<&str>) -> FlowResult<()> {
    let filter = match filter {
        Some(directives) => EnvFilter::try_new(directives)
            .map_err(|e| FlowError::invalid_config(format!("Invalid log filter: {}", e)))?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .compact()
        .finish()
        .try_init()
        .map_err(|e| FlowError::invalid_config(format!("Failed to set logger: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_filter_is_rejected() {
        assert!(matches!(
            init(Some("vtn_flowmgr=notalevel")),
            Err(FlowError::InvalidConfig(_))
        ));
    }
}
