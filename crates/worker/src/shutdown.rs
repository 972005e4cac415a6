//! Shutdown triggers for the worker process

use std::fmt;
use std::time::Duration;

use tally_common::duration_millis::parse_duration;
use tally_domain::{Result, TallyError};
use tracing::warn;

/// Why the process is shutting down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    CtrlC,
    Terminate,
    RunDurationElapsed,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::CtrlC => "ctrl-c",
            Self::Terminate => "SIGTERM",
            Self::RunDurationElapsed => "run duration elapsed",
        })
    }
}

/// Optional run-duration limit from `TALLY_RUN_FOR` (`"30s"`, `90000`)
///
/// # Errors
/// Returns `TallyError::Config` for an unparsable duration.
pub fn run_for_from_env() -> Result<Option<Duration>> {
    parse_run_for(std::env::var("TALLY_RUN_FOR").ok().as_deref())
}

fn parse_run_for(raw: Option<&str>) -> Result<Option<Duration>> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) => parse_duration(text)
            .map(Some)
            .map_err(|e| TallyError::Config(format!("Invalid value for TALLY_RUN_FOR: {e}"))),
    }
}

/// Resolve on ctrl-c, SIGTERM (unix) or once `run_for` has elapsed.
pub async fn wait_for_shutdown(run_for: Option<Duration>) -> ShutdownReason {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let deadline = async {
        match run_for {
            Some(duration) => tokio::time::sleep(duration).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        () = ctrl_c => ShutdownReason::CtrlC,
        () = terminate => ShutdownReason::Terminate,
        () = deadline => ShutdownReason::RunDurationElapsed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_for() {
        assert_eq!(parse_run_for(None).unwrap(), None);
        assert_eq!(parse_run_for(Some(" ")).unwrap(), None);
        assert_eq!(parse_run_for(Some("2s")).unwrap(), Some(Duration::from_secs(2)));
        assert_eq!(parse_run_for(Some("1500")).unwrap(), Some(Duration::from_millis(1500)));
        assert!(parse_run_for(Some("forever")).is_err());
    }

    #[tokio::test]
    async fn test_run_duration_elapses() {
        let reason = wait_for_shutdown(Some(Duration::from_millis(10))).await;
        assert_eq!(reason, ShutdownReason::RunDurationElapsed);
    }
}
