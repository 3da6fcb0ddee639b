//! Signal handling.
//!
//! The first SIGINT, SIGTERM or SIGHUP cancels the token handed to the sync
//! engine, which stops at the next item boundary with the cursor intact. A
//! second signal exits immediately.

use anyhow::Context;
use tokio_util::sync::CancellationToken;

/// Status for an exit forced by a repeated signal.
const FORCED_EXIT_CODE: i32 = 130;

#[cfg(unix)]
struct Signals {
    term: tokio::signal::unix::Signal,
    hup: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl Signals {
    fn register() -> anyhow::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};
        Ok(Self {
            term: signal(SignalKind::terminate()).context("Failed to register SIGTERM handler")?,
            hup: signal(SignalKind::hangup()).context("Failed to register SIGHUP handler")?,
        })
    }

    async fn next(&mut self) {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = self.term.recv() => {}
            _ = self.hup.recv() => {}
        }
    }
}

#[cfg(not(unix))]
struct Signals;

#[cfg(not(unix))]
impl Signals {
    fn register() -> anyhow::Result<Self> {
        Ok(Self)
    }

    async fn next(&mut self) {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Cannot listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

/// Register signal listeners and return the token they cancel.
pub(crate) fn install_signal_handler() -> anyhow::Result<CancellationToken> {
    let mut signals = Signals::register()?;
    let token = CancellationToken::new();

    let cancel = token.clone();
    tokio::spawn(async move {
        signals.next().await;
        tracing::info!("Shutdown requested, stopping after the current item");
        tracing::info!("Signal again to exit immediately");
        cancel.cancel();

        signals.next().await;
        tracing::warn!("Second signal received, exiting now");
        std::process::exit(FORCED_EXIT_CODE);
    });

    Ok(token)
}
