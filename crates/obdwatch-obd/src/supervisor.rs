//! Connection supervisor for the diagnostic link
//!
//! Owns the link exclusively and drives its lifecycle:
//!
//! ```text
//!  Disconnected ──► Connecting ──► Connected ──(link lost)──► Disconnected
//!                       │                                          │
//!                       └──(open failed)──► Failed ──(backoff)─────┘
//! ```
//!
//! Every successful connect advances the connection epoch. Anything derived
//! from a link (capabilities, VIN) is tagged with the epoch it was read in.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use obdwatch_core::commands::RPM;
use obdwatch_core::{
    events, AttrValue, Attributes, CommandDescriptor, ConnectionState, DiagnosticLink, LinkError,
    LinkFactory, LinkHealth, QueryOutcome, Reporter,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ConnectionConfig;
use crate::query::run_query;
use crate::shutdown;

/// Doubling delay between failed connect attempts, capped at a maximum
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let max = max.max(initial);
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Delay the next failure will wait
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Record a failure and return the delay to wait before retrying
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self
            .current
            .checked_mul(2)
            .map_or(self.max, |doubled| doubled.min(self.max));
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

/// Establishes, monitors and recovers the diagnostic link
pub struct ConnectionSupervisor {
    factory: Arc<dyn LinkFactory>,
    config: ConnectionConfig,
    reporter: Reporter,
    link: Option<Box<dyn DiagnosticLink>>,
    state: ConnectionState,
    backoff: Backoff,
    retry_count: u32,
    epoch: u64,
    last_connected_at: Option<DateTime<Utc>>,
}

impl ConnectionSupervisor {
    pub fn new(factory: Arc<dyn LinkFactory>, config: ConnectionConfig, reporter: Reporter) -> Self {
        let backoff = Backoff::new(config.initial_backoff(), config.max_backoff());
        Self {
            factory,
            config,
            reporter,
            link: None,
            state: ConnectionState::Disconnected,
            backoff,
            retry_count: 0,
            epoch: 0,
            last_connected_at: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Current connection epoch, 0 before the first successful connect
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    /// The open link, if any
    pub fn link(&self) -> Option<&dyn DiagnosticLink> {
        self.link.as_deref()
    }

    /// Make sure a live link is held, reconnecting if necessary.
    ///
    /// Returns false when the link is unavailable; a failed attempt has
    /// already waited out its backoff delay by the time this returns.
    pub async fn ensure_connected(&mut self, cancel: &CancellationToken) -> bool {
        if cancel.is_cancelled() {
            return false;
        }

        if self.state == ConnectionState::Connected {
            if let Some(link) = &self.link {
                match shutdown::guard(cancel, link.is_connected()).await {
                    Ok(true) => return true,
                    Ok(false) => {}
                    Err(_) => return false,
                }
            }
            warn!(epoch = self.epoch, "Diagnostic link lost");
            self.release().await;
            self.report_status(false, Some("link_lost")).await;
        }

        self.connect(cancel).await
    }

    async fn connect(&mut self, cancel: &CancellationToken) -> bool {
        self.state = ConnectionState::Connecting;
        info!(
            port = self.config.port.as_deref().unwrap_or("auto"),
            attempt = self.retry_count + 1,
            "Connecting to OBD-II adapter"
        );

        let factory = Arc::clone(&self.factory);
        let opened = shutdown::guard(cancel, factory.open(self.config.port.as_deref())).await;
        let result = match opened {
            Ok(result) => result,
            Err(_) => {
                debug!("Connect cancelled");
                self.state = ConnectionState::Disconnected;
                return false;
            }
        };

        let result = match result {
            Ok(link) => {
                let alive = match shutdown::guard(cancel, link.is_connected()).await {
                    Ok(alive) => alive,
                    Err(_) => {
                        debug!("Connect cancelled");
                        if let Err(e) = link.close().await {
                            debug!(error = %e, "Failed to close link after cancelled connect");
                        }
                        self.state = ConnectionState::Disconnected;
                        return false;
                    }
                };
                if alive {
                    Ok(link)
                } else {
                    if let Err(e) = link.close().await {
                        debug!(error = %e, "Failed to close unconnected link");
                    }
                    Err(LinkError::ConnectionFailed(
                        "adapter opened but reports no vehicle connection".into(),
                    ))
                }
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(link) => {
                self.link = Some(link);
                self.state = ConnectionState::Connected;
                self.epoch += 1;
                self.backoff.reset();
                self.retry_count = 0;
                self.last_connected_at = Some(Utc::now());

                let health = self.health();
                info!(
                    epoch = self.epoch,
                    port = health.port_name.as_deref().unwrap_or("unknown"),
                    protocol = health.protocol_name.as_deref().unwrap_or("unknown"),
                    "Connected to OBD-II adapter"
                );
                self.report_status(true, None).await;
                true
            }
            Err(e) => {
                self.state = ConnectionState::Failed;
                self.retry_count += 1;
                let delay = self.backoff.next_delay();
                warn!(
                    error = %e,
                    retry_count = self.retry_count,
                    retry_in_secs = delay.as_secs_f64(),
                    "Failed to connect to OBD-II adapter"
                );
                if shutdown::sleep(cancel, delay).await.is_err() {
                    debug!("Backoff interrupted by shutdown");
                }
                false
            }
        }
    }

    /// Close the link and return to Disconnected
    pub async fn disconnect(&mut self) {
        if self.link.is_none() {
            self.state = ConnectionState::Disconnected;
            return;
        }
        self.release().await;
        info!(epoch = self.epoch, "Disconnected from OBD-II adapter");
        self.report_status(false, Some("shutdown")).await;
    }

    async fn release(&mut self) {
        if let Some(link) = self.link.take() {
            if let Err(e) = link.close().await {
                warn!(error = %e, "Error closing diagnostic link");
            }
        }
        self.state = ConnectionState::Disconnected;
    }

    /// Query one command on the held link, bounded by the query timeout
    pub async fn query(&self, command: &'static CommandDescriptor) -> QueryOutcome {
        match self.link.as_deref() {
            Some(link) => run_query(link, command, self.config.query_timeout()).await,
            None => QueryOutcome::Failed(LinkError::ConnectionClosed),
        }
    }

    /// Sanity check after connecting: the engine speed PID must answer
    pub async fn test_communication(&self) -> bool {
        match self.query(&RPM).await {
            QueryOutcome::Value(value) => {
                debug!(?value, "Communication test passed");
                true
            }
            QueryOutcome::NoData => {
                warn!("Communication test returned no data");
                false
            }
            QueryOutcome::Failed(e) => {
                warn!(error = %e, "Communication test failed");
                false
            }
        }
    }

    pub fn health(&self) -> LinkHealth {
        LinkHealth {
            state: self.state,
            epoch: self.epoch,
            retry_count: self.retry_count,
            backoff_secs: self.backoff.current().as_secs_f64(),
            port: self.config.port.clone(),
            port_name: self.link.as_ref().and_then(|l| l.port_name()),
            protocol_name: self.link.as_ref().and_then(|l| l.protocol_name()),
            last_connected_at: self.last_connected_at,
        }
    }

    async fn report_status(&self, connected: bool, reason: Option<&str>) {
        let health = self.health();
        let mut attributes = Attributes::new();
        attributes.insert("connected".into(), connected.into());
        attributes.insert("epoch".into(), self.epoch.into());
        if let Some(port) = health.port_name.or(health.port) {
            attributes.insert("port".into(), AttrValue::Text(port));
        }
        if let Some(protocol) = health.protocol_name {
            attributes.insert("protocol".into(), AttrValue::Text(protocol));
        }
        if let Some(reason) = reason {
            attributes.insert("reason".into(), reason.into());
        }
        self.reporter
            .emit(events::CONNECTION_STATUS, attributes)
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MockLinkConfig;
    use crate::link::MockLinkFactory;
    use obdwatch_core::RecordingSink;

    fn supervisor(factory: &MockLinkFactory) -> (ConnectionSupervisor, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::new());
        let supervisor = ConnectionSupervisor::new(
            Arc::new(factory.clone()),
            ConnectionConfig::default(),
            Reporter::new(sink.clone()),
        );
        (supervisor, sink)
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let mut backoff = Backoff::new(Duration::from_secs(30), Duration::from_secs(300));
        let delays: Vec<u64> = (0..6).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![30, 60, 120, 240, 300, 300]);
        assert_eq!(backoff.current(), Duration::from_secs(300));

        backoff.reset();
        assert_eq!(backoff.current(), Duration::from_secs(30));
    }

    #[test]
    fn test_backoff_after_n_failures() {
        let initial = Duration::from_secs(1);
        let max = Duration::from_secs(100);
        for n in 0..12u32 {
            let mut backoff = Backoff::new(initial, max);
            for _ in 0..n {
                backoff.next_delay();
            }
            let expected = (initial * 2u32.pow(n)).min(max);
            assert_eq!(backoff.current(), expected, "after {} failures", n);
        }
    }

    #[test]
    fn test_backoff_max_below_initial() {
        let mut backoff = Backoff::new(Duration::from_secs(60), Duration::from_secs(10));
        assert_eq!(backoff.next_delay(), Duration::from_secs(60));
        assert_eq!(backoff.next_delay(), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_advances_epoch() {
        let factory = MockLinkFactory::new(&MockLinkConfig::default());
        let (mut supervisor, sink) = supervisor(&factory);
        let cancel = CancellationToken::new();

        assert_eq!(supervisor.state(), ConnectionState::Disconnected);
        assert!(supervisor.ensure_connected(&cancel).await);
        assert_eq!(supervisor.state(), ConnectionState::Connected);
        assert_eq!(supervisor.epoch(), 1);

        // Liveness check only, no new open
        assert!(supervisor.ensure_connected(&cancel).await);
        assert_eq!(factory.opens(), 1);
        assert_eq!(supervisor.epoch(), 1);

        let status = sink.events(events::CONNECTION_STATUS);
        assert_eq!(status.len(), 1);
        assert_eq!(status[0].attributes["connected"], AttrValue::Bool(true));
        assert_eq!(status[0].attributes["epoch"], AttrValue::Int(1));
        assert_eq!(
            status[0].attributes["port"],
            AttrValue::Text("/dev/rfcomm0".into())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_connect_waits_backoff() {
        let factory = MockLinkFactory::new(&MockLinkConfig::default());
        factory.fail_next_opens(3);
        let (mut supervisor, _sink) = supervisor(&factory);
        let cancel = CancellationToken::new();

        let start = tokio::time::Instant::now();
        assert!(!supervisor.ensure_connected(&cancel).await);
        assert_eq!(start.elapsed(), Duration::from_secs(30));
        assert_eq!(supervisor.state(), ConnectionState::Failed);
        assert_eq!(supervisor.retry_count(), 1);

        assert!(!supervisor.ensure_connected(&cancel).await);
        assert!(!supervisor.ensure_connected(&cancel).await);
        assert_eq!(start.elapsed(), Duration::from_secs(30 + 60 + 120));
        assert_eq!(supervisor.health().backoff_secs, 240.0);

        assert!(supervisor.ensure_connected(&cancel).await);
        assert_eq!(supervisor.retry_count(), 0);
        assert_eq!(supervisor.backoff().current(), Duration::from_secs(30));
        assert_eq!(supervisor.epoch(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_link_reconnects() {
        let factory = MockLinkFactory::new(&MockLinkConfig::default());
        let (mut supervisor, sink) = supervisor(&factory);
        let cancel = CancellationToken::new();

        assert!(supervisor.ensure_connected(&cancel).await);
        factory.drop_connection();
        assert!(supervisor.ensure_connected(&cancel).await);

        assert_eq!(supervisor.epoch(), 2);
        assert_eq!(factory.opens(), 2);
        assert_eq!(factory.closes(), 1);

        let connected: Vec<_> = sink
            .events(events::CONNECTION_STATUS)
            .into_iter()
            .map(|r| r.attributes["connected"].clone())
            .collect();
        assert_eq!(
            connected,
            vec![
                AttrValue::Bool(true),
                AttrValue::Bool(false),
                AttrValue::Bool(true)
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff() {
        let factory = MockLinkFactory::new(&MockLinkConfig::default());
        factory.fail_next_opens(1);
        let (mut supervisor, _sink) = supervisor(&factory);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.cancel();
        });

        let start = tokio::time::Instant::now();
        assert!(!supervisor.ensure_connected(&cancel).await);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_connecting() {
        let factory = MockLinkFactory::new(&MockLinkConfig {
            latency_ms: 10_000,
            ..Default::default()
        });
        let (mut supervisor, _sink) = supervisor(&factory);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        assert!(!supervisor.ensure_connected(&cancel).await);
        assert_eq!(supervisor.state(), ConnectionState::Disconnected);
        assert_eq!(supervisor.retry_count(), 0);
        assert_eq!(supervisor.epoch(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_post_open_check() {
        let factory = MockLinkFactory::new(&MockLinkConfig::default());
        factory.stall_liveness();
        let (mut supervisor, _sink) = supervisor(&factory);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let start = tokio::time::Instant::now();
        assert!(!supervisor.ensure_connected(&cancel).await);
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(supervisor.state(), ConnectionState::Disconnected);
        assert_eq!(supervisor.epoch(), 0);
        assert_eq!(factory.closes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_liveness_check() {
        let factory = MockLinkFactory::new(&MockLinkConfig::default());
        let (mut supervisor, _sink) = supervisor(&factory);
        let cancel = CancellationToken::new();
        assert!(supervisor.ensure_connected(&cancel).await);

        factory.stall_liveness();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let start = tokio::time::Instant::now();
        assert!(!supervisor.ensure_connected(&cancel).await);
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(supervisor.epoch(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_closes_link() {
        let factory = MockLinkFactory::new(&MockLinkConfig::default());
        let (mut supervisor, _sink) = supervisor(&factory);
        let cancel = CancellationToken::new();

        assert!(supervisor.ensure_connected(&cancel).await);
        assert!(supervisor.test_communication().await);
        supervisor.disconnect().await;

        assert_eq!(supervisor.state(), ConnectionState::Disconnected);
        assert!(supervisor.link().is_none());
        assert_eq!(factory.closes(), 1);
        assert!(matches!(
            supervisor.query(&RPM).await,
            QueryOutcome::Failed(LinkError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_communication_without_rpm() {
        let factory = MockLinkFactory::new(&MockLinkConfig {
            supported: vec!["VIN".into()],
            ..Default::default()
        });
        let (mut supervisor, _sink) = supervisor(&factory);
        let cancel = CancellationToken::new();

        assert!(supervisor.ensure_connected(&cancel).await);
        assert!(!supervisor.test_communication().await);
        assert_eq!(supervisor.state(), ConnectionState::Connected);
    }
}
