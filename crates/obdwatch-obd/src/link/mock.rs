//! Scripted mock link for tests and demo runs

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use obdwatch_core::{CommandDescriptor, DiagnosticLink, LinkError, LinkFactory, RawValue};
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::config::MockLinkConfig;

const DEFAULT_PORT: &str = "/dev/rfcomm0";
const PROTOCOL: &str = "ISO 15765-4 (CAN 11/500)";

/// Vehicle state shared by the factory and every link it opened
#[derive(Default)]
struct MockVehicle {
    config: RwLock<MockLinkConfig>,
    connected: AtomicBool,
    failing_opens: AtomicU32,
    opens: AtomicU32,
    closes: AtomicU32,
    supports_calls: AtomicU32,
    queries: Mutex<Vec<String>>,
    no_data: RwLock<HashSet<String>>,
    query_errors: RwLock<HashMap<String, LinkError>>,
    supports_errors: RwLock<HashSet<String>>,
    stalled: RwLock<HashSet<String>>,
    stalled_liveness: AtomicBool,
}

impl MockVehicle {
    fn latency(&self) -> Duration {
        Duration::from_millis(self.config.read().latency_ms)
    }

    fn is_supported(&self, name: &str) -> bool {
        self.config
            .read()
            .supported
            .iter()
            .any(|s| s.eq_ignore_ascii_case(name))
    }
}

/// Opens [`MockLink`]s onto one scripted vehicle.
///
/// The factory keeps a handle on the vehicle so tests can change its
/// behaviour between poll iterations and inspect the calls it received.
#[derive(Clone)]
pub struct MockLinkFactory {
    vehicle: Arc<MockVehicle>,
}

impl MockLinkFactory {
    pub fn new(config: &MockLinkConfig) -> Self {
        let vehicle = MockVehicle {
            config: RwLock::new(config.clone()),
            ..Default::default()
        };
        Self {
            vehicle: Arc::new(vehicle),
        }
    }

    /// Replace the set of supported commands
    pub fn set_supported(&self, names: &[&str]) {
        self.vehicle.config.write().supported = names.iter().map(|s| s.to_string()).collect();
    }

    /// Override the value returned for a command
    pub fn set_response(&self, name: &str, value: RawValue) {
        self.vehicle.no_data.write().remove(name);
        self.vehicle
            .config
            .write()
            .responses
            .insert(name.to_string(), value);
    }

    /// Answer queries for `name` with no data
    pub fn set_no_data(&self, name: &str) {
        self.vehicle.no_data.write().insert(name.to_string());
    }

    /// Replace the stored trouble codes
    pub fn set_dtcs(&self, dtcs: &[(&str, &str)]) {
        self.vehicle.config.write().dtcs = dtcs
            .iter()
            .map(|(code, description)| (code.to_string(), description.to_string()))
            .collect();
    }

    /// Fail every query for `name` with `error`
    pub fn set_query_error(&self, name: &str, error: LinkError) {
        self.vehicle
            .query_errors
            .write()
            .insert(name.to_string(), error);
    }

    /// Fail the `supports` probe for `name`
    pub fn set_supports_error(&self, name: &str) {
        self.vehicle.supports_errors.write().insert(name.to_string());
    }

    /// Never answer queries for `name`
    pub fn stall_query(&self, name: &str) {
        self.vehicle.stalled.write().insert(name.to_string());
    }

    /// Never answer liveness checks
    pub fn stall_liveness(&self) {
        self.vehicle.stalled_liveness.store(true, Ordering::SeqCst);
    }

    /// Refuse the next `count` open attempts
    pub fn fail_next_opens(&self, count: u32) {
        self.vehicle.failing_opens.store(count, Ordering::SeqCst);
    }

    /// Simulate the adapter dropping off the air
    pub fn drop_connection(&self) {
        self.vehicle.connected.store(false, Ordering::SeqCst);
    }

    pub fn is_connected(&self) -> bool {
        self.vehicle.connected.load(Ordering::SeqCst)
    }

    /// Number of open attempts, successful or not
    pub fn opens(&self) -> u32 {
        self.vehicle.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> u32 {
        self.vehicle.closes.load(Ordering::SeqCst)
    }

    pub fn supports_calls(&self) -> u32 {
        self.vehicle.supports_calls.load(Ordering::SeqCst)
    }

    /// Names of all queried commands, in order
    pub fn queries(&self) -> Vec<String> {
        self.vehicle.queries.lock().clone()
    }

    pub fn query_count(&self, name: &str) -> usize {
        self.vehicle
            .queries
            .lock()
            .iter()
            .filter(|q| q.as_str() == name)
            .count()
    }
}

#[async_trait]
impl LinkFactory for MockLinkFactory {
    async fn open(&self, port: Option<&str>) -> Result<Box<dyn DiagnosticLink>, LinkError> {
        let vehicle = &self.vehicle;
        vehicle.opens.fetch_add(1, Ordering::SeqCst);

        let latency = vehicle.latency();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let port = port.unwrap_or(DEFAULT_PORT).to_string();
        let refused = vehicle
            .failing_opens
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(LinkError::ConnectionFailed(format!(
                "no response from adapter on {}",
                port
            )));
        }

        vehicle.connected.store(true, Ordering::SeqCst);
        debug!(port = %port, "Mock link opened");
        Ok(Box::new(MockLink {
            vehicle: Arc::clone(vehicle),
            port,
        }))
    }
}

/// One connection to the scripted vehicle
pub struct MockLink {
    vehicle: Arc<MockVehicle>,
    port: String,
}

impl MockLink {
    async fn simulate_latency(&self) {
        let latency = self.vehicle.latency();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    fn ensure_connected(&self) -> Result<(), LinkError> {
        if self.vehicle.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(LinkError::ConnectionClosed)
        }
    }
}

#[async_trait]
impl DiagnosticLink for MockLink {
    async fn is_connected(&self) -> bool {
        if self.vehicle.stalled_liveness.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.vehicle.connected.load(Ordering::SeqCst)
    }

    async fn supports(&self, command: &CommandDescriptor) -> Result<bool, LinkError> {
        self.vehicle.supports_calls.fetch_add(1, Ordering::SeqCst);
        self.ensure_connected()?;
        self.simulate_latency().await;

        if self.vehicle.supports_errors.read().contains(command.name) {
            return Err(LinkError::QueryFailed(format!(
                "PID lookup for {} failed",
                command.name
            )));
        }
        Ok(self.vehicle.is_supported(command.name))
    }

    async fn query(&self, command: &CommandDescriptor) -> Result<Option<RawValue>, LinkError> {
        self.vehicle.queries.lock().push(command.name.to_string());
        self.ensure_connected()?;
        self.simulate_latency().await;

        if self.vehicle.stalled.read().contains(command.name) {
            std::future::pending::<()>().await;
        }
        if let Some(error) = self.vehicle.query_errors.read().get(command.name) {
            return Err(error.clone());
        }
        if self.vehicle.no_data.read().contains(command.name) {
            return Ok(None);
        }

        let always_answered = command.name == "CLEAR_DTC";
        if !always_answered && !self.vehicle.is_supported(command.name) {
            return Ok(None);
        }
        Ok(self.vehicle.config.read().demo_value(command.name))
    }

    async fn close(&self) -> Result<(), LinkError> {
        self.vehicle.connected.store(false, Ordering::SeqCst);
        self.vehicle.closes.fetch_add(1, Ordering::SeqCst);
        debug!(port = %self.port, "Mock link closed");
        Ok(())
    }

    fn port_name(&self) -> Option<String> {
        Some(self.port.clone())
    }

    fn protocol_name(&self) -> Option<String> {
        Some(PROTOCOL.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obdwatch_core::commands::{CLEAR_DTC, GET_DTC, RPM, SPEED, VIN};

    fn factory() -> MockLinkFactory {
        MockLinkFactory::new(&MockLinkConfig {
            supported: vec!["RPM".into(), "VIN".into()],
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_open_and_query() {
        let factory = factory();
        let link = factory.open(None).await.unwrap();

        assert!(link.is_connected().await);
        assert_eq!(link.port_name().as_deref(), Some(DEFAULT_PORT));
        assert!(link.supports(&RPM).await.unwrap());
        assert!(!link.supports(&SPEED).await.unwrap());
        assert_eq!(
            link.query(&VIN).await.unwrap(),
            Some(RawValue::text("1HGCM82633A004352"))
        );
        assert_eq!(link.query(&SPEED).await.unwrap(), None);
        assert_eq!(factory.supports_calls(), 2);
        assert_eq!(factory.queries(), vec!["VIN", "SPEED"]);
    }

    #[tokio::test]
    async fn test_failing_opens() {
        let factory = factory();
        factory.fail_next_opens(2);

        assert!(factory.open(Some("/dev/rfcomm1")).await.is_err());
        assert!(factory.open(None).await.is_err());
        assert!(factory.open(None).await.is_ok());
        assert_eq!(factory.opens(), 3);
    }

    #[tokio::test]
    async fn test_dropped_connection() {
        let factory = factory();
        let link = factory.open(None).await.unwrap();
        factory.drop_connection();

        assert!(!link.is_connected().await);
        assert_eq!(link.query(&RPM).await, Err(LinkError::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_scripted_failures() {
        let factory = factory();
        let link = factory.open(None).await.unwrap();
        factory.set_supports_error("RPM");
        factory.set_query_error("VIN", LinkError::Timeout("VIN".into()));
        factory.set_dtcs(&[("P0171", "System Too Lean (Bank 1)")]);

        assert!(link.supports(&RPM).await.is_err());
        assert!(link.query(&VIN).await.is_err());
        // GET_DTC is not in the supported list
        assert_eq!(link.query(&GET_DTC).await.unwrap(), None);
        assert_eq!(
            link.query(&CLEAR_DTC).await.unwrap(),
            Some(RawValue::text("OK"))
        );
    }
}
