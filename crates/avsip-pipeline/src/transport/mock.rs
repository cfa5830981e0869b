//! Mock transports for testing and hardware-free demo runs

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;

use avsip_core::{ObdValue, Position};

use super::{CanTransport, MeshTransport, ObdTransport, RawFrame, TransportError};

// =============================================================================
// OBD
// =============================================================================

/// Mock OBD-II adapter with injectable values and failure modes
pub struct MockObdTransport {
    connected: AtomicBool,
    running: AtomicBool,
    fail_connects: AtomicBool,
    values: RwLock<BTreeMap<String, ObdValue>>,
    dtc_codes: RwLock<Vec<String>>,
    /// Commands that answer with `NoResponse` even while connected
    dead_commands: RwLock<Vec<String>>,
}

impl MockObdTransport {
    pub fn new() -> Self {
        let mut values = BTreeMap::new();
        values.insert("RPM".to_string(), ObdValue::Number(1500.0));
        values.insert("SPEED".to_string(), ObdValue::Number(62.0));
        values.insert("COOLANT_TEMP".to_string(), ObdValue::Number(88.0));

        Self {
            connected: AtomicBool::new(false),
            running: AtomicBool::new(true),
            fail_connects: AtomicBool::new(false),
            values: RwLock::new(values),
            dtc_codes: RwLock::new(Vec::new()),
            dead_commands: RwLock::new(Vec::new()),
        }
    }

    /// Replace the value answered for one command
    pub fn set_value(&self, command: &str, value: ObdValue) {
        self.values.write().insert(command.to_string(), value);
    }

    pub fn set_dtc_codes(&self, codes: Vec<String>) {
        *self.dtc_codes.write() = codes;
    }

    /// Simulate the engine being off
    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    /// Simulate adapter connection loss (queries fail until reconnected)
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Make `connect` itself fail, keeping the adapter unreachable
    pub fn set_fail_connects(&self, fail: bool) {
        self.fail_connects.store(fail, Ordering::SeqCst);
    }

    /// Make one command stop answering without affecting the others
    pub fn kill_command(&self, command: &str) {
        self.dead_commands.write().push(command.to_string());
    }

    fn ensure_connected(&self) -> Result<(), TransportError> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(TransportError::ConnectionClosed)
        }
    }
}

impl Default for MockObdTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObdTransport for MockObdTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        if self.fail_connects.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionFailed(
                "adapter not reachable".to_string(),
            ));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn is_running(&self) -> Result<bool, TransportError> {
        self.ensure_connected()?;
        Ok(self.running.load(Ordering::SeqCst))
    }

    async fn supported_commands(
        &self,
        requested: &[String],
    ) -> Result<Vec<String>, TransportError> {
        self.ensure_connected()?;
        let values = self.values.read();
        Ok(requested
            .iter()
            .filter(|name| values.contains_key(*name))
            .cloned()
            .collect())
    }

    async fn query(&self, command: &str) -> Result<ObdValue, TransportError> {
        self.ensure_connected()?;
        if self.dead_commands.read().iter().any(|c| c == command) {
            return Err(TransportError::NoResponse(command.to_string()));
        }
        self.values
            .read()
            .get(command)
            .cloned()
            .ok_or_else(|| TransportError::UnsupportedCommand(command.to_string()))
    }

    async fn read_dtc_codes(&self) -> Result<Vec<String>, TransportError> {
        self.ensure_connected()?;
        Ok(self.dtc_codes.read().clone())
    }

    async fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

// =============================================================================
// CAN
// =============================================================================

/// Mock CAN interface backed by an injectable frame queue
pub struct MockCanTransport {
    connected: AtomicBool,
    frames: RwLock<VecDeque<RawFrame>>,
    fail_receives: AtomicBool,
}

impl MockCanTransport {
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(false),
            frames: RwLock::new(VecDeque::new()),
            fail_receives: AtomicBool::new(false),
        }
    }

    /// Queue a frame for the next `receive` call
    pub fn inject_frame(&self, id: u32, data: &[u8]) {
        self.frames.write().push_back(RawFrame {
            id,
            data: data.to_vec(),
        });
    }

    /// Make subsequent receives fail as a bus error
    pub fn set_fail_receives(&self, fail: bool) {
        self.fail_receives.store(fail, Ordering::SeqCst);
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }
}

impl Default for MockCanTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CanTransport for MockCanTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn receive(&self, _timeout: Duration) -> Result<Option<RawFrame>, TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }
        if self.fail_receives.load(Ordering::SeqCst) {
            return Err(TransportError::ReceiveFailed("bus error".to_string()));
        }
        // Empty queue behaves like a receive window elapsing with no traffic
        Ok(self.frames.write().pop_front())
    }

    async fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

// =============================================================================
// Mesh radio
// =============================================================================

/// Default payload ceiling of a mesh data packet
const MOCK_MAX_PAYLOAD: usize = 233;

/// Mock mesh-radio device recording every send
pub struct MockMeshTransport {
    node_id: String,
    position: RwLock<Option<Position>>,
    sent: RwLock<Vec<(u32, Vec<u8>)>>,
    fail_sends: AtomicBool,
    max_payload: usize,
}

impl MockMeshTransport {
    pub fn new(node_id: &str) -> Self {
        Self {
            node_id: node_id.to_string(),
            position: RwLock::new(None),
            sent: RwLock::new(Vec::new()),
            fail_sends: AtomicBool::new(false),
            max_payload: MOCK_MAX_PAYLOAD,
        }
    }

    pub fn with_max_payload(node_id: &str, max_payload: usize) -> Self {
        Self {
            max_payload,
            ..Self::new(node_id)
        }
    }

    pub fn set_position(&self, position: Option<Position>) {
        *self.position.write() = position;
    }

    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Everything sent so far, as (port, payload) pairs
    pub fn sent(&self) -> Vec<(u32, Vec<u8>)> {
        self.sent.read().clone()
    }
}

#[async_trait]
impl MeshTransport for MockMeshTransport {
    async fn send(&self, port_num: u32, payload: &[u8]) -> Result<(), TransportError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::SendFailed("radio timeout".to_string()));
        }
        if payload.len() > self.max_payload {
            return Err(TransportError::SendFailed(format!(
                "payload {} bytes exceeds {} byte limit",
                payload.len(),
                self.max_payload
            )));
        }
        self.sent.write().push((port_num, payload.to_vec()));
        Ok(())
    }

    async fn last_position(&self) -> Result<Option<Position>, TransportError> {
        Ok(self.position.read().clone())
    }

    async fn device_id(&self) -> Result<String, TransportError> {
        Ok(self.node_id.clone())
    }

    fn max_payload_bytes(&self) -> usize {
        self.max_payload
    }

    async fn close(&self) {}
}
