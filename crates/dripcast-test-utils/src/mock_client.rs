// SPDX-FileCopyrightText: 2026 Dripcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted protocol client for deterministic tests.
//!
//! `MockClient` records every outbound call, hands out scripted pairing
//! codes, and lets tests push events into the client's event stream.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{broadcast, mpsc};

use dripcast_core::{
    ChatPresence, ClientFactory, Device, DripcastError, PairingCode, ProtocolClient,
    ProtocolEvent, ReceiptType, RegistrationResult, RosterEntry, SendReceipt,
};

/// One message accepted by [`MockClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub message_id: String,
    pub to: String,
    /// Text body, or the caption for media.
    pub text: String,
    /// Mime type and byte length of an attached image.
    pub media: Option<(String, usize)>,
}

#[derive(Default)]
struct MockState {
    link_id: Option<String>,
    push_name: Option<String>,
    pairing_codes: Vec<PairingCode>,
    /// Senders kept alive so pairing channels stay open after the scripted codes.
    held_channels: Option<Vec<mpsc::Sender<PairingCode>>>,
    sent: Vec<SentMessage>,
    presences: Vec<(String, ChatPresence)>,
    registered: HashMap<String, Option<String>>,
    roster: Vec<RosterEntry>,
}

/// A mock protocol client.
pub struct MockClient {
    state: Mutex<MockState>,
    events: broadcast::Sender<ProtocolEvent>,
    connected: AtomicBool,
    logged_in: AtomicBool,
    fail_connect: AtomicBool,
    fail_send: AtomicBool,
    fail_presence: AtomicBool,
    next_message: AtomicU64,
    connect_calls: AtomicUsize,
    disconnect_calls: AtomicUsize,
    available_announced: AtomicUsize,
}

impl MockClient {
    /// An unlinked client that will issue one pairing code.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            state: Mutex::new(MockState {
                push_name: Some("Mock Account".to_string()),
                pairing_codes: vec![PairingCode {
                    code: "2@mock-pairing-code".to_string(),
                    expires_in: Duration::from_secs(60),
                }],
                ..MockState::default()
            }),
            events,
            connected: AtomicBool::new(false),
            logged_in: AtomicBool::new(false),
            fail_connect: AtomicBool::new(false),
            fail_send: AtomicBool::new(false),
            fail_presence: AtomicBool::new(false),
            next_message: AtomicU64::new(1),
            connect_calls: AtomicUsize::new(0),
            disconnect_calls: AtomicUsize::new(0),
            available_announced: AtomicUsize::new(0),
        }
    }

    /// A client resuming an existing link; it logs in on `connect`.
    pub fn linked(link_id: &str) -> Self {
        let client = Self::new();
        client.lock().link_id = Some(link_id.to_string());
        client
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replace the scripted pairing codes. An empty list closes the
    /// pairing channel without issuing a code.
    pub fn set_pairing_codes(&self, codes: Vec<PairingCode>) {
        self.lock().pairing_codes = codes;
    }

    /// Keep every pairing channel open after its scripted codes, as a real
    /// client does while waiting for a scan.
    pub fn hold_pairing_channels(&self) {
        self.lock().held_channels.get_or_insert_with(Vec::new);
    }

    /// Held pairing channels whose receiver is still alive.
    pub fn open_pairing_channels(&self) -> usize {
        self.lock()
            .held_channels
            .as_ref()
            .map_or(0, |held| held.iter().filter(|tx| !tx.is_closed()).count())
    }

    pub fn set_push_name(&self, name: Option<&str>) {
        self.lock().push_name = name.map(str::to_string);
    }

    /// Answer for [`ProtocolClient::is_registered`]; unknown phones are unregistered.
    pub fn set_registered(&self, phone: &str, verified_name: Option<&str>) {
        self.lock()
            .registered
            .insert(phone.to_string(), verified_name.map(str::to_string));
    }

    pub fn set_roster(&self, roster: Vec<RosterEntry>) {
        self.lock().roster = roster;
    }

    pub fn fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail_send.store(fail, Ordering::SeqCst);
    }

    pub fn fail_presence(&self, fail: bool) {
        self.fail_presence.store(fail, Ordering::SeqCst);
    }

    /// Simulate the user scanning the code: the client becomes linked and
    /// logged in, and `Paired` then `Connected` are emitted.
    pub fn complete_pairing(&self, link_id: &str) {
        self.lock().link_id = Some(link_id.to_string());
        self.connected.store(true, Ordering::SeqCst);
        self.logged_in.store(true, Ordering::SeqCst);
        self.emit(ProtocolEvent::Paired {
            link_id: link_id.to_string(),
        });
        self.emit(ProtocolEvent::Connected);
    }

    /// Simulate a remote unlink.
    pub fn log_out(&self) {
        self.lock().link_id = None;
        self.connected.store(false, Ordering::SeqCst);
        self.logged_in.store(false, Ordering::SeqCst);
        self.emit(ProtocolEvent::LoggedOut {
            reason: Some("unlinked from phone".to_string()),
        });
    }

    /// Push a receipt for previously sent messages.
    pub fn emit_receipt(&self, message_ids: &[&str], receipt_type: ReceiptType, remote: &str) {
        self.emit(ProtocolEvent::Receipt {
            message_ids: message_ids.iter().map(|s| s.to_string()).collect(),
            receipt_type,
            remote_phone: remote.to_string(),
        });
    }

    /// Push an arbitrary event. Events without subscribers are dropped.
    pub fn emit(&self, event: ProtocolEvent) {
        let _ = self.events.send(event);
    }

    pub fn sent_messages(&self) -> Vec<SentMessage> {
        self.lock().sent.clone()
    }

    pub fn sent_count(&self) -> usize {
        self.lock().sent.len()
    }

    pub fn presences(&self) -> Vec<(String, ChatPresence)> {
        self.lock().presences.clone()
    }

    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn disconnect_calls(&self) -> usize {
        self.disconnect_calls.load(Ordering::SeqCst)
    }

    pub fn available_announced(&self) -> usize {
        self.available_announced.load(Ordering::SeqCst)
    }

    fn ensure_logged_in(&self) -> Result<(), DripcastError> {
        if self.logged_in.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(DripcastError::protocol("client is not logged in"))
        }
    }

    fn record_send(&self, to: &str, text: &str, media: Option<(String, usize)>) -> SendReceipt {
        let n = self.next_message.fetch_add(1, Ordering::SeqCst);
        let message_id = format!("mock-msg-{n}");
        self.lock().sent.push(SentMessage {
            message_id: message_id.clone(),
            to: to.to_string(),
            text: text.to_string(),
            media,
        });
        SendReceipt {
            message_id,
            timestamp: Utc::now(),
        }
    }
}

impl Default for MockClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProtocolClient for MockClient {
    async fn connect(&self) -> Result<(), DripcastError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(DripcastError::protocol("mock connect refused"));
        }
        self.connected.store(true, Ordering::SeqCst);
        if self.lock().link_id.is_some() {
            self.logged_in.store(true, Ordering::SeqCst);
            self.emit(ProtocolEvent::Connected);
        }
        Ok(())
    }

    async fn disconnect(&self) {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        self.logged_in.store(false, Ordering::SeqCst);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn is_logged_in(&self) -> bool {
        self.logged_in.load(Ordering::SeqCst)
    }

    fn link_id(&self) -> Option<String> {
        self.lock().link_id.clone()
    }

    fn push_name(&self) -> Option<String> {
        self.lock().push_name.clone()
    }

    async fn pairing_channel(&self) -> Result<mpsc::Receiver<PairingCode>, DripcastError> {
        let mut state = self.lock();
        let (tx, rx) = mpsc::channel(state.pairing_codes.len().max(1));
        for code in &state.pairing_codes {
            // Capacity covers every scripted code.
            let _ = tx.try_send(code.clone());
        }
        if let Some(held) = state.held_channels.as_mut() {
            held.push(tx);
        }
        Ok(rx)
    }

    fn subscribe(&self) -> broadcast::Receiver<ProtocolEvent> {
        self.events.subscribe()
    }

    async fn send_text(&self, to: &str, text: &str) -> Result<SendReceipt, DripcastError> {
        self.ensure_logged_in()?;
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(DripcastError::protocol("mock send failure"));
        }
        Ok(self.record_send(to, text, None))
    }

    async fn send_media(
        &self,
        to: &str,
        bytes: Vec<u8>,
        mime: &str,
        caption: &str,
    ) -> Result<SendReceipt, DripcastError> {
        self.ensure_logged_in()?;
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(DripcastError::protocol("mock upload failure"));
        }
        Ok(self.record_send(to, caption, Some((mime.to_string(), bytes.len()))))
    }

    async fn send_chat_presence(
        &self,
        to: &str,
        presence: ChatPresence,
    ) -> Result<(), DripcastError> {
        self.ensure_logged_in()?;
        if self.fail_presence.load(Ordering::SeqCst) {
            return Err(DripcastError::protocol("mock presence failure"));
        }
        self.lock().presences.push((to.to_string(), presence));
        Ok(())
    }

    async fn send_presence_available(&self) -> Result<(), DripcastError> {
        if self.fail_presence.load(Ordering::SeqCst) {
            return Err(DripcastError::protocol("mock presence failure"));
        }
        self.available_announced.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn is_registered(
        &self,
        phones: &[String],
    ) -> Result<Vec<RegistrationResult>, DripcastError> {
        self.ensure_logged_in()?;
        let state = self.lock();
        Ok(phones
            .iter()
            .map(|phone| match state.registered.get(phone) {
                Some(verified_name) => RegistrationResult {
                    phone: phone.clone(),
                    registered: true,
                    verified_name: verified_name.clone(),
                },
                None => RegistrationResult {
                    phone: phone.clone(),
                    registered: false,
                    verified_name: None,
                },
            })
            .collect())
    }

    async fn roster(&self) -> Result<Vec<RosterEntry>, DripcastError> {
        self.ensure_logged_in()?;
        Ok(self.lock().roster.clone())
    }
}

/// Factory handing out [`MockClient`]s and remembering them per device.
#[derive(Default)]
pub struct MockClientFactory {
    clients: Mutex<HashMap<String, Vec<Arc<MockClient>>>>,
    prepared: Mutex<HashMap<String, Arc<MockClient>>>,
    fail: AtomicBool,
}

impl MockClientFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `client` for the next `create` call for `device_id`.
    pub fn prepare(&self, device_id: &str, client: Arc<MockClient>) {
        self.prepared
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(device_id.to_string(), client);
    }

    /// Make every subsequent `create` fail.
    pub fn fail_creation(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// The most recently created client for a device.
    pub fn client(&self, device_id: &str) -> Option<Arc<MockClient>> {
        self.clients
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(device_id)
            .and_then(|list| list.last().cloned())
    }

    /// How many clients were created for a device.
    pub fn created_count(&self, device_id: &str) -> usize {
        self.clients
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(device_id)
            .map_or(0, Vec::len)
    }
}

impl ClientFactory for MockClientFactory {
    fn create(&self, device: &Device) -> Result<Arc<dyn ProtocolClient>, DripcastError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(DripcastError::protocol("mock factory failure"));
        }
        let prepared = self
            .prepared
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&device.id);
        let client = prepared.unwrap_or_else(|| {
            Arc::new(match &device.link_id {
                Some(link) => MockClient::linked(link),
                None => MockClient::new(),
            })
        });
        self.clients
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .entry(device.id.clone())
            .or_default()
            .push(client.clone());
        Ok(client)
    }
}
