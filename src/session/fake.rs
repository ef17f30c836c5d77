//! In-memory transport for session tests

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

use super::transport::{event_channel, PeerTransport, TransportEvent, TransportEventSender, TransportEvents};
use crate::error::{CallError, Result};
use crate::media::LocalTrack;
use crate::signaling::{IceCandidate, SessionDescription};

/// Records every call and answers with canned descriptions
pub(crate) struct FakeTransport {
    calls: Mutex<Vec<String>>,
    candidates: Mutex<Vec<IceCandidate>>,
    sending: Mutex<Vec<String>>,
    events: TransportEventSender,
    closes: AtomicUsize,
    descriptions: AtomicUsize,
    hold_offers: AtomicBool,
    fail_answers: AtomicBool,
    offer_started: Notify,
}

impl FakeTransport {
    pub fn new() -> (Arc<Self>, TransportEvents) {
        let (events, rx) = event_channel();
        let transport = Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            candidates: Mutex::new(Vec::new()),
            sending: Mutex::new(Vec::new()),
            events,
            closes: AtomicUsize::new(0),
            descriptions: AtomicUsize::new(0),
            hold_offers: AtomicBool::new(false),
            fail_answers: AtomicBool::new(false),
            offer_started: Notify::new(),
        });
        (transport, rx)
    }

    /// Inject a host event
    pub fn emit(&self, event: TransportEvent) {
        let _ = self.events.send(event);
    }

    /// Make `create_offer` block until the session is closed
    pub fn hold_offers(&self, hold: bool) {
        self.hold_offers.store(hold, Ordering::SeqCst);
    }

    pub fn fail_answers(&self, fail: bool) {
        self.fail_answers.store(fail, Ordering::SeqCst);
    }

    /// Wait until `create_offer` has been entered
    pub async fn offer_started(&self) {
        self.offer_started.notified().await;
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn applied_candidates(&self) -> Vec<IceCandidate> {
        self.candidates.lock().clone()
    }

    /// Ids of the tracks currently on senders
    pub fn sending(&self) -> Vec<String> {
        self.sending.lock().clone()
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().push(call.into());
    }

    fn next_sdp(&self, name: &str) -> String {
        let version = self.descriptions.fetch_add(1, Ordering::SeqCst);
        format!("v=0\r\no=- 1 {} IN IP4 127.0.0.1\r\ns={}\r\n", version, name)
    }
}

#[async_trait]
impl PeerTransport for FakeTransport {
    async fn create_offer(&self) -> Result<SessionDescription> {
        self.record("create_offer");
        self.offer_started.notify_one();
        if self.hold_offers.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        Ok(SessionDescription::offer(self.next_sdp("offer")))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        self.record("create_answer");
        if self.fail_answers.load(Ordering::SeqCst) {
            return Err(CallError::Negotiation("answer rejected".to_string()));
        }
        Ok(SessionDescription::answer(self.next_sdp("answer")))
    }

    async fn set_local_description(&self, description: &SessionDescription) -> Result<()> {
        self.record(format!("set_local:{}", description.sdp_type));
        Ok(())
    }

    async fn set_remote_description(&self, description: &SessionDescription) -> Result<()> {
        self.record(format!("set_remote:{}", description.sdp_type));
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        self.record("rollback");
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> Result<()> {
        self.candidates.lock().push(candidate.clone());
        Ok(())
    }

    async fn add_track(&self, track: &LocalTrack) -> Result<()> {
        self.record(format!("add_track:{}", track.kind()));
        self.sending.lock().push(track.id().to_string());
        Ok(())
    }

    async fn replace_track(&self, old: &LocalTrack, new: &LocalTrack) -> Result<()> {
        self.record("replace_track");
        let mut sending = self.sending.lock();
        match sending.iter_mut().find(|id| id.as_str() == old.id()) {
            Some(slot) => {
                *slot = new.id().to_string();
                Ok(())
            }
            None => Err(CallError::Negotiation(format!("No sender for {}", old.id()))),
        }
    }

    async fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
