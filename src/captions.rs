use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use videocore::types::captions::{ClosedCaption, ClosedCaptionEvent};
use videocore::types::events::Event;

use crate::dispatch::Dispatcher;

/// Keys remembered for de-duplication, oldest forgotten first.
const SEEN_KEYS_LIMIT: usize = 64;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClosedCaptionsSettings {
    pub visibility_duration_ms: u64,
    pub auto_dismiss_captions: bool,
    pub max_visible_captions: usize,
}

impl Default for ClosedCaptionsSettings {
    fn default() -> Self {
        Self {
            visibility_duration_ms: 2_700,
            auto_dismiss_captions: true,
            max_visible_captions: 2,
        }
    }
}

impl ClosedCaptionsSettings {
    pub fn visibility_duration(&self) -> Duration {
        Duration::from_millis(self.visibility_duration_ms)
    }
}

type CaptionKey = (String, DateTime<Utc>);

struct Captions {
    settings: ClosedCaptionsSettings,
    visible: VecDeque<ClosedCaption>,
    seen: HashSet<CaptionKey>,
    seen_order: VecDeque<CaptionKey>,
    closed_captioning: bool,
    expiry: Option<JoinHandle<()>>,
    generation: u64,
}

impl Captions {
    /// Returns false for an utterance already shown.
    fn remember(&mut self, caption: &ClosedCaption) -> bool {
        let key = (caption.speaker_id.clone(), caption.start_time);
        if !self.seen.insert(key.clone()) {
            return false;
        }
        self.seen_order.push_back(key);
        while self.seen_order.len() > SEEN_KEYS_LIMIT {
            if let Some(old) = self.seen_order.pop_front() {
                self.seen.remove(&old);
            }
        }
        true
    }

    fn cancel_expiry(&mut self) {
        self.generation += 1;
        if let Some(task) = self.expiry.take() {
            task.abort();
        }
    }

    fn snapshot(&self) -> Vec<ClosedCaption> {
        self.visible.iter().cloned().collect()
    }
}

/// Bounded queue of the captions currently on screen.
///
/// New captions push out the oldest once `max_visible_captions` is reached.
/// With auto-dismiss on, the oldest caption is removed every
/// `visibility_duration` while the queue is non-empty; each new caption
/// restarts that countdown.
#[derive(Clone)]
pub struct ClosedCaptionManager {
    inner: Arc<Mutex<Captions>>,
    dispatcher: Dispatcher,
}

impl ClosedCaptionManager {
    pub fn new(settings: ClosedCaptionsSettings, dispatcher: Dispatcher) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Captions {
                settings,
                visible: VecDeque::new(),
                seen: HashSet::new(),
                seen_order: VecDeque::new(),
                closed_captioning: false,
                expiry: None,
                generation: 0,
            })),
            dispatcher,
        }
    }

    pub fn handle_event(&self, event: ClosedCaptionEvent) {
        match event {
            ClosedCaptionEvent::Started => {
                self.lock().closed_captioning = true;
                debug!(target: "Captions", "Closed captioning started");
            }
            ClosedCaptionEvent::Stopped => {
                self.lock().closed_captioning = false;
                debug!(target: "Captions", "Closed captioning stopped");
            }
            ClosedCaptionEvent::Caption(caption) => self.add(caption),
        }
    }

    fn add(&self, caption: ClosedCaption) {
        let mut captions = self.lock();
        captions.closed_captioning = true;
        if !captions.remember(&caption) {
            trace!(target: "Captions", "Dropping duplicate caption from {}", caption.speaker_id);
            return;
        }

        captions.visible.push_back(caption);
        let limit = captions.settings.max_visible_captions;
        while captions.visible.len() > limit {
            captions.visible.pop_front();
        }
        self.dispatcher
            .emit(Event::ClosedCaptionsUpdated(captions.snapshot()));

        if captions.settings.auto_dismiss_captions {
            captions.cancel_expiry();
            self.schedule_expiry(&mut captions);
        }
    }

    fn schedule_expiry(&self, captions: &mut Captions) {
        if captions.visible.is_empty() {
            return;
        }
        let generation = captions.generation;
        let delay = captions.settings.visibility_duration();
        let manager = self.clone();
        captions.expiry = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            manager.expire_oldest(generation);
        }));
    }

    fn expire_oldest(&self, generation: u64) {
        let mut captions = self.lock();
        if captions.generation != generation {
            return;
        }
        captions.expiry = None;
        if captions.visible.pop_front().is_none() {
            return;
        }
        self.dispatcher
            .emit(Event::ClosedCaptionsUpdated(captions.snapshot()));
        self.schedule_expiry(&mut captions);
    }

    /// Drops every caption and cancels the pending expiry.
    pub fn clear(&self) {
        let mut captions = self.lock();
        captions.cancel_expiry();
        captions.seen.clear();
        captions.seen_order.clear();
        captions.closed_captioning = false;
        if !captions.visible.is_empty() {
            captions.visible.clear();
            self.dispatcher.emit(Event::ClosedCaptionsUpdated(Vec::new()));
        }
    }

    /// Applies to captions added from now on.
    pub fn update_settings(&self, settings: ClosedCaptionsSettings) {
        let mut captions = self.lock();
        if !settings.auto_dismiss_captions {
            captions.cancel_expiry();
        }
        captions.settings = settings;
    }

    pub fn captions(&self) -> Vec<ClosedCaption> {
        self.lock().snapshot()
    }

    pub fn is_closed_captioning(&self) -> bool {
        self.lock().closed_captioning
    }

    fn lock(&self) -> MutexGuard<'_, Captions> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
