use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

use super::engine::{
    ListenerSet, NarrationEngine, Utterance, UtteranceCallbacks, UtteranceId,
    VoiceSubscription, VoicesChangedListener,
};
use super::voices::VoiceDescriptor;

/// Sent to the host, which performs the actual synthesis
/// (e.g. a webview running `window.speechSynthesis`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum HostCommand {
    Speak(Utterance),
    Cancel,
}

/// Reported back by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum HostEvent {
    Capability {
        supported: bool,
    },
    VoicesChanged {
        voices: Vec<VoiceDescriptor>,
    },
    Started {
        id: UtteranceId,
    },
    Ended {
        id: UtteranceId,
    },
    Failed {
        id: UtteranceId,
        #[serde(default)]
        error: Option<String>,
    },
}

struct BridgeState {
    supported: bool,
    voices: Vec<VoiceDescriptor>,
    pending: HashMap<UtteranceId, Arc<UtteranceCallbacks>>,
    speaking: Option<UtteranceId>,
}

/// Narration engine that delegates synthesis to a frontend.
///
/// The backend cannot reach the host's speech API directly, so every
/// `speak`/`cancel` becomes a [`HostCommand`] on a channel, and the host
/// answers with [`HostEvent`]s passed to [`BridgeEngine::dispatch`].
pub struct BridgeEngine {
    commands: mpsc::UnboundedSender<HostCommand>,
    state: Mutex<BridgeState>,
    listeners: ListenerSet,
}

impl BridgeEngine {
    /// Assumes the host supports speech until it reports otherwise.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<HostCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let engine = Self {
            commands: tx,
            state: Mutex::new(BridgeState {
                supported: true,
                voices: Vec::new(),
                pending: HashMap::new(),
                speaking: None,
            }),
            listeners: ListenerSet::new(),
        };
        (engine, rx)
    }

    fn state(&self) -> MutexGuard<'_, BridgeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscriber_count(&self) -> usize {
        self.listeners.len()
    }

    /// Apply one event from the host. Callbacks run after the internal lock
    /// is released.
    pub fn dispatch(&self, event: HostEvent) {
        match event {
            HostEvent::Capability { supported } => {
                tracing::info!("[TTS] Host speech support: {}", supported);
                self.state().supported = supported;
            }
            HostEvent::VoicesChanged { voices } => {
                self.state().voices = voices.clone();
                self.listeners.emit(&voices);
            }
            HostEvent::Started { id } => {
                let (callbacks, skipped) = {
                    let mut state = self.state();
                    let callbacks = state.pending.get(&id).cloned();
                    let mut skipped = Vec::new();
                    if callbacks.is_some() {
                        state.speaking = Some(id);
                        // The host speaks in order, so anything older whose
                        // end was never reported is already gone.
                        let older: Vec<UtteranceId> =
                            state.pending.keys().copied().filter(|p| *p < id).collect();
                        for old in older {
                            if let Some(cb) = state.pending.remove(&old) {
                                skipped.push((old, cb));
                            }
                        }
                    }
                    (callbacks, skipped)
                };
                for (old, cb) in skipped {
                    tracing::debug!("[TTS] Host never settled utterance {}, dropping it", old);
                    cb.error(Some("interrupted".to_string()));
                }
                match callbacks {
                    Some(cb) => cb.start(),
                    None => tracing::debug!("[TTS] Host started unknown utterance {}", id),
                }
            }
            HostEvent::Ended { id } => match self.finish(id) {
                Some(cb) => cb.end(),
                None => tracing::debug!("[TTS] Host ended unknown utterance {}", id),
            },
            HostEvent::Failed { id, error } => match self.finish(id) {
                Some(cb) => cb.error(error),
                None => tracing::debug!("[TTS] Host failed unknown utterance {}: {:?}", id, error),
            },
        }
    }

    /// Parse and apply a JSON event as delivered over IPC.
    pub fn dispatch_json(&self, raw: &str) -> Result<(), String> {
        let event: HostEvent =
            serde_json::from_str(raw).map_err(|e| format!("Invalid host event: {}", e))?;
        self.dispatch(event);
        Ok(())
    }

    fn finish(&self, id: UtteranceId) -> Option<Arc<UtteranceCallbacks>> {
        let mut state = self.state();
        if state.speaking == Some(id) {
            state.speaking = None;
        }
        state.pending.remove(&id)
    }

    /// Host is gone: settle every outstanding utterance as cancelled.
    fn abandon_pending(&self) {
        let pending: Vec<Arc<UtteranceCallbacks>> = {
            let mut state = self.state();
            state.speaking = None;
            state.pending.drain().map(|(_, cb)| cb).collect()
        };
        for cb in pending {
            cb.error(Some("canceled".to_string()));
        }
    }
}

impl NarrationEngine for BridgeEngine {
    fn is_supported(&self) -> bool {
        self.state().supported
    }

    fn voices(&self) -> Vec<VoiceDescriptor> {
        self.state().voices.clone()
    }

    fn speak(&self, utterance: Utterance, callbacks: UtteranceCallbacks) {
        let id = utterance.id;
        let callbacks = Arc::new(callbacks);
        self.state().pending.insert(id, callbacks.clone());

        if self.commands.send(HostCommand::Speak(utterance)).is_err() {
            tracing::error!("[TTS] Host channel closed, cannot speak utterance {}", id);
            self.state().pending.remove(&id);
            callbacks.error(Some("synthesis-unavailable".to_string()));
        }
    }

    fn cancel(&self) {
        if self.commands.send(HostCommand::Cancel).is_err() {
            tracing::warn!("[TTS] Host channel closed, settling pending utterances locally");
            self.abandon_pending();
        }
    }

    fn is_speaking(&self) -> bool {
        let state = self.state();
        state.speaking.is_some() || !state.pending.is_empty()
    }

    fn subscribe_voices_changed(&self, listener: VoicesChangedListener) -> VoiceSubscription {
        self.listeners.subscribe(listener)
    }
}
