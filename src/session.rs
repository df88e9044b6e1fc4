//! Page-level state: one identification request at a time, its result,
//! and the narration of that result.

use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::identify::{
    load_image_file, IdentificationResult, IdentifyError, IdentifyRequest, MedicineIdentifier,
};
use crate::speech::{Notification, Notifier, SpeechController, SpeechError, ToggleAction};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "data", rename_all = "lowercase")]
pub enum RequestState {
    Idle,
    Loading,
    Success(IdentificationResult),
    Failed(String),
}

impl RequestState {
    pub fn result(&self) -> Option<&IdentificationResult> {
        match self {
            RequestState::Success(result) => Some(result),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, RequestState::Loading)
    }
}

struct SessionInner {
    request: RequestState,
    language: String,
}

pub struct IdentificationSession {
    identifier: Arc<dyn MedicineIdentifier>,
    speech: SpeechController,
    notifier: Arc<dyn Notifier>,
    inner: Mutex<SessionInner>,
}

impl IdentificationSession {
    pub fn new(
        identifier: Arc<dyn MedicineIdentifier>,
        speech: SpeechController,
        notifier: Arc<dyn Notifier>,
        default_language: impl Into<String>,
    ) -> Self {
        Self {
            identifier,
            speech,
            notifier,
            inner: Mutex::new(SessionInner {
                request: RequestState::Idle,
                language: default_language.into(),
            }),
        }
    }

    fn inner(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> RequestState {
        self.inner().request.clone()
    }

    pub fn result(&self) -> Option<IdentificationResult> {
        self.inner().request.result().cloned()
    }

    pub fn language(&self) -> String {
        self.inner().language.clone()
    }

    pub fn speech(&self) -> &SpeechController {
        &self.speech
    }

    /// Identify the medicine in `photo_data_uri`, answering in `language`.
    ///
    /// A submit while another request is loading is refused and returns the
    /// current state.
    pub async fn submit(&self, photo_data_uri: &str, language: &str) -> RequestState {
        if !self.begin(language) {
            return self.state();
        }

        let outcome = self
            .identifier
            .identify(IdentifyRequest {
                photo_data_uri: photo_data_uri.to_string(),
                language: language.to_string(),
            })
            .await;

        self.finish(outcome)
    }

    /// Like [`submit`](Self::submit), reading and encoding the photo first.
    pub async fn submit_file(&self, path: &Path, language: &str) -> RequestState {
        if !self.begin(language) {
            return self.state();
        }

        let outcome = match load_image_file(path).await {
            Ok(photo_data_uri) => {
                self.identifier
                    .identify(IdentifyRequest {
                        photo_data_uri,
                        language: language.to_string(),
                    })
                    .await
            }
            Err(e) => Err(e),
        };

        self.finish(outcome)
    }

    /// Read the current result's uses aloud, or stop reading.
    pub fn speak_uses(&self) -> Result<ToggleAction, SpeechError> {
        let (uses, language) = {
            let inner = self.inner();
            let uses = inner
                .request
                .result()
                .map(|r| r.uses.clone())
                .unwrap_or_default();
            (uses, inner.language.clone())
        };
        self.speech.toggle(&uses, &language)
    }

    /// Change the response language. Narration of the old text stops.
    pub fn set_language(&self, language: &str) {
        {
            let mut inner = self.inner();
            if inner.language == language {
                return;
            }
            inner.language = language.to_string();
        }
        self.speech.reset();
    }

    pub fn close(&self) {
        self.speech.dispose();
    }

    /// Move to `Loading`, dropping the previous result.
    fn begin(&self, language: &str) -> bool {
        {
            let mut inner = self.inner();
            if inner.request.is_loading() {
                tracing::warn!("[Session] Identification already in progress, ignoring submit");
                return false;
            }
            inner.request = RequestState::Loading;
            inner.language = language.to_string();
        }
        tracing::info!("[Session] Identifying medicine (language {})", language);
        self.speech.reset();
        true
    }

    fn finish(&self, outcome: Result<IdentificationResult, IdentifyError>) -> RequestState {
        let next = match outcome {
            Ok(result) => {
                tracing::info!("[Session] Identified '{}'", result.medicine_name);
                RequestState::Success(result)
            }
            Err(e) => {
                tracing::error!("[Session] Error identifying medicine: {}", e);
                let message = e.friendly_message();
                self.notifier
                    .notify(Notification::error("Identification Error", message.clone()));
                RequestState::Failed(message)
            }
        };

        self.inner().request = next.clone();
        self.speech.reset();
        next
    }
}

impl Drop for IdentificationSession {
    fn drop(&mut self) {
        self.close();
    }
}
