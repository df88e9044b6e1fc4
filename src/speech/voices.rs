use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};

/// One synthetic voice offered by the host engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceDescriptor {
    pub name: String,
    /// BCP 47 locale, e.g. "en-IN"
    pub lang: String,
    #[serde(default)]
    pub voice_uri: String,
    #[serde(default)]
    pub local_service: bool,
    #[serde(default)]
    pub default: bool,
}

impl VoiceDescriptor {
    pub fn new(name: impl Into<String>, lang: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            voice_uri: name.clone(),
            name,
            lang: lang.into(),
            local_service: true,
            default: false,
        }
    }
}

/// Lower-case and use `-` as the subtag separator, so "en_IN" and "EN-in"
/// compare equal to "en-IN".
pub fn normalize_locale(tag: &str) -> String {
    tag.trim().replace('_', "-").to_ascii_lowercase()
}

/// Outcome of voice selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceMatch {
    /// `<language>-<preferred region>`
    Region(VoiceDescriptor),
    /// `<language>-*`
    Prefix(VoiceDescriptor),
    /// locale equals the language tag
    Exact(VoiceDescriptor),
    /// nothing bound, the engine picks from the language tag alone
    EngineDefault,
}

impl VoiceMatch {
    pub fn voice(&self) -> Option<&VoiceDescriptor> {
        match self {
            VoiceMatch::Region(v) | VoiceMatch::Prefix(v) | VoiceMatch::Exact(v) => Some(v),
            VoiceMatch::EngineDefault => None,
        }
    }
}

/// Pick a voice for `language`. The first catalog voice that is either the
/// regional voice or any `<language>-*` voice wins, so catalog order decides
/// between them.
pub fn select_voice(voices: &[VoiceDescriptor], language: &str, region: &str) -> VoiceMatch {
    let lang = normalize_locale(language);
    if lang.is_empty() {
        return VoiceMatch::EngineDefault;
    }

    let region = normalize_locale(region);
    let regional = (!region.is_empty()).then(|| format!("{}-{}", lang, region));
    let prefix = format!("{}-", lang);

    for v in voices {
        let locale = normalize_locale(&v.lang);
        if regional.as_deref() == Some(locale.as_str()) {
            return VoiceMatch::Region(v.clone());
        }
        if locale.starts_with(&prefix) {
            return VoiceMatch::Prefix(v.clone());
        }
    }

    if let Some(v) = voices.iter().find(|v| normalize_locale(&v.lang) == lang) {
        return VoiceMatch::Exact(v.clone());
    }

    VoiceMatch::EngineDefault
}

/// Latest voice list pushed by the host. Cheap to clone; all clones share
/// the same list.
#[derive(Debug, Clone, Default)]
pub struct VoiceCatalog {
    voices: Arc<RwLock<Vec<VoiceDescriptor>>>,
}

impl VoiceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&self, voices: Vec<VoiceDescriptor>) {
        let mut guard = self.voices.write().unwrap_or_else(PoisonError::into_inner);
        *guard = voices;
    }

    pub fn snapshot(&self) -> Vec<VoiceDescriptor> {
        self.voices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.voices.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

}
