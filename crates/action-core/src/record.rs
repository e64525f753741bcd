use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Longest `screen` value sent to the action endpoint, in characters.
pub const SCREEN_MAX_CHARS: usize = 63;
/// Longest `extra` value sent to the action endpoint, in characters.
pub const EXTRA_MAX_CHARS: usize = 127;

// ---------------------------------------------------------------------------
// KnownAction
// ---------------------------------------------------------------------------

/// Action names emitted by the apps. Any other string is still a valid name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KnownAction {
    AppOpen,
    ScreenView,
    QuestionAnswered,
    SectionStarted,
    SectionCompleted,
    SignIn,
    SignOut,
    Custom(String),
}

impl KnownAction {
    /// Every built-in name, in the order they are listed to users.
    pub const BUILTIN: &'static [KnownAction] = &[
        KnownAction::AppOpen,
        KnownAction::ScreenView,
        KnownAction::QuestionAnswered,
        KnownAction::SectionStarted,
        KnownAction::SectionCompleted,
        KnownAction::SignIn,
        KnownAction::SignOut,
    ];

    pub fn is_custom(&self) -> bool {
        matches!(self, Self::Custom(_))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::AppOpen => "app_open",
            Self::ScreenView => "screen_view",
            Self::QuestionAnswered => "question_answered",
            Self::SectionStarted => "section_started",
            Self::SectionCompleted => "section_completed",
            Self::SignIn => "sign_in",
            Self::SignOut => "sign_out",
            Self::Custom(s) => s.as_str(),
        }
    }
}

impl std::fmt::Display for KnownAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for KnownAction {
    fn from(name: &str) -> Self {
        Self::BUILTIN
            .iter()
            .find(|known| known.as_str() == name)
            .cloned()
            .unwrap_or_else(|| Self::Custom(name.to_string()))
    }
}

impl From<KnownAction> for String {
    fn from(action: KnownAction) -> Self {
        match action {
            KnownAction::Custom(s) => s,
            other => other.as_str().to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// ActionOptions
// ---------------------------------------------------------------------------

/// Optional context attached to an action.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionOptions {
    pub screen: Option<String>,
    pub extra: Option<String>,
    pub section_uid: Option<String>,
}

impl ActionOptions {
    pub fn screen(mut self, screen: impl Into<String>) -> Self {
        self.screen = Some(screen.into());
        self
    }

    pub fn extra(mut self, extra: impl Into<String>) -> Self {
        self.extra = Some(extra.into());
        self
    }

    pub fn section_uid(mut self, uid: impl Into<String>) -> Self {
        self.section_uid = Some(uid.into());
        self
    }
}

// ---------------------------------------------------------------------------
// ActionRecord
// ---------------------------------------------------------------------------

/// A single event, captured at the moment it happened.
///
/// The timestamp is fixed at construction so a record that waits in the
/// dispatcher queue still reports when the user acted, not when the request
/// left the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRecord {
    pub name: String,
    pub client_timestamp: DateTime<Utc>,
    pub screen: Option<String>,
    pub extra: Option<String>,
    pub section_uid: Option<String>,
}

impl ActionRecord {
    pub fn new(name: impl Into<String>, opts: ActionOptions) -> Self {
        Self::at(name, opts, Utc::now())
    }

    /// Build a record with an explicit timestamp (used when replaying a log).
    pub fn at(
        name: impl Into<String>,
        opts: ActionOptions,
        client_timestamp: DateTime<Utc>,
    ) -> Self {
        ActionRecord {
            name: name.into(),
            client_timestamp,
            screen: opts.screen,
            extra: opts.extra,
            section_uid: opts.section_uid,
        }
    }

    /// The body POSTed to `/patient/action`.
    pub fn payload(&self) -> ActionPayload {
        ActionPayload {
            action: self.name.clone(),
            client_timestamp: self
                .client_timestamp
                .to_rfc3339_opts(SecondsFormat::Millis, true),
            screen: non_empty(&self.screen).map(|s| truncate_chars(s, SCREEN_MAX_CHARS)),
            extra: non_empty(&self.extra).map(|s| truncate_chars(s, EXTRA_MAX_CHARS)),
            section_uid: non_empty(&self.section_uid).map(str::to_string),
        }
    }

    /// Properties mirrored to the local analytics sink alongside the POST.
    pub fn track_properties(&self) -> serde_json::Value {
        let mut props = serde_json::Map::new();
        if let Some(screen) = non_empty(&self.screen) {
            props.insert("screen".into(), screen.into());
        }
        if let Some(extra) = non_empty(&self.extra) {
            props.insert("extra".into(), extra.into());
        }
        if let Some(uid) = non_empty(&self.section_uid) {
            props.insert("section_uid".into(), uid.into());
        }
        serde_json::Value::Object(props)
    }
}

// ---------------------------------------------------------------------------
// ActionPayload
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionPayload {
    pub action: String,
    pub client_timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screen: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_uid: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

/// Keep at most `max` characters, never splitting a code point.
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
