//! Activity events - the facts the progression engine reduces
//!
//! Events arrive as loosely-shaped JSON documents (`RawActivity`) and are
//! validated once, at the boundary, into the closed `ActivityEvent` type.
//! Everything past the boundary matches on `Activity` instead of probing
//! optional fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{EventId, HabitId, UserId};

/// How hard a habit is; scales the XP of a completion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "easy" => Some(Self::Easy),
            "medium" => Some(Self::Medium),
            "hard" => Some(Self::Hard),
            _ => None,
        }
    }
}

/// Stat category a habit trains
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Attribute {
    Strength,
    Intellect,
    Vitality,
    Creativity,
    Focus,
    Spirit,
}

impl Attribute {
    pub const ALL: [Attribute; 6] = [
        Self::Strength,
        Self::Intellect,
        Self::Vitality,
        Self::Creativity,
        Self::Focus,
        Self::Spirit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strength => "strength",
            Self::Intellect => "intellect",
            Self::Vitality => "vitality",
            Self::Creativity => "creativity",
            Self::Focus => "focus",
            Self::Spirit => "spirit",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.as_str() == s)
    }
}

impl std::fmt::Display for Attribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// What the user did. One case per activity type, carrying only the
/// fields that matter for that case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Activity {
    HabitCompletion {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        habit_id: Option<HabitId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        difficulty: Option<Difficulty>,
    },
    JoinedChallenge,
    JoinedTribe,
    ReflectionSaved,
    /// A type this build does not know. Awards nothing.
    Unrecognized { kind: String },
}

impl Activity {
    /// Wire name of the activity type
    pub fn kind(&self) -> &str {
        match self {
            Self::HabitCompletion { .. } => "habit_completion",
            Self::JoinedChallenge => "joined_challenge",
            Self::JoinedTribe => "joined_tribe",
            Self::ReflectionSaved => "reflection_saved",
            Self::Unrecognized { kind } => kind,
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, Self::Unrecognized { .. })
    }
}

/// An immutable fact: something a user did that may award XP
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub event_id: EventId,
    pub user_id: UserId,
    /// Streak length (days) of the habit at the time of the event
    pub streak_day: Option<u32>,
    /// Attribute bucket credited with the gain, for any activity type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<Attribute>,
    pub occurred_at: Option<DateTime<Utc>>,
    pub activity: Activity,
}

impl ActivityEvent {
    pub fn new(event_id: impl Into<EventId>, user_id: impl Into<UserId>, activity: Activity) -> Self {
        Self {
            event_id: event_id.into(),
            user_id: user_id.into(),
            streak_day: None,
            attribute: None,
            occurred_at: None,
            activity,
        }
    }

    pub fn with_streak_day(mut self, streak_day: u32) -> Self {
        self.streak_day = Some(streak_day);
        self
    }

    pub fn with_attribute(mut self, attribute: Attribute) -> Self {
        self.attribute = Some(attribute);
        self
    }

    /// Shorthand for a habit completion event
    pub fn habit_completion(
        event_id: impl Into<EventId>,
        user_id: impl Into<UserId>,
        difficulty: Option<Difficulty>,
        attribute: Option<Attribute>,
    ) -> Self {
        let mut event = Self::new(
            event_id,
            user_id,
            Activity::HabitCompletion {
                habit_id: None,
                difficulty,
            },
        );
        event.attribute = attribute;
        event
    }
}

/// Reasons an incoming event is rejected outright
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedEvent {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },

    #[error("Event {event_id} belongs to user {event_user}, not {requested_user}")]
    UserMismatch {
        event_id: String,
        event_user: String,
        requested_user: String,
    },

    #[error("Invalid event JSON: {0}")]
    Json(String),
}

/// Event document as written by clients
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawActivity {
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default, rename = "type")]
    pub activity_type: Option<String>,
    #[serde(default)]
    pub habit_id: Option<String>,
    #[serde(default)]
    pub difficulty: Option<String>,
    #[serde(default)]
    pub attribute: Option<String>,
    #[serde(default)]
    pub streak_day: Option<u32>,
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
}

fn required(value: Option<String>, field: &'static str) -> Result<String, MalformedEvent> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(MalformedEvent::MissingField(field)),
    }
}

impl TryFrom<RawActivity> for ActivityEvent {
    type Error = MalformedEvent;

    fn try_from(raw: RawActivity) -> Result<Self, Self::Error> {
        let user_id = required(raw.user_id, "userId")?;
        let event_id = required(raw.event_id, "eventId")?;
        let kind = required(raw.activity_type, "type")?;

        let activity = match kind.as_str() {
            "habit_completion" => {
                let difficulty = raw
                    .difficulty
                    .map(|d| {
                        Difficulty::parse(&d).ok_or(MalformedEvent::InvalidValue {
                            field: "difficulty",
                            value: d,
                        })
                    })
                    .transpose()?;
                Activity::HabitCompletion {
                    habit_id: raw.habit_id.map(HabitId::from),
                    difficulty,
                }
            }
            "joined_challenge" => Activity::JoinedChallenge,
            "joined_tribe" => Activity::JoinedTribe,
            "reflection_saved" => Activity::ReflectionSaved,
            _ => Activity::Unrecognized { kind },
        };

        // Unrecognized types award nothing, so their attribute is not checked
        let attribute = match raw.attribute {
            Some(a) if activity.is_recognized() => {
                Some(Attribute::parse(&a).ok_or(MalformedEvent::InvalidValue {
                    field: "attribute",
                    value: a,
                })?)
            }
            _ => None,
        };

        Ok(Self {
            event_id: EventId::from(event_id),
            user_id: UserId::from(user_id),
            streak_day: raw.streak_day,
            attribute,
            occurred_at: raw.occurred_at,
            activity,
        })
    }
}

impl ActivityEvent {
    /// Parse a single JSON event document
    pub fn from_json(json: &str) -> Result<Self, MalformedEvent> {
        let raw: RawActivity =
            serde_json::from_str(json).map_err(|e| MalformedEvent::Json(e.to_string()))?;
        Self::try_from(raw)
    }
}
