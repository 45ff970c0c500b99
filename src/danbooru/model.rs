use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};

/// Content rating of a post.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
pub enum Rating {
    #[serde(rename = "s")]
    Safe,
    #[serde(rename = "q")]
    Questionable,
    #[serde(rename = "e")]
    Explicit,
    #[default]
    #[serde(other)]
    Unknown,
}

impl Rating {
    pub fn is_safe(&self) -> bool {
        matches!(self, Rating::Safe)
    }
}

/// Post as returned by `/posts.json`. Only the fields the relay reads are kept.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Post {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: u64,
    #[serde(default, deserialize_with = "lenient_time")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub rating: Rating,
    #[serde(default, deserialize_with = "null_as_default")]
    pub file_url: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub file_ext: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tag_string_character: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_pending: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_deleted: bool,
}

impl Post {
    /// Character tags in board order, empty tokens dropped.
    pub fn character_tags(&self) -> impl Iterator<Item = &str> {
        self.tag_string_character.split_whitespace()
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct CountResponse {
    pub counts: Counts,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Counts {
    #[serde(default)]
    pub posts: u64,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// Anything that is not an RFC 3339 string (null, numbers) means "unknown".
fn lenient_time<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::String(s) => DateTime::parse_from_rfc3339(&s)
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(serde::de::Error::custom),
        _ => Ok(None),
    }
}
