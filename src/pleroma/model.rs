use serde::{Deserialize, Serialize};

/// Body of `POST /api/v1/statuses`. Empty fields are left out of the JSON.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct StatusCreateRequest {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub status: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub content_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_reply_to_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub media_ids: Vec<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub sensitive: bool,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct Status {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
}

/// Every Pleroma reply may carry an `error` string instead of the payload.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(flatten)]
    pub payload: T,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct MediaResponse {
    #[serde(default)]
    pub id: String,
}
