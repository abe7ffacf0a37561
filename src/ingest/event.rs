//! Raw browsing events as delivered by an event source or activity log
//!
//! Wire format is one JSON object per event, tagged by `e`:
//! `{"e":"query-entered","t":1700000000000,"q":"cats","url":"...","se":"google"}`.
//! Field names follow the short keys used by the event sources.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::model::Timestamp;

/// Accept integer or float milliseconds, or a numeric string. Anything else
/// (null, NaN, garbage) decodes as `None` so the event is still processed.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<Timestamp>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    let as_millis = |f: f64| f.is_finite().then_some(f as Timestamp);

    Ok(value.and_then(|v| match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(as_millis)),
        Value::String(s) => s.trim().parse::<f64>().ok().and_then(as_millis),
        _ => None,
    }))
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QueryEntered {
    #[serde(rename = "t", default, deserialize_with = "lenient_timestamp")]
    pub time: Option<Timestamp>,
    #[serde(rename = "q", default)]
    pub query: String,
    #[serde(default)]
    pub url: String,
    #[serde(rename = "se", default)]
    pub search_engine: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PageLoaded {
    #[serde(rename = "t", default, deserialize_with = "lenient_timestamp")]
    pub time: Option<Timestamp>,
    #[serde(default)]
    pub url: String,
    #[serde(rename = "ttl", default)]
    pub title: String,
    #[serde(rename = "fav", default)]
    pub favicon: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LinkClicked {
    #[serde(rename = "t", default, deserialize_with = "lenient_timestamp")]
    pub time: Option<Timestamp>,
    /// Page the link was clicked on
    #[serde(default)]
    pub url: String,
    #[serde(rename = "turl", default)]
    pub target_url: String,
    /// The click happened on a search engine results page
    #[serde(rename = "sr", default)]
    pub is_serp: bool,
    /// Query shown on the results page, for SERP clicks
    #[serde(rename = "q", default)]
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PageFocused {
    #[serde(rename = "t", default, deserialize_with = "lenient_timestamp")]
    pub time: Option<Timestamp>,
    #[serde(default)]
    pub url: String,
    #[serde(rename = "ttl", default)]
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PageBlurred {
    #[serde(rename = "t", default, deserialize_with = "lenient_timestamp")]
    pub time: Option<Timestamp>,
    #[serde(default)]
    pub url: String,
}

/// A browsing event, decoded once at the ingestion boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "e", rename_all = "kebab-case")]
pub enum RawEvent {
    QueryEntered(QueryEntered),
    PageLoaded(PageLoaded),
    LinkClicked(LinkClicked),
    PageFocused(PageFocused),
    PageBlurred(PageBlurred),
}

impl RawEvent {
    pub fn time(&self) -> Option<Timestamp> {
        match self {
            RawEvent::QueryEntered(e) => e.time,
            RawEvent::PageLoaded(e) => e.time,
            RawEvent::LinkClicked(e) => e.time,
            RawEvent::PageFocused(e) => e.time,
            RawEvent::PageBlurred(e) => e.time,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RawEvent::QueryEntered(_) => "query-entered",
            RawEvent::PageLoaded(_) => "page-loaded",
            RawEvent::LinkClicked(_) => "link-clicked",
            RawEvent::PageFocused(_) => "page-focused",
            RawEvent::PageBlurred(_) => "page-blurred",
        }
    }

    pub fn query(time: Timestamp, query: &str, url: &str, search_engine: &str) -> Self {
        RawEvent::QueryEntered(QueryEntered {
            time: Some(time),
            query: query.to_string(),
            url: url.to_string(),
            search_engine: search_engine.to_string(),
        })
    }

    pub fn load(time: Timestamp, url: &str, title: &str) -> Self {
        RawEvent::PageLoaded(PageLoaded {
            time: Some(time),
            url: url.to_string(),
            title: title.to_string(),
            favicon: String::new(),
        })
    }

    pub fn click(time: Timestamp, url: &str, target_url: &str, is_serp: bool, query: &str) -> Self {
        RawEvent::LinkClicked(LinkClicked {
            time: Some(time),
            url: url.to_string(),
            target_url: target_url.to_string(),
            is_serp,
            query: query.to_string(),
        })
    }

    pub fn focus(time: Timestamp, url: &str, title: &str) -> Self {
        RawEvent::PageFocused(PageFocused {
            time: Some(time),
            url: url.to_string(),
            title: title.to_string(),
        })
    }

    pub fn blur(time: Timestamp, url: &str) -> Self {
        RawEvent::PageBlurred(PageBlurred {
            time: Some(time),
            url: url.to_string(),
        })
    }
}
