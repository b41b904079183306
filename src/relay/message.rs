// Message, mailbox and store types for the relay

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;

/// A message addressed to a single recipient.
///
/// On the wire and on disk the body is called `message` and the creation
/// time `timestamp`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,
    /// Who sent the message
    pub sender: String,
    /// Message content
    #[serde(rename = "message")]
    pub body: String,
    /// When the store accepted the message (UTC)
    #[serde(rename = "timestamp", with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Create a message stamped with the current time
    pub fn new(id: String, sender: String, body: String) -> Self {
        Self {
            id,
            sender,
            body,
            // Stored form carries microseconds
            created_at: Utc::now().trunc_subsecs(6),
        }
    }

    /// Generate a fresh message ID
    pub fn generate_id() -> String {
        Uuid::new_v4().to_string()
    }
}

/// Messages for one recipient, in insertion order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Mailbox {
    messages: Vec<Message>,
}

impl Mailbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Messages in insertion order
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.messages.iter().any(|m| m.id == id)
    }

    /// Messages created strictly after `since`, keeping insertion order
    pub fn since(&self, since: &DateTime<Utc>) -> Vec<Message> {
        self.messages
            .iter()
            .filter(|m| m.created_at > *since)
            .cloned()
            .collect()
    }

    /// The half-open slice `[start, stop)` of the messages sorted by time.
    ///
    /// Offsets past the end are clamped, and `start >= stop` gives an empty
    /// result. Messages with equal timestamps keep their insertion order.
    pub fn range(&self, start: usize, stop: usize) -> Vec<Message> {
        let mut sorted: Vec<&Message> = self.messages.iter().collect();
        sorted.sort_by_key(|m| m.created_at);

        let stop = stop.min(sorted.len());
        if start >= stop {
            return Vec::new();
        }

        sorted[start..stop].iter().map(|m| (*m).clone()).collect()
    }

    /// Remove every message whose ID is in `ids`, returning how many went
    pub fn remove_ids(&mut self, ids: &HashSet<String>) -> usize {
        let before = self.messages.len();
        self.messages.retain(|m| !ids.contains(&m.id));
        before - self.messages.len()
    }

    /// First ID that appears more than once, if any
    fn duplicate_id(&self) -> Option<&str> {
        let mut seen = HashSet::with_capacity(self.messages.len());
        self.messages
            .iter()
            .find(|m| !seen.insert(m.id.as_str()))
            .map(|m| m.id.as_str())
    }
}

impl From<Vec<Message>> for Mailbox {
    fn from(messages: Vec<Message>) -> Self {
        Self { messages }
    }
}

/// Every mailbox, keyed by recipient. This is the unit of load and save.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Store {
    mailboxes: BTreeMap<String, Mailbox>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mailbox(&self, recipient: &str) -> Option<&Mailbox> {
        self.mailboxes.get(recipient)
    }

    pub fn mailbox_mut(&mut self, recipient: &str) -> Option<&mut Mailbox> {
        self.mailboxes.get_mut(recipient)
    }

    /// Get the recipient's mailbox, creating it if absent
    pub fn mailbox_entry(&mut self, recipient: &str) -> &mut Mailbox {
        self.mailboxes.entry(recipient.to_string()).or_default()
    }

    pub fn remove_mailbox(&mut self, recipient: &str) -> Option<Mailbox> {
        self.mailboxes.remove(recipient)
    }

    /// Whether any mailbox holds a message with this ID
    pub fn contains_id(&self, id: &str) -> bool {
        self.mailboxes.values().any(|mb| mb.contains_id(id))
    }

    pub fn message_count(&self) -> usize {
        self.mailboxes.values().map(Mailbox::len).sum()
    }

    /// Check invariants that serde cannot express
    pub fn validate(&self) -> Result<(), String> {
        for (recipient, mailbox) in &self.mailboxes {
            if let Some(id) = mailbox.duplicate_id() {
                return Err(format!(
                    "duplicate message id {} in mailbox {}",
                    id, recipient
                ));
            }
        }
        Ok(())
    }
}

impl FromIterator<(String, Mailbox)> for Store {
    fn from_iter<I: IntoIterator<Item = (String, Mailbox)>>(iter: I) -> Self {
        Self {
            mailboxes: iter.into_iter().collect(),
        }
    }
}

/// Timestamp parsing and the canonical stored form.
///
/// Stored timestamps are always RFC 3339 with microseconds and a `Z`
/// suffix, which sorts lexically in time order. Parsing is lenient: RFC
/// 3339 with any offset, naive ISO-8601 (assumed UTC) with or without
/// fractional seconds, and bare dates.
pub mod timestamp {
    use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, SubsecRound, TimeZone, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    const NAIVE_FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M",
    ];

    /// Parse any accepted form, truncated to the microseconds we store
    pub fn parse(s: &str) -> Option<DateTime<Utc>> {
        parse_exact(s).map(|ts| ts.trunc_subsecs(6))
    }

    fn parse_exact(s: &str) -> Option<DateTime<Utc>> {
        let s = s.trim();
        if s.is_empty() {
            return None;
        }

        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Some(dt.with_timezone(&Utc));
        }

        for fmt in NAIVE_FORMATS {
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
                return Some(Utc.from_utc_datetime(&naive));
            }
        }

        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|naive| Utc.from_utc_datetime(&naive))
    }

    pub fn format(ts: &DateTime<Utc>) -> String {
        ts.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    pub fn serialize<S>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format(ts))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| de::Error::custom(format!("invalid timestamp: {}", raw)))
    }
}
