//! Records shared between the ledger, the matcher and the feed
//!
//! Documents live in two collections:
//! - `users/{actorId}`: position fields plus the `heartsSent` array
//! - `matches/{matchId}`: the two matched actor ids plus `createdAt`

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Result;
use crate::geo::Coordinate;
use crate::store::{Document, StoredDocument};

/// Actor documents (positions and outgoing hearts)
pub const USERS: &str = "users";

/// Match records keyed by canonical pair id
pub const MATCHES: &str = "matches";

/// Field holding an actor's outgoing hearts
pub const HEARTS_SENT: &str = "heartsSent";

/// Stable identifier of an authenticated actor
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(String);

impl ActorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ActorId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ActorId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Canonical id of an unordered actor pair: both ids sorted, joined with `_`.
///
/// `%` and `_` inside an id are percent-escaped first, so the separator is
/// the only `_` in the key and distinct pairs never share one.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatchId(String);

impl MatchId {
    pub fn for_pair(a: &ActorId, b: &ActorId) -> Self {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        Self(format!("{}_{}", escape_key_part(lo.as_str()), escape_key_part(hi.as_str())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn escape_key_part(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    for ch in id.chars() {
        match ch {
            '%' => out.push_str("%25"),
            '_' => out.push_str("%5F"),
            other => out.push(other),
        }
    }
    out
}

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Latest reported position of one actor
#[derive(Debug, Clone, PartialEq)]
pub struct PositionRecord {
    pub actor_id: ActorId,
    pub latitude: f64,
    pub longitude: f64,
    /// Unix millis
    pub updated_at: u64,
}

impl PositionRecord {
    pub fn new(actor_id: ActorId, coordinate: Coordinate, updated_at: u64) -> Self {
        Self {
            actor_id,
            latitude: coordinate.latitude,
            longitude: coordinate.longitude,
            updated_at,
        }
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }

    /// Fields written to `users/{actorId}`; merged so `heartsSent` survives.
    pub fn to_fields(&self) -> Document {
        let mut fields = Document::new();
        fields.insert("latitude".into(), self.latitude.into());
        fields.insert("longitude".into(), self.longitude.into());
        fields.insert("updatedAt".into(), self.updated_at.into());
        fields
    }
}

/// Typed view of a `users` document
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorDocument {
    #[serde(skip)]
    pub id: Option<ActorId>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub updated_at: Option<u64>,
    #[serde(default)]
    pub hearts_sent: Vec<ActorId>,
}

impl ActorDocument {
    pub fn from_stored(doc: &StoredDocument) -> Result<Self> {
        let mut parsed: ActorDocument =
            serde_json::from_value(serde_json::Value::Object(doc.fields.clone()))?;
        parsed.id = Some(ActorId::new(doc.id.clone()));
        Ok(parsed)
    }

    /// The position part of the document, if both coordinates are present.
    pub fn position(&self) -> Option<PositionRecord> {
        let actor_id = self.id.clone()?;
        let (latitude, longitude) = (self.latitude?, self.longitude?);
        Some(PositionRecord {
            actor_id,
            latitude,
            longitude,
            updated_at: self.updated_at.unwrap_or(0),
        })
    }

    pub fn has_hearted(&self, target: &ActorId) -> bool {
        self.hearts_sent.contains(target)
    }
}

/// A mutual-interest record, created once per unordered pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRecord {
    #[serde(skip)]
    pub match_id: Option<MatchId>,
    pub users: Vec<ActorId>,
    /// Unix millis
    pub created_at: u64,
}

impl MatchRecord {
    pub fn new(from: &ActorId, to: &ActorId, created_at: u64) -> Self {
        Self {
            match_id: Some(MatchId::for_pair(from, to)),
            users: vec![from.clone(), to.clone()],
            created_at,
        }
    }

    pub fn from_stored(doc: &StoredDocument) -> Result<Self> {
        let mut parsed: MatchRecord =
            serde_json::from_value(serde_json::Value::Object(doc.fields.clone()))?;
        parsed.match_id = Some(MatchId(doc.id.clone()));
        Ok(parsed)
    }

    pub fn to_fields(&self) -> Result<Document> {
        match serde_json::to_value(self)? {
            serde_json::Value::Object(map) => Ok(map),
            _ => Ok(Document::new()),
        }
    }

    pub fn includes(&self, actor: &ActorId) -> bool {
        self.users.contains(actor)
    }

    /// The other participant, from `actor`'s point of view.
    pub fn partner_of(&self, actor: &ActorId) -> Option<&ActorId> {
        if !self.includes(actor) {
            return None;
        }
        self.users.iter().find(|u| *u != actor)
    }
}

/// One nearby actor in a candidate set
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub actor_id: ActorId,
    pub distance_m: f64,
}

/// Nearby, not-yet-hearted actors, nearest first
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CandidateSet {
    pub candidates: Vec<Candidate>,
}

impl CandidateSet {
    pub fn ids(&self) -> Vec<ActorId> {
        self.candidates.iter().map(|c| c.actor_id.clone()).collect()
    }

    pub fn contains(&self, actor: &ActorId) -> bool {
        self.candidates.iter().any(|c| &c.actor_id == actor)
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

pub(crate) fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
