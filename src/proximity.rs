//! Radius filtering and ranking of known positions
//!
//! Pure functions over snapshots; nothing here touches the store.

use std::cmp::Ordering;
use std::collections::HashSet;

use crate::geo::distance;
use crate::models::{ActorDocument, ActorId, Candidate, CandidateSet, PositionRecord};

/// Default discovery radius in metres
pub const DEFAULT_RADIUS_M: f64 = 50.0;

/// Whether a distance falls inside the radius.
///
/// Distance and radius are both compared in whole metres, boundary inclusive.
pub fn within_radius(distance_m: f64, radius_m: f64) -> bool {
    distance_m.round() <= radius_m.round()
}

/// Actors within `radius_m` of `origin`, nearest first, ties by actor id.
///
/// Documents without a complete position and the origin actor itself are
/// skipped.
pub fn nearby<'a, I>(origin: &PositionRecord, others: I, radius_m: f64) -> Vec<Candidate>
where
    I: IntoIterator<Item = &'a ActorDocument>,
{
    let here = origin.coordinate();
    let mut found: Vec<Candidate> = others
        .into_iter()
        .filter_map(|doc| doc.position())
        .filter(|other| other.actor_id != origin.actor_id)
        .filter_map(|other| {
            let d = distance(here, other.coordinate());
            within_radius(d, radius_m).then(|| Candidate {
                actor_id: other.actor_id,
                distance_m: d,
            })
        })
        .collect();

    found.sort_by(|a, b| {
        a.distance_m
            .partial_cmp(&b.distance_m)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.actor_id.cmp(&b.actor_id))
    });
    found
}

/// Ids only, in the same order as [`nearby`].
pub fn nearby_ids<'a, I>(origin: &PositionRecord, others: I, radius_m: f64) -> Vec<ActorId>
where
    I: IntoIterator<Item = &'a ActorDocument>,
{
    nearby(origin, others, radius_m)
        .into_iter()
        .map(|c| c.actor_id)
        .collect()
}

/// Candidate computation for one owner over a full `users` snapshot
#[derive(Debug, Clone)]
pub struct ProximityIndex {
    radius_m: f64,
}

impl ProximityIndex {
    pub fn new(radius_m: f64) -> Self {
        Self { radius_m }
    }

    pub fn radius_m(&self) -> f64 {
        self.radius_m
    }

    /// Nearby actors the owner has not hearted yet.
    ///
    /// The owner's own document supplies both the reference position and the
    /// exclusion set. An owner with no position yet has no candidates.
    pub fn candidates(&self, owner: &ActorId, documents: &[ActorDocument]) -> CandidateSet {
        let Some(own) = documents.iter().find(|d| d.id.as_ref() == Some(owner)) else {
            return CandidateSet::default();
        };
        let Some(origin) = own.position() else {
            return CandidateSet::default();
        };

        let hearted: HashSet<&ActorId> = own.hearts_sent.iter().collect();
        let candidates = nearby(&origin, documents, self.radius_m)
            .into_iter()
            .filter(|c| !hearted.contains(&c.actor_id))
            .collect();

        CandidateSet { candidates }
    }
}

impl Default for ProximityIndex {
    fn default() -> Self {
        Self::new(DEFAULT_RADIUS_M)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(id: &str, lat: f64, lon: f64) -> ActorDocument {
        ActorDocument {
            id: Some(ActorId::from(id)),
            latitude: Some(lat),
            longitude: Some(lon),
            updated_at: Some(1),
            hearts_sent: vec![],
        }
    }

    fn unplaced(id: &str) -> ActorDocument {
        ActorDocument {
            id: Some(ActorId::from(id)),
            ..Default::default()
        }
    }

    fn origin(id: &str, lat: f64, lon: f64) -> PositionRecord {
        at(id, lat, lon).position().unwrap()
    }

    #[test]
    fn test_within_radius_boundary() {
        assert!(within_radius(50.0, 50.0));
        assert!(within_radius(50.04, 50.0));
        assert!(!within_radius(50.6, 50.0));
        assert!(within_radius(55.597, 55.597));
    }

    #[test]
    fn test_excludes_self_and_unplaced() {
        let docs = vec![at("a", 0.0, 0.0), unplaced("ghost"), at("b", 0.0, 0.0001)];
        let ids = nearby_ids(&origin("a", 0.0, 0.0), &docs, 50.0);
        assert_eq!(ids, vec![ActorId::from("b")]);
    }

    #[test]
    fn test_orders_by_distance_then_id() {
        let docs = vec![
            at("far", 0.0, 0.0003),
            at("tie-b", 0.0, 0.0001),
            at("tie-a", 0.0, -0.0001),
            at("near", 0.00005, 0.0),
        ];
        let ids = nearby_ids(&origin("me", 0.0, 0.0), &docs, 50.0);
        let ids: Vec<&str> = ids.iter().map(|i| i.as_str()).collect();
        assert_eq!(ids, vec!["near", "tie-a", "tie-b", "far"]);
    }

    #[test]
    fn test_candidates_without_own_position_is_empty() {
        let docs = vec![unplaced("me"), at("b", 0.0, 0.0)];
        let set = ProximityIndex::default().candidates(&ActorId::from("me"), &docs);
        assert!(set.is_empty());
    }

    #[test]
    fn test_candidates_skip_hearted_targets() {
        let mut me = at("me", 0.0, 0.0);
        me.hearts_sent.push(ActorId::from("b"));
        let docs = vec![me, at("b", 0.0, 0.0001), at("c", 0.0, 0.0002)];
        let set = ProximityIndex::default().candidates(&ActorId::from("me"), &docs);
        assert_eq!(set.ids(), vec![ActorId::from("c")]);
    }
}
