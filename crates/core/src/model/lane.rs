//! Lane layout: a pure projection from the unit set to ordered rows.
//!
//! Nothing here touches stored trace data, so switching grouping or sort
//! order after data has streamed in is just a re-projection.

use std::cmp::Ordering;
use std::collections::HashMap;

use lanescope_protocol::{SharedStr, UnitId};
use serde::{Deserialize, Serialize};

use super::trace::TraceModel;

/// How units are bucketed into lanes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupBy {
    /// One lane per unit.
    Id,
    /// One lane per distinct unit name.
    #[default]
    Name,
}

/// Lane ordering policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    /// Ascending by the earliest unit start in the lane.
    #[default]
    Start,
    /// Descending by the longest unit lifetime in the lane.
    Duration,
    /// Descending by the summed running time of the lane.
    Running,
}

/// A horizontal row in the timeline holding one or more units.
#[derive(Debug, Clone, PartialEq)]
pub struct Lane {
    pub name: SharedStr,
    pub units: Vec<UnitId>,
}

/// Bucket the model's units into lanes in discovery order.
pub fn project_lanes(model: &TraceModel, group_by: GroupBy) -> Vec<Lane> {
    match group_by {
        GroupBy::Id => model
            .units()
            .map(|u| Lane {
                name: u.name.clone(),
                units: vec![u.id],
            })
            .collect(),
        GroupBy::Name => {
            let mut lanes: Vec<Lane> = Vec::new();
            let mut by_name: HashMap<SharedStr, usize> = HashMap::new();
            for unit in model.units() {
                match by_name.get(&unit.name) {
                    Some(&i) => lanes[i].units.push(unit.id),
                    None => {
                        by_name.insert(unit.name.clone(), lanes.len());
                        lanes.push(Lane {
                            name: unit.name.clone(),
                            units: vec![unit.id],
                        });
                    }
                }
            }
            lanes
        }
    }
}

/// Stable-sort lanes in place. Ties keep their current relative order.
pub fn sort_lanes(model: &TraceModel, lanes: &mut [Lane], key: SortKey) {
    let summaries = |lane: &Lane| {
        lane.units
            .iter()
            .filter_map(|id| model.unit(*id))
            .collect::<Vec<_>>()
    };
    match key {
        SortKey::Start => lanes.sort_by_cached_key(|lane| {
            OrderedF64(
                summaries(lane)
                    .iter()
                    .map(|u| u.start)
                    .fold(f64::INFINITY, f64::min),
            )
        }),
        SortKey::Duration => lanes.sort_by_cached_key(|lane| {
            std::cmp::Reverse(OrderedF64(
                summaries(lane)
                    .iter()
                    .map(|u| u.duration())
                    .fold(f64::NEG_INFINITY, f64::max),
            ))
        }),
        SortKey::Running => lanes.sort_by_cached_key(|lane| {
            std::cmp::Reverse(OrderedF64(
                summaries(lane).iter().map(|u| u.total_running).sum(),
            ))
        }),
    }
}

/// Project and sort in one step.
pub fn reorder(model: &TraceModel, group_by: GroupBy, key: SortKey) -> Vec<Lane> {
    let mut lanes = project_lanes(model, group_by);
    sort_lanes(model, &mut lanes, key);
    lanes
}

/// Total order over `f64` for sort keys.
#[derive(Debug, Clone, Copy)]
struct OrderedF64(f64);

impl PartialEq for OrderedF64 {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OrderedF64 {}

impl PartialOrd for OrderedF64 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedF64 {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}
