//! False-positive elimination over the error map built by the node
//! analysis.
//!
//! A candidate node lying in the interior of a waterway, or on a
//! riverbank/coastline way, or inside a water polygon cannot be the
//! junction error it was suspected to be. For possible rivermouths and
//! outflows the same evidence confirms the special status instead.

use geo_types::Point;
use log::warn;

use crate::datastorage::DataStorage;
use crate::locations::LocationTable;
use crate::pbf::StashedWay;
use crate::tagcheck;

#[derive(Debug, Default)]
pub struct IndicateFalsePositives;

impl IndicateFalsePositives {
    pub fn new() -> Self {
        Default::default()
    }

    /// Sub-phase 1, streaming ways. Riverbank and coastline ways bound
    /// water bodies and contribute every node; ordinary waterways only
    /// their interior nodes, whose containment is obvious.
    pub fn way(&self, way: &StashedWay, ds: &mut DataStorage, locations: &LocationTable) {
        if !tagcheck::is_way_to_analyse(&way.tags) {
            return;
        }
        if tagcheck::is_riverbank_or_coastline(&way.tags) {
            for &node_id in &way.refs {
                delete_error_node(node_id, ds, locations);
            }
        } else if way.refs.len() > 2 {
            for &node_id in &way.refs[1..way.refs.len() - 1] {
                delete_error_node(node_id, ds, locations);
            }
        }
    }

    /// Sub-phase 2, polygon containment for every candidate left over.
    /// Specifics already confirmed by sub-phase 1 are final and skipped.
    pub fn analyse_polygons(&self, ds: &mut DataStorage, locations: &LocationTable) {
        let candidates: Vec<i64> = ds
            .error_map
            .iter()
            .filter(|(_, sum)| !sum.is_rivermouth() && !sum.is_outflow())
            .map(|(&node_id, _)| node_id)
            .collect();
        for node_id in candidates {
            let location = match locations.get(node_id) {
                Some(location) => location,
                None => {
                    warn!("node without location: {}", node_id);
                    continue;
                }
            };
            let point = Point::new(location.lon(), location.lat());
            if ds.find_containing_polygon(&point).is_some() {
                delete_error_node(node_id, ds, locations);
            }
        }
    }
}

/// Resolution of a traced candidate: possible specifics are promoted to
/// the confirmed variant and stay in the map; plain error hypotheses are
/// cleared, emitted as ordinary nodes and released.
pub fn delete_error_node(node_id: i64, ds: &mut DataStorage, locations: &LocationTable) {
    let mut sum = match ds.error_map.remove(&node_id) {
        Some(sum) => sum,
        None => return,
    };
    if sum.is_poss_rivermouth() {
        sum.set_rivermouth();
        ds.error_map.insert(node_id, sum);
    } else if sum.is_poss_outflow() {
        sum.set_outflow();
        ds.error_map.insert(node_id, sum);
    } else if sum.is_rivermouth() || sum.is_outflow() {
        // already confirmed, nothing left to decide
        ds.error_map.insert(node_id, sum);
    } else {
        sum.set_to_normal();
        match locations.get(node_id) {
            Some(location) => ds.insert_node_feature(location, node_id, &sum),
            None => warn!("node without location: {}", node_id),
        }
    }
}
