//! Joins waterway relations with their member ways, emits way and relation
//! features, and runs the nodal analysis over the degree index.

use ahash::AHashMap;
use geo_types::{LineString, MultiLineString};
use log::warn;

use crate::datastorage::DataStorage;
use crate::errorsum::ErrorSum;
use crate::geometry::{self, GeometryError};
use crate::locations::LocationTable;
use crate::pbf::{StashedRelation, StashedWay};
use crate::tagcheck::{self, Category};

struct RelationState {
    relation: StashedRelation,
    missing: usize,
    done: bool,
}

#[derive(Default)]
pub struct WaterwayCollector {
    states: Vec<RelationState>,
    /// way id -> indices of subscribed relations, one entry per membership
    wanted: AHashMap<i64, Vec<usize>>,
    ways: AHashMap<i64, StashedWay>,
}

impl WaterwayCollector {
    pub fn new() -> Self {
        Default::default()
    }

    /// Keep-rule for pass 1: linear waterway relations, excluding area
    /// relations (multipolygon handled by is_waterway, boundary here).
    pub fn keep_relation(relation: &StashedRelation) -> bool {
        tagcheck::is_waterway(&relation.tags, true)
            && !relation.tags.has_value("type", "boundary")
    }

    /// Pass-1 registration. Subscribes to the way members of every kept
    /// relation.
    pub fn read_relation(&mut self, relation: &StashedRelation) {
        if !Self::keep_relation(relation) {
            return;
        }
        let idx = self.states.len();
        for member in &relation.members {
            self.wanted.entry(member.way_id).or_default().push(idx);
        }
        self.states.push(RelationState {
            missing: relation.members.len(),
            relation: relation.clone(),
            done: relation.members.is_empty(),
        });
    }

    /// Pass-2 way routing: member ways are stashed until their relation
    /// completes, everything else goes through the standalone path.
    pub fn way(&mut self, way: &StashedWay, ds: &mut DataStorage, locations: &LocationTable) {
        if let Some(subscribers) = self.wanted.get(&way.id) {
            let subscribers = subscribers.clone();
            self.ways.entry(way.id).or_insert_with(|| way.clone());
            for idx in subscribers {
                self.states[idx].missing -= 1;
                if self.states[idx].missing == 0 {
                    self.complete_relation(idx, ds, locations);
                }
            }
        } else if tagcheck::is_waterway(&way.tags, false) {
            self.create_single_way(way, ds, locations);
        }
    }

    /// Emits the features of a completed (or force-completed) relation:
    /// one way feature per member that forms a linestring, then one
    /// relation feature with the members combined.
    fn complete_relation(&mut self, idx: usize, ds: &mut DataStorage, locations: &LocationTable) {
        if self.states[idx].done {
            return;
        }
        self.states[idx].done = true;

        let relation = &self.states[idx].relation;
        let mut contains_nowaterway = false;
        let mut linestrings: Vec<LineString<f64>> = Vec::new();

        for member in &relation.members {
            let way = match self.ways.get(&member.way_id) {
                Some(way) => way,
                None => continue, // missing member of an incomplete relation
            };
            match geometry::build_linestring(way.id, &way.refs, locations) {
                Ok(linestring) => {
                    if !tagcheck::has_waterway_tag(&way.tags) {
                        contains_nowaterway = true;
                    }
                    ds.insert_way_feature(&linestring, way, relation.id);
                    linestrings.push(linestring);
                }
                Err(GeometryError::TooFewPoints { .. }) => {
                    insert_way_error(way, ds, locations);
                }
                Err(e) => warn!("Error at way: {}: {}", way.id, e),
            }
        }

        if linestrings.is_empty() {
            return;
        }
        let multilinestring = MultiLineString(linestrings);
        ds.insert_relation_feature(&multilinestring, relation, contains_nowaterway);
    }

    /// Waterway ways outside any retained relation become standalone way
    /// features with relation id 0.
    fn create_single_way(
        &mut self,
        way: &StashedWay,
        ds: &mut DataStorage,
        locations: &LocationTable,
    ) {
        match geometry::build_linestring(way.id, &way.refs, locations) {
            Ok(linestring) => ds.insert_way_feature(&linestring, way, 0),
            Err(GeometryError::TooFewPoints { .. }) => insert_way_error(way, ds, locations),
            Err(e) => warn!("Error at way: {}: {}", way.id, e),
        }
    }

    /// Force-completes relations still missing members at stream end and
    /// returns their ids for the final warning.
    pub fn complete_incomplete_relations(
        &mut self,
        ds: &mut DataStorage,
        locations: &LocationTable,
    ) -> Vec<i64> {
        let pending: Vec<usize> = (0..self.states.len())
            .filter(|&idx| !self.states[idx].done)
            .collect();
        let mut incomplete = Vec::with_capacity(pending.len());
        for idx in pending {
            incomplete.push(self.states[idx].relation.id);
            self.complete_relation(idx, ds, locations);
        }
        incomplete
    }

    /// The junction state machine: classifies every node of the degree
    /// index from its local in/out counts and categories. Normal nodes are
    /// written immediately; anything else goes into the error map.
    pub fn analyse_nodes(&self, ds: &mut DataStorage, locations: &LocationTable) {
        let node_map = std::mem::take(&mut ds.node_map);
        for (&node_id, incident) in &node_map {
            let mut sum = ErrorSum::new();
            {
                let mut count_first_node = 0;
                let mut count_last_node = 0;
                let mut names: Vec<&str> = Vec::new();
                let mut category_in: Vec<Category> = Vec::new();
                let mut category_out: Vec<Category> = Vec::new();
                for &idx in incident {
                    let wway = ds.waterway(idx);
                    if wway.first_node == node_id {
                        count_first_node += 1;
                        names.push(&wway.name);
                        category_out.push(wway.category);
                    }
                    if wway.last_node == node_id {
                        count_last_node += 1;
                        names.push(&wway.name);
                        category_in.push(wway.category);
                    }
                }
                detect_direction_error(count_first_node, count_last_node, &mut sum);
                detect_name_error(&names, &mut sum);
                detect_flow_errors(&category_in, &category_out, &mut sum);
            }
            if sum.is_normal() {
                match locations.get(node_id) {
                    Some(location) => ds.insert_node_feature(location, node_id, &sum),
                    None => warn!("node without location: {}", node_id),
                }
            } else {
                ds.error_map.insert(node_id, sum);
            }
        }
        ds.node_map = node_map;
    }
}

/// Node-error row for a way that cannot form a linestring, placed at the
/// way's first node.
fn insert_way_error(way: &StashedWay, ds: &mut DataStorage, locations: &LocationTable) {
    let node_id = match way.refs.first() {
        Some(&node_id) => node_id,
        None => {
            warn!("way without nodes: {}", way.id);
            return;
        }
    };
    let location = match locations.get(node_id) {
        Some(location) => location,
        None => {
            warn!("node without location: {}", node_id);
            return;
        }
    };
    let mut sum = ErrorSum::new();
    sum.set_way_error();
    ds.insert_node_feature(location, node_id, &sum);
}

/// A junction where every connected way flows in, or every one flows out,
/// with an imbalance above one, cannot be a valid interior node.
fn detect_direction_error(count_first_node: i32, count_last_node: i32, sum: &mut ErrorSum) {
    if (count_first_node - count_last_node).abs() > 1
        && (count_first_node == 0 || count_last_node == 0)
    {
        sum.set_direction_error();
    }
}

/// Exactly two connected ways with differing non-empty names. Other
/// arities are ambiguous and not checked.
fn detect_name_error(names: &[&str], sum: &mut ErrorSum) {
    if let [a, b] = names {
        if a != b && !a.is_empty() && !b.is_empty() {
            sum.set_name_error();
        }
    }
}

/// Category rules over the highest in- and out-category.
///
/// A river demoting into smaller waterways is a type error. A lone way
/// ending (starting) at a node makes it a possible rivermouth (outflow),
/// remembered with its size; canals and other unknown categories are
/// ignored, they may flow either way.
fn detect_flow_errors(category_in: &[Category], category_out: &[Category], sum: &mut ErrorSum) {
    let max_in = category_in.iter().copied().max();
    let max_out = category_out.iter().copied().max();

    if let (Some(max_in), Some(max_out)) = (max_in, max_out) {
        if max_in == Category::C && max_out < Category::C && max_out != Category::Unknown {
            sum.set_type_error();
        }
    } else if category_in.len() == 1 {
        match category_in[0] {
            Category::C => {
                sum.set_poss_rivermouth();
                sum.set_river();
            }
            Category::B => {
                sum.set_poss_rivermouth();
                sum.set_stream();
            }
            _ => {}
        }
    } else if category_out.len() == 1 {
        match category_out[0] {
            Category::C => {
                sum.set_poss_outflow();
                sum.set_river();
            }
            Category::B => {
                sum.set_poss_outflow();
                sum.set_stream();
            }
            _ => {}
        }
    }
}
