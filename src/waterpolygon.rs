//! Collects water areas: multipolygon/boundary relations assembled from
//! their member ways, and standalone closed ways. Finished areas are
//! handed to the area handler.

use ahash::AHashMap;
use log::warn;

use crate::areahandler::AreaHandler;
use crate::datastorage::DataStorage;
use crate::geometry::{self, AssembledArea, RingMember};
use crate::locations::LocationTable;
use crate::pbf::{StashedRelation, StashedWay};
use crate::tagcheck;

struct RelationState {
    relation: StashedRelation,
    missing: usize,
    done: bool,
}

#[derive(Default)]
pub struct WaterpolygonCollector {
    states: Vec<RelationState>,
    wanted: AHashMap<i64, Vec<usize>>,
    ways: AHashMap<i64, StashedWay>,
}

impl WaterpolygonCollector {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn keep_relation(relation: &StashedRelation) -> bool {
        tagcheck::is_waterpolygon_relation(&relation.tags)
    }

    /// Pass-1 registration, way members only.
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

    /// Pass-2 way routing: members are stashed until their relation is
    /// complete; closed standalone water ways assemble directly.
    pub fn way(
        &mut self,
        way: &StashedWay,
        handler: &mut AreaHandler,
        ds: &mut DataStorage,
        locations: &LocationTable,
    ) {
        if let Some(subscribers) = self.wanted.get(&way.id) {
            let subscribers = subscribers.clone();
            self.ways.entry(way.id).or_insert_with(|| way.clone());
            for idx in subscribers {
                self.states[idx].missing -= 1;
                if self.states[idx].missing == 0 {
                    self.assemble_relation(idx, handler, ds, locations);
                }
            }
        } else if Self::way_is_valid(way) {
            self.assemble_way(way, handler, ds, locations);
        }
    }

    /// Closed ways with enough nodes build a simple polygon.
    fn way_is_valid(way: &StashedWay) -> bool {
        tagcheck::is_water_area(&way.tags)
            && way.refs.len() > 3
            && way.refs.first() == way.refs.last()
    }

    fn assemble_way(
        &mut self,
        way: &StashedWay,
        handler: &mut AreaHandler,
        ds: &mut DataStorage,
        locations: &LocationTable,
    ) {
        match geometry::area_from_way(way.id, &way.refs, locations) {
            Ok(geometry) => {
                let area = AssembledArea {
                    orig_id: way.id,
                    from_way: true,
                    tags: way.tags.clone(),
                    timestamp: way.timestamp,
                    geometry,
                };
                handler.area(&area, ds);
            }
            Err(e) => warn!("AreaHandler: Error at way: {}: {}", way.id, e),
        }
    }

    fn assemble_relation(
        &mut self,
        idx: usize,
        handler: &mut AreaHandler,
        ds: &mut DataStorage,
        locations: &LocationTable,
    ) {
        if self.states[idx].done {
            return;
        }
        self.states[idx].done = true;

        let relation = &self.states[idx].relation;
        let members: Vec<RingMember> = relation
            .members
            .iter()
            .filter_map(|member| {
                self.ways.get(&member.way_id).map(|way| RingMember {
                    way_id: way.id,
                    refs: &way.refs,
                    inner: member.role == "inner",
                })
            })
            .collect();
        if members.is_empty() {
            return;
        }

        match geometry::area_from_members(relation.id, &members, locations) {
            Ok(geometry) => {
                let area = AssembledArea {
                    orig_id: relation.id,
                    from_way: false,
                    tags: relation.tags.clone(),
                    timestamp: relation.timestamp,
                    geometry,
                };
                handler.area(&area, ds);
            }
            Err(e) => warn!("AreaHandler: Error at relation: {}: {}", relation.id, e),
        }
    }

    /// Assembles what closed from relations still missing members and
    /// returns their ids for the final warning.
    pub fn complete_incomplete_relations(
        &mut self,
        handler: &mut AreaHandler,
        ds: &mut DataStorage,
        locations: &LocationTable,
    ) -> Vec<i64> {
        let pending: Vec<usize> = (0..self.states.len())
            .filter(|&idx| !self.states[idx].done)
            .collect();
        let mut incomplete = Vec::with_capacity(pending.len());
        for idx in pending {
            incomplete.push(self.states[idx].relation.id);
            self.assemble_relation(idx, handler, ds, locations);
        }
        incomplete
    }
}
