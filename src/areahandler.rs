//! Sink for assembled water areas: writes polygon features and builds the
//! polygon index used for false-positive elimination.

use log::warn;

use crate::datastorage::DataStorage;
use crate::geometry::{AssembledArea, PreparedPolygon};
use crate::tagcheck;

#[derive(Debug, Default)]
pub struct AreaHandler {
    count_polygons: usize,
}

impl AreaHandler {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn area(&mut self, area: &AssembledArea, ds: &mut DataStorage) {
        if !tagcheck::is_water_area(&area.tags) {
            return;
        }
        ds.insert_polygon_feature(area);

        // linearly tagged polygons stay out of the index, they must not
        // eliminate junction-error candidates
        if !tagcheck::is_area_to_analyse(&area.tags) {
            return;
        }
        for polygon in &area.geometry.0 {
            match PreparedPolygon::new(polygon.clone()) {
                Some(prepared) => {
                    ds.add_polygon(prepared);
                    self.count_polygons += 1;
                }
                None => {
                    let kind = if area.from_way { "way" } else { "relation" };
                    warn!(
                        "AreaHandler: Error at {}: {}: degenerate polygon",
                        kind, area.orig_id
                    );
                }
            }
        }
    }

    /// Keeps index queries defined when the input has no analysable water
    /// polygon at all.
    pub fn complete_polygon_tree(&self, ds: &mut DataStorage) {
        if self.count_polygons == 0 {
            ds.add_polygon(PreparedPolygon::sentinel());
        }
    }
}
