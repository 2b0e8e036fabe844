//! In-memory node-location store filled during the full pass.

use ahash::AHashMap;
use geo_types::Coord;

/// A node location in decimicro degrees (1e-7), the resolution of the OSM
/// wire format. Two `i32`s keep the planet-scale table compact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    decimicro_lat: i32,
    decimicro_lon: i32,
}

impl Location {
    pub fn new(decimicro_lat: i32, decimicro_lon: i32) -> Self {
        Self {
            decimicro_lat,
            decimicro_lon,
        }
    }

    pub fn from_degrees(lat: f64, lon: f64) -> Self {
        Self {
            decimicro_lat: (lat * 1e7).round() as i32,
            decimicro_lon: (lon * 1e7).round() as i32,
        }
    }

    pub fn lat(&self) -> f64 {
        f64::from(self.decimicro_lat) * 1e-7
    }

    pub fn lon(&self) -> f64 {
        f64::from(self.decimicro_lon) * 1e-7
    }

    pub fn coord(&self) -> Coord<f64> {
        Coord {
            x: self.lon(),
            y: self.lat(),
        }
    }
}

#[derive(Debug, Default)]
pub struct LocationTable {
    locations: AHashMap<i64, Location>,
}

impl LocationTable {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn insert(&mut self, node_id: i64, location: Location) {
        self.locations.insert(node_id, location);
    }

    pub fn get(&self, node_id: i64) -> Option<Location> {
        self.locations.get(&node_id).copied()
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }
}
