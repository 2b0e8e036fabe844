//! Write-through sink for the four output layers and owner of the shared
//! in-memory state: the waterway arena, the node-degree index, the error
//! map, and the water-polygon index.
//!
//! The output file is a GeoPackage (EPSG:4326) with the layers `polygons`,
//! `relations`, `ways` and `nodes`. Geometries are GeoPackage binary blobs:
//! an 8-byte GP header followed by WKB.

use std::collections::BTreeMap;
use std::path::Path;

use geo_types::{Geometry, LineString, MultiLineString, Point};
use geozero::{CoordDimensions, ToWkb};
use log::{error, warn};
use rstar::primitives::{GeomWithData, Rectangle};
use rstar::{RTree, AABB};
use rusqlite::{params, Connection};
use time::format_description::FormatItem;
use time::macros::format_description;
use time::OffsetDateTime;

use crate::errorsum::ErrorSum;
use crate::geometry::{AssembledArea, PreparedPolygon};
use crate::locations::{Location, LocationTable};
use crate::pbf::{StashedRelation, StashedWay};
use crate::stats::Stats;
use crate::tagcheck::{self, Category};

type Error = Box<dyn std::error::Error>;

/// One emitted waterway, referenced from the node-degree index under both
/// of its endpoints. Records are created by `remember_way` and never
/// mutated afterwards; they live in an arena addressed by index.
#[derive(Debug, Clone)]
pub struct WaterWay {
    pub first_node: i64,
    pub last_node: i64,
    pub name: String,
    pub category: Category,
}

impl WaterWay {
    fn new(first_node: i64, last_node: i64, name: &str, waterway_type: &str) -> Self {
        Self {
            first_node,
            last_node,
            name: name.to_string(),
            category: tagcheck::waterway_category(waterway_type),
        }
    }
}

type PolygonIndexEntry = GeomWithData<Rectangle<[f64; 2]>, usize>;

const SCHEMA: &str = r#"
CREATE TABLE gpkg_spatial_ref_sys (
    srs_name TEXT NOT NULL,
    srs_id INTEGER PRIMARY KEY,
    organization TEXT NOT NULL,
    organization_coordsys_id INTEGER NOT NULL,
    definition TEXT NOT NULL,
    description TEXT
);
INSERT INTO gpkg_spatial_ref_sys VALUES
    ('WGS 84', 4326, 'EPSG', 4326,
     'GEOGCS["WGS 84",DATUM["WGS_1984",SPHEROID["WGS 84",6378137,298.257223563,AUTHORITY["EPSG","7030"]],AUTHORITY["EPSG","6326"]],PRIMEM["Greenwich",0,AUTHORITY["EPSG","8901"]],UNIT["degree",0.0174532925199433,AUTHORITY["EPSG","9122"]],AUTHORITY["EPSG","4326"]]',
     'longitude/latitude coordinates in decimal degrees on the WGS 84 spheroid'),
    ('Undefined cartesian SRS', -1, 'NONE', -1, 'undefined', 'undefined cartesian coordinate reference system'),
    ('Undefined geographic SRS', 0, 'NONE', 0, 'undefined', 'undefined geographic coordinate reference system');

CREATE TABLE gpkg_contents (
    table_name TEXT NOT NULL PRIMARY KEY,
    data_type TEXT NOT NULL,
    identifier TEXT UNIQUE,
    description TEXT DEFAULT '',
    last_change DATETIME NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
    min_x DOUBLE,
    min_y DOUBLE,
    max_x DOUBLE,
    max_y DOUBLE,
    srs_id INTEGER,
    CONSTRAINT fk_gc_r_srs_id FOREIGN KEY (srs_id) REFERENCES gpkg_spatial_ref_sys(srs_id)
);
INSERT INTO gpkg_contents (table_name, data_type, identifier, srs_id) VALUES
    ('polygons', 'features', 'polygons', 4326),
    ('relations', 'features', 'relations', 4326),
    ('ways', 'features', 'ways', 4326),
    ('nodes', 'features', 'nodes', 4326);

CREATE TABLE gpkg_geometry_columns (
    table_name TEXT NOT NULL,
    column_name TEXT NOT NULL,
    geometry_type_name TEXT NOT NULL,
    srs_id INTEGER NOT NULL,
    z TINYINT NOT NULL,
    m TINYINT NOT NULL,
    CONSTRAINT pk_geom_cols PRIMARY KEY (table_name, column_name)
);
INSERT INTO gpkg_geometry_columns VALUES
    ('polygons', 'geom', 'MULTIPOLYGON', 4326, 0, 0),
    ('relations', 'geom', 'MULTILINESTRING', 4326, 0, 0),
    ('ways', 'geom', 'LINESTRING', 4326, 0, 0),
    ('nodes', 'geom', 'POINT', 4326, 0, 0);

CREATE TABLE polygons (
    fid INTEGER PRIMARY KEY AUTOINCREMENT,
    geom BLOB NOT NULL,
    way_id INTEGER,
    relation_id INTEGER,
    type TEXT(10),
    name TEXT(30),
    lastchange TEXT(20),
    error TEXT(6)
);
CREATE TABLE relations (
    fid INTEGER PRIMARY KEY AUTOINCREMENT,
    geom BLOB NOT NULL,
    relation_id INTEGER,
    type TEXT(10),
    name TEXT(30),
    lastchange TEXT(20),
    nowaterway_error TEXT(6),
    tagging_error TEXT(6)
);
CREATE TABLE ways (
    fid INTEGER PRIMARY KEY AUTOINCREMENT,
    geom BLOB NOT NULL,
    way_id INTEGER,
    type TEXT(10),
    name TEXT(30),
    firstnode TEXT(11),
    lastnode TEXT(11),
    relation_id INTEGER,
    width TEXT(10),
    lastchange TEXT(20),
    construction TEXT(7),
    width_error TEXT(6),
    tagging_error TEXT(6)
);
CREATE TABLE nodes (
    fid INTEGER PRIMARY KEY AUTOINCREMENT,
    geom BLOB NOT NULL,
    node_id TEXT(12),
    specific TEXT(11),
    direction_error TEXT(6),
    name_error TEXT(6),
    type_error TEXT(6),
    spring_error TEXT(6),
    end_error TEXT(6),
    way_error TEXT(6)
);
"#;

pub struct DataStorage {
    conn: Connection,
    /// Node-degree index: node id to the waterways starting or ending there.
    pub node_map: BTreeMap<i64, Vec<u32>>,
    /// Nodes still under investigation, keyed by node id.
    pub error_map: BTreeMap<i64, ErrorSum>,
    waterways: Vec<WaterWay>,
    polygons: Vec<PreparedPolygon>,
    polygon_tree: RTree<PolygonIndexEntry>,
    pub stats: Stats,
}

impl DataStorage {
    pub fn new(path: &Path) -> Result<Self, Error> {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        let conn = Connection::open(path)?;
        // bulk-load configuration, returning pragmas go through query_row
        conn.query_row("PRAGMA journal_mode = OFF", [], |_| Ok(()))?;
        conn.query_row("PRAGMA locking_mode = EXCLUSIVE", [], |_| Ok(()))?;
        conn.execute_batch("PRAGMA synchronous = OFF; PRAGMA temp_store = MEMORY;")?;
        conn.execute_batch(SCHEMA)?;
        conn.execute_batch("BEGIN")?;
        Ok(Self {
            conn,
            node_map: BTreeMap::new(),
            error_map: BTreeMap::new(),
            waterways: Vec::new(),
            polygons: Vec::new(),
            polygon_tree: RTree::new(),
            stats: Stats::default(),
        })
    }

    /// Commits everything written so far and hands back the counters.
    pub fn finish(self) -> Result<Stats, Error> {
        self.conn.execute_batch("COMMIT")?;
        Ok(self.stats)
    }

    pub fn waterway(&self, idx: u32) -> &WaterWay {
        &self.waterways[idx as usize]
    }

    pub fn waterway_count(&self) -> usize {
        self.waterways.len()
    }

    /// Registers an emitted waterway in the arena and indexes it under both
    /// endpoints.
    fn remember_way(&mut self, first_node: i64, last_node: i64, name: &str, waterway_type: &str) {
        let idx = self.waterways.len() as u32;
        self.waterways
            .push(WaterWay::new(first_node, last_node, name, waterway_type));
        self.node_map.entry(first_node).or_default().push(idx);
        self.node_map.entry(last_node).or_default().push(idx);
    }

    pub fn insert_polygon_feature(&mut self, area: &AssembledArea) {
        let (way_id, relation_id) = if area.from_way {
            (area.orig_id, 0)
        } else {
            (0, area.orig_id)
        };
        let polygon_type = tagcheck::polygon_type(&area.tags);
        let name = area.tags.get("name");

        let geom = match gpkg_geometry(Geometry::MultiPolygon(area.geometry.clone())) {
            Ok(geom) => geom,
            Err(e) => {
                let kind = if area.from_way { "way" } else { "relation" };
                error!(
                    "Failed to create geometry feature for polygon of {}: {}: {}",
                    kind, area.orig_id, e
                );
                self.stats.num_geometry_errors += 1;
                return;
            }
        };
        let result = self
            .conn
            .prepare_cached(
                "INSERT INTO polygons (geom, way_id, relation_id, type, name, lastchange) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )
            .and_then(|mut stmt| {
                stmt.execute(params![
                    geom,
                    way_id,
                    relation_id,
                    polygon_type,
                    name,
                    timestamp_string(area.timestamp),
                ])
            });
        match result {
            Ok(_) => self.stats.num_polygons += 1,
            Err(e) => error!("Inserting to table failed for polygon: {}: {}", area.orig_id, e),
        }
    }

    pub fn insert_relation_feature(
        &mut self,
        geom: &MultiLineString<f64>,
        relation: &StashedRelation,
        contains_nowaterway: bool,
    ) {
        let relation_type = tagcheck::way_type(&relation.tags);
        let name = relation.tags.get("name");

        let geom = match gpkg_geometry(Geometry::MultiLineString(geom.clone())) {
            Ok(geom) => geom,
            Err(e) => {
                error!("Failed to create relation feature: {}: {}", relation.id, e);
                self.stats.num_geometry_errors += 1;
                return;
            }
        };
        let result = self
            .conn
            .prepare_cached(
                "INSERT INTO relations (geom, relation_id, type, name, lastchange, nowaterway_error) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )
            .and_then(|mut stmt| {
                stmt.execute(params![
                    geom,
                    relation.id,
                    relation_type,
                    name,
                    timestamp_string(relation.timestamp),
                    bool_str(contains_nowaterway),
                ])
            });
        match result {
            Ok(_) => self.stats.num_relations += 1,
            Err(e) => error!("Inserting to table failed for relation: {}: {}", relation.id, e),
        }
    }

    /// Writes a way feature and registers the waterway under its endpoints.
    /// The caller guarantees `way.refs` is non-empty.
    pub fn insert_way_feature(&mut self, geom: &LineString<f64>, way: &StashedWay, rel_id: i64) {
        let way_type = tagcheck::way_type(&way.tags);
        let name = way.tags.get("name").unwrap_or("");
        let construction = tagcheck::construction(&way.tags);
        let (width_error, width) = match tagcheck::width_value(&way.tags) {
            Some(raw) => parse_width(raw),
            None => (false, None),
        };
        let width_str = width.filter(|w| *w >= 0.0).map(width_to_string);

        let first_node = way.refs[0];
        let last_node = way.refs[way.refs.len() - 1];

        match gpkg_geometry(Geometry::LineString(geom.clone())) {
            Ok(geom) => {
                let result = self
                    .conn
                    .prepare_cached(
                        "INSERT INTO ways (geom, way_id, type, name, firstnode, lastnode, \
                         relation_id, width, lastchange, construction, width_error) \
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                    )
                    .and_then(|mut stmt| {
                        stmt.execute(params![
                            geom,
                            way.id,
                            way_type,
                            if name.is_empty() { None } else { Some(name) },
                            first_node.to_string(),
                            last_node.to_string(),
                            rel_id,
                            width_str,
                            timestamp_string(way.timestamp),
                            construction,
                            bool_str(width_error),
                        ])
                    });
                match result {
                    Ok(_) => self.stats.num_ways += 1,
                    Err(e) => error!("Inserting to table failed for way: {}: {}", way.id, e),
                }
            }
            Err(e) => {
                error!("Failed to create geometry feature for way: {}: {}", way.id, e);
                self.stats.num_geometry_errors += 1;
            }
        }

        self.remember_way(first_node, last_node, name, way_type);
    }

    pub fn insert_node_feature(&mut self, location: Location, node_id: i64, sum: &ErrorSum) {
        let point = Point::new(location.lon(), location.lat());
        let geom = match gpkg_geometry(Geometry::Point(point)) {
            Ok(geom) => geom,
            Err(e) => {
                error!("Error at node: {}: {}", node_id, e);
                self.stats.num_geometry_errors += 1;
                return;
            }
        };
        let result = self
            .conn
            .prepare_cached(
                "INSERT INTO nodes (geom, node_id, specific, direction_error, name_error, \
                 type_error, spring_error, end_error, way_error) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )
            .and_then(|mut stmt| {
                stmt.execute(params![
                    geom,
                    node_id.to_string(),
                    sum.specific_label(),
                    bool_str(sum.is_direction_error()),
                    bool_str(sum.is_name_error()),
                    bool_str(sum.is_type_error()),
                    bool_str(sum.is_spring_error()),
                    bool_str(sum.is_end_error()),
                    bool_str(sum.is_way_error()),
                ])
            });
        match result {
            Ok(_) => self.stats.num_nodes += 1,
            Err(e) => error!("Inserting to table failed for node: {}: {}", node_id, e),
        }
    }

    /// Flushes all remaining error nodes, reinterpreting leftover possible
    /// specifics as spring/end errors.
    pub fn insert_error_nodes(&mut self, locations: &LocationTable) {
        let error_map = std::mem::take(&mut self.error_map);
        for (node_id, mut sum) in error_map {
            sum.switch_poss();
            match locations.get(node_id) {
                Some(location) => self.insert_node_feature(location, node_id, &sum),
                None => warn!("node without location: {}", node_id),
            }
        }
    }

    /// Adds a prepared polygon to the arena and its envelope to the
    /// spatial index.
    pub fn add_polygon(&mut self, polygon: PreparedPolygon) {
        let bbox = polygon.bbox();
        let rect = Rectangle::from_corners(
            [bbox.min().x, bbox.min().y],
            [bbox.max().x, bbox.max().y],
        );
        self.polygon_tree
            .insert(GeomWithData::new(rect, self.polygons.len()));
        self.polygons.push(polygon);
    }

    pub fn polygon_count(&self) -> usize {
        self.polygons.len()
    }

    /// Envelope query followed by exact containment tests against the
    /// prepared polygons; first hit wins.
    pub fn find_containing_polygon(&self, point: &Point<f64>) -> Option<usize> {
        let query = AABB::from_point([point.x(), point.y()]);
        self.polygon_tree
            .locate_in_envelope_intersecting(&query)
            .map(|entry| entry.data)
            .find(|&idx| self.polygons[idx].contains(point))
    }
}

fn bool_str(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

/// GeoPackage standard binary: GP magic, version 0, little-endian flags
/// without envelope, srs id, then plain WKB.
fn gpkg_geometry(geometry: Geometry<f64>) -> Result<Vec<u8>, geozero::error::GeozeroError> {
    let wkb = geometry.to_wkb(CoordDimensions::xy())?;
    let mut blob = Vec::with_capacity(wkb.len() + 8);
    blob.extend_from_slice(b"GP");
    blob.push(0);
    blob.push(0b0000_0001);
    blob.extend_from_slice(&4326i32.to_le_bytes());
    blob.extend_from_slice(&wkb);
    Ok(blob)
}

const LASTCHANGE_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

/// Renders an epoch-second timestamp as `YYYY-MM-DD HH:MM:SS`, the ISO form
/// with the `T` replaced by a space and the trailing `Z` dropped.
fn timestamp_string(epoch_seconds: Option<i64>) -> String {
    epoch_seconds
        .and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok())
        .and_then(|ts| ts.format(&LASTCHANGE_FORMAT).ok())
        .unwrap_or_default()
}

/// Parses a `width` value into metres.
///
/// Returns the soft-error flag and the parsed value. A comma decimal
/// separator is handled but flagged; an unparseable number or unknown unit
/// is flagged and yields no value. A bare number is metres.
pub fn parse_width(raw: &str) -> (bool, Option<f64>) {
    let mut error = false;
    let normalized;
    let mut s = raw;
    if s.contains(',') {
        normalized = s.replacen(',', ".", 1);
        s = &normalized;
        error = true;
    }

    let (value, rest) = match parse_leading_float(s.trim_start()) {
        Some(parsed) => parsed,
        None => return (true, None),
    };
    let suffix = rest.trim_start();

    if suffix.is_empty() {
        return (error, Some(value));
    }
    let metres = if suffix.eq_ignore_ascii_case("m") {
        value
    } else if suffix.eq_ignore_ascii_case("km") {
        value * 1000.0
    } else if suffix.eq_ignore_ascii_case("mi") {
        value * 1609.344
    } else if suffix.eq_ignore_ascii_case("nmi") {
        value * 1852.0
    } else if suffix == "'" {
        value * 12.0 * 0.0254
    } else if suffix == "\"" {
        value * 0.0254
    } else if let Some(after_feet) = suffix.strip_prefix('\'') {
        // combined FT'IN" form
        match parse_leading_float(after_feet) {
            Some((inches, after_inches)) if after_inches == "\"" => {
                (value * 12.0 + inches) * 0.0254
            }
            _ => return (true, None),
        }
    } else {
        return (true, None);
    };
    (error, Some(metres))
}

/// Longest numeric prefix, `strtof`-style: optional sign, digits, optional
/// fraction. Returns the value and the unconsumed remainder.
fn parse_leading_float(s: &str) -> Option<(f64, &str)> {
    let bytes = s.as_bytes();
    let mut end = 0;
    if end < bytes.len() && (bytes[end] == b'+' || bytes[end] == b'-') {
        end += 1;
    }
    let digits_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end < bytes.len() && bytes[end] == b'.' {
        end += 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
    }
    if !s[digits_start..end].bytes().any(|b| b.is_ascii_digit()) {
        return None;
    }
    s[..end].parse::<f64>().ok().map(|value| (value, &s[end..]))
}

/// Formats a metre value with one decimal digit, as the ways layer stores
/// it.
pub fn width_to_string(width: f64) -> String {
    let rounded = (width * 10.0).round() as i64;
    let mut s = rounded.to_string();
    if s.len() == 1 {
        s.insert(0, '0');
    }
    s.insert(s.len() - 1, '.');
    s
}
