//! Geometry construction from node references.
//!
//! Every builder in here is fallible and returns a `GeometryError`; callers
//! decide between the log-and-skip contract and the synthetic way-error
//! node. Nothing panics on malformed input.

use std::fmt;

use geo::{BoundingRect, Contains};
use geo_types::{Coord, LineString, MultiPolygon, Point, Polygon, Rect};
use itertools::Itertools;
use log::debug;

use crate::locations::LocationTable;
use crate::tags::TagBag;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeometryError {
    /// Fewer than two distinct locations remain after deduplication.
    TooFewPoints { way_id: i64, points: usize },
    /// A referenced node never appeared in the input.
    MissingLocation { way_id: i64, node_id: i64 },
    /// No member ring of the relation could be closed.
    NoClosedRing { relation_id: i64 },
}

impl fmt::Display for GeometryError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            GeometryError::TooFewPoints { way_id, points } => write!(
                f,
                "way {} has only {} distinct point(s), cannot form a linestring",
                way_id, points
            ),
            GeometryError::MissingLocation { way_id, node_id } => {
                write!(f, "way {} references node {} without location", way_id, node_id)
            }
            GeometryError::NoClosedRing { relation_id } => {
                write!(f, "relation {} has no closable outer ring", relation_id)
            }
        }
    }
}

impl std::error::Error for GeometryError {}

/// Builds a linestring from the way's node references, dropping adjacent
/// repeated locations.
pub fn build_linestring(
    way_id: i64,
    refs: &[i64],
    locations: &LocationTable,
) -> Result<LineString<f64>, GeometryError> {
    let mut coords = Vec::with_capacity(refs.len());
    for &node_id in refs {
        let location = locations
            .get(node_id)
            .ok_or(GeometryError::MissingLocation { way_id, node_id })?;
        coords.push(location.coord());
    }
    let coords: Vec<Coord<f64>> = coords.into_iter().dedup().collect();
    if coords.len() < 2 {
        return Err(GeometryError::TooFewPoints {
            way_id,
            points: coords.len(),
        });
    }
    Ok(LineString::from(coords))
}

/// One way member of an area under assembly.
#[derive(Debug, Clone, Copy)]
pub struct RingMember<'a> {
    pub way_id: i64,
    pub refs: &'a [i64],
    pub inner: bool,
}

/// An assembled water area: the source object, its tags, and the finished
/// multipolygon geometry.
#[derive(Debug, Clone)]
pub struct AssembledArea {
    pub orig_id: i64,
    pub from_way: bool,
    pub tags: TagBag,
    pub timestamp: Option<i64>,
    pub geometry: MultiPolygon<f64>,
}

/// Assembles a closed standalone way into a single-polygon area.
///
/// The caller guarantees first ref == last ref.
pub fn area_from_way(
    way_id: i64,
    refs: &[i64],
    locations: &LocationTable,
) -> Result<MultiPolygon<f64>, GeometryError> {
    let ring = ring_coords(way_id, refs, locations)?;
    let polygon = Polygon::new(LineString::from(ring), Vec::new());
    Ok(MultiPolygon(vec![polygon]))
}

/// Assembles the member ways of a multipolygon relation.
///
/// Members are stitched into closed rings by endpoint node id, outer and
/// inner rings separately (classified by member role). Each inner ring is
/// attached to the first outer ring containing it. Rings that do not close
/// are dropped; if no outer ring closes the whole relation fails.
pub fn area_from_members(
    relation_id: i64,
    members: &[RingMember],
    locations: &LocationTable,
) -> Result<MultiPolygon<f64>, GeometryError> {
    let outer_segments: Vec<&RingMember> = members.iter().filter(|m| !m.inner).collect();
    let inner_segments: Vec<&RingMember> = members.iter().filter(|m| m.inner).collect();

    let outer_rings = stitch_rings(relation_id, &outer_segments);
    let inner_rings = stitch_rings(relation_id, &inner_segments);

    let mut shells: Vec<LineString<f64>> = Vec::new();
    for ring in &outer_rings {
        match checked_ring(relation_id, ring, locations) {
            Ok(coords) => shells.push(LineString::from(coords)),
            Err(err) => debug!("relation {}: dropping outer ring: {}", relation_id, err),
        }
    }
    if shells.is_empty() {
        return Err(GeometryError::NoClosedRing { relation_id });
    }

    let outers: Vec<Polygon<f64>> = shells
        .iter()
        .map(|shell| Polygon::new(shell.clone(), Vec::new()))
        .collect();
    let mut holes: Vec<Vec<LineString<f64>>> = vec![Vec::new(); outers.len()];

    for ring in &inner_rings {
        let coords = match checked_ring(relation_id, ring, locations) {
            Ok(coords) => coords,
            Err(err) => {
                debug!("relation {}: dropping inner ring: {}", relation_id, err);
                continue;
            }
        };
        let probe = Point::from(coords[0]);
        match outers.iter().position(|outer| outer.contains(&probe)) {
            Some(i) => holes[i].push(LineString::from(coords)),
            None => debug!(
                "relation {}: inner ring not contained in any outer ring",
                relation_id
            ),
        }
    }

    let polygons = shells
        .into_iter()
        .zip(holes)
        .map(|(shell, holes)| Polygon::new(shell, holes))
        .collect();
    Ok(MultiPolygon(polygons))
}

/// Joins way segments end-to-end into closed rings of node ids. Segments
/// are consumed in member order; a segment is reversed when its far end
/// matches. Whatever cannot be closed is dropped with a debug note.
fn stitch_rings(relation_id: i64, segments: &[&RingMember]) -> Vec<Vec<i64>> {
    let mut open: Vec<(i64, Vec<i64>)> = segments
        .iter()
        .filter(|m| m.refs.len() >= 2)
        .map(|m| (m.way_id, m.refs.to_vec()))
        .collect();

    let mut rings = Vec::new();
    while let Some((start_way, mut ring)) = open.pop() {
        loop {
            if ring.first() == ring.last() {
                rings.push(ring);
                break;
            }
            let end = match ring.last() {
                Some(&end) => end,
                None => break,
            };
            let joinable = open
                .iter()
                .position(|(_, s)| s.first() == Some(&end) || s.last() == Some(&end));
            match joinable {
                Some(pos) => {
                    let (way_id, mut segment) = open.swap_remove(pos);
                    if segment.last() == Some(&end) {
                        segment.reverse();
                    }
                    debug!(
                        "relation {}: joining way {} onto ring started by way {}",
                        relation_id, way_id, start_way
                    );
                    ring.extend(segment.into_iter().skip(1));
                }
                None => {
                    debug!(
                        "relation {}: ring started by way {} does not close, dropped",
                        relation_id, start_way
                    );
                    break;
                }
            }
        }
    }
    rings
}

/// Resolves a closed id-ring into coordinates and validates it still has
/// enough distinct points for a ring.
fn checked_ring(
    relation_id: i64,
    ring: &[i64],
    locations: &LocationTable,
) -> Result<Vec<Coord<f64>>, GeometryError> {
    let mut coords = Vec::with_capacity(ring.len());
    for &node_id in ring {
        let location = locations.get(node_id).ok_or(GeometryError::MissingLocation {
            way_id: relation_id,
            node_id,
        })?;
        coords.push(location.coord());
    }
    let coords: Vec<Coord<f64>> = coords.into_iter().dedup().collect();
    // a closed ring needs at least a triangle plus the closing point
    if coords.len() < 4 {
        return Err(GeometryError::TooFewPoints {
            way_id: relation_id,
            points: coords.len(),
        });
    }
    Ok(coords)
}

fn ring_coords(
    way_id: i64,
    refs: &[i64],
    locations: &LocationTable,
) -> Result<Vec<Coord<f64>>, GeometryError> {
    checked_ring(way_id, refs, locations)
}

/// A water polygon with its envelope precomputed for the repeated
/// point-in-polygon queries of pass 3. Plain value, owned by the polygon
/// arena; the spatial index refers to arena entries by index.
#[derive(Debug, Clone)]
pub struct PreparedPolygon {
    polygon: Polygon<f64>,
    bbox: Rect<f64>,
}

impl PreparedPolygon {
    /// Returns `None` for degenerate polygons without an envelope.
    pub fn new(polygon: Polygon<f64>) -> Option<Self> {
        let bbox = polygon.bounding_rect()?;
        Some(Self { polygon, bbox })
    }

    /// The sentinel entry keeping index queries defined when no water
    /// polygon exists: an empty envelope that contains nothing.
    pub fn sentinel() -> Self {
        let origin = Coord { x: 0.0, y: 0.0 };
        Self {
            polygon: Polygon::new(LineString::new(Vec::new()), Vec::new()),
            bbox: Rect::new(origin, origin),
        }
    }

    pub fn bbox(&self) -> Rect<f64> {
        self.bbox
    }

    pub fn contains(&self, point: &Point<f64>) -> bool {
        if self.polygon.exterior().0.is_empty() {
            return false;
        }
        let c = point.0;
        if c.x < self.bbox.min().x
            || c.x > self.bbox.max().x
            || c.y < self.bbox.min().y
            || c.y > self.bbox.max().y
        {
            return false;
        }
        self.polygon.contains(point)
    }
}
