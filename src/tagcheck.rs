//! Pure classification predicates over OSM tag bags.
//!
//! Everything in here is a total function of the tags alone: no allocation
//! beyond the returned slices, no I/O, no failure modes.

use crate::tags::TagBag;

/// Waterway size classes, ordered by significance.
///
/// drain, brook, ditch map to `A`, stream to `B`, river to `C`. Canals and
/// everything else are `Unknown`: canals may flow either way and carry no
/// size information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Category {
    Unknown,
    A,
    B,
    C,
}

impl Category {
    pub fn as_char(self) -> char {
        match self {
            Category::Unknown => '?',
            Category::A => 'A',
            Category::B => 'B',
            Category::C => 'C',
        }
    }
}

pub fn waterway_category(waterway_type: &str) -> Category {
    match waterway_type {
        "drain" | "brook" | "ditch" => Category::A,
        "stream" => Category::B,
        "river" => Category::C,
        _ => Category::Unknown,
    }
}

/// Maps a raw `waterway` value to the canonical type string. Values outside
/// the accepted set collapse to `other`.
fn waterway_type(raw: Option<&str>) -> &str {
    match raw {
        None => "",
        Some(t @ "river") | Some(t @ "stream") | Some(t @ "drain") | Some(t @ "brook")
        | Some(t @ "canal") | Some(t @ "ditch") | Some(t @ "riverbank") => t,
        Some(_) => "other",
    }
}

/// Linear waterway test for the waterway collector.
///
/// Riverbanks and multipolygons are areas, not linear waterways. Relations
/// additionally qualify through `type=waterway`; ways through
/// `natural=coastline`.
pub fn is_waterway(tags: &TagBag, is_relation: bool) -> bool {
    if tags.has_value("type", "multipolygon") {
        return false;
    }
    if let Some(waterway) = tags.get("waterway") {
        return waterway != "riverbank";
    }
    if is_relation && tags.has_value("type", "waterway") {
        return true;
    }
    !is_relation && tags.has_value("natural", "coastline")
}

pub fn has_waterway_tag(tags: &TagBag) -> bool {
    tags.has("waterway")
}

/// Ways worth scanning during false-positive elimination.
pub fn is_way_to_analyse(tags: &TagBag) -> bool {
    tags.has("waterway")
        || tags.has_value("natural", "coastline")
        || tags.has_value("natural", "water")
        || tags.has_value("landuse", "reservoir")
        || tags.has_value("landuse", "basin")
}

const LINEAR_VALUES: [&str; 6] = ["river", "drain", "stream", "canal", "ditch", "riverbank"];

/// Areas that belong in the polygon index. Excluded are polygons carrying
/// linear hydrography values in `waterway` or `water`: those misrepresent
/// linear features as areas and must not eliminate error candidates.
pub fn is_area_to_analyse(tags: &TagBag) -> bool {
    if let Some(waterway) = tags.get("waterway") {
        if LINEAR_VALUES.contains(&waterway) {
            return false;
        }
    }
    if let Some(water) = tags.get("water") {
        if LINEAR_VALUES.contains(&water) {
            return false;
        }
    }
    true
}

pub fn is_riverbank_or_coastline(tags: &TagBag) -> bool {
    tags.has_value("waterway", "riverbank") || tags.has_value("natural", "coastline")
}

/// Water surface test, also the member filter of the waterpolygon collector.
pub fn is_water_area(tags: &TagBag) -> bool {
    tags.has_value("natural", "water")
        || tags.has_value("landuse", "reservoir")
        || tags.has_value("landuse", "basin")
        || tags.has("waterway")
}

/// Relations the waterpolygon collector subscribes to: multipolygon or
/// boundary relations carrying a water tag.
pub fn is_waterpolygon_relation(tags: &TagBag) -> bool {
    match tags.get("type") {
        Some("multipolygon") | Some("boundary") => is_water_area(tags),
        _ => false,
    }
}

/// Type string for the polygons layer. Coastline wins; areas carrying any
/// `waterway` tag stay untyped; only areas without one fall back to the
/// landuse value (`reservoir`/`basin`).
pub fn polygon_type<'a>(tags: &'a TagBag) -> &'a str {
    if tags.has_value("natural", "coastline") {
        return "coastline";
    }
    if tags.has("waterway") {
        return "";
    }
    tags.get_or("landuse", "")
}

/// Type string for the ways and relations layers.
pub fn way_type<'a>(tags: &'a TagBag) -> &'a str {
    let from_waterway = waterway_type(tags.get("waterway"));
    if from_waterway.is_empty() {
        if tags.has_value("natural", "coastline") {
            "coastline"
        } else {
            ""
        }
    } else {
        from_waterway
    }
}

pub fn construction(tags: &TagBag) -> &'static str {
    if tags.has("bridge") {
        "bridge"
    } else if tags.has("tunnel") {
        "tunnel"
    } else {
        ""
    }
}

/// Raw width string, preferring `width` over `est_width`.
pub fn width_value(tags: &TagBag) -> Option<&str> {
    tags.get("width").or_else(|| tags.get("est_width"))
}
