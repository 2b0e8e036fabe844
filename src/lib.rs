//! Quality assurance for OSM hydrography.
//!
//! hydrocheck streams an OpenStreetMap extract several times and produces
//! a georeferenced error database with four layers: water polygons,
//! waterway relations, waterway ways, and flagged nodes. Each feature
//! carries its geometry plus a set of boolean error flags describing
//! likely tagging, geometry, and topology problems (wrong flow direction,
//! names changing mid-stream, rivers demoting into ditches, springs and
//! dead ends that are really rivermouths, and so on).
//!
//! The heavy lifting happens in three places: the relation join and nodal
//! analysis in [`waterway`], the polygon index build in [`areahandler`],
//! and the geometric false-positive elimination in [`falsepositives`].
//! The binary in `main.rs` wires them into the pass sequence.

pub mod args;
pub mod areahandler;
pub mod datastorage;
pub mod errorsum;
pub mod falsepositives;
pub mod geometry;
pub mod locations;
pub mod pbf;
pub mod stats;
pub mod tagcheck;
pub mod tags;
pub mod waterpolygon;
pub mod waterway;
