//! End-to-end scenarios at the component level: collectors feed a real
//! database file, node analysis and false-positive elimination run over
//! it, and the assertions read the resulting tables back.

use std::path::PathBuf;

use rusqlite::Connection;
use tempfile::TempDir;

use hydrocheck::areahandler::AreaHandler;
use hydrocheck::datastorage::DataStorage;
use hydrocheck::falsepositives::IndicateFalsePositives;
use hydrocheck::geometry::AssembledArea;
use hydrocheck::locations::{Location, LocationTable};
use hydrocheck::pbf::{StashedRelation, StashedWay, WayMember};
use hydrocheck::tags::TagBag;
use hydrocheck::waterpolygon::WaterpolygonCollector;
use hydrocheck::waterway::WaterwayCollector;

const TS: i64 = 1436185845; // 2015-07-06 12:30:45

struct Fixture {
    _dir: TempDir,
    path: PathBuf,
}

impl Fixture {
    fn new() -> (Fixture, DataStorage) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.gpkg");
        let ds = DataStorage::new(&path).unwrap();
        (Fixture { _dir: dir, path }, ds)
    }

    fn open(&self) -> Connection {
        Connection::open(&self.path).unwrap()
    }
}

fn tags(pairs: &[(&str, &str)]) -> TagBag {
    pairs.iter().cloned().collect()
}

fn way(id: i64, waterway: &str, name: Option<&str>, refs: &[i64]) -> StashedWay {
    let mut tags = TagBag::new();
    tags.insert("waterway", waterway);
    if let Some(name) = name {
        tags.insert("name", name);
    }
    StashedWay {
        id,
        refs: refs.to_vec(),
        tags,
        timestamp: Some(TS),
    }
}

/// Node n sits at (lon, lat) = (n * 0.001, n * 0.001).
fn grid_locations(ids: &[i64]) -> LocationTable {
    let mut locations = LocationTable::new();
    for &id in ids {
        locations.insert(id, Location::from_degrees(id as f64 * 0.001, id as f64 * 0.001));
    }
    locations
}

fn count(conn: &Connection, sql: &str) -> i64 {
    conn.query_row(sql, [], |row| row.get(0)).unwrap()
}

fn node_flags(conn: &Connection, node_id: i64) -> (String, String, String, String, String, String, String) {
    conn.query_row(
        "SELECT specific, direction_error, name_error, type_error, spring_error, end_error, way_error \
         FROM nodes WHERE node_id = ?1",
        [node_id.to_string()],
        |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
                row.get(6)?,
            ))
        },
    )
    .unwrap()
}

/// Square water polygon centred on grid node `n`, small enough to contain
/// only that node.
fn water_polygon_around(node: i64) -> AssembledArea {
    let c = node as f64 * 0.001;
    let d = 0.0004;
    let ring = vec![
        (c - d, c - d),
        (c + d, c - d),
        (c + d, c + d),
        (c - d, c + d),
        (c - d, c - d),
    ];
    let coords: Vec<geo_types::Coord<f64>> = ring
        .into_iter()
        .map(|(x, y)| geo_types::Coord { x, y })
        .collect();
    let polygon = geo_types::Polygon::new(geo_types::LineString::from(coords), Vec::new());
    AssembledArea {
        orig_id: 900,
        from_way: true,
        tags: tags(&[("natural", "water")]),
        timestamp: Some(TS),
        geometry: geo_types::MultiPolygon(vec![polygon]),
    }
}

#[test]
fn y_junction_river() {
    let (fixture, mut ds) = Fixture::new();
    let locations = grid_locations(&[1, 2, 3, 4]);
    let mut collector = WaterwayCollector::new();

    collector.way(&way(11, "river", None, &[1, 2]), &mut ds, &locations);
    collector.way(&way(12, "river", None, &[3, 2]), &mut ds, &locations);
    collector.way(&way(13, "river", None, &[2, 4]), &mut ds, &locations);
    collector.analyse_nodes(&mut ds, &locations);

    // the junction itself is clean and written immediately
    assert!(!ds.error_map.contains_key(&2));
    assert!(ds.error_map.contains_key(&1));
    assert!(ds.error_map.contains_key(&3));
    assert!(ds.error_map.contains_key(&4));
    assert!(ds.error_map[&1].is_poss_outflow());
    assert!(ds.error_map[&3].is_poss_outflow());
    assert!(ds.error_map[&4].is_poss_rivermouth());

    // no polygon evidence arrives: the guesses become spring/end errors
    let handler = AreaHandler::new();
    handler.complete_polygon_tree(&mut ds);
    let fp = IndicateFalsePositives::new();
    fp.analyse_polygons(&mut ds, &locations);
    ds.insert_error_nodes(&locations);

    let stats = ds.finish().unwrap();
    assert_eq!(stats.num_ways, 3);
    assert_eq!(stats.num_nodes, 4);

    let conn = fixture.open();
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM ways"), 3);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM nodes"), 4);

    let junction = node_flags(&conn, 2);
    assert_eq!(
        junction,
        (
            "".into(),
            "false".into(),
            "false".into(),
            "false".into(),
            "false".into(),
            "false".into(),
            "false".into()
        )
    );
    let f1 = node_flags(&conn, 1);
    assert_eq!(f1.0, "");
    assert_eq!(f1.4, "true"); // spring_error

    let f4 = node_flags(&conn, 4);
    assert_eq!(f4.0, "");
    assert_eq!(f4.5, "true"); // end_error
    assert_eq!(f4.4, "false");
}

#[test]
fn river_into_stream_sets_type_error() {
    let (fixture, mut ds) = Fixture::new();
    let locations = grid_locations(&[1, 2, 3]);
    let mut collector = WaterwayCollector::new();

    collector.way(&way(21, "river", None, &[1, 2]), &mut ds, &locations);
    collector.way(&way(22, "stream", None, &[2, 3]), &mut ds, &locations);
    collector.analyse_nodes(&mut ds, &locations);

    assert!(ds.error_map[&2].is_type_error());
    assert!(ds.error_map[&1].is_poss_outflow());
    assert!(ds.error_map[&3].is_poss_rivermouth());

    AreaHandler::new().complete_polygon_tree(&mut ds);
    IndicateFalsePositives::new().analyse_polygons(&mut ds, &locations);
    ds.insert_error_nodes(&locations);
    ds.finish().unwrap();

    let conn = fixture.open();
    let junction = node_flags(&conn, 2);
    assert_eq!(junction.3, "true"); // type_error
    assert_eq!(junction.1, "false");
}

#[test]
fn renamed_through_way_sets_name_error() {
    let (fixture, mut ds) = Fixture::new();
    let locations = grid_locations(&[1, 2, 3]);
    let mut collector = WaterwayCollector::new();

    collector.way(&way(31, "stream", Some("Alpha"), &[1, 2]), &mut ds, &locations);
    collector.way(&way(32, "stream", Some("Beta"), &[2, 3]), &mut ds, &locations);
    collector.analyse_nodes(&mut ds, &locations);

    assert!(ds.error_map[&2].is_name_error());
    assert!(!ds.error_map[&2].is_type_error());
    assert!(!ds.error_map[&2].is_direction_error());

    ds.insert_error_nodes(&locations);
    ds.finish().unwrap();

    let conn = fixture.open();
    let junction = node_flags(&conn, 2);
    assert_eq!(junction.2, "true"); // name_error
}

#[test]
fn coastline_pass_confirms_rivermouth() {
    let (fixture, mut ds) = Fixture::new();
    let locations = grid_locations(&[1, 2, 10, 11]);
    let mut collector = WaterwayCollector::new();

    collector.way(&way(41, "river", None, &[1, 2]), &mut ds, &locations);
    collector.analyse_nodes(&mut ds, &locations);
    assert!(ds.error_map[&2].is_poss_rivermouth());

    // the coastline way contributes all of its nodes, node 2 among them
    let fp = IndicateFalsePositives::new();
    let mut coastline = way(42, "", None, &[10, 2, 11]);
    coastline.tags = tags(&[("natural", "coastline")]);
    fp.way(&coastline, &mut ds, &locations);
    assert!(ds.error_map[&2].is_rivermouth());

    AreaHandler::new().complete_polygon_tree(&mut ds);
    fp.analyse_polygons(&mut ds, &locations);
    ds.insert_error_nodes(&locations);
    ds.finish().unwrap();

    let conn = fixture.open();
    let mouth = node_flags(&conn, 2);
    assert_eq!(mouth.0, "rivermouth");
    assert_eq!(mouth.5, "false"); // no end error once confirmed
}

#[test]
fn point_in_polygon_clears_direction_error() {
    let (fixture, mut ds) = Fixture::new();
    let locations = grid_locations(&[1, 2, 3, 4]);
    let mut collector = WaterwayCollector::new();

    // three rivers all flowing into node 2
    collector.way(&way(51, "river", None, &[1, 2]), &mut ds, &locations);
    collector.way(&way(52, "river", None, &[3, 2]), &mut ds, &locations);
    collector.way(&way(53, "river", None, &[4, 2]), &mut ds, &locations);
    collector.analyse_nodes(&mut ds, &locations);
    assert!(ds.error_map[&2].is_direction_error());

    // a water polygon around node 2 invalidates the hypothesis
    let mut handler = AreaHandler::new();
    handler.area(&water_polygon_around(2), &mut ds);
    handler.complete_polygon_tree(&mut ds);

    let fp = IndicateFalsePositives::new();
    fp.analyse_polygons(&mut ds, &locations);
    assert!(!ds.error_map.contains_key(&2));

    ds.insert_error_nodes(&locations);
    ds.finish().unwrap();

    let conn = fixture.open();
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM polygons"), 1);
    let cleared = node_flags(&conn, 2);
    assert_eq!(
        cleared,
        (
            "".into(),
            "false".into(),
            "false".into(),
            "false".into(),
            "false".into(),
            "false".into(),
            "false".into()
        )
    );
    // the upstream dead ends were outside the polygon and finalise as
    // spring errors
    let upstream = node_flags(&conn, 1);
    assert_eq!(upstream.4, "true");
}

#[test]
fn lone_way_produces_way_error_node() {
    let (fixture, mut ds) = Fixture::new();
    let locations = grid_locations(&[5]);
    let mut collector = WaterwayCollector::new();

    collector.way(&way(61, "stream", None, &[5]), &mut ds, &locations);
    collector.analyse_nodes(&mut ds, &locations);
    ds.finish().unwrap();

    let conn = fixture.open();
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM ways"), 0);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM nodes"), 1);
    let flags = node_flags(&conn, 5);
    assert_eq!(flags.6, "true"); // way_error
}

#[test]
fn relation_without_linestring_members_produces_no_relation_row() {
    let (fixture, mut ds) = Fixture::new();
    let locations = grid_locations(&[5]);
    let mut collector = WaterwayCollector::new();

    let relation = StashedRelation {
        id: 100,
        tags: tags(&[("waterway", "river"), ("type", "waterway")]),
        timestamp: Some(TS),
        members: vec![WayMember {
            way_id: 61,
            role: String::new(),
        }],
    };
    collector.read_relation(&relation);
    collector.way(&way(61, "river", None, &[5]), &mut ds, &locations);
    ds.finish().unwrap();

    let conn = fixture.open();
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM relations"), 0);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM ways"), 0);
    let flags = node_flags(&conn, 5);
    assert_eq!(flags.6, "true");
}

#[test]
fn relation_join_emits_member_ways_and_relation() {
    let (fixture, mut ds) = Fixture::new();
    let locations = grid_locations(&[1, 2, 3]);
    let mut collector = WaterwayCollector::new();

    let relation = StashedRelation {
        id: 200,
        tags: tags(&[("waterway", "river"), ("name", "Aller")]),
        timestamp: Some(TS),
        members: vec![
            WayMember {
                way_id: 71,
                role: String::new(),
            },
            WayMember {
                way_id: 72,
                role: String::new(),
            },
        ],
    };
    collector.read_relation(&relation);
    collector.way(&way(71, "river", Some("Aller"), &[1, 2]), &mut ds, &locations);
    assert_eq!(ds.waterway_count(), 0); // waits for the last member
    collector.way(&way(72, "river", Some("Aller"), &[2, 3]), &mut ds, &locations);
    assert_eq!(ds.waterway_count(), 2);

    collector.analyse_nodes(&mut ds, &locations);
    let stats = ds.finish().unwrap();
    assert_eq!(stats.num_relations, 1);
    assert_eq!(stats.num_ways, 2);

    let conn = fixture.open();
    let (rel_id, rel_type, nowaterway): (i64, String, String) = conn
        .query_row(
            "SELECT relation_id, type, nowaterway_error FROM relations",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .unwrap();
    assert_eq!(rel_id, 200);
    assert_eq!(rel_type, "river");
    assert_eq!(nowaterway, "false");

    let (first, last, rel, lastchange): (String, String, i64, String) = conn
        .query_row(
            "SELECT firstnode, lastnode, relation_id, lastchange FROM ways WHERE way_id = 71",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
        .unwrap();
    assert_eq!(first, "1");
    assert_eq!(last, "2");
    assert_eq!(rel, 200);
    assert_eq!(lastchange, "2015-07-06 12:30:45");

    // the shared node is a clean through-flow junction
    let junction = node_flags(&conn, 2);
    assert_eq!(junction.1, "false");
    assert_eq!(junction.2, "false");
}

#[test]
fn relation_with_nowaterway_member_is_flagged() {
    let (fixture, mut ds) = Fixture::new();
    let locations = grid_locations(&[1, 2, 3]);
    let mut collector = WaterwayCollector::new();

    let relation = StashedRelation {
        id: 300,
        tags: tags(&[("type", "waterway"), ("waterway", "river")]),
        timestamp: Some(TS),
        members: vec![
            WayMember {
                way_id: 81,
                role: String::new(),
            },
            WayMember {
                way_id: 82,
                role: String::new(),
            },
        ],
    };
    collector.read_relation(&relation);
    collector.way(&way(81, "river", None, &[1, 2]), &mut ds, &locations);
    let dam = StashedWay {
        id: 82,
        refs: vec![2, 3],
        tags: tags(&[("man_made", "dyke")]),
        timestamp: Some(TS),
    };
    collector.way(&dam, &mut ds, &locations);
    ds.finish().unwrap();

    let conn = fixture.open();
    let nowaterway: String = conn
        .query_row("SELECT nowaterway_error FROM relations", [], |row| row.get(0))
        .unwrap();
    assert_eq!(nowaterway, "true");
}

#[test]
fn incomplete_relation_still_emits_available_members() {
    let (fixture, mut ds) = Fixture::new();
    let locations = grid_locations(&[1, 2]);
    let mut collector = WaterwayCollector::new();

    let relation = StashedRelation {
        id: 400,
        tags: tags(&[("waterway", "river")]),
        timestamp: Some(TS),
        members: vec![
            WayMember {
                way_id: 91,
                role: String::new(),
            },
            WayMember {
                way_id: 92, // never arrives
                role: String::new(),
            },
        ],
    };
    collector.read_relation(&relation);
    collector.way(&way(91, "river", None, &[1, 2]), &mut ds, &locations);
    assert_eq!(ds.waterway_count(), 0);

    let incomplete = collector.complete_incomplete_relations(&mut ds, &locations);
    assert_eq!(incomplete, vec![400]);
    assert_eq!(ds.waterway_count(), 1);

    ds.finish().unwrap();
    let conn = fixture.open();
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM ways"), 1);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM relations"), 1);
}

#[test]
fn standalone_closed_way_becomes_polygon() {
    let (fixture, mut ds) = Fixture::new();
    let locations = grid_locations(&[1, 2, 3, 4]);
    let mut collector = WaterpolygonCollector::new();
    let mut handler = AreaHandler::new();

    let mut pond = StashedWay {
        id: 95,
        refs: vec![1, 2, 3, 4, 1],
        tags: tags(&[("natural", "water"), ("name", "Teich")]),
        timestamp: Some(TS),
    };
    collector.way(&pond, &mut handler, &mut ds, &locations);
    handler.complete_polygon_tree(&mut ds);
    assert_eq!(ds.polygon_count(), 1); // no sentinel needed

    ds.finish().unwrap();
    let conn = fixture.open();
    let (way_id, rel_id, name): (i64, i64, String) = conn
        .query_row("SELECT way_id, relation_id, name FROM polygons", [], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        })
        .unwrap();
    assert_eq!(way_id, 95);
    assert_eq!(rel_id, 0);
    assert_eq!(name, "Teich");

    pond.refs = vec![1, 2, 3]; // not closed, ignored
    let mut ds2 = DataStorage::new(&fixture.path.with_extension("second")).unwrap();
    let mut handler2 = AreaHandler::new();
    collector.way(&pond, &mut handler2, &mut ds2, &locations);
    assert_eq!(ds2.polygon_count(), 0);
    ds2.finish().unwrap();
}

#[test]
fn sentinel_polygon_only_when_index_empty() {
    let (_fixture, mut ds) = Fixture::new();
    let handler = AreaHandler::new();
    assert_eq!(ds.polygon_count(), 0);
    handler.complete_polygon_tree(&mut ds);
    assert_eq!(ds.polygon_count(), 1);
    // the sentinel keeps queries defined but never matches
    let point = geo_types::Point::new(0.0, 0.0);
    assert_eq!(ds.find_containing_polygon(&point), None);
    ds.finish().unwrap();

    let (_fixture2, mut ds2) = Fixture::new();
    let mut handler2 = AreaHandler::new();
    handler2.area(&water_polygon_around(2), &mut ds2);
    handler2.complete_polygon_tree(&mut ds2);
    assert_eq!(ds2.polygon_count(), 1); // the real polygon, no sentinel
    ds2.finish().unwrap();
}

#[test]
fn riverbank_polygon_is_written_but_not_indexed() {
    let (fixture, mut ds) = Fixture::new();
    let mut handler = AreaHandler::new();
    let mut area = water_polygon_around(2);
    area.tags = tags(&[("waterway", "riverbank")]);
    handler.area(&area, &mut ds);
    assert_eq!(ds.polygon_count(), 0);
    ds.finish().unwrap();

    let conn = fixture.open();
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM polygons"), 1);
    // waterway-tagged polygons carry no type string
    let polygon_type: String = conn
        .query_row("SELECT type FROM polygons", [], |row| row.get(0))
        .unwrap();
    assert_eq!(polygon_type, "");
}
