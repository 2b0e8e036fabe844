use std::fs::File;
use std::io::Read;

use clap::{ErrorKind, Parser};
use colored::*;
use itertools::Itertools;
use log::{info, warn};
use memmap2::Mmap;
use pbr::ProgressBar;

use hydrocheck::args::Args;
use hydrocheck::areahandler::AreaHandler;
use hydrocheck::datastorage::DataStorage;
use hydrocheck::falsepositives::IndicateFalsePositives;
use hydrocheck::locations::{Location, LocationTable};
use hydrocheck::pbf::{self, BlockType, StashedRelation, StashedWay};
use hydrocheck::waterpolygon::WaterpolygonCollector;
use hydrocheck::waterway::WaterwayCollector;

type Error = Box<dyn std::error::Error>;

fn run(args: Args) -> Result<(), Error> {
    let mapped;
    let buffered;
    let data: &[u8] = if args.input.as_os_str() == "-" {
        let mut buf = Vec::new();
        std::io::stdin().read_to_end(&mut buf)?;
        buffered = buf;
        &buffered
    } else {
        let input_file = File::open(&args.input)?;
        mapped = unsafe { Mmap::map(&input_file)? };
        &mapped
    };

    let mut ds = DataStorage::new(&args.output)?;
    info!("Initialized output database at: {}", args.output.display());

    let mut locations = LocationTable::new();
    let mut waterway_collector = WaterwayCollector::new();
    let mut waterpolygon_collector = WaterpolygonCollector::new();
    let mut area_handler = AreaHandler::new();
    let indicate_fp = IndicateFalsePositives::new();

    info!("Building index of PBF blocks...");
    let block_index = pbf::build_block_index(data);

    // Pass 1: register the way members of waterway and waterpolygon
    // relations.
    info!("Pass 1...");
    let mut pb = ProgressBar::new(pbf::count_blocks(&block_index, &[BlockType::Relations]));
    pb.message("Scanning relations...");
    pbf::for_each_block(data, &block_index, &[BlockType::Relations], |block| {
        for group in block.groups() {
            for relation in group.relations() {
                let relation = StashedRelation::from_osm(&relation);
                waterway_collector.read_relation(&relation);
                waterpolygon_collector.read_relation(&relation);
            }
        }
        pb.inc();
    })?;
    info!("Pass 1 done");

    // Pass 2: fill the node-location store, emit ways, relations and
    // polygons, then classify every junction node.
    info!("Pass 2...");
    let mut pb = ProgressBar::new(pbf::count_blocks(
        &block_index,
        &[BlockType::Nodes, BlockType::DenseNodes, BlockType::Ways],
    ));
    pb.message("Collecting waterways and areas...");
    pbf::for_each_block(
        data,
        &block_index,
        &[BlockType::Nodes, BlockType::DenseNodes, BlockType::Ways],
        |block| {
            for group in block.groups() {
                for node in group.nodes() {
                    locations.insert(node.id(), Location::from_degrees(node.lat(), node.lon()));
                }
                for node in group.dense_nodes() {
                    locations.insert(node.id(), Location::from_degrees(node.lat(), node.lon()));
                }
                for way in group.ways() {
                    let way = StashedWay::from_osm(&way);
                    waterway_collector.way(&way, &mut ds, &locations);
                    waterpolygon_collector.way(&way, &mut area_handler, &mut ds, &locations);
                }
            }
            pb.inc();
        },
    )?;
    let mut incomplete = waterway_collector.complete_incomplete_relations(&mut ds, &locations);
    incomplete.extend(waterpolygon_collector.complete_incomplete_relations(
        &mut area_handler,
        &mut ds,
        &locations,
    ));
    info!("Analysing nodes...");
    waterway_collector.analyse_nodes(&mut ds, &locations);
    info!("Pass 2 done");

    // Pass 3: eliminate false positives along waterway, riverbank and
    // coastline ways.
    info!("Pass 3...");
    let mut pb = ProgressBar::new(pbf::count_blocks(&block_index, &[BlockType::Ways]));
    pb.message("Indicating false positives...");
    pbf::for_each_block(data, &block_index, &[BlockType::Ways], |block| {
        for group in block.groups() {
            for way in group.ways() {
                let way = StashedWay::from_osm(&way);
                indicate_fp.way(&way, &mut ds, &locations);
            }
        }
        pb.inc();
    })?;
    info!("Pass 3 done");

    // Final phase: polygon containment for the remaining candidates, then
    // flush the error nodes.
    area_handler.complete_polygon_tree(&mut ds);
    indicate_fp.analyse_polygons(&mut ds, &locations);
    ds.insert_error_nodes(&locations);

    if !incomplete.is_empty() {
        incomplete.sort_unstable();
        incomplete.dedup();
        warn!(
            "Some member ways missing for these multipolygon relations: {}",
            incomplete.iter().join(" ")
        );
    }

    let stats = ds.finish()?;
    println!("{}", stats);
    Ok(())
}

fn main() {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            let _ = e.print();
            std::process::exit(code);
        }
    };
    let level = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = if args.debug {
        format!("{},hydrocheck::geometry=debug", level)
    } else {
        level.to_string()
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter))
        .format_module_path(false)
        .format_timestamp_nanos()
        .init();

    if let Err(e) = run(args) {
        eprintln!("{}: {}", "Error".red(), e);
        std::process::exit(1);
    }
}
