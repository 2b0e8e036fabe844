use std::path::PathBuf;

/// Inspects the hydrographic features of an OSM extract and writes a
/// quality-assurance GeoPackage flagging likely errors
#[derive(Debug, clap::Parser)]
#[clap(about, version, author)]
pub struct Args {
    /// Verbose mode (-v, -vv, -vvv, etc.)
    #[clap(short, long, parse(from_occurrences))]
    pub verbose: u8,

    /// Enable debug output of the multipolygon assembler
    #[clap(short, long)]
    pub debug: bool,

    /// Input OSM pbf file, or - to read from standard input
    pub input: PathBuf,

    /// Output GeoPackage database
    pub output: PathBuf,
}
