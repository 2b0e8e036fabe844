//! PBF input: block index and typed pass traversal.
//!
//! The inspector reads its input several times, but passes 1 and 3 only
//! need relations resp. ways. Decoding every blob once up front and
//! remembering its type lets the later passes skip the expensive
//! decompression of blobs they do not care about.

use std::io::Cursor;

use log::info;
use osmpbf::{BlobDecode, BlobReader, PrimitiveBlock, RelMemberType};
use rayon::prelude::*;

use crate::tags::TagBag;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BlockType {
    Header,
    Nodes,
    DenseNodes,
    Ways,
    Relations,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct BlockIndex {
    pub ordinal: usize,
    pub block_type: BlockType,
}

/// Classifies a data block by its first non-empty primitive group.
///
/// Following the OSMPBF spec all groups of a block hold the same element
/// kind. Blocks without any element are skipped altogether.
fn classify(block: &PrimitiveBlock) -> Option<BlockType> {
    for group in block.groups() {
        if group.dense_nodes().next().is_some() {
            return Some(BlockType::DenseNodes);
        }
        if group.nodes().next().is_some() {
            return Some(BlockType::Nodes);
        }
        if group.ways().next().is_some() {
            return Some(BlockType::Ways);
        }
        if group.relations().next().is_some() {
            return Some(BlockType::Relations);
        }
    }
    None
}

/// Decodes all blobs once, in parallel, and records their types in stream
/// order. Undecodable blobs are reported and skipped; later passes then
/// never touch them.
pub fn build_block_index(data: &[u8]) -> Vec<BlockIndex> {
    let mut index: Vec<BlockIndex> = BlobReader::new(Cursor::new(data))
        .enumerate()
        .par_bridge()
        .filter_map(|(ordinal, blob)| {
            let blob = match blob {
                Ok(blob) => blob,
                Err(e) => {
                    eprintln!("Skipping block due to error: {}", e);
                    return None;
                }
            };
            let block_type = match blob.decode() {
                Ok(BlobDecode::OsmHeader(_)) => Some(BlockType::Header),
                Ok(BlobDecode::OsmData(block)) => classify(&block),
                Ok(BlobDecode::Unknown(_)) => None,
                Err(e) => {
                    eprintln!("Skipping block due to error: {}", e);
                    None
                }
            };
            block_type.map(|block_type| BlockIndex { ordinal, block_type })
        })
        .collect();
    index.par_sort_unstable();
    info!("Found {} blocks", index.len());
    index
}

pub fn count_blocks(index: &[BlockIndex], wanted: &[BlockType]) -> u64 {
    index
        .iter()
        .filter(|b| wanted.contains(&b.block_type))
        .count() as u64
}

/// Walks the blob stream again, decoding only blocks whose indexed type is
/// wanted, and hands each decoded block to `f`.
pub fn for_each_block<F>(
    data: &[u8],
    index: &[BlockIndex],
    wanted: &[BlockType],
    mut f: F,
) -> Result<(), osmpbf::Error>
where
    F: FnMut(&PrimitiveBlock),
{
    let mut wanted_ordinals = index
        .iter()
        .filter(|b| wanted.contains(&b.block_type))
        .map(|b| b.ordinal)
        .peekable();

    for (ordinal, blob) in BlobReader::new(Cursor::new(data)).enumerate() {
        match wanted_ordinals.peek() {
            Some(&next) if next == ordinal => {
                wanted_ordinals.next();
            }
            Some(_) => continue,
            None => break,
        }
        let blob = blob?;
        if let BlobDecode::OsmData(block) = blob.decode()? {
            f(&block);
        }
    }
    Ok(())
}

/// Owned copy of a way, kept while relations wait for their members and
/// handed around between the collectors.
#[derive(Debug, Clone)]
pub struct StashedWay {
    pub id: i64,
    pub refs: Vec<i64>,
    pub tags: TagBag,
    /// Last change, seconds since the epoch.
    pub timestamp: Option<i64>,
}

impl StashedWay {
    pub fn from_osm(way: &osmpbf::Way) -> Self {
        Self {
            id: way.id(),
            refs: way.refs().collect(),
            tags: way.tags().collect(),
            timestamp: way.info().milli_timestamp().map(|ms| ms / 1000),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WayMember {
    pub way_id: i64,
    pub role: String,
}

/// Owned copy of a relation registered in pass 1. Only way members are
/// kept; other member types play no role here.
#[derive(Debug, Clone)]
pub struct StashedRelation {
    pub id: i64,
    pub tags: TagBag,
    pub timestamp: Option<i64>,
    pub members: Vec<WayMember>,
}

impl StashedRelation {
    pub fn from_osm(relation: &osmpbf::Relation) -> Self {
        let members = relation
            .members()
            .filter(|member| member.member_type == RelMemberType::Way)
            .map(|member| WayMember {
                way_id: member.member_id,
                role: member.role().unwrap_or("").to_string(),
            })
            .collect();
        Self {
            id: relation.id(),
            tags: relation.tags().collect(),
            timestamp: relation.info().milli_timestamp().map(|ms| ms / 1000),
            members,
        }
    }
}
