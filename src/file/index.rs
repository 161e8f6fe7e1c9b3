// Copyright (c) 2024-present, spectre contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::block::BlockMetadata;
use crate::final_state::FinalStateMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Current version of the index section's serialization schema. Additive
/// fields gain `#[serde(default)]` so older readers ignore them and older
/// writers default them, rather than bumping this.
pub const INDEX_FORMAT_VERSION: u32 = 1;

/// Summary statistics computed at close time, useful to a reader without
/// scanning `block_metadata`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Statistics {
    pub block_count: u32,
    pub event_count: u64,
    pub timestamp_min: Option<i64>,
    pub timestamp_max: Option<i64>,
}

/// The self-describing, versioned document written at file-close time,
/// holding everything needed to serve queries against a sealed file
/// without re-scanning its blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSection {
    #[serde(default = "default_format_version")]
    pub format_version: u32,

    pub block_metadata: Vec<BlockMetadata>,
    pub kind_to_blocks: BTreeMap<String, Vec<u32>>,
    pub namespace_to_blocks: BTreeMap<String, Vec<u32>>,
    pub group_to_blocks: BTreeMap<String, Vec<u32>>,

    #[serde(default)]
    pub statistics: Statistics,

    #[serde(default)]
    pub final_state_map: FinalStateMap,
}

fn default_format_version() -> u32 {
    INDEX_FORMAT_VERSION
}

impl IndexSection {
    /// Builds the index section from a sealed file's block metadata and
    /// final state map. Inverted-index block-id lists are built in
    /// insertion order, which is naturally sorted because blocks are
    /// appended sequentially.
    #[must_use]
    pub fn build(block_metadata: Vec<BlockMetadata>, final_state_map: FinalStateMap) -> Self {
        let mut kind_to_blocks: BTreeMap<String, Vec<u32>> = BTreeMap::new();
        let mut namespace_to_blocks: BTreeMap<String, Vec<u32>> = BTreeMap::new();
        let mut group_to_blocks: BTreeMap<String, Vec<u32>> = BTreeMap::new();

        let mut statistics = Statistics::default();

        for block in &block_metadata {
            statistics.block_count += 1;
            statistics.event_count += u64::from(block.event_count);
            statistics.timestamp_min = Some(
                statistics
                    .timestamp_min
                    .map_or(block.timestamp_min, |m| m.min(block.timestamp_min)),
            );
            statistics.timestamp_max = Some(
                statistics
                    .timestamp_max
                    .map_or(block.timestamp_max, |m| m.max(block.timestamp_max)),
            );

            for kind in &block.kinds_set {
                kind_to_blocks.entry(kind.clone()).or_default().push(block.id);
            }
            for namespace in &block.namespaces_set {
                namespace_to_blocks
                    .entry(namespace.clone())
                    .or_default()
                    .push(block.id);
            }
            for group in &block.groups_set {
                group_to_blocks.entry(group.clone()).or_default().push(block.id);
            }
        }

        Self {
            format_version: INDEX_FORMAT_VERSION,
            block_metadata,
            kind_to_blocks,
            namespace_to_blocks,
            group_to_blocks,
            statistics,
            final_state_map,
        }
    }

    /// Computes candidate block ids for a combination of filters, per the
    /// inverted-index query contract: start from "all block ids"
    /// conceptually, and for each specified non-empty filter intersect
    /// with that field's block-id list. A missing key yields an empty
    /// candidate set for that filter, which empties the whole
    /// intersection.
    #[must_use]
    pub fn candidates(
        &self,
        kind: Option<&str>,
        namespace: Option<&str>,
        group: Option<&str>,
    ) -> Option<Vec<u32>> {
        let lists = [
            kind.map(|k| self.kind_to_blocks.get(k)),
            namespace.map(|n| self.namespace_to_blocks.get(n)),
            group.map(|g| self.group_to_blocks.get(g)),
        ];

        let mut result: Option<Vec<u32>> = None;

        for list in lists.into_iter().flatten() {
            let list = list.map(Vec::as_slice).unwrap_or_default();
            result = Some(match result {
                None => list.to_vec(),
                Some(acc) => intersect_sorted(&acc, list),
            });
        }

        result
    }
}

/// Two-pointer merge intersection of two block-id lists, each already
/// sorted in ascending order (guaranteed by append-order construction).
fn intersect_sorted(a: &[u32], b: &[u32]) -> Vec<u32> {
    let mut out = Vec::new();
    let (mut i, mut j) = (0, 0);

    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bloom::BloomFilter;
    use std::collections::BTreeSet;
    use test_log::test;

    fn block(id: u32, kinds: &[&str], namespaces: &[&str]) -> BlockMetadata {
        BlockMetadata {
            id,
            offset: 0,
            length: 1,
            uncompressed_length: 1,
            event_count: 1,
            timestamp_min: i64::from(id),
            timestamp_max: i64::from(id),
            kinds_set: kinds.iter().map(|s| (*s).to_string()).collect::<BTreeSet<_>>(),
            namespaces_set: namespaces
                .iter()
                .map(|s| (*s).to_string())
                .collect::<BTreeSet<_>>(),
            groups_set: BTreeSet::new(),
            bloom_kinds: BloomFilter::with_fp_rate(1, 0.01),
            bloom_namespaces: BloomFilter::with_fp_rate(1, 0.01),
            bloom_groups: BloomFilter::with_fp_rate(1, 0.01),
        }
    }

    #[test]
    fn inverted_index_consistency() {
        let blocks = vec![
            block(0, &["Pod"], &["default"]),
            block(1, &["Pod", "Service"], &["default"]),
            block(2, &["Service"], &["kube-system"]),
        ];
        let index = IndexSection::build(blocks, FinalStateMap::new());

        assert_eq!(Some(vec![0, 1]), index.candidates(Some("Pod"), None, None));
        assert_eq!(
            Some(vec![1, 2]),
            index.candidates(Some("Service"), None, None)
        );
        assert_eq!(
            Some(vec![1]),
            index.candidates(Some("Service"), Some("default"), None)
        );
        assert_eq!(Some(vec![]), index.candidates(Some("Deployment"), None, None));
    }

    #[test]
    fn no_filters_yields_no_candidates_restriction() {
        let blocks = vec![block(0, &["Pod"], &["default"])];
        let index = IndexSection::build(blocks, FinalStateMap::new());
        assert_eq!(None, index.candidates(None, None, None));
    }

    #[test]
    fn json_round_trip() {
        let blocks = vec![block(0, &["Pod"], &["default"])];
        let index = IndexSection::build(blocks, FinalStateMap::new());
        let json = serde_json::to_string(&index).unwrap();
        let parsed: IndexSection = serde_json::from_str(&json).unwrap();
        assert_eq!(index.statistics.block_count, parsed.statistics.block_count);
    }
}
