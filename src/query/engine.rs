// Copyright (c) 2024-present, spectre contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::filter::{QueryFilter, QueryResponse};
use crate::block::BlockMetadata;
use crate::block_cache::CachedBlock;
use crate::compression::CompressionAlgorithm;
use crate::error::{Error, Result, Warning};
use crate::event::{Operation, ResourceEvent, ResourceIdentity};
use crate::file::index::IndexSection;
use crate::file::{open_sealed_for_read, read_block_at};
use crate::final_state::FinalStateMap;
use crate::storage::Storage;
use crate::stop_signal::StopSignal;
use crate::time::HourBucket;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::Ordering::Relaxed;
use std::sync::Arc;
use std::time::Instant;

struct StateCandidate {
    timestamp: i64,
    operation: Operation,
    payload: Option<serde_json::Value>,
    uid: String,
}

/// File selection, index-driven block pruning, cached decode, in-block
/// filtering, state-snapshot synthesis, and merge/sort/limit over one or
/// more hourly files.
pub struct QueryEngine {
    storage: Arc<Storage>,
}

impl QueryEngine {
    #[must_use]
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// Answers `filter` against the storage directory. `cancel` is polled
    /// between blocks and between files; once observed stopped the query
    /// returns whatever it has collected so far with
    /// [`QueryResponse::cancelled`] set.
    ///
    /// # Errors
    /// Returns [`Error::InvalidQuery`] if `filter.start_ts > filter.end_ts`
    /// or the window is wider than `max_query_span`.
    pub fn query(&self, filter: QueryFilter, cancel: &StopSignal) -> Result<QueryResponse> {
        let started = Instant::now();

        if filter.start_ts > filter.end_ts {
            return Err(Error::InvalidQuery(
                "start_ts must be less than or equal to end_ts".into(),
            ));
        }

        #[allow(clippy::cast_sign_loss)]
        let span_nanos = (filter.end_ts - filter.start_ts) as u128;
        let max_span_nanos = self.storage.max_query_span().as_nanos();
        if span_nanos > max_span_nanos {
            return Err(Error::InvalidQuery(format!(
                "query window of {span_nanos}ns exceeds max_query_span of {max_span_nanos}ns"
            )));
        }

        let mut response = QueryResponse::default();
        let mut seen_keys: HashSet<String> = HashSet::new();
        let mut state_candidates: HashMap<String, StateCandidate> = HashMap::new();

        let open_file = self.storage.open_file_snapshot();
        let open_file_name = open_file.as_ref().map(|(name, ..)| name.clone());

        for bucket in select_buckets(filter.start_ts, filter.end_ts) {
            if cancel.is_stopped() {
                response.cancelled = true;
                break;
            }

            let file_name = bucket.file_name();
            let path = self.storage.data_dir().join(&file_name);

            for rotated in rotated_aside_siblings(self.storage.data_dir(), &file_name) {
                response.warnings.push(Warning::FileSkipped {
                    file: rotated.clone(),
                    reason: format!("{rotated} was rotated aside at recovery and is not queried"),
                });
            }

            if open_file_name.as_deref() == Some(file_name.as_str()) {
                let (_, snapshot, compression) = open_file.clone().expect("matched by name");
                self.process_file(
                    &filter,
                    &file_name,
                    &path,
                    compression,
                    &snapshot.block_metadata,
                    &snapshot.final_state_map,
                    &snapshot.buffered_events,
                    &mut response,
                    &mut seen_keys,
                    &mut state_candidates,
                    cancel,
                );
                self.count_file_considered(&mut response);
            } else if path.exists() {
                match open_sealed_for_read(&path) {
                    Ok((header, index)) => {
                        self.process_file(
                            &filter,
                            &file_name,
                            &path,
                            header.compression,
                            &index.block_metadata,
                            &index.final_state_map,
                            &[],
                            &mut response,
                            &mut seen_keys,
                            &mut state_candidates,
                            cancel,
                        );
                    }
                    Err(e) => {
                        response.warnings.push(Warning::FileSkipped {
                            file: file_name.clone(),
                            reason: e.to_string(),
                        });
                    }
                }
                self.count_file_considered(&mut response);
            }
        }

        for (key, candidate) in state_candidates {
            if seen_keys.contains(&key) {
                continue;
            }
            if let Some(identity) = parse_resource_key(&key, candidate.uid) {
                if !filter.matches_identity(&identity) {
                    continue;
                }
                response.events.push(ResourceEvent {
                    identity,
                    timestamp: filter.start_ts,
                    operation: candidate.operation,
                    payload: candidate.payload,
                    synthetic: true,
                });
            }
        }

        response.events.sort_by(|a, b| {
            a.timestamp.cmp(&b.timestamp).then_with(|| {
                (
                    &a.identity.kind,
                    &a.identity.namespace,
                    &a.identity.name,
                    &a.identity.uid,
                )
                    .cmp(&(
                        &b.identity.kind,
                        &b.identity.namespace,
                        &b.identity.name,
                        &b.identity.uid,
                    ))
            })
        });

        if let Some(limit) = filter.limit {
            response.events.truncate(limit);
        }

        response.metrics.elapsed = started.elapsed();
        Ok(response)
    }

    fn count_file_considered(&self, response: &mut QueryResponse) {
        response.metrics.files_considered += 1;
        self.storage
            .metrics()
            .query_files_considered
            .fetch_add(1, Relaxed);
    }

    #[allow(clippy::too_many_arguments)]
    fn process_file(
        &self,
        filter: &QueryFilter,
        file_name: &str,
        path: &Path,
        compression: CompressionAlgorithm,
        block_metadata: &[BlockMetadata],
        final_state_map: &FinalStateMap,
        buffered_events: &[ResourceEvent],
        response: &mut QueryResponse,
        seen_keys: &mut HashSet<String>,
        state_candidates: &mut HashMap<String, StateCandidate>,
        cancel: &StopSignal,
    ) {
        let index = IndexSection::build(block_metadata.to_vec(), final_state_map.clone());
        let candidates = index.candidates(
            filter.kind.as_deref(),
            filter.namespace.as_deref(),
            filter.group.as_deref(),
        );

        for block in block_metadata {
            if cancel.is_stopped() {
                response.cancelled = true;
                break;
            }

            let is_candidate = candidates
                .as_ref()
                .is_none_or(|list| list.binary_search(&block.id).is_ok());

            log::trace!(
                "{file_name}: block {} candidate={is_candidate} overlaps={}",
                block.id,
                block.overlaps(filter.start_ts, filter.end_ts)
            );

            if !is_candidate || !block.overlaps(filter.start_ts, filter.end_ts) {
                response.metrics.blocks_skipped += 1;
                self.storage
                    .metrics()
                    .query_blocks_skipped
                    .fetch_add(1, Relaxed);
                continue;
            }

            let events = match self.storage.cache().get(file_name, block.id) {
                Some(cached) => {
                    response.metrics.cache_hits += 1;
                    cached.events
                }
                None => match read_block_at(path, compression, block) {
                    Ok((events, decode_errors)) => {
                        response.metrics.cache_misses += 1;
                        for reason in decode_errors {
                            response.warnings.push(Warning::EventSkipped {
                                file: file_name.to_string(),
                                block_id: block.id,
                                reason,
                            });
                        }
                        let events = Arc::new(events);
                        self.storage.cache().put(
                            Arc::from(file_name),
                            block.id,
                            CachedBlock {
                                events: events.clone(),
                                metadata: Arc::new(block.clone()),
                            },
                        );
                        events
                    }
                    Err(e) => {
                        self.storage
                            .metrics()
                            .query_blocks_failed
                            .fetch_add(1, Relaxed);
                        response.warnings.push(Warning::BlockSkipped {
                            file: file_name.to_string(),
                            block_id: block.id,
                            reason: e.to_string(),
                        });
                        continue;
                    }
                },
            };

            response.metrics.blocks_scanned += 1;
            self.storage
                .metrics()
                .query_blocks_scanned
                .fetch_add(1, Relaxed);

            for event in events.iter().filter(|e| filter.matches(e)) {
                seen_keys.insert(event.resource_key());
                response.events.push(event.clone());
            }
        }

        for event in buffered_events.iter().filter(|e| filter.matches(e)) {
            seen_keys.insert(event.resource_key());
            response.events.push(event.clone());
        }

        for (key, entry) in final_state_map.iter() {
            if entry.operation == Operation::Delete || entry.last_timestamp >= filter.start_ts {
                continue;
            }

            state_candidates
                .entry(key.clone())
                .and_modify(|existing| {
                    if entry.last_timestamp > existing.timestamp {
                        existing.timestamp = entry.last_timestamp;
                        existing.operation = entry.operation;
                        existing.payload = entry.payload.clone();
                        existing.uid = entry.uid.clone();
                    }
                })
                .or_insert_with(|| StateCandidate {
                    timestamp: entry.last_timestamp,
                    operation: entry.operation,
                    payload: entry.payload.clone(),
                    uid: entry.uid.clone(),
                });
        }
    }
}

/// The hour buckets to consult: every bucket overlapping `[start, end]`
/// plus the single bucket immediately preceding the start bucket, needed
/// to serve state-snapshot synthesis.
fn select_buckets(start_ts: i64, end_ts: i64) -> Vec<HourBucket> {
    let start_bucket = HourBucket::from_unix_nanos(start_ts);
    let end_bucket = HourBucket::from_unix_nanos(end_ts);

    let mut buckets = vec![start_bucket.previous()];
    let mut current = start_bucket;
    loop {
        buckets.push(current);
        if current == end_bucket {
            break;
        }
        current = current.next();
    }
    buckets
}

/// Lists data-directory entries that are `file_name` rotated aside by
/// [`crate::file::BlockFile::open`]'s recovery policy (named
/// `{file_name}.incomplete.<ts>` or `{file_name}.corrupted.<ts>`), so the
/// caller can report them as skipped rather than silently querying only
/// whatever file replaced them.
fn rotated_aside_siblings(data_dir: &Path, file_name: &str) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(data_dir) else {
        return Vec::new();
    };

    let prefix = format!("{file_name}.");
    entries
        .filter_map(std::result::Result::ok)
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| {
            name.starts_with(&prefix) && (name.contains(".incomplete.") || name.contains(".corrupted."))
        })
        .collect()
}

/// Reconstructs a [`ResourceIdentity`] from a `FinalStateMap` resource key
/// of the form `group/version/kind/namespace/name`, pairing it with the
/// carried `uid` (not itself part of the key).
fn parse_resource_key(key: &str, uid: String) -> Option<ResourceIdentity> {
    let mut parts = key.splitn(5, '/');
    let group = parts.next()?.to_string();
    let version = parts.next()?.to_string();
    let kind = parts.next()?.to_string();
    let namespace = parts.next()?.to_string();
    let name = parts.next()?.to_string();

    if parts.next().is_some() {
        return None;
    }

    Some(ResourceIdentity {
        group,
        version,
        kind,
        namespace,
        name,
        uid,
    })
}
