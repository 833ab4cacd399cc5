//! Parallel import pipeline
//!
//! ```text
//! NotStarted ─▶ Scanning ─▶ Flushing ─▶ Merging ─▶ Done
//! ```
//!
//! - **Scanning**: one task per source partition. Node batches populate the
//!   id map builder; once every node partition is drained the id map is
//!   built. Relationship batches are fanned out to one buffer per projection
//!   and flushed into the paged [`AdjacencyBuffer`]s whenever a buffer fills.
//! - **Flushing**: partially filled batches left by the scan are flushed.
//! - **Merging**: one task per accumulation page compacts the page into
//!   immutable, compressed bytes.
//!
//! Workers poll the [`TerminationFlag`] between batches and pages. The first
//! failing worker trips the flag so the others stop early; the import then
//! reports one aggregated error.

use super::adjacency_buffer::{AdjacencyBuffer, CompactedPage};
use super::batch::{
    CompositeRelationshipsBatchBuffer, NodesBatchBuffer, RecordsBatchBuffer,
    RelationshipsBatchBuffer, RELATIONSHIP_STRIDE,
};
use super::property::{read_word, to_double, to_long, PropertyReader, ValueType};
use super::radix_sort::sort_strided;
use super::records::{NodeRecord, RecordSource, RelationshipRecord, ScanCursor};
use super::sizing::ImportSizing;
use super::termination::TerminationFlag;
use crate::config::{ImportConfig, PropertyMapping, RelationshipProjection};
use crate::error::{CsrError, Result};
use crate::idmap::{IdMap, IdMapBuilder, Insertion, LabelIndex, NodeMapping, NOT_FOUND};
use crate::mem::{GraphDimensions, MemoryBudget, MemoryEstimation, MemoryTree};
use crate::storage::{CsrGraphStore, ImportStats, NodePropertyColumn, Topology};
use rayon::prelude::*;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;
use tracing::{debug, info, info_span, warn};

/// Stage of an import
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImportPhase {
    /// Nothing happened yet
    NotStarted,
    /// Partitions are being scanned
    Scanning,
    /// Partial batches are being flushed
    Flushing,
    /// Pages are being compacted
    Merging,
    /// The store has been assembled
    Done,
}

impl ImportPhase {
    /// Lowercase name
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Scanning => "scanning",
            Self::Flushing => "flushing",
            Self::Merging => "merging",
            Self::Done => "done",
        }
    }

    const fn successor(self) -> Option<Self> {
        match self {
            Self::NotStarted => Some(Self::Scanning),
            Self::Scanning => Some(Self::Flushing),
            Self::Flushing => Some(Self::Merging),
            Self::Merging => Some(Self::Done),
            Self::Done => None,
        }
    }

    /// Move to `next`
    ///
    /// # Errors
    ///
    /// Returns [`CsrError::InvalidPhaseTransition`] unless `next` directly
    /// follows the current phase.
    pub fn advance(&mut self, next: Self) -> Result<()> {
        if self.successor() != Some(next) {
            return Err(CsrError::InvalidPhaseTransition {
                from: self.name(),
                to: next.name(),
            });
        }
        *self = next;
        info!(phase = next.name(), "import phase");
        Ok(())
    }
}

impl fmt::Display for ImportPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Drives one import on a dedicated worker pool
///
/// An importer runs once; a second [`GraphImporter::import`] fails with
/// [`CsrError::InvalidPhaseTransition`].
pub struct GraphImporter {
    config: ImportConfig,
    pool: rayon::ThreadPool,
    termination: TerminationFlag,
    phase: ImportPhase,
}

impl fmt::Debug for GraphImporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphImporter")
            .field("config", &self.config)
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct NodeScan {
    imported: u64,
    dropped: u64,
    filtered: u64,
    // original id per node with properties, values flat in mapping order
    originals: Vec<u64>,
    words: Vec<u64>,
}

#[derive(Default)]
struct RelationshipScan {
    dropped: u64,
    unmapped: u64,
}

impl GraphImporter {
    /// Importer for `config`, with a pool of `config.concurrency` workers
    ///
    /// # Errors
    ///
    /// Returns [`CsrError::InvalidConfig`] if `config` fails validation and
    /// [`CsrError::Pool`] if the workers cannot be started.
    pub fn new(config: ImportConfig) -> Result<Self> {
        config.validate()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.concurrency)
            .thread_name(|index| format!("csr-import-{index}"))
            .build()?;
        Ok(Self {
            config,
            pool,
            termination: TerminationFlag::new(),
            phase: ImportPhase::NotStarted,
        })
    }

    /// Poll `termination` instead of a private flag
    #[must_use]
    pub fn with_termination_flag(mut self, termination: TerminationFlag) -> Self {
        self.termination = termination;
        self
    }

    /// Handle to cancel the import from another thread
    #[must_use]
    pub fn termination_flag(&self) -> TerminationFlag {
        self.termination.clone()
    }

    /// Current phase
    #[must_use]
    pub const fn phase(&self) -> ImportPhase {
        self.phase
    }

    /// Configuration in use
    #[must_use]
    pub const fn config(&self) -> &ImportConfig {
        &self.config
    }

    /// Memory estimate for `node_count` nodes and `relationship_count`
    /// relationship records
    #[must_use]
    pub fn estimate(&self, node_count: u64, relationship_count: u64) -> MemoryTree {
        let dimensions = GraphDimensions::for_config(&self.config, node_count, relationship_count);
        MemoryEstimation::for_config(&self.config).estimate(&dimensions, self.config.concurrency)
    }

    /// Import `nodes` and `relationships`, resolving properties with `reader`
    ///
    /// # Errors
    ///
    /// Fails with the first worker failure (see [`CsrError::Aggregated`]),
    /// with [`CsrError::Terminated`] after cancellation, with
    /// [`CsrError::MemoryBudgetExceeded`] if the estimate exceeds the
    /// configured budget and with [`CsrError::InvalidPhaseTransition`] if the
    /// importer already ran.
    pub fn import(
        &mut self,
        nodes: &dyn RecordSource<NodeRecord>,
        relationships: &dyn RecordSource<RelationshipRecord>,
        reader: &dyn PropertyReader,
    ) -> Result<CsrGraphStore> {
        let node_hint = nodes.record_count();
        let relationship_hint = relationships.record_count();
        let span = info_span!("import", nodes = ?node_hint, relationships = ?relationship_hint);
        let _entered = span.enter();
        let started = Instant::now();

        if self.phase != ImportPhase::NotStarted {
            return Err(CsrError::InvalidPhaseTransition {
                from: self.phase.name(),
                to: ImportPhase::Scanning.name(),
            });
        }
        self.check_budget(node_hint.unwrap_or(0), relationship_hint.unwrap_or(0))?;

        self.phase.advance(ImportPhase::Scanning)?;
        let (id_map, node_properties, node_scan) = self
            .import_nodes(nodes, reader)
            .map_err(|e| self.report(e))?;

        let node_count = id_map.node_count();
        let sizing = match self.config.page_size {
            Some(page_size) => ImportSizing::with_page_size(page_size, node_count)?,
            None => ImportSizing::of(self.config.concurrency, node_count)?,
        };
        let adjacency: Vec<AdjacencyBuffer> = self
            .config
            .relationships
            .iter()
            .map(|projection| self.adjacency_buffer(projection, sizing, node_count))
            .collect();

        let (leftovers, mut relationship_scan) = self
            .scan_relationships(relationships, &id_map, &adjacency, reader)
            .map_err(|e| self.report(e))?;

        self.phase.advance(ImportPhase::Flushing)?;
        let flushed = self
            .flush_leftovers(leftovers, &id_map, &adjacency, reader)
            .map_err(|e| self.report(e))?;
        for scan in flushed {
            relationship_scan.dropped += scan.dropped;
            relationship_scan.unmapped += scan.unmapped;
        }

        self.phase.advance(ImportPhase::Merging)?;
        let topologies = self
            .merge(&adjacency, sizing)
            .map_err(|e| self.report(e))?;

        self.phase.advance(ImportPhase::Done)?;
        let stats = ImportStats {
            node_count,
            relationship_counts: topologies
                .iter()
                .map(|(name, topology)| (name.clone(), topology.relationship_count()))
                .collect(),
            dropped_nodes: node_scan.dropped,
            filtered_nodes: node_scan.filtered,
            dropped_relationships: relationship_scan.dropped,
            unmapped_relationships: relationship_scan.unmapped,
        };
        info!(
            nodes = stats.node_count,
            relationships = stats.relationship_count(),
            dropped_nodes = stats.dropped_nodes,
            dropped_relationships = stats.dropped_relationships,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "import finished"
        );
        Ok(CsrGraphStore::new(id_map, topologies, node_properties, stats))
    }

    fn report(&self, error: CsrError) -> CsrError {
        if error.is_termination() {
            warn!(phase = self.phase.name(), "import terminated");
        } else {
            warn!(phase = self.phase.name(), error = %error, "import failed");
        }
        error
    }

    fn check_budget(&self, node_count: u64, relationship_count: u64) -> Result<()> {
        let Some(bytes) = self.config.memory_budget else {
            return Ok(());
        };
        let estimate = self.estimate(node_count, relationship_count);
        debug!(estimate = %estimate.memory_usage(), budget = bytes, "memory estimate");
        MemoryBudget {
            bytes,
            use_max_estimation: self.config.use_max_estimation,
        }
        .validate(&estimate)
    }

    fn adjacency_buffer(
        &self,
        projection: &RelationshipProjection,
        sizing: ImportSizing,
        node_count: u64,
    ) -> AdjacencyBuffer {
        AdjacencyBuffer::new(
            sizing,
            node_count,
            projection.aggregations(),
            projection.collapses(),
            self.config.codec,
            self.config.flags,
            self.config.accumulation_ceiling,
        )
    }

    /// Run `task` once per input on the pool
    ///
    /// A failing or panicking task trips the termination flag. Results keep
    /// the input order.
    fn run_tasks<I, T, F>(&self, inputs: Vec<I>, task: F) -> Result<Vec<T>>
    where
        I: Send,
        T: Send,
        F: Fn(usize, I) -> Result<T> + Sync,
    {
        let termination = &self.termination;
        let outcomes: Vec<Result<T>> = self.pool.install(|| {
            inputs
                .into_par_iter()
                .enumerate()
                .map(|(index, input)| {
                    let outcome = catch_unwind(AssertUnwindSafe(|| task(index, input)))
                        .unwrap_or_else(|payload| Err(CsrError::WorkerPanic(panic_message(&*payload))));
                    if let Err(error) = &outcome {
                        if !error.is_termination() {
                            termination.terminate();
                        }
                    }
                    outcome
                })
                .collect()
        });

        let mut values = Vec::with_capacity(outcomes.len());
        let mut failures = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok(value) => values.push(value),
                Err(error) => failures.push(error),
            }
        }
        match CsrError::aggregate(failures) {
            Some(error) => Err(error),
            None => Ok(values),
        }
    }

    fn import_nodes(
        &self,
        nodes: &dyn RecordSource<NodeRecord>,
        reader: &dyn PropertyReader,
    ) -> Result<(IdMap, BTreeMap<String, NodePropertyColumn>, NodeScan)> {
        let builder = IdMapBuilder::new(self.config.highest_possible_id);
        let partitions = nodes.partitions(self.config.concurrency);
        let scans = self.run_tasks(partitions, |index, cursor| {
            self.scan_nodes(index, cursor, &builder, reader)
        })?;

        let id_map = builder.build(self.config.id_map_strategy)?;
        let node_count = usize::try_from(id_map.node_count()).map_err(|_| CsrError::CapacityOverflow {
            requested: id_map.node_count(),
            ceiling: usize::MAX,
        })?;

        let mappings = &self.config.node_properties;
        let mut columns: Vec<NodePropertyColumn> = mappings
            .iter()
            .map(|m| NodePropertyColumn::filled(m.value_type, node_count, m.default_value))
            .collect();
        let mut total = NodeScan::default();
        for scan in scans {
            for (slot, &original) in scan.originals.iter().enumerate() {
                let mapped = id_map.to_mapped_node_id(original);
                if mapped == NOT_FOUND {
                    continue;
                }
                let words = &scan.words[slot * mappings.len()..(slot + 1) * mappings.len()];
                for (column, &word) in columns.iter_mut().zip(words) {
                    #[allow(clippy::cast_possible_truncation)]
                    column.set_word(mapped as usize, word);
                }
            }
            total.imported += scan.imported;
            total.dropped += scan.dropped;
            total.filtered += scan.filtered;
        }
        info!(
            nodes = total.imported,
            dropped = total.dropped,
            filtered = total.filtered,
            id_map = %id_map.strategy(),
            "nodes imported"
        );

        let columns = mappings
            .iter()
            .map(|m| m.name.clone())
            .zip(columns)
            .collect();
        Ok((id_map, columns, total))
    }

    fn scan_nodes(
        &self,
        partition: usize,
        mut cursor: Box<dyn ScanCursor<NodeRecord> + '_>,
        builder: &IdMapBuilder,
        reader: &dyn PropertyReader,
    ) -> Result<NodeScan> {
        let mut buffer = NodesBatchBuffer::new(self.config.batch_size, self.config.id_bound());
        if let Some(labels) = &self.config.label_filter {
            buffer = buffer.with_label_filter(labels.clone());
        }
        let mut scan = NodeScan::default();
        let mut labels = LabelIndex::new();
        let mappings = &self.config.node_properties;

        loop {
            self.termination.assert_running()?;
            if !cursor.reserve_batch() {
                break;
            }
            cursor.consume_batch(&mut |record| {
                if !buffer.offer(record) {
                    flush_nodes(&mut buffer, builder, reader, mappings, &mut labels, &mut scan)?;
                    buffer.add_unchecked(record)?;
                }
                Ok(())
            })?;
        }
        flush_nodes(&mut buffer, builder, reader, mappings, &mut labels, &mut scan)?;
        builder.add_labels(labels);

        scan.dropped = buffer.dropped();
        scan.filtered = buffer.filtered();
        debug!(partition, nodes = scan.imported, dropped = scan.dropped, "node partition scanned");
        Ok(scan)
    }

    fn composite_buffer(&self) -> CompositeRelationshipsBatchBuffer {
        let id_bound = self.config.id_bound();
        CompositeRelationshipsBatchBuffer::new(
            self.config
                .relationships
                .iter()
                .map(|projection| {
                    RelationshipsBatchBuffer::new(self.config.batch_size, id_bound)
                        .with_type_filter(projection.type_token)
                        .with_orientation(projection.orientation)
                })
                .collect(),
        )
    }

    fn scan_relationships(
        &self,
        relationships: &dyn RecordSource<RelationshipRecord>,
        id_map: &IdMap,
        adjacency: &[AdjacencyBuffer],
        reader: &dyn PropertyReader,
    ) -> Result<(Vec<CompositeRelationshipsBatchBuffer>, RelationshipScan)> {
        let partitions = relationships.partitions(self.config.concurrency);
        let scans = self.run_tasks(partitions, |partition, mut cursor| {
            let mut flusher = RelationshipFlusher::new(id_map, reader, &self.config.relationships, adjacency);
            let mut composite = self.composite_buffer();
            let mut records = 0_usize;
            loop {
                self.termination.assert_running()?;
                if !cursor.reserve_batch() {
                    break;
                }
                records += cursor.consume_batch(&mut |record| {
                    if !composite.offer(record) {
                        for (index, buffer) in composite.buffers_mut().iter_mut().enumerate() {
                            if buffer.is_full() {
                                flusher.flush(index, buffer)?;
                            }
                        }
                        let accepted = composite.offer(record);
                        debug_assert!(accepted);
                    }
                    Ok(())
                })?;
            }
            debug!(partition, records, "relationship partition scanned");
            Ok((composite, flusher.unmapped))
        })?;

        let mut total = RelationshipScan::default();
        let mut leftovers = Vec::with_capacity(scans.len());
        for (composite, unmapped) in scans {
            total.unmapped += unmapped;
            leftovers.push(composite);
        }
        Ok((leftovers, total))
    }

    fn flush_leftovers(
        &self,
        leftovers: Vec<CompositeRelationshipsBatchBuffer>,
        id_map: &IdMap,
        adjacency: &[AdjacencyBuffer],
        reader: &dyn PropertyReader,
    ) -> Result<Vec<RelationshipScan>> {
        self.run_tasks(leftovers, |_, mut composite| {
            let mut flusher = RelationshipFlusher::new(id_map, reader, &self.config.relationships, adjacency);
            for (index, buffer) in composite.buffers_mut().iter_mut().enumerate() {
                if !buffer.is_empty() {
                    self.termination.assert_running()?;
                    flusher.flush(index, buffer)?;
                }
            }
            Ok(RelationshipScan {
                dropped: composite.dropped(),
                unmapped: flusher.unmapped,
            })
        })
    }

    fn merge(
        &self,
        adjacency: &[AdjacencyBuffer],
        sizing: ImportSizing,
    ) -> Result<BTreeMap<String, Topology>> {
        let tasks: Vec<(usize, usize)> = adjacency
            .iter()
            .enumerate()
            .flat_map(|(projection, buffer)| (0..buffer.page_count()).map(move |page| (projection, page)))
            .collect();
        let compacted = self.run_tasks(tasks, |_, (projection, page)| {
            self.termination.assert_running()?;
            adjacency[projection].compact(page).map(|p| (projection, p))
        })?;

        let mut pages: Vec<Vec<CompactedPage>> = adjacency.iter().map(|_| Vec::new()).collect();
        for (projection, page) in compacted {
            pages[projection].push(page);
        }
        Ok(self
            .config
            .relationships
            .iter()
            .zip(pages)
            .map(|(projection, pages)| {
                let names: Vec<String> = projection.properties.iter().map(|p| p.name.clone()).collect();
                let topology = Topology::from_pages(sizing, self.config.codec, self.config.flags, pages, &names);
                debug!(
                    projection = %projection.name,
                    relationships = topology.relationship_count(),
                    bytes = topology.compressed_bytes(),
                    "topology assembled"
                );
                (projection.name.clone(), topology)
            })
            .collect())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[allow(clippy::cast_sign_loss)]
fn node_word(reader: &dyn PropertyReader, properties_ref: u64, mapping: &PropertyMapping) -> Result<u64> {
    let value = reader.read(properties_ref, mapping.key);
    Ok(match mapping.value_type {
        ValueType::Double => to_double(mapping.key, &value, mapping.default_value)?.to_bits(),
        #[allow(clippy::cast_possible_truncation)]
        ValueType::Long => to_long(mapping.key, &value, mapping.default_value as i64)? as u64,
    })
}

fn flush_nodes(
    buffer: &mut NodesBatchBuffer,
    builder: &IdMapBuilder,
    reader: &dyn PropertyReader,
    mappings: &[PropertyMapping],
    labels: &mut LabelIndex,
    scan: &mut NodeScan,
) -> Result<()> {
    for node in buffer.iter() {
        match builder.insert(node.id) {
            Some(Insertion::New(id)) => {
                labels.insert_all(id, node.labels);
                if !mappings.is_empty() {
                    scan.originals.push(node.id);
                    for mapping in mappings {
                        scan.words.push(node_word(reader, node.properties_ref, mapping)?);
                    }
                }
                scan.imported += 1;
            }
            Some(Insertion::Existing(_)) => {}
            None => scan.dropped += 1,
        }
    }
    buffer.reset();
    Ok(())
}

/// Per-task state turning full relationship batches into adjacency runs
struct RelationshipFlusher<'a> {
    id_map: &'a IdMap,
    reader: &'a dyn PropertyReader,
    projections: &'a [RelationshipProjection],
    adjacency: &'a [AdjacencyBuffer],
    scratch: Vec<u64>,
    targets: Vec<u64>,
    properties: Vec<Vec<u64>>,
    unmapped: u64,
}

impl<'a> RelationshipFlusher<'a> {
    fn new(
        id_map: &'a IdMap,
        reader: &'a dyn PropertyReader,
        projections: &'a [RelationshipProjection],
        adjacency: &'a [AdjacencyBuffer],
    ) -> Self {
        Self {
            id_map,
            reader,
            projections,
            adjacency,
            scratch: Vec::new(),
            targets: Vec::new(),
            properties: Vec::new(),
            unmapped: 0,
        }
    }

    /// Map, sort and append the batch of projection `index`, then reset it
    fn flush(&mut self, index: usize, buffer: &mut RelationshipsBatchBuffer) -> Result<()> {
        let mappings = &self.projections[index].properties;
        let adjacency = &self.adjacency[index];
        let entries = buffer.entries_mut();

        let mut write = 0;
        for read in (0..entries.len()).step_by(RELATIONSHIP_STRIDE) {
            let source = self.id_map.to_mapped_node_id(entries[read]);
            let target = self.id_map.to_mapped_node_id(entries[read + 1]);
            if source == NOT_FOUND || target == NOT_FOUND {
                self.unmapped += 1;
                continue;
            }
            entries[write] = source;
            entries[write + 1] = target;
            entries[write + 2] = entries[read + 2];
            write += RELATIONSHIP_STRIDE;
        }
        entries.truncate(write);
        sort_strided(entries, RELATIONSHIP_STRIDE, &[0, 1], &mut self.scratch);

        self.properties.resize_with(mappings.len(), Vec::new);
        let mut start = 0;
        while start < entries.len() {
            let source = entries[start];
            self.targets.clear();
            for channel in &mut self.properties {
                channel.clear();
            }
            let mut end = start;
            while end < entries.len() && entries[end] == source {
                self.targets.push(entries[end + 1]);
                let properties_ref = entries[end + 2];
                for (channel, mapping) in self.properties.iter_mut().zip(mappings) {
                    channel.push(read_word(
                        self.reader,
                        properties_ref,
                        mapping.key,
                        mapping.value_type,
                        mapping.default_value,
                    )?);
                }
                end += RELATIONSHIP_STRIDE;
            }
            let length = self.targets.len();
            adjacency.add_run(source, &mut self.targets, &mut self.properties, 0..length)?;
            start = end;
        }
        buffer.reset();
        Ok(())
    }
}
