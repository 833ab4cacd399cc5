//! Paged accumulation of one relationship projection
//!
//! Scanning tasks append sorted, pre-aggregated source runs into the page that
//! owns the source node, under that page's lock. Once scanning is over, every
//! page is compacted by exactly one task into an immutable byte page.

use super::chunked::ChunkedAdjacencyLists;
use super::radix_sort::sort_adjacency;
use super::sizing::ImportSizing;
use crate::compress::{preaggregate, retain_survivors, Aggregation, Codec, CompressionFlags};
use crate::error::Result;
use parking_lot::Mutex;
use std::ops::Range;

/// One compacted page, ready to be stitched into a topology
#[derive(Debug, Clone, Default)]
pub struct CompactedPage {
    /// Encoded adjacency of every node of the page, back to back
    pub bytes: Vec<u8>,
    /// Start of each node's encoding in `bytes`
    pub offsets: Vec<usize>,
    /// Degree of each node of the page
    pub degrees: Vec<u64>,
    /// Per channel, property words of every node back to back
    pub properties: Vec<Vec<u64>>,
}

impl CompactedPage {
    /// Relationships stored in the page
    #[must_use]
    pub fn relationship_count(&self) -> u64 {
        self.degrees.iter().sum()
    }
}

/// Accumulation pages of one projection
#[derive(Debug)]
pub struct AdjacencyBuffer {
    sizing: ImportSizing,
    node_count: u64,
    pages: Vec<Mutex<ChunkedAdjacencyLists>>,
    aggregations: Vec<Aggregation>,
    collapse: bool,
    codec: Codec,
    flags: CompressionFlags,
    ceiling: usize,
}

impl AdjacencyBuffer {
    /// Empty pages for `node_count` nodes
    ///
    /// `aggregations` has one entry per property channel; `collapse` turns on
    /// pre-aggregation of parallel relationships.
    #[must_use]
    pub fn new(
        sizing: ImportSizing,
        node_count: u64,
        aggregations: Vec<Aggregation>,
        collapse: bool,
        codec: Codec,
        flags: CompressionFlags,
        ceiling: usize,
    ) -> Self {
        let channels = aggregations.len();
        let pages = (0..sizing.page_count())
            .map(|_| Mutex::new(ChunkedAdjacencyLists::new(channels, ceiling)))
            .collect();
        Self {
            sizing,
            node_count,
            pages,
            aggregations,
            collapse,
            codec,
            flags,
            ceiling,
        }
    }

    /// Number of property channels
    #[must_use]
    pub fn channels(&self) -> usize {
        self.aggregations.len()
    }

    /// Number of pages
    #[must_use]
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Page layout
    #[must_use]
    pub const fn sizing(&self) -> ImportSizing {
        self.sizing
    }

    /// Append the targets of `source` found in `targets[range]`
    ///
    /// The run is pre-aggregated in place first if collapsing is on.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CsrError::CapacityOverflow`] if the node's list hits
    /// the ceiling.
    pub fn add_run(
        &self,
        source: u64,
        targets: &mut [u64],
        properties: &mut [Vec<u64>],
        range: Range<usize>,
    ) -> Result<()> {
        let survivors = if self.collapse {
            preaggregate(targets, properties, range.clone(), &self.aggregations)
        } else {
            range.len()
        };
        let page = &self.pages[self.sizing.page_of(source)];
        page.lock().add(
            self.sizing.local_id(source),
            targets,
            properties,
            range,
            survivors,
        )
    }

    /// Bytes held by the accumulation lists
    #[must_use]
    pub fn size_in_bytes(&self) -> usize {
        self.pages.iter().map(|p| p.lock().size_in_bytes()).sum()
    }

    /// Compact page `page` and release its accumulation memory
    ///
    /// Lists are decoded, sorted and aggregated across flush rounds if
    /// needed, stripped of collapsed slots and encoded with the configured
    /// codec.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CsrError::Corrupt`] if an accumulated list cannot be
    /// decoded.
    #[allow(clippy::cast_possible_truncation)]
    pub fn compact(&self, page: usize) -> Result<CompactedPage> {
        let channels = self.channels();
        let lists = std::mem::replace(
            &mut *self.pages[page].lock(),
            ChunkedAdjacencyLists::new(channels, self.ceiling),
        );

        let start = self.sizing.page_start(page);
        let nodes = (self.node_count.saturating_sub(start) as usize).min(self.sizing.page_size());
        let mut compacted = CompactedPage {
            bytes: Vec::new(),
            offsets: vec![0; nodes],
            degrees: vec![0; nodes],
            properties: vec![Vec::new(); channels],
        };

        let reorder = self.collapse || (channels > 0 && self.flags.sorted());
        let mut targets = Vec::new();
        let mut properties: Vec<Vec<u64>> = vec![Vec::new(); channels];
        let mut scratch = (Vec::new(), Vec::new());

        let mut written = 0;
        lists.consume(|local, list| {
            targets.clear();
            targets.reserve(list.length());
            let mut cursor = list.targets();
            while let Some(target) = cursor.try_next()? {
                targets.push(target);
            }
            for (buffer, accumulated) in properties.iter_mut().zip(list.properties()) {
                buffer.clear();
                buffer.extend_from_slice(accumulated);
            }

            if reorder {
                sort_adjacency(&mut targets, &mut properties, &mut scratch);
            }
            let mut length = targets.len();
            if self.collapse {
                preaggregate(&mut targets, &mut properties, 0..length, &self.aggregations);
                length = retain_survivors(&mut targets, &mut properties, 0..length);
            }

            compacted.offsets[local] = compacted.bytes.len();
            compacted.degrees[local] = length as u64;
            self.codec
                .encode_into(&mut targets[..length], self.flags, &mut compacted.bytes);
            for (page_channel, buffer) in compacted.properties.iter_mut().zip(&properties) {
                page_channel.extend_from_slice(&buffer[..length]);
            }
            written += length;
            Ok(())
        })?;

        // nodes without relationships point at the end of their predecessor
        let mut next = compacted.bytes.len();
        for local in (0..nodes).rev() {
            if compacted.degrees[local] == 0 {
                compacted.offsets[local] = next;
            } else {
                next = compacted.offsets[local];
            }
        }

        tracing::debug!(
            page,
            nodes,
            relationships = written,
            bytes = compacted.bytes.len(),
            "compacted adjacency page"
        );
        Ok(compacted)
    }
}
