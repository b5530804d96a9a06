//! Paged scatter-gather across the local store and sibling regions.
//!
//! Every source keeps a cursor and a sorted buffer holding its next `count` rows (fewer once
//! it runs dry). A round merges the buffer heads, consumes the globally smallest rows and
//! refills each source with exactly as many rows as it lost. Skipping `offset` rows takes
//! `ceil(offset / count)` rounds, after which the smallest `count` buffered rows are the
//! requested page. No source is ever asked for more than `count` rows at a time.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use tracing::{debug, warn};

use super::types::FileEntry;
use crate::error::Result;
use crate::storage::SortSpec;

pub type RowsFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<FileEntry>>> + Send + 'a>>;

/// A sorted, pageable stream of rows.
pub trait RowSource: Send + Sync {
    fn name(&self) -> String;

    /// Rows `[offset, offset + limit)` in the shared sort order.
    fn fetch(&self, offset: u64, limit: u32) -> RowsFuture<'_>;
}

struct Cursor<'s> {
    source: &'s dyn RowSource,
    buffer: VecDeque<FileEntry>,
    next_offset: u64,
    exhausted: bool,
}

impl<'s> Cursor<'s> {
    fn new(source: &'s dyn RowSource) -> Self {
        Self {
            source,
            buffer: VecDeque::new(),
            next_offset: 0,
            exhausted: false,
        }
    }

    async fn refill(&mut self, want: u32, sort: &SortSpec) {
        if self.exhausted || want == 0 {
            return;
        }
        match self.source.fetch(self.next_offset, want).await {
            Ok(rows) => {
                if rows.len() < want as usize {
                    self.exhausted = true;
                }
                self.next_offset += rows.len() as u64;
                self.buffer.extend(rows);
                self.buffer
                    .make_contiguous()
                    .sort_by(|a, b| sort.compare(a, b));
            }
            Err(e) => {
                warn!("Dropping rows from {}: {}", self.source.name(), e);
                self.exhausted = true;
            }
        }
    }
}

/// Pops the `n` smallest buffered rows, reporting how many came from each cursor.
fn take_smallest(cursors: &mut [Cursor<'_>], n: usize, sort: &SortSpec) -> (Vec<FileEntry>, Vec<u32>) {
    // `n` comes off the wire; only what is buffered can be taken
    let buffered: usize = cursors.iter().map(|c| c.buffer.len()).sum();
    let mut taken = Vec::with_capacity(n.min(buffered));
    let mut consumed = vec![0u32; cursors.len()];

    while taken.len() < n {
        let next = cursors
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.buffer.front().map(|row| (i, row)))
            .min_by(|a, b| sort.compare(a.1, b.1))
            .map(|(i, _)| i);
        let Some(i) = next else { break };
        if let Some(row) = cursors[i].buffer.pop_front() {
            taken.push(row);
            consumed[i] += 1;
        }
    }

    (taken, consumed)
}

/// Returns rows `[offset, offset + count)` of the union of `sources` under `sort`.
///
/// A failing source is logged and contributes nothing further.
pub async fn gather_page(
    sources: &[&dyn RowSource],
    sort: &SortSpec,
    offset: u64,
    count: u32,
) -> Vec<FileEntry> {
    if count == 0 || sources.is_empty() {
        return Vec::new();
    }

    if let [only] = sources {
        return match only.fetch(offset, count).await {
            Ok(mut rows) => {
                rows.sort_by(|a, b| sort.compare(a, b));
                rows.truncate(count as usize);
                rows
            }
            Err(e) => {
                warn!("Dropping rows from {}: {}", only.name(), e);
                Vec::new()
            }
        };
    }

    let mut cursors: Vec<Cursor<'_>> = sources.iter().map(|s| Cursor::new(*s)).collect();
    for cursor in cursors.iter_mut() {
        cursor.refill(count, sort).await;
    }

    let mut to_skip = offset;
    let mut rounds = 0u64;
    while to_skip > 0 {
        let step = to_skip.min(u64::from(count)) as usize;
        let (skipped, consumed) = take_smallest(&mut cursors, step, sort);
        if skipped.len() < step {
            debug!("Offset {} is past the end of {} sources", offset, sources.len());
            return Vec::new();
        }
        to_skip -= step as u64;
        rounds += 1;

        for (cursor, lost) in cursors.iter_mut().zip(consumed) {
            cursor.refill(lost, sort).await;
        }
    }

    let (page, _) = take_smallest(&mut cursors, count as usize, sort);
    debug!(
        "Gathered {} rows at offset {} from {} sources in {} skip rounds",
        page.len(),
        offset,
        sources.len(),
        rounds
    );
    page
}
