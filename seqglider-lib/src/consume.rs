use crate::chrom_chunk::{Chunk, ChunkResult};
use crate::glide_err::Result;
use crate::metrics::{format_stat, MetricPlan, COORD_COLUMNS};
use crate::pipeline::{AbortSignal, Stage};
use crossbeam_channel::{Receiver, Sender};
use log::debug;
use std::sync::Arc;

/// Fills one row per window: coordinates first, then every planned metric.
pub fn compute_chunk(chunk: &Chunk, plan: &MetricPlan) -> Result<ChunkResult> {
    let mut result = ChunkResult::new(plan.header(), chunk.n_windows());
    let chrom = String::from_utf8_lossy(&chunk.id);
    let n_coords = COORD_COLUMNS.len();
    for (row, ((start, end), window)) in result.data.iter_mut().zip(chunk.windows()) {
        row[0] = chrom.to_string();
        row[1] = start.to_string();
        row[2] = end.to_string();
        for (cell, column) in row[n_coords..].iter_mut().zip(plan.columns()) {
            *cell = format_stat(plan.compute(column, window)?);
        }
    }
    Ok(result)
}

pub fn consume_chunk_stream(
    recv: &Receiver<Chunk>,
    dest: &Sender<ChunkResult>,
    plan: &MetricPlan,
    abort: &AbortSignal,
) -> Result<()> {
    let mut n_windows: usize = 0;
    while let Some(chunk) = abort.recv(recv)? {
        let result = compute_chunk(&chunk, plan)?;
        n_windows += result.n_rows();
        dest.send(result)?;
    }
    debug!("computed statistics for {} windows", n_windows);
    Ok(())
}

pub fn consume_chunks(
    chunks: Receiver<Chunk>,
    plan: Arc<MetricPlan>,
    capacity: usize,
    abort: &AbortSignal,
) -> Result<Stage<ChunkResult>> {
    Stage::spawn("consumer", capacity, abort, move |dest, abort| {
        consume_chunk_stream(&chunks, dest, &plan, abort)
    })
}
