use crate::chrom_chunk::{cdiv, window_starts, Chunk, SeqRecord, WindowLayout};
use crate::glide_err::Result;
use crate::pipeline::{AbortSignal, Stage};
use crossbeam_channel::{Receiver, Sender};
use log::debug;
use std::cmp::min;

/// Lazily carves one record into chunks of at most `layout.chunk_size`
/// whole windows, in increasing coordinate order.
pub struct RecordChunks<'a> {
    record: &'a SeqRecord,
    layout: WindowLayout,
    // 0-based start of the next chunk
    offset: usize,
}

impl Iterator for RecordChunks<'_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        let seq_len = self.record.len();
        if self.offset > seq_len || seq_len - self.offset < self.layout.window_size {
            return None;
        }
        let end = min(self.offset.saturating_add(self.layout.chunk_len()), seq_len);
        let starts = window_starts(
            end - self.offset,
            self.layout.window_size,
            self.layout.window_stride,
        );
        let chunk = Chunk {
            id: self.record.id.clone(),
            bp_start: self.offset + 1,
            bp_end: end,
            window_size: self.layout.window_size,
            window_stride: self.layout.window_stride,
            data: self.record.subseq(self.offset + 1, end).to_vec(),
            starts,
        };
        // next chunk opens on the window right after this chunk's last one
        self.offset = self
            .offset
            .saturating_add(chunk.n_windows().saturating_mul(self.layout.window_stride));
        Some(chunk)
    }
}

pub fn chunk_record<'a>(record: &'a SeqRecord, layout: &WindowLayout) -> RecordChunks<'a> {
    RecordChunks {
        record,
        layout: *layout,
        offset: 0,
    }
}

/// Chunks every record received, one record at a time.
pub fn chunk_records(
    recv: &Receiver<SeqRecord>,
    dest: &Sender<Chunk>,
    layout: &WindowLayout,
    abort: &AbortSignal,
) -> Result<()> {
    let mut n_chunks: usize = 0;
    while let Some(record) = abort.recv(recv)? {
        let n_windows = layout.n_windows(record.len());
        if n_windows == 0 {
            debug!(
                "{} ({} bp) is shorter than one window, skipping",
                record.id_str(),
                record.len()
            );
            continue;
        }
        debug!(
            "chunking {}: {} windows in {} chunks",
            record.id_str(),
            n_windows,
            cdiv(n_windows, layout.chunk_size)
        );
        for chunk in chunk_record(&record, layout) {
            abort.check()?;
            dest.send(chunk)?;
            n_chunks += 1;
        }
    }
    debug!("emitted {} chunks", n_chunks);
    Ok(())
}

pub fn chunk_genome(
    records: Receiver<SeqRecord>,
    layout: WindowLayout,
    capacity: usize,
    abort: &AbortSignal,
) -> Result<Stage<Chunk>> {
    Stage::spawn("chunker", capacity, abort, move |dest, abort| {
        chunk_records(&records, dest, &layout, abort)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn record(len: usize) -> SeqRecord {
        let seq: Vec<u8> = b"ACGT".iter().cycle().take(len).copied().collect();
        SeqRecord::new(b"chr1".to_vec(), seq)
    }

    fn all_window_starts(chunks: &[Chunk]) -> Vec<usize> {
        chunks
            .iter()
            .flat_map(|c| c.starts.iter().map(move |s| c.bp_start - 1 + s))
            .collect()
    }

    #[test]
    fn test_windows_fit_and_are_contiguous() {
        let rec = record(100);
        let layout = WindowLayout::new(10, 5, 3).unwrap();
        let chunks: Vec<Chunk> = chunk_record(&rec, &layout).collect();
        for chunk in chunks.iter() {
            assert!(chunk.n_windows() <= 3);
            assert_eq!(chunk.data.len(), chunk.size());
            for &s in chunk.starts.iter() {
                assert!(chunk.bp_start + s + chunk.window_size - 1 <= chunk.bp_end);
            }
        }
        let starts = all_window_starts(&chunks);
        assert_eq!(starts, (0..=90).step_by(5).collect::<Vec<_>>());
        assert!(starts.iter().all(|&s| s <= 100 - 10));
    }

    #[test]
    fn test_chunk_data_matches_record() {
        let rec = record(57);
        let layout = WindowLayout::new(7, 3, 4).unwrap();
        for chunk in chunk_record(&rec, &layout) {
            for ((start, end), window) in chunk.windows() {
                assert_eq!(window, rec.subseq(start, end));
            }
        }
    }

    #[rstest]
    #[case(100, 10, 10, 3, 10)]
    #[case(105, 10, 10, 3, 10)]
    #[case(100, 10, 5, 3, 19)]
    #[case(100, 10, 15, 2, 7)]
    #[case(10, 10, 5, 3, 1)]
    #[case(9, 10, 5, 3, 0)]
    #[case(0, 10, 5, 3, 0)]
    fn test_window_count(
        #[case] len: usize,
        #[case] size: usize,
        #[case] stride: usize,
        #[case] chunk_size: usize,
        #[case] expected: usize,
    ) {
        let rec = record(len);
        let layout = WindowLayout::new(size, stride, chunk_size).unwrap();
        let chunks: Vec<Chunk> = chunk_record(&rec, &layout).collect();
        let n: usize = chunks.iter().map(|c| c.n_windows()).sum();
        assert_eq!(n, expected);
        assert_eq!(n, layout.n_windows(len));
        assert!(chunks.windows(2).all(|w| w[0].bp_start < w[1].bp_start));
    }

    #[rstest]
    #[case(10, usize::MAX / 4, 3)]
    #[case(10, usize::MAX / 2, 1)]
    #[case(10, usize::MAX, 1)]
    fn test_huge_stride_yields_one_window(
        #[case] size: usize,
        #[case] stride: usize,
        #[case] chunk_size: usize,
    ) {
        let rec = record(100);
        let layout = WindowLayout::new(size, stride, chunk_size).unwrap();
        let chunks: Vec<Chunk> = chunk_record(&rec, &layout).collect();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].starts, vec![0]);
        assert_eq!(chunks[0].bp_start, 1);
        assert_eq!(chunks[0].bp_end, min(layout.chunk_len(), 100));
    }

    #[test]
    fn test_chunk_genome_stage() {
        let abort = AbortSignal::new();
        let (sender, receiver) = crossbeam_channel::bounded(1);
        let layout = WindowLayout::new(10, 10, 2).unwrap();
        let stage = chunk_genome(receiver, layout, 1, &abort).unwrap();
        let feeder = std::thread::spawn(move || {
            sender.send(SeqRecord::new(b"a".to_vec(), vec![b'A'; 45])).unwrap();
            sender.send(SeqRecord::new(b"short".to_vec(), vec![b'A'; 5])).unwrap();
            sender.send(SeqRecord::new(b"b".to_vec(), vec![b'C'; 20])).unwrap();
        });
        let chunks: Vec<Chunk> = stage.iter().collect();
        feeder.join().unwrap();
        stage.join().unwrap();
        let summary: Vec<(&[u8], usize, usize)> = chunks
            .iter()
            .map(|c| (c.id.as_slice(), c.bp_start, c.n_windows()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (&b"a"[..], 1, 2),
                (&b"a"[..], 21, 2),
                (&b"b"[..], 1, 2),
            ]
        );
    }
}
