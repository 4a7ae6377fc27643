use crate::glide_err::{GliderError, Result};

/// One sequence read from the input, owned independently of the reader's buffers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeqRecord {
    pub id: Vec<u8>,
    pub seq: Vec<u8>,
}

impl SeqRecord {
    pub fn new(id: impl Into<Vec<u8>>, seq: impl Into<Vec<u8>>) -> SeqRecord {
        SeqRecord {
            id: id.into(),
            seq: seq.into(),
        }
    }
    pub fn len(&self) -> usize {
        self.seq.len()
    }
    pub fn is_empty(&self) -> bool {
        self.seq.is_empty()
    }
    /// Bases `bp_start..=bp_end`, 1-based inclusive.
    pub fn subseq(&self, bp_start: usize, bp_end: usize) -> &[u8] {
        assert!(
            bp_start >= 1 && bp_start <= bp_end + 1 && bp_end <= self.seq.len(),
            "subsequence {}-{} out of bounds for record of length {}",
            bp_start,
            bp_end,
            self.seq.len()
        );
        &self.seq[bp_start - 1..bp_end]
    }
    pub fn id_str(&self) -> String {
        String::from_utf8_lossy(&self.id).into_owned()
    }
}

/// Window geometry shared by the chunker and the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowLayout {
    pub window_size: usize,
    pub window_stride: usize,
    // number of windows per chunk
    pub chunk_size: usize,
    chunk_len: usize,
}

impl WindowLayout {
    pub fn new(window_size: usize, window_stride: usize, chunk_size: usize) -> Result<WindowLayout> {
        if window_size == 0 || window_stride == 0 || chunk_size == 0 {
            return Err(GliderError::InvalidConfig(format!(
                "window size ({}), stride ({}) and chunk size ({}) must all be positive",
                window_size, window_stride, chunk_size
            )));
        }
        let chunk_len = (chunk_size - 1)
            .checked_mul(window_stride)
            .and_then(|span| span.checked_add(window_size))
            .ok_or_else(|| {
                GliderError::InvalidConfig(format!(
                    "{} windows of {} bp with stride {} do not fit in a chunk",
                    chunk_size, window_size, window_stride
                ))
            })?;
        Ok(WindowLayout {
            window_size,
            window_stride,
            chunk_size,
            chunk_len,
        })
    }
    /// Basepairs spanned by a full chunk.
    pub fn chunk_len(&self) -> usize {
        self.chunk_len
    }
    /// Number of complete windows in a sequence of length `seq_len`.
    pub fn n_windows(&self, seq_len: usize) -> usize {
        if seq_len < self.window_size {
            0
        } else {
            (seq_len - self.window_size) / self.window_stride + 1
        }
    }
}

pub fn cdiv(x: usize, y: usize) -> usize {
    if x == 0 {
        0
    } else {
        (x - 1) / y + 1
    }
}

/// Offsets `0, stride, 2*stride, ...` of every window of `window_size` that
/// fits entirely within `span` basepairs.
pub fn window_starts(span: usize, window_size: usize, stride: usize) -> Vec<usize> {
    if span < window_size {
        return Vec::new();
    }
    let last = span - window_size;
    let mut starts = Vec::with_capacity(last / stride + 1);
    let mut start = 0;
    while start <= last {
        starts.push(start);
        start = match start.checked_add(stride) {
            Some(next) => next,
            None => break,
        };
    }
    starts
}

/// A contiguous slice of one record holding a batch of whole windows.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub id: Vec<u8>,
    // start and end of data within the record, 1-based inclusive
    pub bp_start: usize,
    pub bp_end: usize,
    pub window_size: usize,
    pub window_stride: usize,
    // window offsets relative to bp_start
    pub starts: Vec<usize>,
    pub data: Vec<u8>,
}

impl Chunk {
    pub fn size(&self) -> usize {
        self.bp_end + 1 - self.bp_start
    }
    pub fn n_windows(&self) -> usize {
        self.starts.len()
    }
    pub fn window_seq(&self, offset: usize) -> &[u8] {
        &self.data[offset..offset + self.window_size]
    }
    /// 1-based inclusive genomic coordinates of the window at `offset`.
    pub fn window_coords(&self, offset: usize) -> (usize, usize) {
        let start = self.bp_start + offset;
        (start, start + self.window_size - 1)
    }
    pub fn windows(&self) -> impl Iterator<Item = ((usize, usize), &[u8])> + '_ {
        self.starts
            .iter()
            .map(move |&offset| (self.window_coords(offset), self.window_seq(offset)))
    }
}

/// Per-window statistics of one chunk: one row per window, one column per field.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkResult {
    pub header: Vec<String>,
    pub data: Vec<Vec<String>>,
}

impl ChunkResult {
    pub fn new(header: Vec<String>, n_rows: usize) -> ChunkResult {
        let n_cols = header.len();
        ChunkResult {
            header,
            data: vec![vec![String::new(); n_cols]; n_rows],
        }
    }
    pub fn n_rows(&self) -> usize {
        self.data.len()
    }
    pub fn column(&self, name: &str) -> Option<impl Iterator<Item = &str> + '_> {
        let idx = self.header.iter().position(|h| h == name)?;
        Some(self.data.iter().map(move |row| row[idx].as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_window_starts() {
        assert_eq!(window_starts(20, 10, 5), vec![0, 5, 10]);
        assert_eq!(window_starts(24, 10, 5), vec![0, 5, 10]);
        assert_eq!(window_starts(25, 10, 5), vec![0, 5, 10, 15]);
        assert_eq!(window_starts(10, 10, 5), vec![0]);
        assert!(window_starts(9, 10, 5).is_empty());
    }

    #[test]
    fn test_layout() {
        let layout = WindowLayout::new(10, 5, 3).unwrap();
        assert_eq!(layout.chunk_len(), 20);
        assert_eq!(layout.n_windows(100), 19);
        assert_eq!(layout.n_windows(9), 0);
        assert!(WindowLayout::new(10, 0, 3).is_err());
    }

    #[rstest]
    #[case(10, usize::MAX / 2, 3)]
    #[case(usize::MAX, 1, 2)]
    #[case(10, 2, usize::MAX)]
    fn test_layout_overflow_rejected(
        #[case] window_size: usize,
        #[case] stride: usize,
        #[case] chunk_size: usize,
    ) {
        assert!(matches!(
            WindowLayout::new(window_size, stride, chunk_size),
            Err(GliderError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_window_starts_huge_stride() {
        assert_eq!(window_starts(100, 10, usize::MAX), vec![0]);
    }

    #[test]
    fn test_subseq_is_one_based() {
        let rec = SeqRecord::new(b"chr1".to_vec(), b"ACGTACGT".to_vec());
        assert_eq!(rec.subseq(1, 4), b"ACGT");
        assert_eq!(rec.subseq(3, 3), b"G");
        assert_eq!(rec.subseq(8, 8), b"T");
    }

    #[test]
    fn test_chunk_windows() {
        let chunk = Chunk {
            id: b"chr1".to_vec(),
            bp_start: 11,
            bp_end: 20,
            window_size: 4,
            window_stride: 3,
            starts: window_starts(10, 4, 3),
            data: b"AACCGGTTAC".to_vec(),
        };
        assert_eq!(chunk.size(), 10);
        let windows: Vec<_> = chunk.windows().collect();
        assert_eq!(windows.len(), 3);
        assert_eq!(windows[0], ((11, 14), &b"AACC"[..]));
        assert_eq!(windows[2], ((17, 20), &b"TTAC"[..]));
    }

    #[test]
    fn test_cdiv() {
        assert_eq!(cdiv(10, 5), 2);
        assert_eq!(cdiv(11, 5), 3);
        assert_eq!(cdiv(0, 5), 0);
        assert_eq!(cdiv(7, usize::MAX), 1);
    }
}
