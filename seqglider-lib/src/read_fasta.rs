use crate::chrom_chunk::SeqRecord;
use crate::glide_err::{GliderError, Result};
use crate::pipeline::{AbortSignal, Stage};
use crossbeam_channel::Sender;
use flate2::bufread::MultiGzDecoder;
use log::debug;
use noodles_fasta as fasta;
use noodles_fasta::record::Definition;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

const BUF_CAPACITY: usize = 1 << 16;
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Sequential FASTA reader, plain or gzipped. Definition and sequence
/// buffers are reused between records.
pub struct FastaSource {
    reader: fasta::io::Reader<Box<dyn BufRead + Send>>,
    definition: String,
    sequence: Vec<u8>,
}

impl FastaSource {
    pub fn open(path: &Path) -> Result<FastaSource> {
        let file = File::open(path)?;
        let mut buffered = BufReader::with_capacity(BUF_CAPACITY, file);
        let is_gzip = buffered.fill_buf()?.starts_with(&GZIP_MAGIC);
        let inner: Box<dyn BufRead + Send> = if is_gzip {
            debug!("{} is gzip compressed", path.display());
            Box::new(BufReader::with_capacity(
                BUF_CAPACITY,
                MultiGzDecoder::new(buffered),
            ))
        } else {
            Box::new(buffered)
        };
        Ok(FastaSource::from_reader(inner))
    }

    pub fn from_reader<R: BufRead + Send + 'static>(reader: R) -> FastaSource {
        let inner: Box<dyn BufRead + Send> = Box::new(reader);
        FastaSource {
            reader: fasta::io::Reader::new(inner),
            definition: String::new(),
            sequence: Vec::new(),
        }
    }

    /// Next record, `None` at a clean end of input.
    pub fn read_record(&mut self) -> Result<Option<SeqRecord>> {
        self.definition.clear();
        if self.reader.read_definition(&mut self.definition)? == 0 {
            return Ok(None);
        }
        let definition: Definition = self.definition.parse().map_err(|e| {
            GliderError::BadFileFormat(format!("invalid record header '{}': {}", self.definition, e))
        })?;
        self.sequence.clear();
        self.reader.read_sequence(&mut self.sequence)?;
        Ok(Some(SeqRecord::new(definition.name().to_vec(), self.sequence.to_vec())))
    }

    pub fn records(self) -> Records {
        Records { source: self, done: false }
    }
}

pub struct Records {
    source: FastaSource,
    done: bool,
}

impl Iterator for Records {
    type Item = Result<SeqRecord>;

    fn next(&mut self) -> Option<Result<SeqRecord>> {
        if self.done {
            return None;
        }
        match self.source.read_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                // the stream cannot resume after a malformed record
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

/// Sends every record of `source` in file order. Stops at the first read error.
pub fn read_fasta(dest: &Sender<SeqRecord>, source: FastaSource, abort: &AbortSignal) -> Result<()> {
    let mut n_records: usize = 0;
    let mut n_bases: usize = 0;
    for record in source.records() {
        let record = record?;
        abort.check()?;
        n_bases += record.len();
        dest.send(record)?;
        n_records += 1;
    }
    debug!("read {} records ({} bp)", n_records, n_bases);
    Ok(())
}

/// Reads `source` on its own thread. At most `capacity` records wait in the
/// queue, plus the one the reader is blocked on.
pub fn stream_records(
    source: FastaSource,
    capacity: usize,
    abort: &AbortSignal,
) -> Result<Stage<SeqRecord>> {
    Stage::spawn("reader", capacity, abort, move |dest, abort| {
        read_fasta(dest, source, abort)
    })
}
