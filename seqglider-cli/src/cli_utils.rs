use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use log::{info, LevelFilter};
use seqglider_lib::{
    ChunkResult, DistanceMetric, MetricRegistry, ReferenceProfiles, RunConfig,
    DEFAULT_CHUNK_SIZE, DEFAULT_QUEUE_CAPACITY, DEFAULT_WINDOW_SIZE,
};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(
    name = "seqglider",
    author = env!("CARGO_PKG_AUTHORS"),
    version = env!("CARGO_PKG_VERSION"),
    about = env!("CARGO_PKG_DESCRIPTION"),
    long_about = None,
    after_help = "Fields: GC, GCSKEW, ATSKEW, ENTRO, or <k>MER for the k-mer divergence \
                  of each window from the reference profile (e.g. 4MER)."
)]
pub struct GliderArgs {
    /// Input FASTA file, optionally gzipped
    #[arg(short, long)]
    pub fasta: PathBuf,

    /// Comma-separated statistics to compute for each window
    #[arg(short = 'F', long, value_delimiter = ',', default_value = "GC")]
    pub fields: Vec<String>,

    /// Window size in basepairs
    #[arg(short, long, default_value_t = DEFAULT_WINDOW_SIZE)]
    pub window: usize,

    /// Distance between the starts of consecutive windows, in basepairs
    #[arg(short, long, default_value_t = DEFAULT_WINDOW_SIZE)]
    pub stride: usize,

    /// Windows processed together in one chunk
    #[arg(short, long, default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,

    /// Items buffered between pipeline stages
    #[arg(short, long, default_value_t = DEFAULT_QUEUE_CAPACITY)]
    pub queue_capacity: usize,

    /// FASTA used for reference k-mer profiles [default: the input FASTA]
    #[arg(short, long)]
    pub reference: Option<PathBuf>,

    /// Distance between window and reference k-mer profiles: tvd, euclidean or cosine
    #[arg(short, long, default_value = "tvd")]
    pub distance: DistanceMetric,

    /// Output TSV file, - for stdout
    #[arg(short, long, default_value = "-")]
    pub out: String,

    /// Increase logging verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl GliderArgs {
    /// RUST_LOG takes precedence over -v.
    pub fn setup_logging(&self) -> Result<()> {
        let level = match self.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };
        let mut builder = pretty_env_logger::formatted_builder();
        match std::env::var("RUST_LOG") {
            Ok(filters) => builder.parse_filters(&filters),
            Err(_) => builder.filter_level(level),
        };
        builder.try_init().context("failed to initialise logging")?;
        Ok(())
    }

    pub fn run_config(&self) -> RunConfig {
        RunConfig::new(&self.fields)
            .with_windows(self.window, self.stride)
            .with_chunk_size(self.chunk_size)
            .with_queue_capacity(self.queue_capacity)
            .with_distance(self.distance)
    }

    pub fn reference_path(&self) -> &PathBuf {
        self.reference.as_ref().unwrap_or(&self.fasta)
    }
}

/// Checks every requested metric name, then counts the reference profiles
/// the `<k>MER` fields need. A bad name fails before the reference is opened.
pub fn load_references(
    config: &RunConfig,
    registry: &MetricRegistry,
    ref_path: &Path,
) -> Result<ReferenceProfiles> {
    config.validate()?;
    registry.check_names(&config.metrics)?;
    let kmer_sizes = config.kmer_sizes();
    if kmer_sizes.is_empty() {
        return Ok(ReferenceProfiles::new());
    }
    info!(
        "computing reference profiles for k={:?} from {}",
        kmer_sizes,
        ref_path.display()
    );
    let references = ReferenceProfiles::from_fasta(ref_path, &kmer_sizes)
        .with_context(|| format!("cannot build reference profiles from {}", ref_path.display()))?;
    Ok(references)
}

pub fn open_output(out_path: &str) -> Result<Box<dyn Write>> {
    let out_writer = if out_path != "-" {
        let file = File::create(out_path)
            .with_context(|| format!("cannot create output file {}", out_path))?;
        Box::new(file) as Box<dyn Write>
    } else {
        Box::new(std::io::stdout()) as Box<dyn Write>
    };
    Ok(Box::new(BufWriter::new(out_writer)))
}

/// Tab separated output: the header once, then every row in arrival order.
pub struct TsvSink<W: Write> {
    writer: csv::Writer<W>,
    n_rows: usize,
}

impl<W: Write> TsvSink<W> {
    pub fn new(out: W) -> TsvSink<W> {
        let writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .from_writer(out);
        TsvSink { writer, n_rows: 0 }
    }

    pub fn write_header(&mut self, header: &[String]) -> Result<()> {
        self.writer.write_record(header)?;
        Ok(())
    }

    pub fn write_table(&mut self, table: &ChunkResult) -> Result<()> {
        for row in table.data.iter() {
            self.writer.write_record(row)?;
        }
        self.n_rows += table.n_rows();
        Ok(())
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn finish(mut self) -> Result<W> {
        self.writer.flush()?;
        self.writer
            .into_inner()
            .map_err(|e| anyhow::anyhow!("failed to flush output: {}", e.error()))
    }
}
