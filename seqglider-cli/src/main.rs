mod cli_utils;

use crate::cli_utils::{load_references, open_output, GliderArgs, TsvSink};
use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use seqglider_lib::*;
use std::time::Instant;

fn main() -> Result<()> {
    let args = GliderArgs::parse();
    args.setup_logging()?;
    let start_time = Instant::now();

    let config = args.run_config();
    let registry = MetricRegistry::with_defaults();
    let references = load_references(&config, &registry, args.reference_path())?;

    let source = FastaSource::open(&args.fasta)
        .with_context(|| format!("cannot open {}", args.fasta.display()))?;
    let pipeline = Pipeline::spawn(source, &config, &registry, &references)?;

    let mut sink = TsvSink::new(open_output(&args.out)?);
    let mut written = sink.write_header(pipeline.header());
    if written.is_ok() {
        for table in pipeline.results() {
            written = sink.write_table(&table);
            if written.is_err() {
                warn!("output failed, stopping the pipeline");
                pipeline.abort();
                break;
            }
        }
    }
    let run = pipeline.finish();
    // a failed write is what cancelled the run
    written?;
    run?;
    let n_rows = sink.n_rows();
    sink.finish()?;

    info!("wrote {} windows to {}", n_rows, args.out);
    info!("Completed in {}s", start_time.elapsed().as_secs_f64());
    Ok(())
}
