mod bit2ops;
mod chrom_chunk;
mod chunk_genome;
mod consume;
mod glide_err;
mod kmer_profile;
mod metrics;
mod pipeline;
mod read_fasta;
mod run_config;

pub use crate::bit2ops::*;
pub use crate::chrom_chunk::*;
pub use crate::chunk_genome::*;
pub use crate::consume::*;
pub use crate::glide_err::*;
pub use crate::kmer_profile::*;
pub use crate::metrics::*;
pub use crate::pipeline::*;
pub use crate::read_fasta::*;
pub use crate::run_config::*;
