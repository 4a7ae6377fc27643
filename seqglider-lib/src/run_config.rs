use crate::chrom_chunk::WindowLayout;
use crate::glide_err::{GliderError, Result};
use crate::kmer_profile::DistanceMetric;
use crate::metrics::requested_kmer_sizes;

pub const DEFAULT_WINDOW_SIZE: usize = 100;
pub const DEFAULT_CHUNK_SIZE: usize = 10;
pub const DEFAULT_QUEUE_CAPACITY: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub window_size: usize,
    pub window_stride: usize,
    // windows per chunk
    pub chunk_size: usize,
    // items buffered between two stages
    pub queue_capacity: usize,
    pub metrics: Vec<String>,
    pub distance: DistanceMetric,
}

impl Default for RunConfig {
    fn default() -> RunConfig {
        RunConfig {
            window_size: DEFAULT_WINDOW_SIZE,
            window_stride: DEFAULT_WINDOW_SIZE,
            chunk_size: DEFAULT_CHUNK_SIZE,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            metrics: vec!["GC".to_string()],
            distance: DistanceMetric::default(),
        }
    }
}

impl RunConfig {
    pub fn new<S: AsRef<str>>(metrics: &[S]) -> RunConfig {
        RunConfig {
            metrics: metrics.iter().map(|m| m.as_ref().to_string()).collect(),
            ..RunConfig::default()
        }
    }
    pub fn with_windows(mut self, window_size: usize, window_stride: usize) -> RunConfig {
        self.window_size = window_size;
        self.window_stride = window_stride;
        self
    }
    pub fn with_chunk_size(mut self, chunk_size: usize) -> RunConfig {
        self.chunk_size = chunk_size;
        self
    }
    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> RunConfig {
        self.queue_capacity = queue_capacity;
        self
    }
    pub fn with_distance(mut self, distance: DistanceMetric) -> RunConfig {
        self.distance = distance;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.layout()?;
        if self.queue_capacity == 0 {
            return Err(GliderError::InvalidConfig(
                "queue capacity must be positive".to_string(),
            ));
        }
        if self.metrics.is_empty() {
            return Err(GliderError::InvalidConfig(
                "at least one metric is required".to_string(),
            ));
        }
        Ok(())
    }

    pub fn layout(&self) -> Result<WindowLayout> {
        WindowLayout::new(self.window_size, self.window_stride, self.chunk_size)
    }

    /// k values whose reference profiles the requested metrics need.
    pub fn kmer_sizes(&self) -> Vec<usize> {
        requested_kmer_sizes(&self.metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = RunConfig::default();
        config.validate().unwrap();
        assert_eq!(config.layout().unwrap().chunk_len(), 100 + 9 * 100);
    }

    #[test]
    fn test_rejects_zero_values() {
        assert!(RunConfig::new(&["GC"]).with_windows(0, 10).validate().is_err());
        assert!(RunConfig::new(&["GC"]).with_windows(10, 0).validate().is_err());
        assert!(RunConfig::new(&["GC"]).with_chunk_size(0).validate().is_err());
        assert!(RunConfig::new(&["GC"]).with_queue_capacity(0).validate().is_err());
        assert!(RunConfig::new(&["GC"])
            .with_windows(10, usize::MAX / 2)
            .with_chunk_size(3)
            .validate()
            .is_err());
        let empty: [&str; 0] = [];
        assert!(matches!(
            RunConfig::new(&empty).validate(),
            Err(GliderError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_kmer_sizes() {
        let config = RunConfig::new(&["5MER", "GC", "3MER"]);
        assert_eq!(config.kmer_sizes(), vec![3, 5]);
    }
}
