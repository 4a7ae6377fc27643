use crate::bit2ops::MAX_K;
use crate::glide_err::{GliderError, Result};
use crate::kmer_profile::{DistanceMetric, KmerProfile, ReferenceProfiles};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A per-window statistic computed from the window's bases alone.
pub type MetricFn = Arc<dyn Fn(&[u8]) -> f64 + Send + Sync>;

pub const COORD_COLUMNS: [&str; 3] = ["chrom", "start", "end"];
const KMER_SUFFIX: &str = "MER";

/// Named window metrics, looked up once when a run is planned.
#[derive(Clone, Default)]
pub struct MetricRegistry {
    metrics: HashMap<String, MetricFn>,
}

impl MetricRegistry {
    pub fn new() -> MetricRegistry {
        MetricRegistry::default()
    }

    /// GC, GCSKEW, ATSKEW and ENTRO.
    pub fn with_defaults() -> MetricRegistry {
        let mut registry = MetricRegistry::new();
        registry.register("GC", gc_content);
        registry.register("GCSKEW", gc_skew);
        registry.register("ATSKEW", at_skew);
        registry.register("ENTRO", entropy);
        registry
    }

    pub fn register<F>(&mut self, name: &str, metric: F)
    where
        F: Fn(&[u8]) -> f64 + Send + Sync + 'static,
    {
        self.metrics.insert(name.to_string(), Arc::new(metric));
    }

    pub fn get(&self, name: &str) -> Option<&MetricFn> {
        self.metrics.get(name)
    }

    /// Rejects unknown names and out-of-range `<k>MER` fields without
    /// touching any input.
    pub fn check_names<S: AsRef<str>>(&self, names: &[S]) -> Result<()> {
        for name in names.iter().map(|n| n.as_ref()) {
            match parse_kmer_field(name) {
                Some(k) if k == 0 || k > MAX_K => return Err(GliderError::InvalidK(k)),
                Some(_) => {}
                None if self.metrics.contains_key(name) => {}
                None => return Err(GliderError::UnknownMetric(name.to_string())),
            }
        }
        Ok(())
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.metrics.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for MetricRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricRegistry")
            .field("metrics", &self.names())
            .finish()
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct BaseCounts {
    a: usize,
    c: usize,
    g: usize,
    t: usize,
}

impl BaseCounts {
    fn of(seq: &[u8]) -> BaseCounts {
        let mut counts = BaseCounts::default();
        for base in seq {
            match base.to_ascii_uppercase() {
                b'A' => counts.a += 1,
                b'C' => counts.c += 1,
                b'G' => counts.g += 1,
                b'T' | b'U' => counts.t += 1,
                _ => {}
            }
        }
        counts
    }
    fn total(&self) -> usize {
        self.a + self.c + self.g + self.t
    }
}

fn ratio(num: f64, den: usize) -> f64 {
    if den == 0 {
        f64::NAN
    } else {
        num / den as f64
    }
}

/// Fraction of G and C among unambiguous bases.
pub fn gc_content(seq: &[u8]) -> f64 {
    let counts = BaseCounts::of(seq);
    ratio((counts.g + counts.c) as f64, counts.total())
}

/// (G - C) / (G + C)
pub fn gc_skew(seq: &[u8]) -> f64 {
    let counts = BaseCounts::of(seq);
    ratio(counts.g as f64 - counts.c as f64, counts.g + counts.c)
}

/// (A - T) / (A + T)
pub fn at_skew(seq: &[u8]) -> f64 {
    let counts = BaseCounts::of(seq);
    ratio(counts.a as f64 - counts.t as f64, counts.a + counts.t)
}

/// Shannon entropy of the base composition, in bits.
pub fn entropy(seq: &[u8]) -> f64 {
    let counts = BaseCounts::of(seq);
    let total = counts.total();
    if total == 0 {
        return f64::NAN;
    }
    [counts.a, counts.c, counts.g, counts.t]
        .iter()
        .filter(|&&n| n > 0)
        .map(|&n| {
            let p = n as f64 / total as f64;
            p * (1.0 / p).log2()
        })
        .sum()
}

/// k of a `<k>MER` field name, e.g. 4 for "4MER". Digits too large for a
/// `usize` saturate so the name still classifies as a k-mer field.
pub fn parse_kmer_field(name: &str) -> Option<usize> {
    let digits = name.strip_suffix(KMER_SUFFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(digits.parse().unwrap_or(usize::MAX))
}

/// The distinct k values requested through `<k>MER` fields, ascending.
pub fn requested_kmer_sizes<S: AsRef<str>>(names: &[S]) -> Vec<usize> {
    let mut ks: Vec<usize> = names
        .iter()
        .filter_map(|name| parse_kmer_field(name.as_ref()))
        .collect();
    ks.sort_unstable();
    ks.dedup();
    ks
}

/// Divergence of a window's own k-mer profile from a reference profile.
/// NaN when the window holds no countable k-mer.
pub fn window_kmer_divergence(
    window: &[u8],
    reference: &KmerProfile,
    metric: DistanceMetric,
) -> Result<f64> {
    let profile = KmerProfile::from_seq(window, reference.k())?;
    if profile.is_empty() {
        return Ok(f64::NAN);
    }
    profile.distance(reference, metric)
}

#[derive(Clone)]
pub enum MetricColumn {
    Registry {
        name: String,
        metric: MetricFn,
    },
    KmerDivergence {
        name: String,
        k: usize,
        reference: Arc<KmerProfile>,
    },
}

impl MetricColumn {
    pub fn name(&self) -> &str {
        match self {
            MetricColumn::Registry { name, .. } | MetricColumn::KmerDivergence { name, .. } => name,
        }
    }
}

/// Requested metrics resolved to their implementations, in output column order.
#[derive(Clone)]
pub struct MetricPlan {
    columns: Vec<MetricColumn>,
    distance: DistanceMetric,
}

impl MetricPlan {
    /// Resolves every name up front: `<k>MER` fields need a reference profile
    /// for k, anything else must be registered.
    pub fn new<S: AsRef<str>>(
        names: &[S],
        registry: &MetricRegistry,
        references: &ReferenceProfiles,
        distance: DistanceMetric,
    ) -> Result<MetricPlan> {
        registry.check_names(names)?;
        let columns = names
            .iter()
            .map(|name| -> Result<MetricColumn> {
                let name = name.as_ref();
                if let Some(k) = parse_kmer_field(name) {
                    let reference = references
                        .get(k)
                        .ok_or(GliderError::MissingReference(k))?;
                    Ok(MetricColumn::KmerDivergence {
                        name: name.to_string(),
                        k,
                        reference: Arc::clone(reference),
                    })
                } else {
                    let metric = registry
                        .get(name)
                        .ok_or_else(|| GliderError::UnknownMetric(name.to_string()))?;
                    Ok(MetricColumn::Registry {
                        name: name.to_string(),
                        metric: Arc::clone(metric),
                    })
                }
            })
            .collect::<Result<Vec<MetricColumn>>>()?;
        Ok(MetricPlan { columns, distance })
    }

    pub fn columns(&self) -> &[MetricColumn] {
        &self.columns
    }

    pub fn header(&self) -> Vec<String> {
        COORD_COLUMNS
            .iter()
            .map(|c| c.to_string())
            .chain(self.columns.iter().map(|c| c.name().to_string()))
            .collect()
    }

    pub fn compute(&self, column: &MetricColumn, window: &[u8]) -> Result<f64> {
        match column {
            MetricColumn::Registry { metric, .. } => Ok(metric(window)),
            MetricColumn::KmerDivergence { reference, .. } => {
                window_kmer_divergence(window, reference, self.distance)
            }
        }
    }

    pub fn describe(&self) -> String {
        self.columns
            .iter()
            .map(|c| match c {
                MetricColumn::Registry { name, .. } => name.clone(),
                MetricColumn::KmerDivergence { k, .. } => {
                    format!("{}-mer divergence ({:?})", k, self.distance)
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

pub fn format_stat(value: f64) -> String {
    format!("{:.6}", value)
}
