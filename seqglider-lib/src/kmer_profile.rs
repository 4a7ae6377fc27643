use crate::bit2ops::{canonical_kmers, MAX_K};
use crate::glide_err::{GliderError, Result};
use crate::read_fasta::FastaSource;
use fxhash::FxHashMap;
use log::{debug, info};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

/// How two k-mer frequency profiles are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DistanceMetric {
    /// Half the L1 distance, in [0, 1].
    #[default]
    TotalVariation,
    Euclidean,
    /// One minus the cosine similarity.
    Cosine,
}

impl FromStr for DistanceMetric {
    type Err = GliderError;

    fn from_str(s: &str) -> Result<DistanceMetric> {
        match s.to_ascii_lowercase().as_str() {
            "tvd" | "total-variation" => Ok(DistanceMetric::TotalVariation),
            "euclidean" => Ok(DistanceMetric::Euclidean),
            "cosine" => Ok(DistanceMetric::Cosine),
            _ => Err(GliderError::InvalidConfig(format!(
                "unknown distance metric '{}', expected one of tvd, euclidean, cosine",
                s
            ))),
        }
    }
}

/// Counts of canonical k-mers for a fixed k, converted once to frequencies.
#[derive(Debug, Clone, PartialEq)]
pub struct KmerProfile {
    k: usize,
    profile: FxHashMap<u64, f64>,
    normalized: bool,
}

impl KmerProfile {
    pub fn new(k: usize) -> Result<KmerProfile> {
        if k == 0 || k > MAX_K {
            return Err(GliderError::InvalidK(k));
        }
        Ok(KmerProfile {
            k,
            profile: FxHashMap::default(),
            normalized: false,
        })
    }

    pub fn k(&self) -> usize {
        self.k
    }
    pub fn len(&self) -> usize {
        self.profile.len()
    }
    pub fn is_empty(&self) -> bool {
        self.profile.is_empty()
    }
    pub fn is_normalized(&self) -> bool {
        self.normalized
    }
    /// Count (or frequency once normalized) stored for a canonical code.
    pub fn get(&self, code: u64) -> f64 {
        self.profile.get(&code).copied().unwrap_or(0.0)
    }
    pub fn iter(&self) -> impl Iterator<Item = (u64, f64)> + '_ {
        self.profile.iter().map(|(&code, &val)| (code, val))
    }
    pub fn total(&self) -> f64 {
        self.profile.values().sum()
    }

    /// Adds every canonical k-mer of `seq` to the counts. Sequences shorter
    /// than k leave the profile unchanged.
    pub fn count_seq(&mut self, seq: &[u8]) -> Result<()> {
        if self.normalized {
            return Err(GliderError::AlreadyNormalized);
        }
        for code in canonical_kmers(seq, self.k) {
            *self.profile.entry(code).or_insert(0.0) += 1.0;
        }
        Ok(())
    }

    pub fn from_seq(seq: &[u8], k: usize) -> Result<KmerProfile> {
        let mut profile = KmerProfile::new(k)?;
        profile.count_seq(seq)?;
        profile.counts_to_freqs()?;
        Ok(profile)
    }

    /// Divides every count by the total so values sum to 1. An empty profile
    /// stays empty. May only be called once.
    pub fn counts_to_freqs(&mut self) -> Result<()> {
        if self.normalized {
            return Err(GliderError::AlreadyNormalized);
        }
        let total = self.total();
        if total > 0.0 {
            for val in self.profile.values_mut() {
                *val /= total;
            }
        }
        self.normalized = true;
        Ok(())
    }

    /// Total variation distance to `other`: half the summed absolute
    /// frequency differences over the union of k-mers.
    pub fn kmer_dist(&self, other: &KmerProfile) -> Result<f64> {
        self.distance(other, DistanceMetric::TotalVariation)
    }

    pub fn distance(&self, other: &KmerProfile, metric: DistanceMetric) -> Result<f64> {
        if self.k != other.k {
            return Err(GliderError::KMismatch {
                left: self.k,
                right: other.k,
            });
        }
        if !self.normalized || !other.normalized {
            return Err(GliderError::NotNormalized);
        }
        let dist = match metric {
            DistanceMetric::TotalVariation => {
                0.5 * self.fold_union(other, |acc, p, q| acc + (p - q).abs())
            }
            DistanceMetric::Euclidean => self
                .fold_union(other, |acc, p, q| acc + (p - q) * (p - q))
                .sqrt(),
            DistanceMetric::Cosine => match (self.is_empty(), other.is_empty()) {
                (true, true) => 0.0,
                (true, false) | (false, true) => 1.0,
                (false, false) => {
                    let dot: f64 = self.iter().map(|(code, p)| p * other.get(code)).sum();
                    let norm = |prof: &KmerProfile| prof.profile.values().map(|v| v * v).sum::<f64>().sqrt();
                    (1.0 - dot / (norm(self) * norm(other))).clamp(0.0, 1.0)
                }
            },
        };
        Ok(dist)
    }

    // visits each k-mer of the key union once, absent keys read as 0
    fn fold_union<F>(&self, other: &KmerProfile, f: F) -> f64
    where
        F: Fn(f64, f64, f64) -> f64,
    {
        let shared = self
            .profile
            .iter()
            .fold(0.0, |acc, (code, &p)| f(acc, p, other.get(*code)));
        other
            .profile
            .iter()
            .filter(|(code, _)| !self.profile.contains_key(*code))
            .fold(shared, |acc, (_, &q)| f(acc, 0.0, q))
    }
}

/// Normalized reference profiles windows are compared against, keyed by k.
#[derive(Debug, Clone, Default)]
pub struct ReferenceProfiles {
    profiles: BTreeMap<usize, Arc<KmerProfile>>,
}

impl ReferenceProfiles {
    pub fn new() -> ReferenceProfiles {
        ReferenceProfiles::default()
    }

    pub fn insert(&mut self, profile: KmerProfile) -> Result<()> {
        if !profile.is_normalized() {
            return Err(GliderError::NotNormalized);
        }
        self.profiles.insert(profile.k(), Arc::new(profile));
        Ok(())
    }

    pub fn get(&self, k: usize) -> Option<&Arc<KmerProfile>> {
        self.profiles.get(&k)
    }

    pub fn ks(&self) -> impl Iterator<Item = usize> + '_ {
        self.profiles.keys().copied()
    }

    /// Genome-wide composition: a single pass over every record of a FASTA
    /// file, counting each requested k.
    pub fn from_fasta(path: &Path, ks: &[usize]) -> Result<ReferenceProfiles> {
        let mut counting: Vec<KmerProfile> = ks
            .iter()
            .map(|&k| KmerProfile::new(k))
            .collect::<Result<_>>()?;
        let mut n_records = 0;
        for record in FastaSource::open(path)?.records() {
            let record = record?;
            for profile in counting.iter_mut() {
                profile.count_seq(&record.seq)?;
            }
            n_records += 1;
        }
        debug!("counted reference k-mers over {} records", n_records);
        let mut refs = ReferenceProfiles::new();
        for mut profile in counting {
            profile.counts_to_freqs()?;
            info!(
                "reference {}-mer profile from {}: {} distinct canonical k-mers",
                profile.k(),
                path.display(),
                profile.len()
            );
            refs.insert(profile)?;
        }
        Ok(refs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bit2ops::{canonical_code, encode_kmer};
    use assert_approx_eq::assert_approx_eq;
    use proptest::prelude::*;
    use rstest::rstest;

    fn canon(kmer: &[u8]) -> u64 {
        canonical_code(encode_kmer(kmer).unwrap(), kmer.len())
    }

    #[test]
    fn test_new_profile() {
        let prof = KmerProfile::new(3).unwrap();
        assert_eq!(prof.k(), 3);
        assert!(prof.is_empty());
        assert!(matches!(KmerProfile::new(0), Err(GliderError::InvalidK(0))));
        assert!(matches!(KmerProfile::new(33), Err(GliderError::InvalidK(33))));
    }

    #[test]
    fn test_count_seq_canonical() {
        let mut prof = KmerProfile::new(3).unwrap();
        prof.count_seq(b"CCTA").unwrap();
        assert_eq!(prof.len(), 2);
        assert_eq!(prof.get(canon(b"AGG")), 1.0);
        assert_eq!(prof.get(canon(b"TAG")), 1.0);
    }

    #[test]
    fn test_counts_to_freqs() {
        let mut prof = KmerProfile::new(3).unwrap();
        prof.count_seq(b"CCTA").unwrap();
        prof.counts_to_freqs().unwrap();
        assert_eq!(prof.get(canon(b"AGG")), 0.5);
        assert_eq!(prof.get(canon(b"TAG")), 0.5);
    }

    #[test]
    fn test_normalize_twice_rejected() {
        let mut prof = KmerProfile::from_seq(b"ACGTTGCA", 2).unwrap();
        assert!(matches!(prof.counts_to_freqs(), Err(GliderError::AlreadyNormalized)));
        assert!(matches!(prof.count_seq(b"ACGT"), Err(GliderError::AlreadyNormalized)));
        assert_approx_eq!(prof.total(), 1.0);
    }

    #[test]
    fn test_counts_accumulate_across_sequences() {
        let mut prof = KmerProfile::new(2).unwrap();
        prof.count_seq(b"AAA").unwrap();
        prof.count_seq(b"TT").unwrap();
        // AA and TT are the same canonical 2-mer
        assert_eq!(prof.len(), 1);
        assert_eq!(prof.get(canon(b"AA")), 3.0);
    }

    #[test]
    fn test_short_sequence_stays_empty() {
        let prof = KmerProfile::from_seq(b"AC", 3).unwrap();
        assert!(prof.is_empty());
        assert!(prof.is_normalized());
    }

    #[test]
    fn test_kmer_dist() {
        let seq = KmerProfile::from_seq(b"CCTA", 3).unwrap();
        let reference = KmerProfile::from_seq(b"CCTAAA", 3).unwrap();
        assert_eq!(seq.kmer_dist(&reference).unwrap(), 0.5);
        assert_eq!(reference.kmer_dist(&seq).unwrap(), 0.5);
    }

    #[test]
    fn test_disjoint_support() {
        let a = KmerProfile::from_seq(b"AAAA", 2).unwrap();
        let c = KmerProfile::from_seq(b"CACA", 2).unwrap();
        assert_approx_eq!(a.kmer_dist(&c).unwrap(), 1.0);
        assert_approx_eq!(a.distance(&c, DistanceMetric::Cosine).unwrap(), 1.0);
    }

    #[test]
    fn test_k_mismatch() {
        let a = KmerProfile::from_seq(b"ACGTACGT", 3).unwrap();
        let b = KmerProfile::from_seq(b"ACGTACGT", 4).unwrap();
        assert!(matches!(
            a.kmer_dist(&b),
            Err(GliderError::KMismatch { left: 3, right: 4 })
        ));
    }

    #[test]
    fn test_raw_counts_rejected() {
        let mut a = KmerProfile::new(3).unwrap();
        a.count_seq(b"ACGTACGT").unwrap();
        let b = KmerProfile::from_seq(b"ACGTACGT", 3).unwrap();
        assert!(matches!(a.kmer_dist(&b), Err(GliderError::NotNormalized)));
    }

    #[rstest]
    #[case(DistanceMetric::TotalVariation)]
    #[case(DistanceMetric::Euclidean)]
    #[case(DistanceMetric::Cosine)]
    fn test_identical_profiles(#[case] metric: DistanceMetric) {
        let a = KmerProfile::from_seq(b"GATTACAGATTACA", 3).unwrap();
        assert_approx_eq!(a.distance(&a.clone(), metric).unwrap(), 0.0);
    }

    #[test]
    fn test_euclidean() {
        let seq = KmerProfile::from_seq(b"CCTA", 3).unwrap();
        let reference = KmerProfile::from_seq(b"CCTAAA", 3).unwrap();
        // differences: 0.25, 0.25, 0.25, 0.25
        assert_approx_eq!(seq.distance(&reference, DistanceMetric::Euclidean).unwrap(), 0.5);
    }

    #[rstest]
    #[case("tvd", DistanceMetric::TotalVariation)]
    #[case("Euclidean", DistanceMetric::Euclidean)]
    #[case("cosine", DistanceMetric::Cosine)]
    fn test_parse_distance(#[case] name: &str, #[case] expected: DistanceMetric) {
        assert_eq!(name.parse::<DistanceMetric>().unwrap(), expected);
    }

    #[test]
    fn test_reference_requires_normalized() {
        let mut refs = ReferenceProfiles::new();
        let mut raw = KmerProfile::new(3).unwrap();
        raw.count_seq(b"ACGT").unwrap();
        assert!(refs.insert(raw).is_err());
        refs.insert(KmerProfile::from_seq(b"ACGT", 3).unwrap()).unwrap();
        assert_eq!(refs.ks().collect::<Vec<_>>(), vec![3]);
        assert!(refs.get(4).is_none());
    }

    fn dna(min_len: usize) -> impl Strategy<Value = Vec<u8>> {
        prop::collection::vec(prop::sample::select(b"ACGT".to_vec()), min_len..200)
    }

    proptest! {
        #[test]
        fn prop_distance_symmetric_and_bounded(k in 1usize..=6, s in dna(6), t in dna(6)) {
            let ps = KmerProfile::from_seq(&s, k).unwrap();
            let pt = KmerProfile::from_seq(&t, k).unwrap();
            let st = ps.kmer_dist(&pt).unwrap();
            let ts = pt.kmer_dist(&ps).unwrap();
            prop_assert!((st - ts).abs() < 1e-12);
            prop_assert!((-1e-12..=1.0 + 1e-12).contains(&st));
            prop_assert!(ps.kmer_dist(&ps).unwrap().abs() < 1e-12);
        }

        #[test]
        fn prop_freqs_sum_to_one(k in 1usize..=8, s in dna(0)) {
            let prof = KmerProfile::from_seq(&s, k).unwrap();
            if s.len() < k {
                prop_assert!(prof.is_empty());
            } else {
                prop_assert!((prof.total() - 1.0).abs() < 1e-9);
            }
        }

        #[test]
        fn prop_strand_insensitive(k in 1usize..=8, s in dna(8)) {
            let rc: Vec<u8> = s
                .iter()
                .rev()
                .map(|b| match b {
                    b'A' => b'T',
                    b'C' => b'G',
                    b'G' => b'C',
                    _ => b'A',
                })
                .collect();
            let fwd = KmerProfile::from_seq(&s, k).unwrap();
            let rev = KmerProfile::from_seq(&rc, k).unwrap();
            prop_assert!(fwd.kmer_dist(&rev).unwrap().abs() < 1e-12);
        }
    }
}
