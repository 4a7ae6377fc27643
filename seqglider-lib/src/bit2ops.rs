const A: u8 = 0b00;
const C: u8 = 0b01;
const G: u8 = 0b10;
const T: u8 = 0b11;
const INVALID: u8 = 0xff;

const NCHRS: usize = 1 << 8;

/// Longest k-mer whose 2-bit code fits in a `u64`.
pub const MAX_K: usize = 32;

const fn makebit2map() -> [u8; NCHRS] {
    let mut arr = [INVALID; NCHRS];
    arr['A' as usize] = A;
    arr['C' as usize] = C;
    arr['G' as usize] = G;
    arr['T' as usize] = T;
    arr['U' as usize] = T;
    arr
}
const fn apply_lower(inarr: [u8; NCHRS]) -> [u8; NCHRS] {
    let mut arr = inarr;
    let mut i = 1;
    while i <= 26 {
        arr[i + 96] = inarr[i + 64];
        i += 1;
    }
    arr
}

/*
Precomputed mapping from ascii to 2 bit codes, ambiguous bases map to INVALID
*/
const STR_2_BIT2: [u8; NCHRS] = apply_lower(makebit2map());
const BIT2_TO_STR: [u8; 4] = [b'A', b'C', b'G', b'T'];

pub fn base_to_bit2(base: u8) -> Option<u8> {
    match STR_2_BIT2[base as usize] {
        INVALID => None,
        code => Some(code),
    }
}

pub fn kmer_mask(k: usize) -> u64 {
    debug_assert!(k >= 1 && k <= MAX_K);
    if k == MAX_K {
        u64::MAX
    } else {
        (1_u64 << (2 * k)) - 1
    }
}

/// Packs a k-mer into the low `2k` bits, first base most significant.
/// Returns `None` for an empty or too long k-mer, or one holding an ambiguous base.
pub fn encode_kmer(kmer: &[u8]) -> Option<u64> {
    if kmer.is_empty() || kmer.len() > MAX_K {
        return None;
    }
    kmer.iter()
        .try_fold(0_u64, |code, &b| Some((code << 2) | base_to_bit2(b)? as u64))
}

pub fn decode_kmer(code: u64, k: usize) -> Vec<u8> {
    (0..k)
        .rev()
        .map(|i| BIT2_TO_STR[((code >> (2 * i)) & 0b11) as usize])
        .collect()
}

pub fn revcomp_code(code: u64, k: usize) -> u64 {
    let mut rc: u64 = 0;
    let mut fwd = code;
    for _ in 0..k {
        rc = (rc << 2) | (!fwd & 0b11);
        fwd >>= 2;
    }
    rc
}

/// The numerically smaller of a code and its reverse complement.
pub fn canonical_code(code: u64, k: usize) -> u64 {
    code.min(revcomp_code(code, k))
}

/// Rolling iterator over the canonical codes of every k-mer of `seq`.
/// K-mers overlapping an ambiguous base are skipped.
pub struct CanonicalKmers<'a> {
    seq: &'a [u8],
    pos: usize,
    k: usize,
    mask: u64,
    fwd: u64,
    rc: u64,
    filled: usize,
}

impl<'a> CanonicalKmers<'a> {
    pub fn new(seq: &'a [u8], k: usize) -> CanonicalKmers<'a> {
        CanonicalKmers {
            seq,
            pos: 0,
            k,
            mask: kmer_mask(k),
            fwd: 0,
            rc: 0,
            filled: 0,
        }
    }
}

impl Iterator for CanonicalKmers<'_> {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        while self.pos < self.seq.len() {
            let base = self.seq[self.pos];
            self.pos += 1;
            match base_to_bit2(base) {
                None => self.filled = 0,
                Some(v) => {
                    let v = v as u64;
                    self.fwd = ((self.fwd << 2) | v) & self.mask;
                    self.rc = (self.rc >> 2) | ((v ^ 0b11) << (2 * (self.k - 1)));
                    self.filled = (self.filled + 1).min(self.k);
                    if self.filled == self.k {
                        return Some(self.fwd.min(self.rc));
                    }
                }
            }
        }
        None
    }
}

pub fn canonical_kmers(seq: &[u8], k: usize) -> CanonicalKmers<'_> {
    CanonicalKmers::new(seq, k)
}
