//! One cluster of consistent ratios for a single bucket pair.

/// Samples whose `countA / countB` ratio falls in a common range.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketPair {
    /// Position in discovery order; assigned once pairs are final.
    pub id: usize,
    /// Row of the bucket pair in the ratio matrix.
    pub row: usize,
    /// Numerator bucket.
    pub bucket_a: usize,
    /// Denominator bucket.
    pub bucket_b: usize,
    /// Lowest ratio observed.
    pub low: f64,
    /// Highest ratio observed.
    pub high: f64,
    /// `(sample, ratio)` observations, ascending by sample.
    observations: Vec<(usize, f64)>,
}

impl BucketPair {
    /// Start a pair from its first observation.
    pub fn new(row: usize, bucket_a: usize, bucket_b: usize, sample: usize, ratio: f64) -> Self {
        Self {
            id: 0,
            row,
            bucket_a,
            bucket_b,
            low: ratio,
            high: ratio,
            observations: vec![(sample, ratio)],
        }
    }

    /// Whether `ratio` lies inside the range widened by `tolerance`.
    pub fn accepts(&self, ratio: f64, tolerance: f64) -> bool {
        ratio >= self.low * (1.0 - tolerance) && ratio <= self.high * (1.0 + tolerance)
    }

    /// Record one observation. Samples must arrive in ascending order.
    pub fn add(&mut self, sample: usize, ratio: f64) {
        debug_assert!(self.observations.last().map_or(true, |(s, _)| *s < sample));
        self.observations.push((sample, ratio));
        self.low = self.low.min(ratio);
        self.high = self.high.max(ratio);
    }

    /// Same bucket pair and intersecting ranges.
    pub fn overlaps(&self, other: &BucketPair) -> bool {
        self.row == other.row && self.low <= other.high && other.low <= self.high
    }

    /// Take over another pair's observations and range.
    pub fn absorb(&mut self, other: BucketPair) {
        let mut merged = Vec::with_capacity(self.observations.len() + other.observations.len());
        let (mut i, mut j) = (0, 0);
        let (a, b) = (&self.observations, &other.observations);
        while i < a.len() || j < b.len() {
            if j >= b.len() || (i < a.len() && a[i].0 <= b[j].0) {
                if j < b.len() && a[i].0 == b[j].0 {
                    j += 1;
                }
                merged.push(a[i]);
                i += 1;
            } else {
                merged.push(b[j]);
                j += 1;
            }
        }
        self.observations = merged;
        self.low = self.low.min(other.low);
        self.high = self.high.max(other.high);
    }

    /// The two buckets, in `(a, b)` order.
    pub fn buckets(&self) -> [usize; 2] {
        [self.bucket_a, self.bucket_b]
    }

    /// True when the two pairs have exactly one bucket in common.
    pub fn shares_one_bucket(&self, other: &BucketPair) -> bool {
        let shared = self
            .buckets()
            .iter()
            .filter(|b| other.buckets().contains(*b))
            .count();
        shared == 1
    }

    /// Samples in ascending order.
    pub fn samples(&self) -> Vec<usize> {
        self.observations.iter().map(|(s, _)| *s).collect()
    }

    /// Number of samples.
    pub fn sample_count(&self) -> usize {
        self.observations.len()
    }
}
