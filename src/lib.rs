//! # mutsig
//!
//! Mutational signature discovery: factor a buckets × samples count matrix
//! into a few non-negative signatures and per-sample contributions, propose
//! signatures straight from correlated bucket ratios, and re-fit every sample
//! against a signature set under per-bucket noise ceilings.
//!
//! **Default build** is single-threaded. The `parallel` feature runs
//! factorization trials and per-sample fits on rayon; `serde` derives
//! (de)serialization for the config structs.
//!
//! ```rust
//! use mutsig::{analyse, AnalysisConfig, CountMatrix, NmfConfig};
//! use ndarray::array;
//!
//! let w = array![[0.5, 0.0], [0.5, 0.1], [0.0, 0.9]];
//! let h = array![[200.0, 0.0, 120.0, 80.0], [0.0, 300.0, 60.0, 240.0]];
//! let counts = CountMatrix::new(w.dot(&h)).unwrap();
//!
//! let config = AnalysisConfig::new(NmfConfig::new(2).with_run_count(3).with_seed(11));
//! let analysis = analyse(&counts, &config, None).unwrap();
//! assert!(analysis.all_samples_valid());
//! ```

pub mod bucket;
pub mod diagnostics;
/// Error types used across `mutsig`.
pub mod error;
pub mod fit;
pub mod matrix;
pub mod nmf;
pub mod noise;
pub mod pipeline;
pub mod similarity;


pub use bucket::{BucketAnalyser, BucketConfig, BucketGroup, BucketPair};
pub use diagnostics::{Issue, Report, Severity};
pub use error::{Error, Result};
pub use fit::{
    fit_samples, BatchFit, FitResult, OptimiserConfig, SampleFit, SigContribOptimiser, Termination,
};
pub use matrix::{CountMatrix, MatrixExt};
pub use nmf::{NmfCalculator, NmfConfig, NmfModel, NmfResult, NmfRunner, References, RunSummary};
pub use noise::{noise_margins, poisson_margin};
pub use pipeline::{analyse, Analysis, AnalysisConfig};
pub use similarity::{cosine_sim, top_pairs, SimPair};
