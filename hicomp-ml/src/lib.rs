//! Machine-learning primitives for the hicomp Hi-C compartment toolkit.
//!
//! - **Hidden Markov models**: Gaussian-emission HMM with pooled Baum-Welch
//!   training, Viterbi decoding and AIC/BIC model scoring
//! - **Clustering**: agglomerative linkage (Ward and friends) with dendrogram cuts
//! - **Distances**: condensed Euclidean distance matrices
//! - **Evaluation**: Calinski-Harabasz index over pairwise dissimilarities

pub mod cluster;
pub mod distance;
pub mod evaluate;
pub mod hmm;

pub use cluster::{linkage, Dendrogram, Linkage, MergeStep};
pub use distance::DistanceMatrix;
pub use evaluate::calinski_harabasz;
pub use hmm::{BaumWelchConfig, GaussianHmm, ModelScore, TrainingSummary};
