//! # distconn
//!
//! distconn computes connected-component labels for very large undirected
//! graphs whose edge lists are partitioned across the ranks of a
//! bulk-synchronous cluster. The engine never materializes an adjacency
//! structure: it runs iterative label propagation with pointer doubling over
//! one flat distributed array of 16-byte tuples, using only distributed sort,
//! prefix-scan, and redistribution primitives.
//!
//! ## Features
//! - Label-propagation engine with three optimization levels (naive, stable
//!   partitions parked, fully load-balanced) and optional pointer doubling
//! - Pluggable communication backends (single-rank, threaded, MPI) behind one
//!   small `Communicator` trait
//! - A collective library (allgather, all-to-all, scans, sample sort, block
//!   redistribution) reusable on its own
//!
//! ## Usage
//! Add `distconn` as a dependency in your `Cargo.toml` and enable features as
//! needed:
//!
//! ```toml
//! [dependencies]
//! distconn = "0.1"
//! # Optional features:
//! # features = ["mpi-support", "rayon"]
//! ```
//!
//! Every rank builds the engine over its slice of the edge list and calls the
//! collective operations in lock step:
//!
//! ```
//! use distconn::prelude::*;
//!
//! // Both directions of each undirected edge, on a single rank here.
//! let mut edges = vec![(1u64, 2), (2, 1), (2, 3), (3, 2)];
//! let mut engine =
//!     ConnectedComponents::new(&mut edges, NoComm, LabelingConfig::default())?;
//! engine.compute()?;
//! assert_eq!(engine.component_count()?, 1);
//! # Ok::<(), distconn::error::ConnError>(())
//! ```
//!
//! Ranks holding an empty edge slice must be excluded from the communicator
//! before construction; vertex ids must stay below `u32::MAX - 1` (the
//! partition-id space), and `u64::MAX` is reserved.

pub mod comm;
pub mod error;
pub mod labeling;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::comm::communicator::{CommTag, Communicator, NoComm, ThreadComm, Wait};
    #[cfg(feature = "mpi-support")]
    pub use crate::comm::communicator::MpiComm;
    pub use crate::error::ConnError;
    pub use crate::labeling::{
        ConnectedComponents, LabelingConfig, NodeId, Optimization, PartitionId, Triple,
    };
}
