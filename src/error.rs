//! ConnError: unified error type for distconn public APIs.
//!
//! Every fallible public operation in this crate returns `Result<_, ConnError>`.
//! There is no local recovery path for any of these: a failure on one rank
//! terminates the job, because the remaining ranks are left waiting inside a
//! collective that will never complete.

use thiserror::Error;

/// Unified error type for distributed labeling operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConnError {
    /// A rank entered engine construction with no local edges. Such ranks must
    /// be excluded from the communicator before construction.
    #[error("rank {rank} holds an empty local edge partition; exclude idle ranks from the communicator before constructing the engine")]
    EmptyLocalEdges { rank: usize },
    /// A vertex id does not fit the 32-bit partition-id space.
    #[error("vertex id {max_seen} does not fit the partition-id space (ids must be < {limit})")]
    VertexIdRange { max_seen: u64, limit: u64 },
    /// The configured iteration cap was reached before convergence.
    #[error("label propagation did not converge within {iterations} iterations")]
    IterationCap { iterations: usize },
    /// `compute()` was called a second time after the communicator was dropped.
    #[error("the communicator was already released by a previous compute()")]
    CommunicatorReleased,
    /// A component statistic was requested before `compute()` finished.
    #[error("component statistics are unavailable before compute()")]
    NotComputed,
    /// A point-to-point receive completed without data.
    #[error("no data received from rank {peer}")]
    RecvFailed { peer: usize },
    /// A peer sent a different number of bytes than the size exchange announced.
    #[error("expected {expected} bytes from rank {peer}, got {got}")]
    BufferSizeMismatch { peer: usize, expected: usize, got: usize },
    /// An all-to-all call was handed the wrong number of destination buckets.
    #[error("all-to-all fan-out has {got} buckets for {ranks} ranks")]
    FanoutMismatch { got: usize, ranks: usize },
    /// Redistribution targets do not cover the global element count.
    #[error("redistribution targets cover {target_total} elements but {total} are present")]
    RedistributionMismatch { target_total: u64, total: u64 },
}
