//! Bulk-synchronous communication substrate.
//!
//! The labeling engine never touches a socket or an MPI call directly. It
//! talks to a [`communicator::Communicator`] (non-blocking point-to-point
//! plus rank/size), and everything collective is derived from that seam:
//!
//! - [`collectives`]: allgather / allgatherv / alltoallv / allreduce and
//!   forward/reverse exclusive scans,
//! - [`sort`]: distributed sample sort and the sorted-array queries built on
//!   top of it (is-sorted, unique-count, longest-run),
//! - [`distribute`]: order-preserving block redistribution.
//!
//! Every function in the three collective modules is a collective: all ranks
//! of the communicator must call it, in the same order, with compatible
//! arguments. A rank holding no local data still participates.

pub mod collectives;
pub mod communicator;
pub mod distribute;
pub mod sort;
