//! Order-preserving block redistribution of distributed arrays.
//!
//! A distributed array is the rank-order concatenation of the local vectors.
//! The helpers here move elements between ranks without reordering that
//! global sequence.

use bytemuck::Pod;

use super::collectives;
use super::communicator::Communicator;
use crate::error::ConnError;

/// Block-decomposition counts: `total` elements over `ranks` ranks, with the
/// remainder spread over the leading ranks.
pub fn block_counts(total: u64, ranks: usize) -> Vec<usize> {
    let base = (total / ranks as u64) as usize;
    let rem = (total % ranks as u64) as usize;
    (0..ranks).map(|r| base + usize::from(r < rem)).collect()
}

/// Redistribute so that rank `r` ends up with exactly `targets[r]` elements,
/// preserving global order. Collective; `targets` must be identical on every
/// rank and cover the global element count.
pub fn redistribute_to_counts<C, T>(
    comm: &C,
    data: &mut Vec<T>,
    targets: &[usize],
) -> Result<(), ConnError>
where
    C: Communicator,
    T: Pod,
{
    let p = comm.size();
    let me = comm.rank();
    let current = collectives::allgather(comm, &(data.len() as u64))?;
    let total: u64 = current.iter().sum();
    let target_total: u64 = targets.iter().map(|&t| t as u64).sum();
    if target_total != total {
        return Err(ConnError::RedistributionMismatch { target_total, total });
    }

    let my_offset: u64 = current[..me].iter().sum();
    let mut starts = vec![0u64; p + 1];
    for r in 0..p {
        starts[r + 1] = starts[r] + targets[r] as u64;
    }

    let n = data.len() as u64;
    let mut sends: Vec<Vec<T>> = (0..p).map(|_| Vec::new()).collect();
    for r in 0..p {
        let lo = starts[r].max(my_offset);
        let hi = starts[r + 1].min(my_offset + n);
        if lo < hi {
            let a = (lo - my_offset) as usize;
            let b = (hi - my_offset) as usize;
            sends[r] = data[a..b].to_vec();
        }
    }

    let received = collectives::alltoallv(comm, sends)?;
    data.clear();
    for chunk in received {
        data.extend_from_slice(&chunk);
    }
    Ok(())
}

/// Redistribute into equal-sized blocks (the leading ranks absorb the
/// remainder), preserving global order. Collective.
pub fn distribute_evenly<C, T>(comm: &C, data: &mut Vec<T>) -> Result<(), ConnError>
where
    C: Communicator,
    T: Pod,
{
    let counts = collectives::allgather(comm, &(data.len() as u64))?;
    let total: u64 = counts.iter().sum();
    let targets = block_counts(total, comm.size());
    redistribute_to_counts(comm, data, &targets)
}
