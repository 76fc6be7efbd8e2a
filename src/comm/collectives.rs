//! Collectives derived from the point-to-point [`Communicator`] seam.
//!
//! Everything here is a collective call: all ranks must enter in the same
//! order. The implementations favor the simplest correct shape, a size
//! exchange followed by a data exchange, over tree schedules; the payloads
//! involved (counts, splitter samples, boundary carries) are tiny compared to
//! the sorted data that [`super::sort`] and [`super::distribute`] move.
//!
//! Scan reducers must be associative; the values folded are per-rank
//! contributions in rank order (reverse rank order for [`exscan_rev`]).

use bytemuck::{Pod, Zeroable};

use super::communicator::{CommTag, Communicator, Wait};
use crate::error::ConnError;

/// One tag per exchange phase. Reuse across successive collectives is safe
/// because channels are FIFO and every collective drains what it posts.
pub(crate) mod tags {
    use super::CommTag;

    pub const GATHER_FIXED: CommTag = CommTag::new(0x10);
    pub const GATHER_DATA: CommTag = CommTag::new(0x11);
    pub const EXCHANGE_SIZES: CommTag = CommTag::new(0x12);
    pub const EXCHANGE_DATA: CommTag = CommTag::new(0x13);
}

fn typed_from_bytes<T: Pod>(peer: usize, raw: &[u8]) -> Result<Vec<T>, ConnError> {
    let width = std::mem::size_of::<T>();
    if raw.len() % width != 0 {
        return Err(ConnError::BufferSizeMismatch {
            peer,
            expected: raw.len().next_multiple_of(width),
            got: raw.len(),
        });
    }
    // Copy through a zeroed Vec<T>: the wire bytes are unaligned.
    let mut out = vec![T::zeroed(); raw.len() / width];
    bytemuck::cast_slice_mut::<T, u8>(&mut out).copy_from_slice(raw);
    Ok(out)
}

/// Gather one fixed-width value from every rank. Returns the values indexed
/// by rank; identical on every rank.
pub fn allgather<C, T>(comm: &C, value: &T) -> Result<Vec<T>, ConnError>
where
    C: Communicator,
    T: Pod,
{
    let p = comm.size();
    let me = comm.rank();
    let bytes = bytemuck::bytes_of(value);

    let mut pending = Vec::with_capacity(p.saturating_sub(1));
    let mut template = vec![0u8; bytes.len()];
    for peer in (0..p).filter(|&r| r != me) {
        pending.push((peer, comm.irecv(peer, tags::GATHER_FIXED.as_u16(), &mut template)));
    }
    let mut sends = Vec::with_capacity(p.saturating_sub(1));
    for peer in (0..p).filter(|&r| r != me) {
        sends.push(comm.isend(peer, tags::GATHER_FIXED.as_u16(), bytes));
    }

    let mut out = vec![*value; p];
    for (peer, handle) in pending {
        let raw = handle.wait().ok_or(ConnError::RecvFailed { peer })?;
        if raw.len() != bytes.len() {
            return Err(ConnError::BufferSizeMismatch {
                peer,
                expected: bytes.len(),
                got: raw.len(),
            });
        }
        out[peer] = typed_from_bytes::<T>(peer, &raw)?[0];
    }
    for send in sends {
        let _ = send.wait();
    }
    Ok(out)
}

/// Gather a variable-length slice from every rank (sizes first, then data).
/// Returns one vector per source rank; identical on every rank.
pub fn allgatherv<C, T>(comm: &C, items: &[T]) -> Result<Vec<Vec<T>>, ConnError>
where
    C: Communicator,
    T: Pod,
{
    let p = comm.size();
    let me = comm.rank();
    let counts = allgather(comm, &(items.len() as u64))?;
    let width = std::mem::size_of::<T>();
    let bytes: &[u8] = bytemuck::cast_slice(items);

    let mut pending = Vec::new();
    let mut template = Vec::new();
    for peer in (0..p).filter(|&r| r != me) {
        let len = counts[peer] as usize * width;
        if len == 0 {
            continue;
        }
        template.resize(len, 0);
        pending.push((
            peer,
            len,
            comm.irecv(peer, tags::GATHER_DATA.as_u16(), &mut template[..len]),
        ));
    }
    let mut sends = Vec::new();
    if !bytes.is_empty() {
        for peer in (0..p).filter(|&r| r != me) {
            sends.push(comm.isend(peer, tags::GATHER_DATA.as_u16(), bytes));
        }
    }

    let mut out: Vec<Vec<T>> = (0..p).map(|_| Vec::new()).collect();
    out[me] = items.to_vec();
    for (peer, len, handle) in pending {
        let raw = handle.wait().ok_or(ConnError::RecvFailed { peer })?;
        if raw.len() != len {
            return Err(ConnError::BufferSizeMismatch {
                peer,
                expected: len,
                got: raw.len(),
            });
        }
        out[peer] = typed_from_bytes(peer, &raw)?;
    }
    for send in sends {
        let _ = send.wait();
    }
    Ok(out)
}

/// Personalized all-to-all: `sends[r]` goes to rank `r`. Returns one vector
/// per source rank.
pub fn alltoallv<C, T>(comm: &C, mut sends: Vec<Vec<T>>) -> Result<Vec<Vec<T>>, ConnError>
where
    C: Communicator,
    T: Pod,
{
    let p = comm.size();
    let me = comm.rank();
    if sends.len() != p {
        return Err(ConnError::FanoutMismatch {
            got: sends.len(),
            ranks: p,
        });
    }
    let width = std::mem::size_of::<T>();

    // Size exchange.
    let mut count_pending = Vec::with_capacity(p.saturating_sub(1));
    let mut count_template = [0u8; std::mem::size_of::<u64>()];
    for peer in (0..p).filter(|&r| r != me) {
        count_pending.push((
            peer,
            comm.irecv(peer, tags::EXCHANGE_SIZES.as_u16(), &mut count_template),
        ));
    }
    let mut count_sends = Vec::with_capacity(p.saturating_sub(1));
    for peer in (0..p).filter(|&r| r != me) {
        let n = sends[peer].len() as u64;
        count_sends.push(comm.isend(peer, tags::EXCHANGE_SIZES.as_u16(), bytemuck::bytes_of(&n)));
    }
    let mut incoming = vec![0u64; p];
    for (peer, handle) in count_pending {
        let raw = handle.wait().ok_or(ConnError::RecvFailed { peer })?;
        if raw.len() != std::mem::size_of::<u64>() {
            return Err(ConnError::BufferSizeMismatch {
                peer,
                expected: std::mem::size_of::<u64>(),
                got: raw.len(),
            });
        }
        incoming[peer] = typed_from_bytes::<u64>(peer, &raw)?[0];
    }
    for send in count_sends {
        let _ = send.wait();
    }

    // Data exchange.
    let mut pending = Vec::new();
    let mut template = Vec::new();
    for peer in (0..p).filter(|&r| r != me) {
        let len = incoming[peer] as usize * width;
        if len == 0 {
            continue;
        }
        template.resize(len, 0);
        pending.push((
            peer,
            len,
            comm.irecv(peer, tags::EXCHANGE_DATA.as_u16(), &mut template[..len]),
        ));
    }
    let mut data_sends = Vec::new();
    for peer in (0..p).filter(|&r| r != me) {
        if sends[peer].is_empty() {
            continue;
        }
        let bytes: &[u8] = bytemuck::cast_slice(&sends[peer]);
        data_sends.push(comm.isend(peer, tags::EXCHANGE_DATA.as_u16(), bytes));
    }

    let mut out: Vec<Vec<T>> = (0..p).map(|_| Vec::new()).collect();
    out[me] = std::mem::take(&mut sends[me]);
    for (peer, len, handle) in pending {
        let raw = handle.wait().ok_or(ConnError::RecvFailed { peer })?;
        if raw.len() != len {
            return Err(ConnError::BufferSizeMismatch {
                peer,
                expected: len,
                got: raw.len(),
            });
        }
        out[peer] = typed_from_bytes(peer, &raw)?;
    }
    for send in data_sends {
        let _ = send.wait();
    }
    Ok(out)
}

/// Reduce one value per rank with an associative, commutative `op`. Every
/// rank receives the same result.
pub fn allreduce<C, T, F>(comm: &C, value: T, op: F) -> Result<T, ConnError>
where
    C: Communicator,
    T: Pod,
    F: Fn(T, T) -> T,
{
    let all = allgather(comm, &value)?;
    let mut ranks = all.into_iter();
    let first = ranks.next().expect("communicator has at least one rank");
    Ok(ranks.fold(first, op))
}

/// Exclusive prefix scan. Rank `r` receives the fold of the `Some`
/// contributions of ranks `0..r` in rank order, or `None` when no preceding
/// rank contributed.
pub fn exscan<C, T, F>(comm: &C, value: Option<T>, op: F) -> Result<Option<T>, ConnError>
where
    C: Communicator,
    T: Pod,
    F: Fn(T, T) -> T,
{
    let contribution = match &value {
        Some(v) => std::slice::from_ref(v),
        None => &[],
    };
    let gathered = allgatherv(comm, contribution)?;
    Ok(gathered[..comm.rank()]
        .iter()
        .flat_map(|v| v.iter().copied())
        .reduce(|a, b| op(a, b)))
}

/// Reverse exclusive prefix scan: the fold of the contributions of ranks
/// `r+1..size`, walked from the far end toward `r`.
pub fn exscan_rev<C, T, F>(comm: &C, value: Option<T>, op: F) -> Result<Option<T>, ConnError>
where
    C: Communicator,
    T: Pod,
    F: Fn(T, T) -> T,
{
    let contribution = match &value {
        Some(v) => std::slice::from_ref(v),
        None => &[],
    };
    let gathered = allgatherv(comm, contribution)?;
    Ok(gathered[comm.rank() + 1..]
        .iter()
        .rev()
        .flat_map(|v| v.iter().copied())
        .reduce(|a, b| op(a, b)))
}
