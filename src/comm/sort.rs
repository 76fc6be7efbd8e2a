//! Distributed sample sort and queries over globally sorted arrays.
//!
//! [`sort_by_key`] leaves the distributed array globally ordered by the key
//! while preserving each rank's element count, so callers can keep reasoning
//! about their local range sizes across sorts. Relative order between equal
//! keys is unspecified.

use bytemuck::{Pod, Zeroable};

use super::collectives;
use super::communicator::Communicator;
use super::distribute;
use crate::error::ConnError;

fn local_sort<T, K, F>(data: &mut [T], key: &F)
where
    T: Pod + Send + Sync,
    K: Ord + Copy + Send,
    F: Fn(&T) -> K + Sync,
{
    #[cfg(feature = "rayon")]
    {
        use rayon::slice::ParallelSliceMut;
        data.par_sort_unstable_by_key(key);
    }
    #[cfg(not(feature = "rayon"))]
    data.sort_unstable_by_key(key);
}

/// Globally sort the distributed array by `key`. Collective. Per-rank element
/// counts are preserved; ties across ranks land in unspecified relative order.
pub fn sort_by_key<C, T, K, F>(comm: &C, data: &mut Vec<T>, key: F) -> Result<(), ConnError>
where
    C: Communicator,
    T: Pod + Send + Sync,
    K: Ord + Copy + Send,
    F: Fn(&T) -> K + Sync,
{
    local_sort(data, &key);
    let p = comm.size();
    if p <= 1 {
        return Ok(());
    }

    let counts = collectives::allgather(comm, &(data.len() as u64))?;
    let original: Vec<usize> = counts.iter().map(|&c| c as usize).collect();

    // Regular sampling: p-1 evenly spaced local candidates from each rank.
    let n = data.len();
    let mut candidates = Vec::with_capacity(p.saturating_sub(1));
    for i in 1..p {
        let idx = i * n / p;
        if idx < n {
            candidates.push(data[idx]);
        }
    }
    let mut samples: Vec<T> = collectives::allgatherv(comm, &candidates)?
        .into_iter()
        .flatten()
        .collect();
    samples.sort_unstable_by_key(|s| key(s));

    let mut splitters = Vec::with_capacity(p - 1);
    if !samples.is_empty() {
        for i in 1..p {
            let idx = (i * samples.len() / p).min(samples.len() - 1);
            splitters.push(samples[idx]);
        }
    }

    // Route each element to the bucket of the first splitter at or above it.
    // Local data is sorted, so the buckets are contiguous slices.
    let mut sends: Vec<Vec<T>> = (0..p).map(|_| Vec::new()).collect();
    for &item in data.iter() {
        let k = key(&item);
        let dest = splitters.partition_point(|s| key(s) < k);
        sends[dest].push(item);
    }

    let mut merged: Vec<T> = collectives::alltoallv(comm, sends)?
        .into_iter()
        .flatten()
        .collect();
    local_sort(&mut merged, &key);
    *data = merged;

    distribute::redistribute_to_counts(comm, data, &original)
}

/// Check whether the distributed array is globally sorted by `key`.
/// Collective; every rank receives the same answer.
pub fn is_sorted_by_key<C, T, K, F>(comm: &C, data: &[T], key: F) -> Result<bool, ConnError>
where
    C: Communicator,
    T: Pod,
    K: Ord + Copy,
    F: Fn(&T) -> K,
{
    let local_ok = data.windows(2).all(|w| key(&w[0]) <= key(&w[1]));
    let all_ok = collectives::allreduce(comm, u8::from(local_ok), |a, b| a.min(b))? == 1;

    let ends = boundary_elements(data);
    let gathered = collectives::allgatherv(comm, &ends)?;
    let mut prev_last: Option<K> = None;
    let mut boundaries_ok = true;
    for pair in &gathered {
        if pair.is_empty() {
            continue;
        }
        let first = key(&pair[0]);
        if let Some(last) = prev_last {
            if last > first {
                boundaries_ok = false;
            }
        }
        prev_last = Some(key(&pair[1]));
    }
    Ok(all_ok && boundaries_ok)
}

/// Count distinct keys of a globally sorted distributed array. Collective;
/// every rank receives the same count.
pub fn unique_count_by_key<C, T, K, F>(comm: &C, data: &[T], key: F) -> Result<u64, ConnError>
where
    C: Communicator,
    T: Pod,
    K: Ord + Copy,
    F: Fn(&T) -> K,
{
    let mut local_runs = 0u64;
    let mut prev: Option<K> = None;
    for item in data {
        let k = key(item);
        if prev != Some(k) {
            local_runs += 1;
            prev = Some(k);
        }
    }
    let runs = collectives::allgather(comm, &local_runs)?;
    let mut total: u64 = runs.iter().sum();

    // A key run straddling a rank boundary was counted once per side.
    let gathered = collectives::allgatherv(comm, &boundary_elements(data))?;
    let mut prev_last: Option<K> = None;
    for pair in &gathered {
        if pair.is_empty() {
            continue;
        }
        if prev_last == Some(key(&pair[0])) {
            total -= 1;
        }
        prev_last = Some(key(&pair[1]));
    }
    Ok(total)
}

/// Per-rank run-length summary exchanged by [`max_run_by_key`].
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct RunLens {
    first: u64,
    last: u64,
    max: u64,
}

/// Length of the longest run of equal keys in a globally sorted distributed
/// array. Collective; every rank receives the same length.
pub fn max_run_by_key<C, T, K, F>(comm: &C, data: &[T], key: F) -> Result<u64, ConnError>
where
    C: Communicator,
    T: Pod,
    K: Ord + Copy,
    F: Fn(&T) -> K,
{
    let mut lens = RunLens::zeroed();
    if !data.is_empty() {
        let mut run = 1u64;
        let mut first_done = false;
        for w in data.windows(2) {
            if key(&w[0]) == key(&w[1]) {
                run += 1;
            } else {
                if !first_done {
                    lens.first = run;
                    first_done = true;
                }
                lens.max = lens.max.max(run);
                run = 1;
            }
        }
        if !first_done {
            lens.first = run;
        }
        lens.last = run;
        lens.max = lens.max.max(run);
    }

    let all_lens = collectives::allgather(comm, &lens)?;
    let gathered = collectives::allgatherv(comm, &boundary_elements(data))?;

    // Fold rank summaries in order, splicing runs that straddle boundaries.
    let mut best = 0u64;
    let mut tail: Option<(K, u64)> = None;
    for (pair, lens) in gathered.iter().zip(&all_lens) {
        if pair.is_empty() {
            continue;
        }
        let first_k = key(&pair[0]);
        let last_k = key(&pair[1]);
        let spliced = match tail {
            Some((k, len)) if k == first_k => len + lens.first,
            Some((_, len)) => {
                best = best.max(len);
                lens.first
            }
            None => lens.first,
        };
        if first_k == last_k {
            // The whole rank is one run; keep accumulating.
            tail = Some((first_k, spliced));
        } else {
            best = best.max(spliced).max(lens.max);
            tail = Some((last_k, lens.last));
        }
    }
    if let Some((_, len)) = tail {
        best = best.max(len);
    }
    Ok(best)
}

fn boundary_elements<T: Pod>(data: &[T]) -> Vec<T> {
    match (data.first(), data.last()) {
        (Some(first), Some(last)) => vec![*first, *last],
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::communicator::NoComm;

    #[test]
    fn single_rank_sort_orders_locally() {
        let comm = NoComm;
        let mut data = vec![5u64, 1, 4, 1, 9];
        sort_by_key(&comm, &mut data, |&x| x).unwrap();
        assert_eq!(data, vec![1, 1, 4, 5, 9]);
        assert!(is_sorted_by_key(&comm, &data, |&x| x).unwrap());
    }

    #[test]
    fn single_rank_unique_count() {
        let comm = NoComm;
        let data = vec![1u32, 1, 2, 2, 2, 7];
        assert_eq!(unique_count_by_key(&comm, &data, |&x| x).unwrap(), 3);
        assert_eq!(unique_count_by_key(&comm, &[] as &[u32], |&x| x).unwrap(), 0);
    }

    #[test]
    fn single_rank_max_run() {
        let comm = NoComm;
        let data = vec![1u32, 1, 2, 2, 2, 7];
        assert_eq!(max_run_by_key(&comm, &data, |&x| x).unwrap(), 3);
        assert_eq!(max_run_by_key(&comm, &[] as &[u32], |&x| x).unwrap(), 0);
        assert_eq!(max_run_by_key(&comm, &[4u32], |&x| x).unwrap(), 1);
    }

    #[test]
    fn unsorted_array_is_detected() {
        let comm = NoComm;
        let data = vec![3u64, 1];
        assert!(!is_sorted_by_key(&comm, &data, |&x| x).unwrap());
    }
}
