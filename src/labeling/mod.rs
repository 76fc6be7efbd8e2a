//! Connected-component labeling by distributed label propagation.
//!
//! The engine owns one distributed array of [`Triple`]s and drives it to a
//! fixpoint with alternating neighborhood and partition passes, each a
//! distributed sort followed by a bucket walk whose rank-boundary buckets are
//! resolved with exclusive scans. Pointer doubling (on by default) rewrites
//! every migrating partition to its grand-parent each round, which bounds the
//! round count logarithmically in the component diameter instead of linearly.
//!
//! All engine operations are collective over the communicator passed at
//! construction. The communicator is owned by the engine and released when
//! [`ConnectedComponents::compute`] returns.

pub mod triple;

use bytemuck::{Pod, Zeroable};

use crate::comm::communicator::Communicator;
use crate::comm::{collectives, distribute, sort};
use crate::error::ConnError;

pub use self::triple::{NodeId, PartitionId, Triple, MAX_NID, MAX_PID, MAX_PID2};
use self::triple::{max_node_min_pc, max_pc_min_pn, min_node_max_pc};

/// How aggressively converged parts of the tuple array are taken out of play.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Optimization {
    /// Every tuple stays in the active range for every round.
    Naive,
    /// Stable tuples are parked locally and never re-examined.
    StablePartitionRemoved,
    /// Stable tuples are parked and both array segments are re-block-decomposed
    /// each round so the shrinking active range stays spread over all ranks.
    LoadBalanced,
}

/// Engine knobs; the default is the fastest configuration.
#[derive(Debug, Clone)]
pub struct LabelingConfig {
    pub optimization: Optimization,
    /// Rewrite migrating partitions to their grand-parent every round.
    pub doubling: bool,
    /// Safety valve: fail instead of looping if convergence has not been
    /// reached after this many rounds. `None` means no cap.
    pub iteration_cap: Option<usize>,
}

impl Default for LabelingConfig {
    fn default() -> Self {
        Self {
            optimization: Optimization::LoadBalanced,
            doubling: true,
            iteration_cap: None,
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct Edge {
    src: u64,
    dst: u64,
}

/// Distributed connected-component labeler.
///
/// Construction converts the caller's edge list into label tuples; a single
/// [`compute`](Self::compute) call then runs to convergence and caches the
/// component statistics. For undirected semantics the caller must have
/// inserted both `(u, v)` and `(v, u)`.
pub struct ConnectedComponents<C: Communicator> {
    comm: Option<C>,
    config: LabelingConfig,
    /// Tuples of partitions known stable in earlier rounds; never re-examined.
    stable: Vec<Triple>,
    active: Vec<Triple>,
    iterations: usize,
    component_count: Option<u64>,
    largest_component: Option<u64>,
}

impl<C: Communicator> ConnectedComponents<C> {
    /// Build the engine from a distributed edge list. Collective.
    ///
    /// The edge list is left globally sorted by source vertex. Fails on an
    /// empty local slice (such ranks must be excluded from the communicator
    /// beforehand) and on vertex ids that do not fit the partition-id space.
    pub fn new(
        edges: &mut Vec<(NodeId, NodeId)>,
        comm: C,
        config: LabelingConfig,
    ) -> Result<Self, ConnError> {
        if edges.is_empty() {
            return Err(ConnError::EmptyLocalEdges { rank: comm.rank() });
        }
        let local_max = edges
            .iter()
            .map(|&(u, v)| u.max(v))
            .max()
            .expect("edge list is non-empty");
        let global_max = collectives::allreduce(&comm, local_max, |a, b| a.max(b))?;
        if global_max >= MAX_PID2 as NodeId {
            return Err(ConnError::VertexIdRange {
                max_seen: global_max,
                limit: MAX_PID2 as NodeId,
            });
        }

        let mut sorted: Vec<Edge> = edges.iter().map(|&(src, dst)| Edge { src, dst }).collect();
        sort::sort_by_key(&comm, &mut sorted, |e| (e.src, e.dst))?;
        for (slot, e) in edges.iter_mut().zip(&sorted) {
            *slot = (e.src, e.dst);
        }

        // One self-loop tuple per local source run, then one tuple per edge.
        // A run split across ranks yields a duplicate self-loop, which later
        // rounds absorb.
        let mut active = Vec::with_capacity(sorted.len() + 1);
        let mut i = 0;
        while i < sorted.len() {
            let src = sorted[i].src;
            active.push(Triple {
                pc: src as PartitionId,
                pn: MAX_PID,
                nid: src,
            });
            while i < sorted.len() && sorted[i].src == src {
                active.push(Triple {
                    pc: src as PartitionId,
                    pn: MAX_PID,
                    nid: sorted[i].dst,
                });
                i += 1;
            }
        }

        let total = collectives::allreduce(&comm, active.len() as u64, |a, b| a + b)?;
        if comm.rank() == 0 {
            log::info!("ingested {total} label tuples");
        }
        distribute::distribute_evenly(&comm, &mut active)?;

        Ok(Self {
            comm: Some(comm),
            config,
            stable: Vec::new(),
            active,
            iterations: 0,
            component_count: None,
            largest_component: None,
        })
    }

    /// Run label propagation to convergence, then compute and cache the
    /// component statistics. Collective. The communicator is released when
    /// this returns, so `compute` can only be called once.
    pub fn compute(&mut self) -> Result<(), ConnError> {
        let comm = self.comm.take().ok_or(ConnError::CommunicatorReleased)?;
        self.run(&comm)
    }

    /// Global number of connected components. Cached by [`compute`](Self::compute).
    pub fn component_count(&self) -> Result<u64, ConnError> {
        self.component_count.ok_or(ConnError::NotComputed)
    }

    /// Tuple count of the most populous component: its vertex occurrences,
    /// i.e. vertices plus twice the edges (plus any boundary self-loop
    /// duplicates from ingest). Cached by [`compute`](Self::compute).
    pub fn largest_component_size(&self) -> Result<u64, ConnError> {
        self.largest_component.ok_or(ConnError::NotComputed)
    }

    /// Number of label-propagation rounds executed.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Rank-local tuples. After [`compute`](Self::compute) every tuple of a
    /// vertex carries the component label in `pc`.
    pub fn local_tuples(&self) -> impl Iterator<Item = &Triple> + '_ {
        self.stable.iter().chain(self.active.iter())
    }

    fn run(&mut self, comm: &C) -> Result<(), ConnError> {
        loop {
            let mut requests = Vec::new();
            self.update_pn(comm)?;
            let converged = self.update_pc(comm, &mut requests)?;
            if self.config.doubling {
                self.double_pointers(comm, requests)?;
            }
            self.iterations += 1;
            if comm.rank() == 0 {
                log::debug!(
                    "round {}: {} active tuples on rank 0",
                    self.iterations,
                    self.active.len()
                );
            }
            if converged {
                break;
            }
            if let Some(cap) = self.config.iteration_cap {
                if self.iterations >= cap {
                    return Err(ConnError::IterationCap {
                        iterations: self.iterations,
                    });
                }
            }
            if self.config.optimization != Optimization::Naive {
                let split = partition_in_place(&mut self.active, |t| t.is_stable());
                self.stable.extend(self.active.drain(..split));
                if self.config.optimization == Optimization::LoadBalanced {
                    distribute::distribute_evenly(comm, &mut self.stable)?;
                    distribute::distribute_evenly(comm, &mut self.active)?;
                }
            }
        }
        if comm.rank() == 0 {
            log::info!("label propagation converged after {} rounds", self.iterations);
        }
        self.finalize(comm)
    }

    /// Neighborhood pass: for every vertex, propose the cheapest partition
    /// currently claiming it, or mark the vertex locally settled when all its
    /// claims agree.
    fn update_pn(&mut self, comm: &C) -> Result<(), ConnError> {
        sort::sort_by_key(comm, &mut self.active, Triple::node_key)?;

        // Two-sided boundary resolution: the left carry folds the minimum
        // claim of a bucket straddling our left edge, the right carry the
        // maximum claim across our right edge.
        let last = self.active.iter().copied().reduce(max_node_min_pc);
        let prev = collectives::exscan(comm, last, max_node_min_pc)?;
        let first = self.active.iter().copied().reduce(min_node_max_pc);
        let next = collectives::exscan_rev(comm, first, min_node_max_pc)?;

        let n = self.active.len();
        let mut i = 0;
        while i < n {
            let nid = self.active[i].nid;
            let mut j = i + 1;
            while j < n && self.active[j].nid == nid {
                j += 1;
            }
            let bucket = &self.active[i..j];
            let mut lo = bucket.iter().map(|t| t.pc).min().expect("bucket is non-empty");
            let mut hi = bucket.iter().map(|t| t.pc).max().expect("bucket is non-empty");
            if i == 0 {
                if let Some(carry) = prev {
                    if carry.nid == nid {
                        lo = lo.min(carry.pc);
                    }
                }
            }
            if j == n {
                if let Some(carry) = next {
                    if carry.nid == nid {
                        hi = hi.max(carry.pc);
                    }
                }
            }
            let pn = if lo < hi { lo } else { MAX_PID2 };
            for t in &mut self.active[i..j] {
                t.pn = pn;
            }
            i = j;
        }
        Ok(())
    }

    /// Partition pass: migrate every partition to the cheapest proposal among
    /// its tuples, or mark the whole partition stable when every proposal is
    /// the settled sentinel. Returns the global convergence flag.
    fn update_pc(&mut self, comm: &C, requests: &mut Vec<Triple>) -> Result<bool, ConnError> {
        sort::sort_by_key(comm, &mut self.active, Triple::partition_key)?;

        let last = self.active.iter().copied().reduce(max_pc_min_pn);
        let prev = collectives::exscan(comm, last, max_pc_min_pn)?;

        let mut migrated = false;
        let n = self.active.len();
        let mut i = 0;
        while i < n {
            let pc = self.active[i].pc;
            let mut j = i + 1;
            while j < n && self.active[j].pc == pc {
                j += 1;
            }
            let mut lo = self.active[i..j]
                .iter()
                .map(|t| t.pn)
                .min()
                .expect("bucket is non-empty");
            if i == 0 {
                if let Some(carry) = prev {
                    if carry.pc == pc {
                        lo = lo.min(carry.pn);
                    }
                }
            }
            if lo < MAX_PID2 {
                migrated = true;
                for t in &mut self.active[i..j] {
                    t.pc = lo;
                }
                if self.config.doubling {
                    // One lookup of the new parent's own owner per local bucket.
                    requests.push(Triple {
                        pc: MAX_PID,
                        pn: MAX_PID,
                        nid: lo as NodeId,
                    });
                }
            } else {
                for t in &mut self.active[i..j] {
                    t.pn = MAX_PID;
                }
            }
            i = j;
        }

        let all = collectives::allreduce(comm, u8::from(!migrated), |a, b| a.min(b))?;
        Ok(all == 1)
    }

    /// Pointer doubling: resolve each migrating partition's grand-parent via
    /// the appended parent requests, promote the partition to it, then erase
    /// the requests.
    fn double_pointers(&mut self, comm: &C, requests: Vec<Triple>) -> Result<(), ConnError> {
        self.active.extend(requests);

        // Neighborhood protocol over the enlarged range, writing only into
        // requests: each learns the minimum partition currently owning its
        // target vertex, then flips into the shape of an ordinary tuple of
        // the migrated partition.
        sort::sort_by_key(comm, &mut self.active, Triple::node_key)?;
        let last = self.active.iter().copied().reduce(max_node_min_pc);
        let prev = collectives::exscan(comm, last, max_node_min_pc)?;
        let n = self.active.len();
        let mut i = 0;
        while i < n {
            let nid = self.active[i].nid;
            let mut j = i + 1;
            while j < n && self.active[j].nid == nid {
                j += 1;
            }
            let mut lo = self.active[i..j]
                .iter()
                .map(|t| t.pc)
                .min()
                .expect("bucket is non-empty");
            if i == 0 {
                if let Some(carry) = prev {
                    if carry.nid == nid {
                        lo = lo.min(carry.pc);
                    }
                }
            }
            for t in &mut self.active[i..j] {
                if t.pc == MAX_PID {
                    t.pn = lo;
                    t.pc = t.nid as PartitionId;
                    t.nid = MAX_NID;
                }
            }
            i = j;
        }

        // Partition protocol: in every non-stable bucket the flipped request
        // carries the grand-parent as a proposal, so the min-reduction
        // promotes the whole bucket to it.
        sort::sort_by_key(comm, &mut self.active, Triple::partition_key)?;
        let last = self.active.iter().copied().reduce(max_pc_min_pn);
        let prev = collectives::exscan(comm, last, max_pc_min_pn)?;
        let mut i = 0;
        while i < n {
            let pc = self.active[i].pc;
            let mut j = i + 1;
            while j < n && self.active[j].pc == pc {
                j += 1;
            }
            let mut lo = self.active[i..j]
                .iter()
                .map(|t| t.pn)
                .min()
                .expect("bucket is non-empty");
            if i == 0 {
                if let Some(carry) = prev {
                    if carry.pc == pc {
                        lo = lo.min(carry.pn);
                    }
                }
            }
            if self.active[i].pn != MAX_PID {
                for t in &mut self.active[i..j] {
                    t.pc = lo;
                }
            }
            i = j;
        }

        let keep = partition_in_place(&mut self.active, |t| t.nid != MAX_NID);
        self.active.truncate(keep);
        Ok(())
    }

    /// Final global sort by label plus the collective unique-count and
    /// longest-run queries backing the cached statistics.
    fn finalize(&mut self, comm: &C) -> Result<(), ConnError> {
        let mut tuples = std::mem::take(&mut self.stable);
        tuples.append(&mut self.active);
        if !sort::is_sorted_by_key(comm, &tuples, |t: &Triple| t.pc)? {
            sort::sort_by_key(comm, &mut tuples, |t: &Triple| t.pc)?;
        }
        self.component_count = Some(sort::unique_count_by_key(comm, &tuples, |t: &Triple| t.pc)?);
        self.largest_component = Some(sort::max_run_by_key(comm, &tuples, |t: &Triple| t.pc)?);
        self.active = tuples;
        Ok(())
    }
}

/// Unstable in-place partition; returns the number of elements satisfying
/// `pred`, moved to the front.
fn partition_in_place<T, P: Fn(&T) -> bool>(xs: &mut [T], pred: P) -> usize {
    let mut i = 0;
    let mut j = xs.len();
    while i < j {
        if pred(&xs[i]) {
            i += 1;
        } else {
            j -= 1;
            xs.swap(i, j);
        }
    }
    i
}
