//! The 16-byte label tuple and its sentinel encoding.
//!
//! Every vertex occurrence in the edge list is represented by one tuple
//! `(pc, pn, nid)`: the partition currently claiming the occurrence, the
//! partition proposed for the next round, and the vertex id itself. Stability
//! and request status are encoded in-band by reserving the top values of each
//! field, so the record stays a fixed-width `Pod` that the bulk primitives
//! can move without per-element metadata.

use std::cmp::Ordering;
use std::mem::{align_of, size_of};

use bytemuck::{Pod, Zeroable};

/// Vertex ids as they appear in the caller's edge list.
pub type NodeId = u64;
/// Partition ids: vertex ids promoted into a 32-bit counter space.
pub type PartitionId = u32;

/// Initial `pn` value, the `pc` of a parent request, and the `pn` of a stable
/// tuple.
pub const MAX_PID: PartitionId = PartitionId::MAX;
/// `pn` of a tuple whose vertex saw no disagreement this round; larger than
/// any real partition id so min-reductions prefer real proposals.
pub const MAX_PID2: PartitionId = PartitionId::MAX - 1;
/// `nid` of a flipped parent request scheduled for deletion.
pub const MAX_NID: NodeId = NodeId::MAX;

/// One vertex occurrence: current partition, proposed partition, vertex id.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct Triple {
    pub pc: PartitionId,
    pub pn: PartitionId,
    pub nid: NodeId,
}

impl Triple {
    /// Sort key of the neighborhood pass: vertex buckets, cheapest claim first.
    #[inline]
    pub fn node_key(&self) -> (NodeId, PartitionId) {
        (self.nid, self.pc)
    }

    /// Sort key of the partition pass: partition buckets, best proposal first.
    #[inline]
    pub fn partition_key(&self) -> (PartitionId, PartitionId) {
        (self.pc, self.pn)
    }

    /// A stable tuple's `pc` is its final component label.
    #[inline]
    pub fn is_stable(&self) -> bool {
        self.pn == MAX_PID
    }

    /// Parent requests exist only inside the pointer-doubling step.
    #[inline]
    pub fn is_request(&self) -> bool {
        self.pc == MAX_PID
    }
}

/// Boundary-carry reducer: the tuple of the later vertex bucket wins; inside
/// a bucket the smaller `pc` wins. Folding rank summaries with this yields
/// the minimum claim of a bucket that straddles the left rank edge.
#[inline]
pub fn max_node_min_pc(a: Triple, b: Triple) -> Triple {
    match a.nid.cmp(&b.nid) {
        Ordering::Greater => a,
        Ordering::Less => b,
        Ordering::Equal => {
            if a.pc <= b.pc {
                a
            } else {
                b
            }
        }
    }
}

/// Mirror of [`max_node_min_pc`] for the right rank edge: earlier vertex
/// bucket wins, larger `pc` wins inside a bucket.
#[inline]
pub fn min_node_max_pc(a: Triple, b: Triple) -> Triple {
    match a.nid.cmp(&b.nid) {
        Ordering::Less => a,
        Ordering::Greater => b,
        Ordering::Equal => {
            if a.pc >= b.pc {
                a
            } else {
                b
            }
        }
    }
}

/// Carry reducer of the partition pass: later partition bucket wins, smaller
/// proposal wins inside a bucket.
#[inline]
pub fn max_pc_min_pn(a: Triple, b: Triple) -> Triple {
    match a.pc.cmp(&b.pc) {
        Ordering::Greater => a,
        Ordering::Less => b,
        Ordering::Equal => {
            if a.pn <= b.pn {
                a
            } else {
                b
            }
        }
    }
}

const _: () = {
    assert!(size_of::<Triple>() == 16);
    assert!(align_of::<Triple>() == 8);
};

#[cfg(test)]
mod tests {
    use super::*;

    fn t(pc: PartitionId, pn: PartitionId, nid: NodeId) -> Triple {
        Triple { pc, pn, nid }
    }

    #[test]
    fn sentinels_classify_tuples() {
        assert!(t(4, MAX_PID, 9).is_stable());
        assert!(!t(4, MAX_PID2, 9).is_stable());
        assert!(t(MAX_PID, MAX_PID, 9).is_request());
        assert!(!t(4, MAX_PID, 9).is_request());
    }

    #[test]
    fn node_reducers_pick_the_boundary_bucket() {
        let early = t(3, 0, 5);
        let late = t(9, 0, 8);
        assert_eq!(max_node_min_pc(early, late), late);
        assert_eq!(min_node_max_pc(early, late), early);

        // Same bucket: min wins one way, max the other.
        let cheap = t(2, 0, 8);
        let dear = t(9, 0, 8);
        assert_eq!(max_node_min_pc(cheap, dear), cheap);
        assert_eq!(min_node_max_pc(cheap, dear), dear);
    }

    #[test]
    fn partition_reducer_prefers_best_proposal() {
        let a = t(7, 3, 0);
        let b = t(7, 1, 1);
        assert_eq!(max_pc_min_pn(a, b), b);
        let later = t(8, 9, 2);
        assert_eq!(max_pc_min_pn(a, later), later);
    }

    #[test]
    fn reducers_are_commutative() {
        let a = t(3, 4, 10);
        let b = t(5, 1, 10);
        assert_eq!(max_node_min_pc(a, b), max_node_min_pc(b, a));
        assert_eq!(min_node_max_pc(a, b), min_node_max_pc(b, a));
        assert_eq!(max_pc_min_pn(a, b), max_pc_min_pn(b, a));
    }
}
