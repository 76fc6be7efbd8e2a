//! Shared helpers for the integration tests: a sequential union-find oracle,
//! graph builders, and a harness running one `ThreadComm` rank per thread.
#![allow(dead_code)]

use hashbrown::HashMap;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use distconn::comm::communicator::ThreadComm;
use distconn::labeling::{ConnectedComponents, LabelingConfig};

/// Route engine logs through the test harness; honors `RUST_LOG`.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Union-find with path-halving and union-by-rank; the test oracle for
/// component membership.
pub struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    pub fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    pub fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            let grandparent = self.parent[self.parent[x]];
            self.parent[x] = grandparent;
            x = grandparent;
        }
        x
    }

    pub fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
    }
}

/// Insert both directions of every edge.
pub fn undirected(edges: &[(u64, u64)]) -> Vec<(u64, u64)> {
    let mut out = Vec::with_capacity(edges.len() * 2);
    for &(u, v) in edges {
        out.push((u, v));
        out.push((v, u));
    }
    out
}

/// Random multigraph on vertex ids `0..vertices` (self loops allowed), in
/// the one-direction form; symmetrize with [`undirected`].
pub fn random_graph(seed: u64, vertices: u64, edges: usize) -> Vec<(u64, u64)> {
    let mut rng = SmallRng::seed_from_u64(seed);
    (0..edges)
        .map(|_| (rng.gen_range(0..vertices), rng.gen_range(0..vertices)))
        .collect()
}

/// Expected label of every vertex appearing in `edges`: the minimum vertex id
/// of its connected component, from a sequential union-find.
pub fn reference_labels(edges: &[(u64, u64)]) -> HashMap<u64, u64> {
    let mut ids: Vec<u64> = edges.iter().flat_map(|&(u, v)| [u, v]).collect();
    ids.sort_unstable();
    ids.dedup();
    let index: HashMap<u64, usize> = ids.iter().enumerate().map(|(i, &v)| (v, i)).collect();

    let mut uf = UnionFind::new(ids.len());
    for &(u, v) in edges {
        uf.union(index[&u], index[&v]);
    }

    let mut min_of_root: HashMap<usize, u64> = HashMap::new();
    for (&v, &i) in &index {
        let root = uf.find(i);
        min_of_root
            .entry(root)
            .and_modify(|m| *m = (*m).min(v))
            .or_insert(v);
    }
    index
        .iter()
        .map(|(&v, &i)| (v, min_of_root[&uf.find(i)]))
        .collect()
}

pub fn reference_component_count(edges: &[(u64, u64)]) -> u64 {
    let labels = reference_labels(edges);
    let mut roots: Vec<u64> = labels.values().copied().collect();
    roots.sort_unstable();
    roots.dedup();
    roots.len() as u64
}

/// Split into contiguous per-rank chunks, every rank non-empty.
pub fn chunk_for_ranks(edges: &[(u64, u64)], ranks: usize) -> Vec<Vec<(u64, u64)>> {
    assert!(edges.len() >= ranks, "need at least one edge per rank");
    let base = edges.len() / ranks;
    let rem = edges.len() % ranks;
    let mut chunks = Vec::with_capacity(ranks);
    let mut offset = 0;
    for r in 0..ranks {
        let len = base + usize::from(r < rem);
        chunks.push(edges[offset..offset + len].to_vec());
        offset += len;
    }
    chunks
}

/// Run `f` once per rank of a fresh world, one thread per rank.
pub fn with_world<R: Send>(
    ranks: usize,
    f: impl Fn(ThreadComm) -> R + Send + Sync,
) -> Vec<R> {
    let comms = ThreadComm::world(ranks);
    std::thread::scope(|s| {
        let f = &f;
        let handles: Vec<_> = comms.into_iter().map(|c| s.spawn(move || f(c))).collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("rank thread panicked"))
            .collect()
    })
}

/// Everything a rank reports back after a full labeling run.
pub struct RankOutcome {
    pub labels: Vec<(u64, u32)>,
    pub count: u64,
    pub largest: u64,
    pub iterations: usize,
}

/// Run the engine over `ranks` threads on contiguous chunks of `edges`.
pub fn run_labeling(
    edges: &[(u64, u64)],
    ranks: usize,
    config: LabelingConfig,
) -> Vec<RankOutcome> {
    let comms = ThreadComm::world(ranks);
    let chunks = chunk_for_ranks(edges, ranks);
    std::thread::scope(|s| {
        let handles: Vec<_> = comms
            .into_iter()
            .zip(chunks)
            .map(|(comm, mut chunk)| {
                let config = config.clone();
                s.spawn(move || {
                    let mut engine = ConnectedComponents::new(&mut chunk, comm, config)
                        .expect("engine construction");
                    engine.compute().expect("compute runs to convergence");
                    RankOutcome {
                        labels: engine.local_tuples().map(|t| (t.nid, t.pc)).collect(),
                        count: engine.component_count().expect("count cached"),
                        largest: engine.largest_component_size().expect("size cached"),
                        iterations: engine.iterations(),
                    }
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("rank thread panicked"))
            .collect()
    })
}

/// Merge per-rank labels into one vertex map, asserting no vertex was labeled
/// two different ways.
pub fn gathered_labels(outcomes: &[RankOutcome]) -> HashMap<u64, u32> {
    let mut merged: HashMap<u64, u32> = HashMap::new();
    for outcome in outcomes {
        for &(v, label) in &outcome.labels {
            if let Some(&prev) = merged.get(&v) {
                assert_eq!(prev, label, "vertex {v} labeled {label} and {prev}");
            } else {
                merged.insert(v, label);
            }
        }
    }
    merged
}

/// Assert the engine outcome matches the union-find oracle on labels, count,
/// and self-consistency of the largest-component size.
pub fn assert_matches_reference(edges: &[(u64, u64)], outcomes: &[RankOutcome]) {
    let expected = reference_labels(edges);
    let got = gathered_labels(outcomes);
    assert_eq!(got.len(), expected.len(), "vertex sets differ");
    for (&v, &label) in &got {
        assert_eq!(
            u64::from(label),
            expected[&v],
            "vertex {v} got label {label}"
        );
    }

    let expected_count = reference_component_count(edges);
    for outcome in outcomes {
        assert_eq!(outcome.count, expected_count, "component count");
    }

    // The largest-component size counts tuples, including boundary self-loop
    // duplicates, so check it against the gathered tuple multiset.
    let mut bucket_sizes: HashMap<u32, u64> = HashMap::new();
    for outcome in outcomes {
        for &(_, label) in &outcome.labels {
            *bucket_sizes.entry(label).or_insert(0) += 1;
        }
    }
    let largest = bucket_sizes.values().copied().max().unwrap_or(0);
    for outcome in outcomes {
        assert_eq!(outcome.largest, largest, "largest component size");
    }
}
