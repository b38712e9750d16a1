//! Bounded pseudocompound buffer.
//!
//! A fixed-capacity max-heap keyed on Gibbs energy: the root is the worst
//! retained candidate, and a full buffer accepts a new candidate only by
//! evicting that root. Eviction order is therefore deterministic and the
//! buffer never grows.

/// One discretized (or refined) candidate composition of a solid solution.
#[derive(Debug, Clone)]
pub struct Pseudocompound {
    /// Gibbs energy of the mixture, after hyperplane subtraction when the
    /// generator ran against a Gamma vector [kJ/mol]
    pub gibbs: f64,
    /// Compositional coordinates
    pub x: Vec<f64>,
    /// Endmember proportions derived from `x`
    pub p: Vec<f64>,
    /// Endmember chemical potentials
    pub mu: Vec<f64>,
    /// Oxide composition of the mixture
    pub comp: Vec<f64>,
    /// Normalization scale
    pub factor: f64,
    /// False when a refinement exhausted its evaluation budget; such a
    /// candidate stays usable but is not a definitive equilibrium solution
    pub converged: bool,
}

/// Outcome of a capacity-bounded insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Stored in a free slot
    Kept,
    /// Stored by evicting the worst retained candidate
    Evicted,
    /// Worse than everything retained; dropped
    Rejected,
}

#[derive(Debug, Clone)]
pub struct PseudocompoundBuffer {
    capacity: usize,
    heap: Vec<Pseudocompound>,
}

impl PseudocompoundBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            heap: Vec::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Drop contents, keep the allocation.
    pub fn clear(&mut self) {
        self.heap.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Pseudocompound> {
        self.heap.iter()
    }

    /// Lowest-energy retained candidate.
    pub fn best(&self) -> Option<&Pseudocompound> {
        self.heap
            .iter()
            .min_by(|a, b| a.gibbs.total_cmp(&b.gibbs))
    }

    /// Highest-energy retained candidate (the next eviction victim).
    pub fn worst(&self) -> Option<&Pseudocompound> {
        self.heap.first()
    }

    /// Capacity-bounded insert: keep the N lowest-energy candidates.
    pub fn insert(&mut self, pc: Pseudocompound) -> InsertOutcome {
        if self.capacity == 0 {
            return InsertOutcome::Rejected;
        }
        if self.heap.len() < self.capacity {
            self.heap.push(pc);
            self.sift_up(self.heap.len() - 1);
            return InsertOutcome::Kept;
        }
        if pc.gibbs >= self.heap[0].gibbs {
            return InsertOutcome::Rejected;
        }
        self.heap[0] = pc;
        self.sift_down(0);
        InsertOutcome::Evicted
    }

    fn sift_up(&mut self, mut i: usize) {
        while i > 0 {
            let parent = (i - 1) / 2;
            if self.heap[i].gibbs > self.heap[parent].gibbs {
                self.heap.swap(i, parent);
                i = parent;
            } else {
                break;
            }
        }
    }

    fn sift_down(&mut self, mut i: usize) {
        let n = self.heap.len();
        loop {
            let (l, r) = (2 * i + 1, 2 * i + 2);
            let mut largest = i;
            if l < n && self.heap[l].gibbs > self.heap[largest].gibbs {
                largest = l;
            }
            if r < n && self.heap[r].gibbs > self.heap[largest].gibbs {
                largest = r;
            }
            if largest == i {
                break;
            }
            self.heap.swap(i, largest);
            i = largest;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pc(gibbs: f64) -> Pseudocompound {
        Pseudocompound {
            gibbs,
            x: vec![],
            p: vec![],
            mu: vec![],
            comp: vec![],
            factor: 1.0,
            converged: true,
        }
    }

    #[test]
    fn keeps_the_n_best_candidates() {
        let mut buf = PseudocompoundBuffer::new(3);
        assert_eq!(buf.insert(pc(-1.0)), InsertOutcome::Kept);
        assert_eq!(buf.insert(pc(-5.0)), InsertOutcome::Kept);
        assert_eq!(buf.insert(pc(-3.0)), InsertOutcome::Kept);
        // worse than the current worst (-1.0): dropped
        assert_eq!(buf.insert(pc(0.0)), InsertOutcome::Rejected);
        // better: evicts -1.0
        assert_eq!(buf.insert(pc(-4.0)), InsertOutcome::Evicted);

        let mut kept: Vec<f64> = buf.iter().map(|p| p.gibbs).collect();
        kept.sort_by(|a, b| a.total_cmp(b));
        assert_eq!(kept, vec![-5.0, -4.0, -3.0]);
        assert_eq!(buf.best().unwrap().gibbs, -5.0);
        assert_eq!(buf.worst().unwrap().gibbs, -3.0);
    }

    #[test]
    fn eviction_order_is_deterministic() {
        // Same inputs in the same order always evict the same victim.
        for _ in 0..10 {
            let mut buf = PseudocompoundBuffer::new(2);
            buf.insert(pc(2.0));
            buf.insert(pc(1.0));
            assert_eq!(buf.insert(pc(1.5)), InsertOutcome::Evicted);
            assert_eq!(buf.worst().unwrap().gibbs, 1.5);
        }
    }

    #[test]
    fn zero_capacity_rejects_everything() {
        let mut buf = PseudocompoundBuffer::new(0);
        assert_eq!(buf.insert(pc(-10.0)), InsertOutcome::Rejected);
        assert!(buf.is_empty());
    }
}
