//! Label-guided mapping: a greedy upper bound on the tree edit distance.
//!
//! `init` builds an inverted list from label id to the postorder positions
//! carrying it in the destination tree. `ted` then scans the source tree in
//! postorder and greedily extends a valid edit mapping with equal-label
//! pairs; whatever stays unmapped is paid as deletions and insertions. The
//! produced mapping is always valid, so the cost never undercuts the exact
//! distance. Useful as a cheap filter in front of an exact algorithm.

use crate::indexing::TedIndex;
use crate::parsing::LabelId;
use crate::ted::{assert_same_dictionary, sentinel, CostModel, TedAlgorithm};
use rustc_hash::FxHashMap;

pub struct LgmTreeIndex<C: CostModel> {
    costs: C,
    subproblems: u64,
    /// Label id to ascending postorder positions in the destination tree.
    postings: FxHashMap<LabelId, Vec<i32>>,
}

impl<C: CostModel> LgmTreeIndex<C> {
    pub fn new(costs: C) -> Self {
        Self {
            costs,
            subproblems: 0,
            postings: FxHashMap::default(),
        }
    }

    /// Precomputes the label postings of the destination tree.
    pub fn init(&mut self, t2: &TedIndex) {
        self.postings.clear();
        for y in 0..t2.c.tree_size as i32 {
            self.postings
                .entry(t2.postl_to_label_id[y as usize])
                .or_default()
                .push(y);
        }
    }

    pub fn get_subproblem_count(&self) -> u64 {
        self.subproblems
    }

    /// A pair set is a valid edit mapping iff it preserves both the pre- and
    /// the postorder between the trees. Candidates arrive in ascending
    /// source postorder, so only the destination side and the preorders need
    /// checking.
    fn compatible(
        &mut self,
        t1: &TedIndex,
        t2: &TedIndex,
        accepted: &[(i32, i32)],
        x: i32,
        y: i32,
    ) -> bool {
        let pre_x = t1.postl_to_prel[x as usize];
        let pre_y = t2.postl_to_prel[y as usize];
        for &(px, py) in accepted {
            self.subproblems += 1;
            if py >= y {
                return false;
            }
            let pre_px = t1.postl_to_prel[px as usize];
            let pre_py = t2.postl_to_prel[py as usize];
            if (pre_px < pre_x) != (pre_py < pre_y) {
                return false;
            }
        }
        true
    }
}

impl<C: CostModel> TedAlgorithm for LgmTreeIndex<C> {
    fn ted(&mut self, t1: &TedIndex, t2: &TedIndex) -> f64 {
        assert_same_dictionary(t1, t2);
        self.subproblems = 0;
        self.init(t2);
        let n1 = t1.c.tree_size;
        let n2 = t2.c.tree_size;

        let mut mapped2 = vec![false; n2];
        let mut accepted: Vec<(i32, i32)> = Vec::new();
        let mut saved_del = 0.0f64;
        let mut saved_ins = 0.0f64;

        for x in 0..n1 as i32 {
            let label = t1.postl_to_label_id[x as usize];
            let Some(list) = self.postings.get(&label) else {
                continue;
            };
            let list = list.clone();
            for &y in &list {
                if mapped2[y as usize] {
                    continue;
                }
                if self.compatible(t1, t2, &accepted, x, y) {
                    mapped2[y as usize] = true;
                    accepted.push((x, y));
                    saved_del += self.costs.del(label);
                    saved_ins += self.costs.ins(label);
                    break;
                }
            }
        }

        // whole-tree delete/insert sums sit at the preorder roots
        let total = t1.prel_to_subtree_del_cost[0] + t2.prel_to_subtree_ins_cost[0];
        total - saved_del - saved_ins
    }

    fn ted_k(&mut self, t1: &TedIndex, t2: &TedIndex, k: usize) -> f64 {
        let bound = self.ted(t1, t2);
        if bound <= k as f64 {
            bound
        } else {
            sentinel(k)
        }
    }

    fn subproblem_count(&self) -> u64 {
        self.subproblems
    }
}
