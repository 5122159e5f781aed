//! The classical tree edit distance algorithm by Zhang and Shasha.
//!
//! Runs the forest-distance DP once per pair of key-roots; tree distances
//! for all node pairs on the key-roots' left spines fall out as a byproduct.

use crate::indexing::TedIndex;
use crate::ted::{assert_same_dictionary, CostModel, TedAlgorithm};

pub struct ZhangShasha<C: CostModel> {
    costs: C,
    subproblems: u64,
}

impl<C: CostModel> ZhangShasha<C> {
    pub fn new(costs: C) -> Self {
        Self {
            costs,
            subproblems: 0,
        }
    }

    /// Fills the forest-distance table for key-root pair `(i, j)` (postorder
    /// ids) and records tree distances for every pair on both left spines.
    fn forest_dist(
        &mut self,
        t1: &TedIndex,
        t2: &TedIndex,
        i: i32,
        j: i32,
        treedist: &mut [f64],
        fd: &mut [f64],
    ) {
        let n2 = t2.c.tree_size;
        let cols = n2 + 1;
        let at = |x: usize, y: usize| x * cols + y;
        let li = t1.postl_to_lld[i as usize];
        let lj = t2.postl_to_lld[j as usize];
        let rows_span = (i - li + 1) as usize;
        let cols_span = (j - lj + 1) as usize;

        fd[at(0, 0)] = 0.0;
        for x in 1..=rows_span {
            let di = li as usize + x - 1;
            fd[at(x, 0)] = fd[at(x - 1, 0)] + self.costs.del(t1.postl_to_label_id[di]);
        }
        for y in 1..=cols_span {
            let dj = lj as usize + y - 1;
            fd[at(0, y)] = fd[at(0, y - 1)] + self.costs.ins(t2.postl_to_label_id[dj]);
        }

        for x in 1..=rows_span {
            let di = li as usize + x - 1;
            let del_cost = self.costs.del(t1.postl_to_label_id[di]);
            for y in 1..=cols_span {
                let dj = lj as usize + y - 1;
                self.subproblems += 1;
                let del = fd[at(x - 1, y)] + del_cost;
                let ins = fd[at(x, y - 1)] + self.costs.ins(t2.postl_to_label_id[dj]);
                if t1.postl_to_lld[di] == li && t2.postl_to_lld[dj] == lj {
                    let ren = fd[at(x - 1, y - 1)]
                        + self
                            .costs
                            .ren(t1.postl_to_label_id[di], t2.postl_to_label_id[dj]);
                    let dist = del.min(ins).min(ren);
                    fd[at(x, y)] = dist;
                    treedist[di * n2 + dj] = dist;
                } else {
                    let x0 = (t1.postl_to_lld[di] - li) as usize;
                    let y0 = (t2.postl_to_lld[dj] - lj) as usize;
                    let sub = fd[at(x0, y0)] + treedist[di * n2 + dj];
                    fd[at(x, y)] = del.min(ins).min(sub);
                }
            }
        }
    }
}

impl<C: CostModel> TedAlgorithm for ZhangShasha<C> {
    fn ted(&mut self, t1: &TedIndex, t2: &TedIndex) -> f64 {
        assert_same_dictionary(t1, t2);
        self.subproblems = 0;
        let n1 = t1.c.tree_size;
        let n2 = t2.c.tree_size;

        let mut treedist = vec![0.0f64; n1 * n2];
        let mut forestdist = vec![0.0f64; (n1 + 1) * (n2 + 1)];

        // key-roots ascend, so inner spine pairs are ready when needed
        for &i in &t1.kr {
            for &j in &t2.kr {
                self.forest_dist(t1, t2, i, j, &mut treedist, &mut forestdist);
            }
        }

        treedist[(n1 - 1) * n2 + (n2 - 1)]
    }

    fn subproblem_count(&self) -> u64 {
        self.subproblems
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexing::{Indexer, TedIndex};
    use crate::parsing::{parse_single, LabelDictionary};
    use crate::ted::UnitCostModel;

    fn ted_of(t1: &str, t2: &str) -> f64 {
        let mut ld = LabelDictionary::new();
        let p1 = parse_single(t1, &mut ld).unwrap();
        let p2 = parse_single(t2, &mut ld).unwrap();
        let i1 = TedIndex::index_tree(&p1, &ld);
        let i2 = TedIndex::index_tree(&p2, &ld);
        ZhangShasha::new(UnitCostModel).ted(&i1, &i2)
    }

    #[test]
    fn test_single_nodes() {
        assert_eq!(ted_of("{a}", "{a}"), 0.0);
        assert_eq!(ted_of("{a}", "{b}"), 1.0);
    }

    #[test]
    fn test_canonical_example() {
        // delete c and re-insert it one level up
        assert_eq!(ted_of("{f{d{a}{c{b}}}{e}}", "{f{c{d{a}{b}}}{e}}"), 2.0);
    }

    #[test]
    fn test_sibling_swap_costs_two_relabels() {
        assert_eq!(ted_of("{a{b}{c}}", "{a{c}{b}}"), 2.0);
    }

    #[test]
    fn test_disjoint_labels_cost_everything() {
        // no common label and no structural savings beyond the root mapping
        assert_eq!(ted_of("{a{b}}", "{c{d}}"), 2.0);
        assert_eq!(ted_of("{a}", "{c{d}{e}}"), 3.0);
    }

    #[test]
    fn test_growing_a_chain() {
        assert_eq!(ted_of("{a}", "{a{b{c}}}"), 2.0);
        assert_eq!(ted_of("{a{b{c}}}", "{a}"), 2.0);
    }
}
