//! Bounded tree edit distance: the Touzet algorithm family.
//!
//! All variants answer `ted_k(t1, t2, k)`: the exact distance when it does
//! not exceed `k`, otherwise the sentinel `k + 1`. The unbounded `ted` runs
//! with `k = 2 * max(|T1|, |T2|)`, which dominates any unit-cost distance.
//!
//! The baseline scans all node pairs inside a positional band and runs a
//! banded forest DP per relevant subtree pair. The depth-pruning variants
//! tighten the relevance bound and budget with the depth-difference lower
//! bound. The kr variants run the band DP once per key-root pair instead,
//! which wins when many nodes share their leftmost leaf.

use crate::indexing::TedIndex;
use crate::ted::{assert_same_dictionary, sentinel, CostModel, TedAlgorithm};

/// Lower-bound terms shared by relevance test and budget: edits forced
/// outside a candidate subtree pair `(x, y)` (postorder ids).
#[derive(Clone, Copy, PartialEq, Eq)]
enum PairPruning {
    /// Left-region and right-region node-count differences.
    Size,
    /// Additionally the depth difference. Deleted ancestors are
    /// right-region nodes, so the depth term is combined with the
    /// right-region term by `max`, never added to it.
    SizeAndDepth,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum MatchPruning {
    Off,
    /// Nodes deeper than `height(opposite subtree) + e` can never be mapped
    /// within budget `e`; only their match option is dropped. They still
    /// flow through the band DP as deletions/insertions, so truncated
    /// subtrees are priced as wholesale edits instead of being cut from the
    /// table (cutting the cells is the over-pruning trap).
    TruncatedSubtrees,
}

/// Band-limited forest distance matrix: row `i` stores columns
/// `i - e - 1 ..= i + e + 1`. Reads outside the band yield infinity.
struct BandMatrix {
    e: i64,
    width: usize,
    data: Vec<f64>,
}

impl BandMatrix {
    fn new(rows: usize, e: i64) -> Self {
        let width = (2 * e + 3) as usize;
        Self {
            e,
            width,
            data: vec![f64::INFINITY; (rows + 1) * width],
        }
    }

    #[inline]
    fn offset(&self, i: i64, j: i64) -> Option<usize> {
        let shifted = j - i + self.e + 1;
        if i < 0 || j < 0 || shifted < 0 || shifted >= self.width as i64 {
            None
        } else {
            Some(i as usize * self.width + shifted as usize)
        }
    }

    #[inline]
    fn get(&self, i: i64, j: i64) -> f64 {
        match self.offset(i, j) {
            Some(off) => self.data[off],
            None => f64::INFINITY,
        }
    }

    #[inline]
    fn set(&mut self, i: i64, j: i64, value: f64) {
        let off = self.offset(i, j).expect("cell outside the band");
        self.data[off] = value;
    }
}

/// The node-pair-scan engine behind the baseline and depth-pruning variants.
struct PairScan<C: CostModel> {
    costs: C,
    subproblems: u64,
    pair: PairPruning,
    matches: MatchPruning,
}

impl<C: CostModel> PairScan<C> {
    fn new(costs: C, pair: PairPruning, matches: MatchPruning) -> Self {
        Self {
            costs,
            subproblems: 0,
            pair,
            matches,
        }
    }

    /// Edits forced outside the pair: nodes after `x`/`y` in postorder and
    /// nodes before the subtrees cannot all survive unedited when the
    /// region sizes differ.
    fn outer_lower_bound(&self, t1: &TedIndex, t2: &TedIndex, x: i64, y: i64) -> i64 {
        let n1 = t1.c.tree_size as i64;
        let n2 = t2.c.tree_size as i64;
        let sx = t1.postl_to_size[x as usize] as i64;
        let sy = t2.postl_to_size[y as usize] as i64;
        let after = ((n1 - 1 - x) - (n2 - 1 - y)).abs();
        let before = ((x + 1 - sx) - (y + 1 - sy)).abs();
        let after = match self.pair {
            PairPruning::Size => after,
            PairPruning::SizeAndDepth => {
                let depth =
                    (t1.postl_to_depth[x as usize] - t2.postl_to_depth[y as usize]).abs() as i64;
                after.max(depth)
            }
        };
        after + before
    }

    fn k_relevant(&self, t1: &TedIndex, t2: &TedIndex, x: i64, y: i64, k: i64) -> bool {
        let sx = t1.postl_to_size[x as usize] as i64;
        let sy = t2.postl_to_size[y as usize] as i64;
        (sx - sy).abs() + self.outer_lower_bound(t1, t2, x, y) <= k
    }

    fn e_budget(&self, t1: &TedIndex, t2: &TedIndex, x: i64, y: i64, k: i64) -> i64 {
        k - self.outer_lower_bound(t1, t2, x, y)
    }

    /// Banded forest DP over the subtree pair `(x, y)`; distances of inner
    /// subtree pairs are read from `td` (infinity when never computed, which
    /// only happens for pairs that cannot appear in a <= k solution).
    fn tree_dist(
        &mut self,
        t1: &TedIndex,
        t2: &TedIndex,
        x: i64,
        y: i64,
        e: i64,
        td: &[f64],
    ) -> f64 {
        let n2 = t2.c.tree_size;
        let sx = t1.postl_to_size[x as usize] as i64;
        let sy = t2.postl_to_size[y as usize] as i64;
        if (sx - sy).abs() > e {
            return f64::INFINITY;
        }
        let e = e.min(sx.max(sy));
        let lx = x - sx + 1;
        let ly = y - sy + 1;
        let depth_cutoff_1 = t2.postl_to_height[y as usize] as i64 + e;
        let depth_cutoff_2 = t1.postl_to_height[x as usize] as i64 + e;

        let mut fd = BandMatrix::new(sx as usize, e);
        fd.set(0, 0, 0.0);
        for i in 1..=sx.min(e) {
            let di = (lx + i - 1) as usize;
            fd.set(i, 0, fd.get(i - 1, 0) + self.costs.del(t1.postl_to_label_id[di]));
        }
        for j in 1..=sy.min(e) {
            let dj = (ly + j - 1) as usize;
            fd.set(0, j, fd.get(0, j - 1) + self.costs.ins(t2.postl_to_label_id[dj]));
        }

        for i in 1..=sx {
            let di = (lx + i - 1) as usize;
            let del_cost = self.costs.del(t1.postl_to_label_id[di]);
            for j in (i - e).max(1)..=(i + e).min(sy) {
                let dj = (ly + j - 1) as usize;
                self.subproblems += 1;
                let del = fd.get(i - 1, j) + del_cost;
                let ins = fd.get(i, j - 1) + self.costs.ins(t2.postl_to_label_id[dj]);
                let lldi = t1.postl_to_lld[di] as i64;
                let lldj = t2.postl_to_lld[dj] as i64;
                let matchable_pair = lldi == lx && lldj == ly;
                let value = if matchable_pair {
                    let matchable = match self.matches {
                        MatchPruning::Off => true,
                        MatchPruning::TruncatedSubtrees => {
                            let rd1 = (t1.postl_to_depth[di]
                                - t1.postl_to_depth[x as usize]) as i64;
                            let rd2 = (t2.postl_to_depth[dj]
                                - t2.postl_to_depth[y as usize]) as i64;
                            rd1 <= depth_cutoff_1 && rd2 <= depth_cutoff_2
                        }
                    };
                    let ren = if matchable {
                        fd.get(i - 1, j - 1)
                            + self
                                .costs
                                .ren(t1.postl_to_label_id[di], t2.postl_to_label_id[dj])
                    } else {
                        f64::INFINITY
                    };
                    del.min(ins).min(ren)
                } else {
                    let jump =
                        fd.get(lldi - lx, lldj - ly) + td[di * n2 + dj];
                    del.min(ins).min(jump)
                };
                fd.set(i, j, value);
            }
        }

        fd.get(sx, sy)
    }

    fn ted_k(&mut self, t1: &TedIndex, t2: &TedIndex, k: usize) -> f64 {
        assert_same_dictionary(t1, t2);
        self.subproblems = 0;
        let n1 = t1.c.tree_size as i64;
        let n2 = t2.c.tree_size as i64;
        let k = k as i64;
        if (n1 - n2).abs() > k {
            return sentinel(k as usize);
        }

        let mut td = vec![f64::INFINITY; (n1 * n2) as usize];
        let slack = k + (n1 - n2).abs();
        for x in 0..n1 {
            for y in (x - slack).max(0)..=(x + slack).min(n2 - 1) {
                if !self.k_relevant(t1, t2, x, y, k) {
                    continue;
                }
                let e = self.e_budget(t1, t2, x, y, k);
                td[(x * n2 + y) as usize] = self.tree_dist(t1, t2, x, y, e, &td);
            }
        }

        let distance = td[((n1 - 1) * n2 + (n2 - 1)) as usize];
        if distance <= k as f64 {
            distance
        } else {
            sentinel(k as usize)
        }
    }
}

/// Key-root-pair engine: the Zhang–Shasha recursion with every forest table
/// limited to the `|forest1| - |forest2| <= k` band. Tree distances the band
/// never produces can only belong to solutions costing more than `k`.
struct KrScan<C: CostModel> {
    costs: C,
    subproblems: u64,
    precomputed_set: bool,
}

impl<C: CostModel> KrScan<C> {
    fn new(costs: C, precomputed_set: bool) -> Self {
        Self {
            costs,
            subproblems: 0,
            precomputed_set,
        }
    }

    fn forest_dist(
        &mut self,
        t1: &TedIndex,
        t2: &TedIndex,
        i: i64,
        j: i64,
        k: i64,
        td: &mut [f64],
    ) {
        let n2 = t2.c.tree_size;
        let li = t1.postl_to_lld[i as usize] as i64;
        let lj = t2.postl_to_lld[j as usize] as i64;
        let rows = i - li + 1;
        let cols = j - lj + 1;
        let e = k.min(rows.max(cols));

        let mut fd = BandMatrix::new(rows as usize, e);
        fd.set(0, 0, 0.0);
        for x in 1..=rows.min(e) {
            let di = (li + x - 1) as usize;
            fd.set(x, 0, fd.get(x - 1, 0) + self.costs.del(t1.postl_to_label_id[di]));
        }
        for y in 1..=cols.min(e) {
            let dj = (lj + y - 1) as usize;
            fd.set(0, y, fd.get(0, y - 1) + self.costs.ins(t2.postl_to_label_id[dj]));
        }

        for x in 1..=rows {
            let di = (li + x - 1) as usize;
            let del_cost = self.costs.del(t1.postl_to_label_id[di]);
            for y in (x - e).max(1)..=(x + e).min(cols) {
                let dj = (lj + y - 1) as usize;
                self.subproblems += 1;
                let del = fd.get(x - 1, y) + del_cost;
                let ins = fd.get(x, y - 1) + self.costs.ins(t2.postl_to_label_id[dj]);
                let lldi = t1.postl_to_lld[di] as i64;
                let lldj = t2.postl_to_lld[dj] as i64;
                let value = if lldi == li && lldj == lj {
                    let ren = fd.get(x - 1, y - 1)
                        + self
                            .costs
                            .ren(t1.postl_to_label_id[di], t2.postl_to_label_id[dj]);
                    let dist = del.min(ins).min(ren);
                    td[di * n2 + dj] = dist;
                    dist
                } else {
                    let jump = fd.get(lldi - li, lldj - lj) + td[di * n2 + dj];
                    del.min(ins).min(jump)
                };
                fd.set(x, y, value);
            }
        }
    }

    fn ted_k(&mut self, t1: &TedIndex, t2: &TedIndex, k: usize) -> f64 {
        assert_same_dictionary(t1, t2);
        self.subproblems = 0;
        let n1 = t1.c.tree_size as i64;
        let n2 = t2.c.tree_size as i64;
        let k = k as i64;
        if (n1 - n2).abs() > k {
            return sentinel(k as usize);
        }

        let mut td = vec![f64::INFINITY; (n1 * n2) as usize];
        if self.precomputed_set {
            for &i in &t1.kr {
                for &j in &t2.kr {
                    self.forest_dist(t1, t2, i as i64, j as i64, k, &mut td);
                }
            }
        } else {
            for i in 0..n1 {
                if !is_keyroot(t1, i) {
                    continue;
                }
                for j in 0..n2 {
                    if !is_keyroot(t2, j) {
                        continue;
                    }
                    self.forest_dist(t1, t2, i, j, k, &mut td);
                }
            }
        }

        let distance = td[((n1 - 1) * n2 + (n2 - 1)) as usize];
        if distance <= k as f64 {
            distance
        } else {
            sentinel(k as usize)
        }
    }
}

/// A node is a key-root when no proper ancestor shares its leftmost leaf.
#[inline]
fn is_keyroot(t: &TedIndex, i: i64) -> bool {
    let parent = t.postl_to_parent[i as usize];
    parent < 0 || t.postl_to_lld[parent as usize] != t.postl_to_lld[i as usize]
}

fn default_k(t1: &TedIndex, t2: &TedIndex) -> usize {
    2 * t1.c.tree_size.max(t2.c.tree_size)
}

macro_rules! bounded_algorithm {
    ($name:ident, $engine:ident, $($ctor:expr),+) => {
        pub struct $name<C: CostModel> {
            engine: $engine<C>,
        }

        impl<C: CostModel> $name<C> {
            pub fn new(costs: C) -> Self {
                Self {
                    engine: $engine::new(costs, $($ctor),+),
                }
            }
        }

        impl<C: CostModel> TedAlgorithm for $name<C> {
            fn ted(&mut self, t1: &TedIndex, t2: &TedIndex) -> f64 {
                self.engine.ted_k(t1, t2, default_k(t1, t2))
            }

            fn ted_k(&mut self, t1: &TedIndex, t2: &TedIndex, k: usize) -> f64 {
                self.engine.ted_k(t1, t2, k)
            }

            fn subproblem_count(&self) -> u64 {
                self.engine.subproblems
            }
        }
    };
}

bounded_algorithm!(
    TouzetBaseline,
    PairScan,
    PairPruning::Size,
    MatchPruning::Off
);
bounded_algorithm!(
    TouzetDepthPruning,
    PairScan,
    PairPruning::SizeAndDepth,
    MatchPruning::Off
);
bounded_algorithm!(
    TouzetDepthPruningTruncatedTreeFix,
    PairScan,
    PairPruning::SizeAndDepth,
    MatchPruning::TruncatedSubtrees
);
bounded_algorithm!(TouzetKrLoop, KrScan, false);
bounded_algorithm!(TouzetKrSet, KrScan, true);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexing::{Indexer, TedIndex};
    use crate::parsing::{parse_single, LabelDictionary};
    use crate::ted::UnitCostModel;

    fn indexes(t1: &str, t2: &str) -> (TedIndex, TedIndex) {
        let mut ld = LabelDictionary::new();
        let p1 = parse_single(t1, &mut ld).unwrap();
        let p2 = parse_single(t2, &mut ld).unwrap();
        (TedIndex::index_tree(&p1, &ld), TedIndex::index_tree(&p2, &ld))
    }

    #[test]
    fn test_sentinel_below_distance() {
        let (i1, i2) = indexes("{f{d{a}{c{b}}}{e}}", "{f{c{d{a}{b}}}{e}}");
        let mut baseline = TouzetBaseline::new(UnitCostModel);
        assert_eq!(baseline.ted_k(&i1, &i2, 1), 2.0);
        assert_eq!(baseline.ted_k(&i1, &i2, 0), 1.0);
        assert_eq!(baseline.ted_k(&i1, &i2, 2), 2.0);
        assert_eq!(baseline.ted_k(&i1, &i2, 10), 2.0);
    }

    #[test]
    fn test_size_difference_cutoff() {
        let (i1, i2) = indexes("{a}", "{a{b}{c}{d}{e}}");
        let mut baseline = TouzetBaseline::new(UnitCostModel);
        // sizes differ by 4, so k = 3 cannot be met
        assert_eq!(baseline.ted_k(&i1, &i2, 3), 4.0);
        assert_eq!(baseline.ted_k(&i1, &i2, 4), 4.0);
    }

    #[test]
    fn test_variants_agree_at_tight_thresholds() {
        let pairs = [
            ("{f{d{a}{c{b}}}{e}}", "{f{c{d{a}{b}}}{e}}", 2),
            ("{a{b{c{d{e}}}}}", "{e{d{c{b{a}}}}}", 4),
            ("{a{b}{c}}", "{a{c}{b}}", 2),
            ("{x{a}}", "{x{b}}", 1),
        ];
        for (t1, t2, expected) in pairs {
            let (i1, i2) = indexes(t1, t2);
            let mut algorithms: Vec<Box<dyn TedAlgorithm>> = vec![
                Box::new(TouzetBaseline::new(UnitCostModel)),
                Box::new(TouzetDepthPruning::new(UnitCostModel)),
                Box::new(TouzetDepthPruningTruncatedTreeFix::new(UnitCostModel)),
                Box::new(TouzetKrLoop::new(UnitCostModel)),
                Box::new(TouzetKrSet::new(UnitCostModel)),
            ];
            for algorithm in algorithms.iter_mut() {
                assert_eq!(algorithm.ted_k(&i1, &i2, expected), expected as f64);
                assert!(algorithm.ted_k(&i1, &i2, expected - 1) > (expected - 1) as f64);
            }
        }
    }

    #[test]
    fn test_deep_chains_against_flat_trees() {
        // depth pruning must not over-prune when whole subtrees get truncated
        let (i1, i2) = indexes("{a{b{c{d{e{f}}}}}}", "{a{b}{c}{d}{e}{f}}");
        let mut fix = TouzetDepthPruningTruncatedTreeFix::new(UnitCostModel);
        let mut baseline = TouzetBaseline::new(UnitCostModel);
        for k in 0..12 {
            assert_eq!(
                fix.ted_k(&i1, &i2, k),
                baseline.ted_k(&i1, &i2, k),
                "divergence at k = {k}"
            );
        }
    }

    #[test]
    fn test_kr_set_matches_kr_loop_subproblems() {
        let (i1, i2) = indexes("{q{w{e}{r}}{t{y}{u}{i}}{o{p}}}", "{q{w{e}}{t{y}{u}}{o}}");
        let mut kr_loop = TouzetKrLoop::new(UnitCostModel);
        let mut kr_set = TouzetKrSet::new(UnitCostModel);
        let d_loop = kr_loop.ted_k(&i1, &i2, 6);
        let d_set = kr_set.ted_k(&i1, &i2, 6);
        assert_eq!(d_loop, d_set);
        assert_eq!(kr_loop.subproblem_count(), kr_set.subproblem_count());
    }

    #[test]
    fn test_unbounded_default_threshold() {
        let (i1, i2) = indexes("{a{b}{c}}", "{x{y{z}}}");
        let mut baseline = TouzetBaseline::new(UnitCostModel);
        let d = baseline.ted(&i1, &i2);
        assert!(d <= (i1.c.tree_size + i2.c.tree_size) as f64);
        // all labels differ: three renames are impossible to line up, so one
        // node on each side stays unmapped
        assert_eq!(d, 4.0);
    }
}
