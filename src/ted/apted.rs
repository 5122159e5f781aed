//! Tree edit distance with dynamic path-strategy decomposition, after the
//! APTED algorithm family by Pawlik and Augsten [1,2,3].
//!
//! [1] M. Pawlik and N. Augsten. RTED: A Robust Algorithm for the Tree Edit
//!     Distance. PVLDB. 2011.
//! [2] M. Pawlik and N. Augsten. Efficient Computation of the Tree Edit
//!     Distance. ACM Transactions on Database Systems (TODS). 2015.
//! [3] M. Pawlik and N. Augsten. Tree edit distance: Robust and
//!     memory-efficient. Information Systems. 2016.
//!
//! A strategy table picks, per subtree pair, the root-leaf path whose
//! decomposition touches the fewest subproblems; the `gted` recursion solves
//! the subtrees hanging off that path and a single-path function then fills
//! tree distances for the whole pair. Single-node subtrees short-circuit
//! through `spf1` on precomputed subtree insert/delete cost sums.

use crate::indexing::TedIndex;
use crate::ted::{assert_same_dictionary, CostModel, TedAlgorithm};

/// Packed path codes of the strategy table.
const LEFT1: u8 = 0;
const RIGHT1: u8 = 1;
const INNER1: u8 = 2;
const LEFT2: u8 = 3;
const RIGHT2: u8 = 4;
const INNER2: u8 = 5;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

pub struct Apted<C: CostModel> {
    costs: C,
    subproblems: u64,
}

impl<C: CostModel> Apted<C> {
    pub fn new(costs: C) -> Self {
        Self {
            costs,
            subproblems: 0,
        }
    }

    pub fn get_subproblem_count(&self) -> u64 {
        self.subproblems
    }

    /// Computes the optimal decomposition path per subtree pair, bottom-up
    /// over both postorders.
    ///
    /// The cost of decomposing `(v, w)` along a path is the single-path-
    /// function work `|T1_v| * |T2_w|` plus the optimal costs of all subtree
    /// pairs hanging off that path, which are already known for every child
    /// pair. Six accumulation tables carry the hanging-pair sums for the
    /// left, right and heavy path of either tree, so each pair is charged in
    /// time proportional to its child count.
    fn compute_strategy(&self, t1: &TedIndex, t2: &TedIndex) -> Vec<u8> {
        let n1 = t1.c.tree_size;
        let n2 = t2.c.tree_size;
        let mut strategy = vec![0u8; n1 * n2];
        let mut cost = vec![0i64; n1 * n2];
        // Σ of optimal costs of the pairs hanging off each path of T1_v
        // (columns fixed to w), and the mirror for the paths of T2_w.
        let mut acc = vec![vec![0i64; n1 * n2]; 6];

        for x in 0..n1 {
            let v = t1.postl_to_prel[x] as usize;
            let sv = t1.prel_to_size[v] as i64;
            let children1 = &t1.prel_to_children[v];
            let heavy1 = heavy_child(t1, children1);
            for y in 0..n2 {
                let w = t2.postl_to_prel[y] as usize;
                let sw = t2.prel_to_size[w] as i64;
                let children2 = &t2.prel_to_children[w];
                let heavy2 = heavy_child(t2, children2);
                let at = v * n2 + w;

                for (code, spine) in [
                    (LEFT1, children1.first().copied()),
                    (RIGHT1, children1.last().copied()),
                    (INNER1, heavy1),
                ] {
                    let sum = match spine {
                        None => 0,
                        Some(spine) => {
                            let mut sum = acc[code as usize][spine as usize * n2 + w];
                            for &c in children1 {
                                if c != spine {
                                    sum += cost[c as usize * n2 + w];
                                }
                            }
                            sum
                        }
                    };
                    acc[code as usize][at] = sum;
                }
                for (code, spine) in [
                    (LEFT2, children2.first().copied()),
                    (RIGHT2, children2.last().copied()),
                    (INNER2, heavy2),
                ] {
                    let sum = match spine {
                        None => 0,
                        Some(spine) => {
                            let mut sum = acc[code as usize][v * n2 + spine as usize];
                            for &c in children2 {
                                if c != spine {
                                    sum += cost[v * n2 + c as usize];
                                }
                            }
                            sum
                        }
                    };
                    acc[code as usize][at] = sum;
                }

                let spf_work = sv * sw;
                let mut best = 0u8;
                let mut best_cost = spf_work + acc[0][at];
                for code in 1..6u8 {
                    let candidate = spf_work + acc[code as usize][at];
                    if candidate < best_cost {
                        best = code;
                        best_cost = candidate;
                    }
                }
                strategy[at] = best;
                cost[at] = best_cost;
            }
        }
        strategy
    }

    fn gted(
        &mut self,
        t1: &TedIndex,
        t2: &TedIndex,
        v: usize,
        w: usize,
        strategy: &[u8],
        td: &mut [f64],
    ) {
        let n2 = t2.c.tree_size;
        // a finite pair distance means this pair's single-path function
        // already ran and the whole subtree product is filled
        if td[v * n2 + w].is_finite() {
            return;
        }
        if t1.prel_to_size[v] == 1 {
            self.spf1_row(t1, t2, v, w, td);
            return;
        }
        if t2.prel_to_size[w] == 1 {
            self.spf1_col(t1, t2, v, w, td);
            return;
        }

        match strategy[v * n2 + w] {
            code @ (LEFT1 | RIGHT1 | INNER1) => {
                let side = match code {
                    LEFT1 => Side::Left,
                    RIGHT1 => Side::Right,
                    _ => inner_side(t1, v),
                };
                for c in hanging_subtrees(t1, v, side) {
                    self.gted(t1, t2, c, w, strategy, td);
                }
                match side {
                    Side::Left => {
                        let pv = t1.prel_to_postl[v];
                        for j in left_keyroots(t2, w) {
                            self.spf_left(t1, t2, pv, j, td);
                        }
                    }
                    Side::Right => {
                        let pv = t1.prel_to_postr(v as i32);
                        for j in right_keyroots(t2, w) {
                            self.spf_right(t1, t2, pv, j, td);
                        }
                    }
                }
            }
            code => {
                let side = match code {
                    LEFT2 => Side::Left,
                    RIGHT2 => Side::Right,
                    INNER2 => inner_side(t2, w),
                    _ => unreachable!("invalid path code"),
                };
                for c in hanging_subtrees(t2, w, side) {
                    self.gted(t1, t2, v, c, strategy, td);
                }
                match side {
                    Side::Left => {
                        let pw = t2.prel_to_postl[w];
                        for i in left_keyroots(t1, v) {
                            self.spf_left(t1, t2, i, pw, td);
                        }
                    }
                    Side::Right => {
                        let pw = t2.prel_to_postr(w as i32);
                        for i in right_keyroots(t1, v) {
                            self.spf_right(t1, t2, i, pw, td);
                        }
                    }
                }
            }
        }
    }

    /// Single-node shortcut: `v` is a leaf. Distances of `v` against every
    /// subtree of `T2_w` collapse to the subtree insert sums minus the best
    /// single saving, O(|T2_w|) in total.
    fn spf1_row(&mut self, t1: &TedIndex, t2: &TedIndex, v: usize, w: usize, td: &mut [f64]) {
        let n2 = t2.c.tree_size;
        let vl = t1.prel_to_label_id[v];
        let del_v = self.costs.del(vl);
        let pw = t2.prel_to_postl[w];
        let start = pw - t2.prel_to_size[w] + 1;
        let mut best = vec![0.0f64; t2.prel_to_size[w] as usize];
        for y in start..=pw {
            self.subproblems += 1;
            let y_prel = t2.postl_to_prel[y as usize] as usize;
            let yl = t2.postl_to_label_id[y as usize];
            let mut b = self.costs.ren(vl, yl) - self.costs.ins(yl);
            for &c in &t2.prel_to_children[y_prel] {
                b = b.min(best[(t2.prel_to_postl[c as usize] - start) as usize]);
            }
            best[(y - start) as usize] = b;
            td[v * n2 + y_prel] = t2.prel_to_subtree_ins_cost[y_prel] + del_v.min(b);
        }
    }

    /// Mirror of [`Self::spf1_row`]: `w` is a leaf.
    fn spf1_col(&mut self, t1: &TedIndex, t2: &TedIndex, v: usize, w: usize, td: &mut [f64]) {
        let n2 = t2.c.tree_size;
        let wl = t2.prel_to_label_id[w];
        let ins_w = self.costs.ins(wl);
        let pv = t1.prel_to_postl[v];
        let start = pv - t1.prel_to_size[v] + 1;
        let mut best = vec![0.0f64; t1.prel_to_size[v] as usize];
        for x in start..=pv {
            self.subproblems += 1;
            let x_prel = t1.postl_to_prel[x as usize] as usize;
            let xl = t1.postl_to_label_id[x as usize];
            let mut b = self.costs.ren(xl, wl) - self.costs.del(xl);
            for &c in &t1.prel_to_children[x_prel] {
                b = b.min(best[(t1.prel_to_postl[c as usize] - start) as usize]);
            }
            best[(x - start) as usize] = b;
            td[x_prel * n2 + w] = t1.prel_to_subtree_del_cost[x_prel] + ins_w.min(b);
        }
    }

    /// Left-decomposition forest DP over the postorder spans of subtrees
    /// `i` and `j` (postorder ids). Writes tree distances for every pair on
    /// both left spines; reads distances of hanging pairs from `td`.
    fn spf_left(&mut self, t1: &TedIndex, t2: &TedIndex, i: i32, j: i32, td: &mut [f64]) {
        let n2 = t2.c.tree_size;
        let li = t1.postl_to_lld[i as usize];
        let lj = t2.postl_to_lld[j as usize];
        let rows = (i - li + 1) as usize;
        let cols = (j - lj + 1) as usize;
        let fd_cols = cols + 1;
        let mut fd = vec![0.0f64; (rows + 1) * fd_cols];
        let at = |x: usize, y: usize| x * fd_cols + y;

        for x in 1..=rows {
            let di = (li as usize) + x - 1;
            fd[at(x, 0)] = fd[at(x - 1, 0)] + self.costs.del(t1.postl_to_label_id[di]);
        }
        for y in 1..=cols {
            let dj = (lj as usize) + y - 1;
            fd[at(0, y)] = fd[at(0, y - 1)] + self.costs.ins(t2.postl_to_label_id[dj]);
        }

        for x in 1..=rows {
            let di = (li as usize) + x - 1;
            let di_prel = t1.postl_to_prel[di] as usize;
            let del_cost = self.costs.del(t1.postl_to_label_id[di]);
            for y in 1..=cols {
                let dj = (lj as usize) + y - 1;
                let dj_prel = t2.postl_to_prel[dj] as usize;
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
                    td[di_prel * n2 + dj_prel] = dist;
                } else {
                    let x0 = (t1.postl_to_lld[di] - li) as usize;
                    let y0 = (t2.postl_to_lld[dj] - lj) as usize;
                    let sub = td[di_prel * n2 + dj_prel];
                    debug_assert!(sub.is_finite(), "hanging pair was not decomposed");
                    fd[at(x, y)] = del.min(ins).min(fd[at(x0, y0)] + sub);
                }
            }
        }
    }

    /// Right-decomposition mirror of [`Self::spf_left`], over right-to-left
    /// postorder spans and rightmost leaf descendants.
    fn spf_right(&mut self, t1: &TedIndex, t2: &TedIndex, i: i32, j: i32, td: &mut [f64]) {
        let n2 = t2.c.tree_size;
        let ri = t1.postr_to_rld[i as usize];
        let rj = t2.postr_to_rld[j as usize];
        let rows = (i - ri + 1) as usize;
        let cols = (j - rj + 1) as usize;
        let fd_cols = cols + 1;
        let mut fd = vec![0.0f64; (rows + 1) * fd_cols];
        let at = |x: usize, y: usize| x * fd_cols + y;

        for x in 1..=rows {
            let di = (ri as usize) + x - 1;
            fd[at(x, 0)] = fd[at(x - 1, 0)] + self.costs.del(t1.postr_to_label_id[di]);
        }
        for y in 1..=cols {
            let dj = (rj as usize) + y - 1;
            fd[at(0, y)] = fd[at(0, y - 1)] + self.costs.ins(t2.postr_to_label_id[dj]);
        }

        for x in 1..=rows {
            let di = (ri as usize) + x - 1;
            let di_prel = t1.postr_to_prel(di as i32) as usize;
            let del_cost = self.costs.del(t1.postr_to_label_id[di]);
            for y in 1..=cols {
                let dj = (rj as usize) + y - 1;
                let dj_prel = t2.postr_to_prel(dj as i32) as usize;
                self.subproblems += 1;
                let del = fd[at(x - 1, y)] + del_cost;
                let ins = fd[at(x, y - 1)] + self.costs.ins(t2.postr_to_label_id[dj]);
                if t1.postr_to_rld[di] == ri && t2.postr_to_rld[dj] == rj {
                    let ren = fd[at(x - 1, y - 1)]
                        + self
                            .costs
                            .ren(t1.postr_to_label_id[di], t2.postr_to_label_id[dj]);
                    let dist = del.min(ins).min(ren);
                    fd[at(x, y)] = dist;
                    td[di_prel * n2 + dj_prel] = dist;
                } else {
                    let x0 = (t1.postr_to_rld[di] - ri) as usize;
                    let y0 = (t2.postr_to_rld[dj] - rj) as usize;
                    let sub = td[di_prel * n2 + dj_prel];
                    debug_assert!(sub.is_finite(), "hanging pair was not decomposed");
                    fd[at(x, y)] = del.min(ins).min(fd[at(x0, y0)] + sub);
                }
            }
        }
    }
}

/// Child carrying the most decomposition weight; its subtree continues the
/// heavy path.
fn heavy_child(t: &TedIndex, children: &[i32]) -> Option<i32> {
    children
        .iter()
        .copied()
        .max_by_key(|&c| t.prel_to_desc_sum[c as usize] + t.prel_to_size[c as usize] as i64)
}

/// Inner paths resolve to the lighter of the two outer spines.
fn inner_side(t: &TedIndex, v: usize) -> Side {
    if t.prel_to_kr_sum[v] <= t.prel_to_rev_kr_sum[v] {
        Side::Left
    } else {
        Side::Right
    }
}

/// Roots of the subtrees hanging off the spine of `v` on the given side,
/// in preorder.
fn hanging_subtrees(t: &TedIndex, v: usize, side: Side) -> Vec<usize> {
    let mut hanging = Vec::new();
    let mut p = v;
    loop {
        let children = &t.prel_to_children[p];
        if children.is_empty() {
            break;
        }
        let spine_pos = match side {
            Side::Left => 0,
            Side::Right => children.len() - 1,
        };
        for (pos, &c) in children.iter().enumerate() {
            if pos != spine_pos {
                hanging.push(c as usize);
            }
        }
        p = children[spine_pos] as usize;
    }
    hanging
}

/// Key-roots of the subtree rooted at preorder node `w`, ascending in
/// postorder: nodes without a strict ancestor (within the subtree) sharing
/// their leftmost leaf.
fn left_keyroots(t: &TedIndex, w: usize) -> Vec<i32> {
    let pw = t.prel_to_postl[w];
    let start = pw - t.prel_to_size[w] + 1;
    let mut kr = Vec::new();
    for j in start..=pw {
        if j == pw {
            kr.push(j);
            continue;
        }
        let parent = t.postl_to_parent[j as usize];
        if t.postl_to_lld[parent as usize] != t.postl_to_lld[j as usize] {
            kr.push(j);
        }
    }
    kr
}

/// Mirror of [`left_keyroots`] over rightmost leaves, ascending in
/// right-to-left postorder.
fn right_keyroots(t: &TedIndex, w: usize) -> Vec<i32> {
    let pw = t.prel_to_postr(w as i32);
    let start = pw - t.prel_to_size[w] + 1;
    let mut kr = Vec::new();
    for j in start..=pw {
        if j == pw {
            kr.push(j);
            continue;
        }
        let parent_prel = t.prel_to_parent[t.postr_to_prel(j) as usize];
        let parent_postr = t.prel_to_postr(parent_prel);
        if t.postr_to_rld[parent_postr as usize] != t.postr_to_rld[j as usize] {
            kr.push(j);
        }
    }
    kr
}

impl<C: CostModel> TedAlgorithm for Apted<C> {
    fn ted(&mut self, t1: &TedIndex, t2: &TedIndex) -> f64 {
        assert_same_dictionary(t1, t2);
        self.subproblems = 0;
        let n1 = t1.c.tree_size;
        let n2 = t2.c.tree_size;

        let strategy = self.compute_strategy(t1, t2);
        let mut td = vec![f64::INFINITY; n1 * n2];
        self.gted(t1, t2, 0, 0, &strategy, &mut td);
        // both roots sit at preorder 0
        td[0]
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

    fn indexes(t1: &str, t2: &str) -> (TedIndex, TedIndex) {
        let mut ld = LabelDictionary::new();
        let p1 = parse_single(t1, &mut ld).unwrap();
        let p2 = parse_single(t2, &mut ld).unwrap();
        (TedIndex::index_tree(&p1, &ld), TedIndex::index_tree(&p2, &ld))
    }

    #[test]
    fn test_canonical_example() {
        let (i1, i2) = indexes("{f{d{a}{c{b}}}{e}}", "{f{c{d{a}{b}}}{e}}");
        assert_eq!(Apted::new(UnitCostModel).ted(&i1, &i2), 2.0);
    }

    #[test]
    fn test_single_node_shortcut() {
        let (i1, i2) = indexes("{a}", "{a{b}{c}}");
        let mut apted = Apted::new(UnitCostModel);
        assert_eq!(apted.ted(&i1, &i2), 2.0);
        assert_eq!(apted.ted(&i2, &i1), 2.0);
        let (i1, i2) = indexes("{x}", "{a{b}{c}}");
        assert_eq!(apted.ted(&i1, &i2), 3.0);
    }

    #[test]
    fn test_strategy_table_is_deterministic() {
        let (i1, i2) = indexes("{a{b{c}{d}}{e}{f{g}}}", "{a{b{c{d{e}}}}}");
        let apted = Apted::new(UnitCostModel);
        let s1 = apted.compute_strategy(&i1, &i2);
        let s2 = apted.compute_strategy(&i1, &i2);
        assert_eq!(s1, s2);
        assert_eq!(s1.len(), i1.c.tree_size * i2.c.tree_size);
    }

    #[test]
    fn test_all_strategy_sides_agree_with_mirrors() {
        // left combs, right combs and stars push the table to every side
        let shapes = [
            "{a{b{c{d}}}}",
            "{a{b{c}{d}{e}}}",
            "{a{b}{c}{d}{e}}",
            "{a{b{c}{d}}{e{f}{g}}}",
        ];
        let mut apted = Apted::new(UnitCostModel);
        for s1 in shapes {
            for s2 in shapes {
                let (i1, i2) = indexes(s1, s2);
                let d12 = apted.ted(&i1, &i2);
                let d21 = apted.ted(&i2, &i1);
                assert_eq!(d12, d21, "{s1} vs {s2}");
            }
        }
    }
}
