//! Tree edit distance algorithms over [`crate::indexing::TedIndex`].
//!
//! Every algorithm computes the minimum-cost sequence of node relabel,
//! delete and insert operations between two ordered labeled trees. The
//! variants differ in decomposition strategy, not in output: for the same
//! cost model they all return the same distance.

pub mod apted;
pub mod lgm;
pub mod touzet;
pub mod zhang_shasha;

use crate::indexing::TedIndex;
use crate::parsing::LabelId;
use clap::ValueEnum;

pub trait CostModel {
    fn del(&self, label: LabelId) -> f64;
    fn ins(&self, label: LabelId) -> f64;
    /// Must satisfy `ren(x, x) == 0`.
    fn ren(&self, label1: LabelId, label2: LabelId) -> f64;
}

/// Unit costs: 1 for delete and insert, 1 for renaming distinct labels.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnitCostModel;

impl CostModel for UnitCostModel {
    #[inline]
    fn del(&self, _label: LabelId) -> f64 {
        1.0
    }

    #[inline]
    fn ins(&self, _label: LabelId) -> f64 {
        1.0
    }

    #[inline]
    fn ren(&self, label1: LabelId, label2: LabelId) -> f64 {
        if label1 == label2 {
            0.0
        } else {
            1.0
        }
    }
}

pub trait TedAlgorithm {
    /// Exact distance between the two indexed trees.
    fn ted(&mut self, t1: &TedIndex, t2: &TedIndex) -> f64;

    /// Distance if it does not exceed `k`, otherwise a sentinel `> k`.
    fn ted_k(&mut self, t1: &TedIndex, t2: &TedIndex, k: usize) -> f64 {
        let distance = self.ted(t1, t2);
        if distance <= k as f64 {
            distance
        } else {
            sentinel(k)
        }
    }

    /// Number of DP cells touched by the last call.
    fn subproblem_count(&self) -> u64;
}

/// Value returned by bounded variants when the distance exceeds `k`.
#[inline]
pub(crate) fn sentinel(k: usize) -> f64 {
    (k + 1) as f64
}

/// Label ids are only comparable between indexes built from one dictionary.
#[inline]
pub(crate) fn assert_same_dictionary(t1: &TedIndex, t2: &TedIndex) {
    assert_eq!(
        t1.dict_tag, t2.dict_tag,
        "both indexes must be built with the same label dictionary"
    );
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AlgorithmKind {
    #[value(name = "zhang_shasha")]
    ZhangShasha,
    #[value(name = "apted")]
    Apted,
    #[value(name = "touzet_baseline")]
    TouzetBaseline,
    #[value(name = "touzet_depth_pruning")]
    TouzetDepthPruning,
    #[value(name = "touzet_depth_pruning_truncated_tree_fix")]
    TouzetDepthPruningTruncatedTreeFix,
    #[value(name = "touzet_kr_loop")]
    TouzetKrLoop,
    #[value(name = "touzet_kr_set")]
    TouzetKrSet,
    #[value(name = "lgm")]
    Lgm,
}

impl AlgorithmKind {
    /// Instantiates the algorithm under unit costs. Hot loops stay
    /// monomorphized over the cost model; dispatch happens once per run.
    pub fn build(&self) -> Box<dyn TedAlgorithm> {
        match self {
            Self::ZhangShasha => Box::new(zhang_shasha::ZhangShasha::new(UnitCostModel)),
            Self::Apted => Box::new(apted::Apted::new(UnitCostModel)),
            Self::TouzetBaseline => Box::new(touzet::TouzetBaseline::new(UnitCostModel)),
            Self::TouzetDepthPruning => {
                Box::new(touzet::TouzetDepthPruning::new(UnitCostModel))
            }
            Self::TouzetDepthPruningTruncatedTreeFix => {
                Box::new(touzet::TouzetDepthPruningTruncatedTreeFix::new(UnitCostModel))
            }
            Self::TouzetKrLoop => Box::new(touzet::TouzetKrLoop::new(UnitCostModel)),
            Self::TouzetKrSet => Box::new(touzet::TouzetKrSet::new(UnitCostModel)),
            Self::Lgm => Box::new(lgm::LgmTreeIndex::new(UnitCostModel)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexing::{Indexer, TedIndex};
    use crate::parsing::{parse_single, LabelDictionary};

    fn build_indexes(inputs: &[&str]) -> (Vec<TedIndex>, LabelDictionary) {
        let mut ld = LabelDictionary::new();
        let trees: Vec<_> = inputs
            .iter()
            .map(|s| parse_single(s, &mut ld).unwrap())
            .collect();
        let indexes = trees.iter().map(|t| TedIndex::index_tree(t, &ld)).collect();
        (indexes, ld)
    }

    const CORPUS: &[&str] = &[
        "{a}",
        "{b}",
        "{a{b}{c}}",
        "{a{c}{b}}",
        "{x{a}}",
        "{x{b}}",
        "{f{d{a}{c{b}}}{e}}",
        "{f{c{d{a}{b}}}{e}}",
        "{a{b{c}{d}}{e}{f{g}}}",
        "{a{b{c{d{e}}}}}",
        "{e{d{c{b{a}}}}}",
        "{q{w{e}{r}}{t{y}{u}{i}}{o{p}}}",
        "{a{a}{a{a}{a}}}",
        "{}",
        "{a{}{b}}",
    ];

    fn exact_algorithms() -> Vec<(&'static str, Box<dyn TedAlgorithm>)> {
        vec![
            ("zhang_shasha", AlgorithmKind::ZhangShasha.build()),
            ("apted", AlgorithmKind::Apted.build()),
            ("touzet_baseline", AlgorithmKind::TouzetBaseline.build()),
            (
                "touzet_depth_pruning",
                AlgorithmKind::TouzetDepthPruning.build(),
            ),
            (
                "touzet_depth_pruning_truncated_tree_fix",
                AlgorithmKind::TouzetDepthPruningTruncatedTreeFix.build(),
            ),
            ("touzet_kr_loop", AlgorithmKind::TouzetKrLoop.build()),
            ("touzet_kr_set", AlgorithmKind::TouzetKrSet.build()),
        ]
    }

    #[test]
    fn test_expected_distances() {
        let cases = [
            ("{a}", "{a}", 0.0),
            ("{a}", "{b}", 1.0),
            ("{a{b}{c}}", "{a{b}{c}}", 0.0),
            ("{a{b}{c}}", "{a{c}{b}}", 2.0),
            ("{x{a}}", "{x{b}}", 1.0),
            ("{f{d{a}{c{b}}}{e}}", "{f{c{d{a}{b}}}{e}}", 2.0),
        ];
        for (t1, t2, expected) in cases {
            let (indexes, _) = build_indexes(&[t1, t2]);
            for (name, mut algorithm) in exact_algorithms() {
                let got = algorithm.ted(&indexes[0], &indexes[1]);
                assert_eq!(got, expected, "{name} on {t1} vs {t2}");
            }
        }
    }

    #[test]
    fn test_identity_on_corpus() {
        let (indexes, _) = build_indexes(CORPUS);
        for (name, mut algorithm) in exact_algorithms() {
            for idx in &indexes {
                assert_eq!(algorithm.ted(idx, idx), 0.0, "{name} identity");
            }
        }
    }

    #[test]
    fn test_symmetry_and_upper_bound_on_corpus() {
        let (indexes, _) = build_indexes(CORPUS);
        for (name, mut algorithm) in exact_algorithms() {
            for t1 in &indexes {
                for t2 in &indexes {
                    let d12 = algorithm.ted(t1, t2);
                    let d21 = algorithm.ted(t2, t1);
                    assert_eq!(d12, d21, "{name} symmetry");
                    let bound = (t1.c.tree_size + t2.c.tree_size) as f64;
                    assert!(d12 <= bound, "{name} exceeds |T1|+|T2|");
                }
            }
        }
    }

    #[test]
    fn test_triangle_inequality_on_corpus() {
        let (indexes, _) = build_indexes(CORPUS);
        let mut zs = zhang_shasha::ZhangShasha::new(UnitCostModel);
        let n = indexes.len();
        let mut dist = vec![vec![0.0f64; n]; n];
        for i in 0..n {
            for j in 0..n {
                dist[i][j] = zs.ted(&indexes[i], &indexes[j]);
            }
        }
        for a in 0..n {
            for b in 0..n {
                for c in 0..n {
                    assert!(
                        dist[a][c] <= dist[a][b] + dist[b][c] + 1e-9,
                        "triangle violated at ({a},{b},{c})"
                    );
                }
            }
        }
    }

    #[test]
    fn test_cross_algorithm_agreement_on_corpus() {
        let (indexes, _) = build_indexes(CORPUS);
        let mut reference = zhang_shasha::ZhangShasha::new(UnitCostModel);
        for t1 in &indexes {
            for t2 in &indexes {
                let expected = reference.ted(t1, t2);
                for (name, mut algorithm) in exact_algorithms() {
                    assert_eq!(algorithm.ted(t1, t2), expected, "{name} disagrees");
                }
            }
        }
    }

    #[test]
    fn test_bounded_semantics_both_sides_of_threshold() {
        let (indexes, _) = build_indexes(CORPUS);
        let mut reference = zhang_shasha::ZhangShasha::new(UnitCostModel);
        for t1 in &indexes {
            for t2 in &indexes {
                let exact = reference.ted(t1, t2) as usize;
                for (name, mut algorithm) in exact_algorithms() {
                    if exact > 0 {
                        let below = algorithm.ted_k(t1, t2, exact - 1);
                        assert!(
                            below > (exact - 1) as f64,
                            "{name} must return a sentinel below the distance"
                        );
                    }
                    let at = algorithm.ted_k(t1, t2, exact);
                    assert_eq!(at, exact as f64, "{name} at k == ted");
                    let above = algorithm.ted_k(t1, t2, exact + 3);
                    assert_eq!(above, exact as f64, "{name} at k > ted");
                }
            }
        }
    }

    #[test]
    fn test_lgm_upper_bounds_apted() {
        let (indexes, _) = build_indexes(CORPUS);
        let mut apted = apted::Apted::new(UnitCostModel);
        let mut lgm = lgm::LgmTreeIndex::new(UnitCostModel);
        for t1 in &indexes {
            for t2 in &indexes {
                let exact = apted.ted(t1, t2);
                lgm.init(t2);
                let bound = lgm.ted(t1, t2);
                assert!(bound >= exact, "LGM bound below the exact distance");
            }
        }
    }

    #[test]
    fn test_scenario_six_bounded() {
        let (indexes, _) = build_indexes(&["{f{d{a}{c{b}}}{e}}", "{f{c{d{a}{b}}}{e}}"]);
        let mut touzet = touzet::TouzetBaseline::new(UnitCostModel);
        assert_eq!(touzet.ted_k(&indexes[0], &indexes[1], 2), 2.0);
        assert!(touzet.ted_k(&indexes[0], &indexes[1], 1) > 1.0);
    }

    #[test]
    fn test_subproblem_counts_are_deterministic() {
        let (indexes, _) = build_indexes(&["{f{d{a}{c{b}}}{e}}", "{f{c{d{a}{b}}}{e}}"]);
        let mut apted = apted::Apted::new(UnitCostModel);
        apted.ted(&indexes[0], &indexes[1]);
        let first = apted.subproblem_count();
        apted.ted(&indexes[0], &indexes[1]);
        assert_eq!(apted.subproblem_count(), first);
        assert!(first > 0);

        let mut lgm = lgm::LgmTreeIndex::new(UnitCostModel);
        lgm.init(&indexes[1]);
        lgm.ted(&indexes[0], &indexes[1]);
        let first = lgm.subproblem_count();
        lgm.ted(&indexes[0], &indexes[1]);
        assert_eq!(lgm.subproblem_count(), first);
    }

    #[test]
    #[should_panic(expected = "same label dictionary")]
    fn test_mixed_dictionaries_are_rejected() {
        let (i1, _) = {
            let mut ld = LabelDictionary::new();
            let t = parse_single("{a{b}}", &mut ld).unwrap();
            (TedIndex::index_tree(&t, &ld), ld)
        };
        let (i2, _) = {
            let mut ld = LabelDictionary::new();
            let t = parse_single("{a{b}}", &mut ld).unwrap();
            (TedIndex::index_tree(&t, &ld), ld)
        };
        zhang_shasha::ZhangShasha::new(UnitCostModel).ted(&i1, &i2);
    }
}
