use crate::parsing::{LabelDictionary, LabelId, ParsedTree};
use crate::ted::{CostModel, UnitCostModel};
use indextree::NodeEdge;

pub trait Indexer {
    fn index_tree(tree: &ParsedTree, label_dict: &LabelDictionary) -> Self
    where
        Self: Sized;
}

#[derive(Debug)]
pub struct ConstantsIndex {
    pub tree_size: usize,
}

/// Struct-of-arrays tree index consumed by every TED algorithm.
///
/// Nodes are numbered in left-to-right preorder (`prel`) and left-to-right
/// postorder (`postl`). The right-to-left numberings follow from the
/// identities `preR = n-1-postL` and `postR = n-1-preL`; the non-trivial
/// conversions are materialized, the trivial ones are methods. All arrays
/// have length `tree_size` and are filled by one `NodeEdge` traversal of the
/// arena plus O(n) post-passes; the index is immutable afterwards.
#[derive(Debug)]
pub struct TedIndex {
    pub c: ConstantsIndex,
    /// Tag of the dictionary the labels were interned with.
    pub dict_tag: u32,

    /// Label id of each node, indexed in left-to-right preorder.
    pub prel_to_label_id: Vec<LabelId>,
    /// Label id of each node, indexed in left-to-right postorder.
    pub postl_to_label_id: Vec<LabelId>,
    /// Label id of each node, indexed in right-to-left postorder.
    pub postr_to_label_id: Vec<LabelId>,

    /// Subtree size of each node.
    pub prel_to_size: Vec<i32>,
    /// Preorder id of the parent node, `-1` for the root.
    pub prel_to_parent: Vec<i32>,
    /// Ordered preorder ids of each node's children.
    pub prel_to_children: Vec<Vec<i32>>,
    /// Number of edges from the root.
    pub prel_to_depth: Vec<i32>,

    /// Preorder id of the leftmost leaf descendant.
    pub prel_to_lld: Vec<i32>,
    /// Preorder id of the rightmost leaf descendant.
    pub prel_to_rld: Vec<i32>,

    /// Postorder id of the leftmost leaf descendant, indexed in postorder.
    pub postl_to_lld: Vec<i32>,
    /// Right-to-left postorder id of the rightmost leaf descendant, indexed
    /// in right-to-left postorder.
    pub postr_to_rld: Vec<i32>,
    /// Postorder id of the parent, `-1` for the root.
    pub postl_to_parent: Vec<i32>,
    /// Subtree size, indexed in postorder.
    pub postl_to_size: Vec<i32>,
    /// Depth, indexed in postorder.
    pub postl_to_depth: Vec<i32>,
    /// Subtree height (leaf = 0), indexed in postorder.
    pub postl_to_height: Vec<i32>,

    /// Key-roots (nodes whose leftmost leaf differs from their parent's),
    /// ascending in postorder. The root is always a member.
    pub kr: Vec<i32>,
    /// Mirror key-roots over rightmost leaves, ascending in right-to-left
    /// postorder.
    pub rkr: Vec<i32>,

    /// Order conversions.
    pub prel_to_postl: Vec<i32>,
    pub postl_to_prel: Vec<i32>,
    pub prel_to_prer: Vec<i32>,
    pub prer_to_prel: Vec<i32>,

    /// Sum of subtree sizes over all descendants (inner-path weight).
    pub prel_to_desc_sum: Vec<i64>,
    /// Sum of subtree sizes over key-roots within the subtree (left-path
    /// weight).
    pub prel_to_kr_sum: Vec<i64>,
    /// Mirror of `prel_to_kr_sum` over rightmost leaves (right-path weight).
    pub prel_to_rev_kr_sum: Vec<i64>,

    /// Cost of deleting/inserting the entire subtree under the cost model
    /// the index was built with.
    pub prel_to_subtree_del_cost: Vec<f64>,
    pub prel_to_subtree_ins_cost: Vec<f64>,
}

/// Per-node accumulator alive between the Start and End visits of one node.
struct Frame {
    prel: i32,
    depth: i32,
    children: Vec<i32>,
    size: i32,
    lld: i32,
    rld: i32,
    lld_postl: i32,
    height: i32,
    desc_sum: i64,
    kr_sum_acc: i64,
    rev_kr_sum_acc: i64,
    first_child_size: i32,
    last_child_size: i32,
    del_sum: f64,
    ins_sum: f64,
}

impl TedIndex {
    pub fn with_cost_model(
        tree: &ParsedTree,
        label_dict: &LabelDictionary,
        costs: &impl CostModel,
    ) -> Self {
        let n = tree.count();
        assert!(n > 0, "cannot index an empty tree");

        let mut idx = Self {
            c: ConstantsIndex { tree_size: n },
            dict_tag: label_dict.tag(),
            prel_to_label_id: vec![0; n],
            postl_to_label_id: vec![0; n],
            postr_to_label_id: vec![0; n],
            prel_to_size: vec![0; n],
            prel_to_parent: vec![-1; n],
            prel_to_children: vec![Vec::new(); n],
            prel_to_depth: vec![0; n],
            prel_to_lld: vec![0; n],
            prel_to_rld: vec![0; n],
            postl_to_lld: vec![0; n],
            postr_to_rld: vec![0; n],
            postl_to_parent: vec![-1; n],
            postl_to_size: vec![0; n],
            postl_to_depth: vec![0; n],
            postl_to_height: vec![0; n],
            kr: Vec::new(),
            rkr: Vec::new(),
            prel_to_postl: vec![0; n],
            postl_to_prel: vec![0; n],
            prel_to_prer: vec![0; n],
            prer_to_prel: vec![0; n],
            prel_to_desc_sum: vec![0; n],
            prel_to_kr_sum: vec![0; n],
            prel_to_rev_kr_sum: vec![0; n],
            prel_to_subtree_del_cost: vec![0.0; n],
            prel_to_subtree_ins_cost: vec![0.0; n],
        };

        let Some(root) = tree.iter().next() else {
            unreachable!("tree is not empty");
        };
        let root_id = tree.get_node_id(root).expect("Root ID not found!");

        let mut frames: Vec<Frame> = Vec::with_capacity(64);
        let mut pre_counter: i32 = 0;
        let mut post_counter: i32 = 0;

        for edge in root_id.traverse(tree) {
            match edge {
                NodeEdge::Start(nid) => {
                    let prel = pre_counter;
                    pre_counter += 1;
                    let label = *tree.get(nid).unwrap().get();
                    idx.prel_to_label_id[prel as usize] = label;
                    let (parent, depth) = match frames.last() {
                        Some(pf) => (pf.prel, pf.depth + 1),
                        None => (-1, 0),
                    };
                    idx.prel_to_parent[prel as usize] = parent;
                    idx.prel_to_depth[prel as usize] = depth;
                    frames.push(Frame {
                        prel,
                        depth,
                        children: Vec::new(),
                        size: 1,
                        lld: prel,
                        rld: prel,
                        lld_postl: -1,
                        height: 0,
                        desc_sum: 0,
                        kr_sum_acc: 0,
                        rev_kr_sum_acc: 0,
                        first_child_size: 0,
                        last_child_size: 0,
                        del_sum: 0.0,
                        ins_sum: 0.0,
                    });
                }
                NodeEdge::End(_) => {
                    let f = frames.pop().expect("traversal imbalance");
                    let postl = post_counter;
                    post_counter += 1;
                    let prel = f.prel as usize;
                    let label = idx.prel_to_label_id[prel];

                    let lld_postl = if f.children.is_empty() { postl } else { f.lld_postl };
                    let size = f.size as i64;
                    let kr_sum = size + f.kr_sum_acc - f.first_child_size as i64;
                    let rev_kr_sum = size + f.rev_kr_sum_acc - f.last_child_size as i64;
                    let del_sum = f.del_sum + costs.del(label);
                    let ins_sum = f.ins_sum + costs.ins(label);

                    idx.prel_to_postl[prel] = postl;
                    idx.postl_to_prel[postl as usize] = f.prel;
                    idx.prel_to_size[prel] = f.size;
                    idx.prel_to_lld[prel] = f.lld;
                    idx.prel_to_rld[prel] = f.rld;
                    idx.postl_to_lld[postl as usize] = lld_postl;
                    idx.postl_to_size[postl as usize] = f.size;
                    idx.postl_to_depth[postl as usize] = f.depth;
                    idx.postl_to_height[postl as usize] = f.height;
                    idx.prel_to_desc_sum[prel] = f.desc_sum;
                    idx.prel_to_kr_sum[prel] = kr_sum;
                    idx.prel_to_rev_kr_sum[prel] = rev_kr_sum;
                    idx.prel_to_subtree_del_cost[prel] = del_sum;
                    idx.prel_to_subtree_ins_cost[prel] = ins_sum;
                    idx.prel_to_children[prel] = f.children;

                    if let Some(pf) = frames.last_mut() {
                        if pf.children.is_empty() {
                            pf.lld = idx.prel_to_lld[prel];
                            pf.lld_postl = lld_postl;
                            pf.first_child_size = f.size;
                        }
                        pf.rld = idx.prel_to_rld[prel];
                        pf.last_child_size = f.size;
                        pf.size += f.size;
                        pf.height = pf.height.max(f.height + 1);
                        pf.desc_sum += idx.prel_to_desc_sum[prel] + size;
                        pf.kr_sum_acc += kr_sum;
                        pf.rev_kr_sum_acc += rev_kr_sum;
                        pf.del_sum += del_sum;
                        pf.ins_sum += ins_sum;
                        pf.children.push(f.prel);
                    }
                }
            }
        }

        debug_assert_eq!(pre_counter as usize, n);
        debug_assert_eq!(post_counter as usize, n);

        for postl in 0..n {
            let prel = idx.postl_to_prel[postl] as usize;
            idx.postl_to_label_id[postl] = idx.prel_to_label_id[prel];
            let parent = idx.prel_to_parent[prel];
            idx.postl_to_parent[postl] = if parent < 0 {
                -1
            } else {
                idx.prel_to_postl[parent as usize]
            };
        }

        for prel in 0..n {
            let prer = n as i32 - 1 - idx.prel_to_postl[prel];
            idx.prel_to_prer[prel] = prer;
            idx.prer_to_prel[prer as usize] = prel as i32;
        }

        for postr in 0..n {
            let prel = n - 1 - postr;
            idx.postr_to_label_id[postr] = idx.prel_to_label_id[prel];
            idx.postr_to_rld[postr] = n as i32 - 1 - idx.prel_to_rld[prel];
        }

        idx.kr = collect_keyroots(&idx.postl_to_lld);
        idx.rkr = collect_keyroots(&idx.postr_to_rld);

        idx
    }

    /// Preorder id of a node given in right-to-left postorder.
    #[inline]
    pub fn postr_to_prel(&self, postr: i32) -> i32 {
        self.c.tree_size as i32 - 1 - postr
    }

    /// Right-to-left postorder id of a node given in preorder.
    #[inline]
    pub fn prel_to_postr(&self, prel: i32) -> i32 {
        self.c.tree_size as i32 - 1 - prel
    }
}

/// Nodes whose leaf descendant differs from their parent's, ascending. Works
/// for both orientations: feed `postl_to_lld` or `postr_to_rld`.
fn collect_keyroots(to_leaf: &[i32]) -> Vec<i32> {
    let n = to_leaf.len();
    let mut seen = vec![false; n];
    let mut kr = Vec::new();
    for i in (0..n).rev() {
        let leaf = to_leaf[i] as usize;
        if !seen[leaf] {
            seen[leaf] = true;
            kr.push(i as i32);
        }
    }
    kr.reverse();
    kr
}

impl Indexer for TedIndex {
    fn index_tree(tree: &ParsedTree, label_dict: &LabelDictionary) -> Self {
        Self::with_cost_model(tree, label_dict, &UnitCostModel)
    }
}
