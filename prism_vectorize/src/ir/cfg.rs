//! Control flow graph, dominator tree and natural loops.
//!
//! All three are snapshots of a [`Function`]; rebuild them after any change
//! to the block structure.

use std::collections::VecDeque;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use super::arena::BitSet;
use super::function::Function;
use super::instruction::BlockId;

// =============================================================================
// CFG
// =============================================================================

/// Successor and predecessor lists of the blocks reachable from entry.
#[derive(Debug, Clone)]
pub struct Cfg {
    pub entry: BlockId,
    succs: Vec<SmallVec<[BlockId; 2]>>,
    preds: Vec<SmallVec<[BlockId; 4]>>,
    /// Reachable blocks in reverse postorder.
    rpo: Vec<BlockId>,
    /// Postorder number per block; `u32::MAX` if unreachable.
    postorder: Vec<u32>,
}

impl Cfg {
    pub fn build(func: &Function) -> Self {
        let n = func.blocks.len();
        let mut cfg = Cfg {
            entry: func.entry,
            succs: vec![SmallVec::new(); n],
            preds: vec![SmallVec::new(); n],
            rpo: Vec::with_capacity(n),
            postorder: vec![u32::MAX; n],
        };

        // Iterative DFS; a block is numbered once all successors are done.
        let mut visited = BitSet::with_capacity(n);
        let mut order = Vec::with_capacity(n);
        let mut stack: Vec<(BlockId, usize)> = vec![(func.entry, 0)];
        visited.insert(func.entry.as_usize());
        while let Some((block, next)) = stack.pop() {
            let succs = func.successors(block);
            if next < succs.len() {
                stack.push((block, next + 1));
                let succ = succs[next];
                if visited.insert(succ.as_usize()) {
                    stack.push((succ, 0));
                }
            } else {
                cfg.postorder[block.as_usize()] = order.len() as u32;
                order.push(block);
            }
        }

        for &block in &order {
            for succ in func.successors(block) {
                cfg.succs[block.as_usize()].push(succ);
                if !cfg.preds[succ.as_usize()].contains(&block) {
                    cfg.preds[succ.as_usize()].push(block);
                }
            }
        }
        // Deterministic predecessor order: layout order.
        let rank: FxHashMap<BlockId, usize> =
            func.layout.iter().enumerate().map(|(i, &b)| (b, i)).collect();
        for preds in cfg.preds.iter_mut() {
            preds.sort_by_key(|b| rank.get(b).copied().unwrap_or(usize::MAX));
        }

        order.reverse();
        cfg.rpo = order;
        cfg
    }

    #[inline]
    pub fn succs(&self, block: BlockId) -> &[BlockId] {
        &self.succs[block.as_usize()]
    }

    #[inline]
    pub fn preds(&self, block: BlockId) -> &[BlockId] {
        &self.preds[block.as_usize()]
    }

    #[inline]
    pub fn rpo(&self) -> &[BlockId] {
        &self.rpo
    }

    #[inline]
    fn postorder_number(&self, block: BlockId) -> u32 {
        self.postorder[block.as_usize()]
    }

    /// Number of block slots (live or dead).
    #[inline]
    pub fn capacity(&self) -> usize {
        self.succs.len()
    }
}

// =============================================================================
// Dominator Tree
// =============================================================================

/// Immediate dominators, computed with the Cooper-Harvey-Kennedy iteration.
#[derive(Debug, Clone)]
pub struct DominatorTree {
    idom: Vec<BlockId>,
    entry: BlockId,
}

impl DominatorTree {
    pub fn build(cfg: &Cfg) -> Self {
        let mut idom = vec![BlockId::INVALID; cfg.capacity()];
        idom[cfg.entry.as_usize()] = cfg.entry;

        let mut changed = true;
        while changed {
            changed = false;
            for &block in cfg.rpo().iter().skip(1) {
                let mut new_idom = BlockId::INVALID;
                for &pred in cfg.preds(block) {
                    if !idom[pred.as_usize()].is_valid() {
                        continue;
                    }
                    new_idom = if new_idom.is_valid() {
                        Self::intersect(&idom, cfg, pred, new_idom)
                    } else {
                        pred
                    };
                }
                if new_idom.is_valid() && idom[block.as_usize()] != new_idom {
                    idom[block.as_usize()] = new_idom;
                    changed = true;
                }
            }
        }

        DominatorTree {
            idom,
            entry: cfg.entry,
        }
    }

    fn intersect(idom: &[BlockId], cfg: &Cfg, mut a: BlockId, mut b: BlockId) -> BlockId {
        while a != b {
            while cfg.postorder_number(a) < cfg.postorder_number(b) {
                a = idom[a.as_usize()];
            }
            while cfg.postorder_number(b) < cfg.postorder_number(a) {
                b = idom[b.as_usize()];
            }
        }
        a
    }

    /// Immediate dominator; `None` for the entry and unreachable blocks.
    pub fn idom(&self, block: BlockId) -> Option<BlockId> {
        let d = *self.idom.get(block.as_usize())?;
        (d.is_valid() && block != self.entry).then_some(d)
    }

    /// Whether `a` dominates `b` (reflexive).
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        if a == b {
            return true;
        }
        let mut current = b;
        while let Some(up) = self.idom(current) {
            if up == a {
                return true;
            }
            current = up;
        }
        false
    }
}

// =============================================================================
// Loop Analysis
// =============================================================================

/// A natural loop.
#[derive(Debug, Clone)]
pub struct Loop {
    pub header: BlockId,
    /// Sources of back edges to the header.
    pub latches: SmallVec<[BlockId; 2]>,
    /// Blocks of the loop including the header, sorted by id.
    pub body: Vec<BlockId>,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    /// 1 for outermost loops.
    pub depth: u32,
}

impl Loop {
    #[inline]
    pub fn contains(&self, block: BlockId) -> bool {
        self.body.binary_search(&block).is_ok()
    }

    #[inline]
    pub fn is_innermost(&self) -> bool {
        self.children.is_empty()
    }
}

/// All natural loops of a function.
#[derive(Debug, Clone, Default)]
pub struct LoopAnalysis {
    pub loops: Vec<Loop>,
    header_to_loop: FxHashMap<BlockId, usize>,
}

impl LoopAnalysis {
    pub fn compute(cfg: &Cfg, dom: &DominatorTree) -> Self {
        let mut analysis = LoopAnalysis::default();

        for &block in cfg.rpo() {
            for &succ in cfg.succs(block) {
                if dom.dominates(succ, block) {
                    analysis.add_back_edge(succ, block, cfg);
                }
            }
        }
        analysis.compute_nesting();
        analysis
    }

    fn add_back_edge(&mut self, header: BlockId, latch: BlockId, cfg: &Cfg) {
        let idx = match self.header_to_loop.get(&header) {
            Some(&idx) => idx,
            None => {
                let idx = self.loops.len();
                self.loops.push(Loop {
                    header,
                    latches: SmallVec::new(),
                    body: vec![header],
                    parent: None,
                    children: Vec::new(),
                    depth: 1,
                });
                self.header_to_loop.insert(header, idx);
                idx
            }
        };

        let lp = &mut self.loops[idx];
        if !lp.latches.contains(&latch) {
            lp.latches.push(latch);
        }

        let mut body = BitSet::with_capacity(cfg.capacity());
        for &b in &lp.body {
            body.insert(b.as_usize());
        }
        let mut worklist = VecDeque::from([latch]);
        while let Some(block) = worklist.pop_front() {
            if body.insert(block.as_usize()) {
                worklist.extend(cfg.preds(block).iter().copied());
            }
        }
        lp.body = body.iter().map(|i| BlockId::new(i as u32)).collect();
    }

    fn compute_nesting(&mut self) {
        let n = self.loops.len();
        for i in 0..n {
            let header = self.loops[i].header;
            let parent = (0..n)
                .filter(|&j| j != i && self.loops[j].contains(header))
                .min_by_key(|&j| self.loops[j].body.len());
            if let Some(p) = parent {
                self.loops[i].parent = Some(p);
                self.loops[p].children.push(i);
            }
        }
        for i in 0..n {
            let mut depth = 1;
            let mut current = self.loops[i].parent;
            while let Some(p) = current {
                depth += 1;
                current = self.loops[p].parent;
            }
            self.loops[i].depth = depth;
        }
    }

    pub fn loop_for_header(&self, header: BlockId) -> Option<&Loop> {
        self.header_to_loop.get(&header).map(|&i| &self.loops[i])
    }

    pub fn len(&self) -> usize {
        self.loops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loops.is_empty()
    }
}
