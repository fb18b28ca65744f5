// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information

//! control flow graph with dominator and post-dominator trees

use fixedbitset::FixedBitSet;
use hashbrown::HashMap;
use hashbrown::HashSet;
use petgraph::algo::dominators;
use petgraph::graph::IndexType;
use petgraph::prelude::*;
use petgraph::visit::DfsPostOrder;
use petgraph::visit::Reversed;
use shader_compiler_ir::Block;
use shader_compiler_ir::Function;
use shader_compiler_ir::Handle;
use shader_compiler_ir::InstructionKind;
use std::ops;

/// index type of `CFGGraph`
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default)]
#[repr(transparent)]
pub struct CFGIndexType(u32);

unsafe impl IndexType for CFGIndexType {
    fn new(v: usize) -> Self {
        CFGIndexType(v as _)
    }
    fn index(&self) -> usize {
        self.0 as _
    }
    fn max() -> Self {
        CFGIndexType(u32::max_value())
    }
}

/// node index of `CFGGraph`
pub type CFGNodeIndex = NodeIndex<CFGIndexType>;

/// a node of the `CFG`
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum CFGNode {
    /// a basic block of the function
    Block(Handle<Block>),
    /// the virtual exit node every returning block branches to
    Exit,
}

impl CFGNode {
    /// the block, if `self` isn't the exit node
    pub fn block(self) -> Option<Handle<Block>> {
        match self {
            CFGNode::Block(block) => Some(block),
            CFGNode::Exit => None,
        }
    }
}

/// the underlying graph of a `CFG`
pub type CFGGraph = DiGraph<CFGNode, (), CFGIndexType>;

/// dominator tree of a `CFGGraph`
pub type CFGDominators = dominators::Dominators<CFGNodeIndex>;

/// snapshot of a function's control flow graph
#[derive(Clone, Debug)]
pub struct CFG {
    graph: CFGGraph,
    block_to_node_index_map: HashMap<Handle<Block>, CFGNodeIndex>,
    exit: CFGNodeIndex,
    dominators: CFGDominators,
    post_dominators: CFGDominators,
    reverse_postorder: Vec<Handle<Block>>,
    reverse_postorder_indexes: HashMap<Handle<Block>, usize>,
}

impl ops::Deref for CFG {
    type Target = CFGGraph;
    fn deref(&self) -> &Self::Target {
        &self.graph
    }
}

impl CFG {
    /// build the graph of the blocks in `function`'s layout.
    /// blocks ending in `return`, `unreachable` or without a terminator
    /// branch to the virtual exit node.
    pub fn new(function: &Function) -> CFG {
        let mut graph = CFGGraph::default();
        let mut block_to_node_index_map = HashMap::new();
        for &block in function.layout() {
            block_to_node_index_map.insert(block, graph.add_node(CFGNode::Block(block)));
        }
        let exit = graph.add_node(CFGNode::Exit);
        let mut successors_set = HashSet::new();
        for &block in function.layout() {
            let node_index = block_to_node_index_map[&block];
            let terminator = function
                .terminator(block)
                .map(|terminator| &function.instructions[terminator].kind);
            match terminator {
                Some(InstructionKind::Branch { .. }) | Some(InstructionKind::CondBranch { .. }) => {
                    successors_set.clear();
                    for successor in function.successors(block) {
                        // remove duplicates
                        if !successors_set.insert(successor) {
                            continue;
                        }
                        if let Some(&successor) = block_to_node_index_map.get(&successor) {
                            graph.add_edge(node_index, successor, ());
                        }
                    }
                }
                _ => {
                    graph.add_edge(node_index, exit, ());
                }
            }
        }
        let entry = function
            .entry_block()
            .map_or(exit, |entry| block_to_node_index_map[&entry]);
        let dominators = dominators::simple_fast(&graph, entry);
        let post_dominators = dominators::simple_fast(Reversed(&graph), exit);
        let mut reverse_postorder = Vec::new();
        let mut dfs = DfsPostOrder::new(&graph, entry);
        while let Some(node_index) = dfs.next(&graph) {
            if let CFGNode::Block(block) = graph[node_index] {
                reverse_postorder.push(block);
            }
        }
        reverse_postorder.reverse();
        let reverse_postorder_indexes = reverse_postorder
            .iter()
            .enumerate()
            .map(|(index, &block)| (block, index))
            .collect();
        CFG {
            graph,
            block_to_node_index_map,
            exit,
            dominators,
            post_dominators,
            reverse_postorder,
            reverse_postorder_indexes,
        }
    }
    /// the node of `block`, `None` if `block` isn't in the layout
    pub fn node_index(&self, block: Handle<Block>) -> Option<CFGNodeIndex> {
        self.block_to_node_index_map.get(&block).copied()
    }
    /// the blocks reachable from the entry block, in reverse postorder
    pub fn reverse_postorder(&self) -> &[Handle<Block>] {
        &self.reverse_postorder
    }
    /// the position of `block` in `reverse_postorder`, `None` if unreachable
    pub fn reverse_postorder_index(&self, block: Handle<Block>) -> Option<usize> {
        self.reverse_postorder_indexes.get(&block).copied()
    }
    /// returns `true` if `block` is reachable from the entry block
    pub fn is_reachable(&self, block: Handle<Block>) -> bool {
        self.reverse_postorder_indexes.contains_key(&block)
    }
    /// distinct predecessor blocks of `block`
    pub fn predecessors<'a>(
        &'a self,
        block: Handle<Block>,
    ) -> impl Iterator<Item = Handle<Block>> + 'a {
        self.node_index(block)
            .into_iter()
            .flat_map(move |node_index| self.graph.neighbors_directed(node_index, Incoming))
            .filter_map(move |node_index| self.graph[node_index].block())
    }
    /// distinct successor blocks of `block`
    pub fn successors<'a>(
        &'a self,
        block: Handle<Block>,
    ) -> impl Iterator<Item = Handle<Block>> + 'a {
        self.node_index(block)
            .into_iter()
            .flat_map(move |node_index| self.graph.neighbors_directed(node_index, Outgoing))
            .filter_map(move |node_index| self.graph[node_index].block())
    }
    /// the immediate dominator of `block`, `None` for the entry and unreachable blocks
    pub fn immediate_dominator(&self, block: Handle<Block>) -> Option<Handle<Block>> {
        self.node_index(block)
            .and_then(|node_index| self.dominators.immediate_dominator(node_index))
            .and_then(|node_index| self.graph[node_index].block())
    }
    /// the immediate post-dominator of `block`; `Some(CFGNode::Exit)` when only
    /// the virtual exit post-dominates it and `None` when `block` can't reach the exit
    pub fn immediate_post_dominator(&self, block: Handle<Block>) -> Option<CFGNode> {
        self.node_index(block)
            .and_then(|node_index| self.post_dominators.immediate_dominator(node_index))
            .map(|node_index| self.graph[node_index])
    }
    /// the blocks whose execution depends on the branch at the end of `block`:
    /// everything reachable from `block`'s successors without passing through
    /// `block`'s immediate post-dominator.
    ///
    /// the returned set is indexed by `CFGNodeIndex`
    pub fn influence_region(&self, block: Handle<Block>) -> FixedBitSet {
        let mut region = FixedBitSet::with_capacity(self.graph.node_count());
        let node_index = match self.node_index(block) {
            Some(node_index) => node_index,
            None => return region,
        };
        let stop = self.post_dominators.immediate_dominator(node_index);
        let mut stack: Vec<_> = self
            .graph
            .neighbors_directed(node_index, Outgoing)
            .collect();
        while let Some(node_index) = stack.pop() {
            if Some(node_index) == stop || node_index == self.exit {
                continue;
            }
            if region.put(node_index.index()) {
                continue;
            }
            stack.extend(self.graph.neighbors_directed(node_index, Outgoing));
        }
        region
    }
    /// the blocks in `region`, a set returned by `influence_region`
    pub fn region_blocks<'a>(
        &'a self,
        region: &'a FixedBitSet,
    ) -> impl Iterator<Item = Handle<Block>> + 'a {
        region
            .ones()
            .filter_map(move |index| self.graph[CFGNodeIndex::new(index)].block())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shader_compiler_ir::prelude::*;

    /// build a function with one block per template entry;
    /// blocks branch on a per-invocation flag when they have two successors
    fn build_function(blocks: &[(&str, &[&str])]) -> Function {
        let mut function = Function::new(
            "cfg_test",
            FunctionKind::Kernel,
            vec![Argument::new("flag", Type::BOOL, ArgumentKind::PerInvocation)],
            Type::Void,
        );
        let handles: HashMap<&str, Handle<Block>> = blocks
            .iter()
            .map(|&(name, _)| (name, function.add_block(name)))
            .collect();
        for &(name, successors) in blocks {
            let mut builder = Builder::new(&mut function, handles[name]);
            match *successors {
                [] => {
                    builder.ret(None);
                }
                [target] => {
                    builder.branch(handles[target]);
                }
                [true_target, false_target] => {
                    builder.cond_branch(
                        Value::Argument(0),
                        handles[true_target],
                        handles[false_target],
                    );
                }
                _ => unreachable!(),
            }
        }
        function
    }

    #[derive(Debug)]
    struct CFGTemplateBlock<'a> {
        name: &'a str,
        immediate_dominator: Option<&'a str>,
        /// `None` for the virtual exit
        immediate_post_dominator: Option<&'a str>,
        influence_region: &'a [&'a str],
    }

    fn test_cfg(blocks: &[(&str, &[&str])], template: &[CFGTemplateBlock]) {
        let function = build_function(blocks);
        println!("{}", function);
        let cfg = CFG::new(&function);
        let name = |block: Handle<Block>| function.blocks[block].name.as_str();
        let by_name: HashMap<&str, Handle<Block>> = function
            .layout()
            .iter()
            .map(|&block| (name(block), block))
            .collect();
        for &CFGTemplateBlock {
            name: block_name,
            immediate_dominator,
            immediate_post_dominator,
            influence_region,
        } in template
        {
            let block = by_name[block_name];
            assert_eq!(
                cfg.immediate_dominator(block).map(name),
                immediate_dominator,
                "block: {}",
                block_name
            );
            let actual_post_dominator = match cfg.immediate_post_dominator(block) {
                Some(CFGNode::Block(post_dominator)) => Some(name(post_dominator)),
                Some(CFGNode::Exit) => None,
                None => panic!("block {} can't reach the exit", block_name),
            };
            assert_eq!(
                actual_post_dominator, immediate_post_dominator,
                "block: {}",
                block_name
            );
            let region = cfg.influence_region(block);
            let mut actual_region: Vec<_> = cfg.region_blocks(&region).map(name).collect();
            actual_region.sort();
            let mut expected_region = influence_region.to_vec();
            expected_region.sort();
            assert_eq!(actual_region, expected_region, "block: {}", block_name);
        }
    }

    #[test]
    fn test_cfg_return() {
        test_cfg(
            &[("entry", &[])],
            &[CFGTemplateBlock {
                name: "entry",
                immediate_dominator: None,
                immediate_post_dominator: None,
                influence_region: &[],
            }],
        );
    }

    #[test]
    fn test_cfg_diamond() {
        test_cfg(
            &[
                ("entry", &["left", "right"]),
                ("left", &["join"]),
                ("right", &["join"]),
                ("join", &[]),
            ],
            &[
                CFGTemplateBlock {
                    name: "entry",
                    immediate_dominator: None,
                    immediate_post_dominator: Some("join"),
                    influence_region: &["left", "right"],
                },
                CFGTemplateBlock {
                    name: "left",
                    immediate_dominator: Some("entry"),
                    immediate_post_dominator: Some("join"),
                    influence_region: &[],
                },
                CFGTemplateBlock {
                    name: "join",
                    immediate_dominator: Some("entry"),
                    immediate_post_dominator: None,
                    influence_region: &[],
                },
            ],
        );
    }

    #[test]
    fn test_cfg_loop() {
        test_cfg(
            &[
                ("entry", &["header"]),
                ("header", &["body", "exit"]),
                ("body", &["header"]),
                ("exit", &[]),
            ],
            &[
                CFGTemplateBlock {
                    name: "header",
                    immediate_dominator: Some("entry"),
                    immediate_post_dominator: Some("exit"),
                    influence_region: &["header", "body"],
                },
                CFGTemplateBlock {
                    name: "body",
                    immediate_dominator: Some("header"),
                    immediate_post_dominator: Some("header"),
                    influence_region: &[],
                },
            ],
        );
    }

    #[test]
    fn test_cfg_self_loop() {
        test_cfg(
            &[("entry", &["loop"]), ("loop", &["loop", "exit"]), ("exit", &[])],
            &[CFGTemplateBlock {
                name: "loop",
                immediate_dominator: Some("entry"),
                immediate_post_dominator: Some("exit"),
                influence_region: &["loop"],
            }],
        );
    }

    #[test]
    fn test_cfg_infinite_loop_region_is_everything_reachable() {
        let function = build_function(&[
            ("entry", &["spin", "exit"]),
            ("spin", &["spin", "spin2"]),
            ("spin2", &["spin"]),
            ("exit", &[]),
        ]);
        let cfg = CFG::new(&function);
        let spin = function.layout()[1];
        let spin2 = function.layout()[2];
        assert_eq!(cfg.immediate_post_dominator(spin), None);
        let region = cfg.influence_region(spin);
        let mut blocks: Vec<_> = cfg.region_blocks(&region).collect();
        blocks.sort();
        assert_eq!(blocks, vec![spin, spin2]);
    }

    #[test]
    fn test_reverse_postorder_and_predecessors() {
        let function = build_function(&[
            ("entry", &["left", "right"]),
            ("left", &["join"]),
            ("right", &["join"]),
            ("join", &[]),
            ("dead", &["join"]),
        ]);
        let cfg = CFG::new(&function);
        let layout = function.layout();
        let (entry, left, right, join, dead) =
            (layout[0], layout[1], layout[2], layout[3], layout[4]);
        let rpo = cfg.reverse_postorder();
        assert_eq!(rpo.len(), 4);
        assert_eq!(rpo[0], entry);
        assert_eq!(rpo[3], join);
        assert!(!cfg.is_reachable(dead));
        let mut predecessors: Vec<_> = cfg.predecessors(join).collect();
        predecessors.sort();
        assert_eq!(predecessors, vec![left, right, dead]);
        assert_eq!(cfg.immediate_dominator(join), Some(entry));
        assert_eq!(cfg.immediate_dominator(left), Some(entry));
        assert_eq!(cfg.successors(entry).count(), 2);
        assert!(cfg.reverse_postorder_index(right).is_some());
    }
}
