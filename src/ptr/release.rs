//! Cycle-breaking release
//!
//! Dropping a strong handle while other strong handles exist may be
//! the moment a cycle loses its last external holder. Walk the
//! subgraph under the payload, count how often each object is met,
//! and compare with its strong count:
//!
//! - root: every strong reference must have been met (the dropped
//!   handle itself counts as one)
//! - any other object held from outside (strong > met) must not lead
//!   back to the root
//!
//! When both hold the root is released outright, which cascades
//! through the rest of the cycle. Otherwise the drop is an ordinary
//! decrement.

use super::block::RefBlock;
use crate::logging::{log_cycle_release, trace};
use crate::visit::{walker, Edge, VisitPolicy};
use smallvec::SmallVec;
use std::collections::HashMap;
use std::ptr::NonNull;

const ROOT: usize = 0;

/// One object met during the walk
#[derive(Debug)]
struct RefNode {
    declared: u16,
    reachable: u32,
    children: SmallVec<[usize; 4]>,
}

/// Arena of nodes indexed by discovery order; node 0 is the root
#[derive(Debug)]
pub(crate) struct RefTree {
    nodes: Vec<RefNode>,
    index: HashMap<*const RefBlock, usize>,
}

impl RefTree {
    fn new(root: &RefBlock) -> Self {
        let mut index = HashMap::with_capacity(16);
        index.insert(root as *const RefBlock, ROOT);

        Self {
            nodes: vec![RefNode {
                declared: root.strong(),
                reachable: 1,
                children: SmallVec::new(),
            }],
            index,
        }
    }

    fn record(&mut self, edge: &Edge<'_>) {
        let target = edge.target_block() as *const RefBlock;
        let declared = edge.strong_count();

        let next = self.nodes.len();
        let child = *self.index.entry(target).or_insert(next);
        if child == next {
            self.nodes.push(RefNode {
                declared,
                reachable: 0,
                children: SmallVec::new(),
            });
        }
        self.nodes[child].reachable += 1;

        let parent = edge
            .parent_block()
            .and_then(|p| self.index.get(&(p as *const RefBlock)).copied())
            .unwrap_or(ROOT);
        let children = &mut self.nodes[parent].children;
        if !children.contains(&child) {
            children.push(child);
        }
    }

    fn reaches(&self, from: usize, target: usize) -> bool {
        let mut visited = vec![false; self.nodes.len()];
        let mut stack: SmallVec<[usize; 16]> = SmallVec::new();
        stack.push(from);
        visited[from] = true;

        while let Some(node) = stack.pop() {
            for &child in &self.nodes[node].children {
                if child == target {
                    return true;
                }
                if !visited[child] {
                    visited[child] = true;
                    stack.push(child);
                }
            }
        }

        false
    }

    /// Whether no strong reference from outside the subgraph keeps
    /// the root alive, directly or through another member
    fn is_self_contained(&self) -> bool {
        for (i, node) in self.nodes.iter().enumerate() {
            if i == ROOT {
                if u32::from(node.declared) != node.reachable {
                    return false;
                }
            } else if u32::from(node.declared) > node.reachable && self.reaches(i, ROOT) {
                return false;
            }
        }
        true
    }

    fn len(&self) -> usize {
        self.nodes.len()
    }
}

/// Whether releasing one strong reference to `root` may release the
/// whole subgraph under it
pub(crate) fn can_release_subgraph(root: NonNull<RefBlock>) -> bool {
    let root_block = unsafe { root.as_ref() };
    let mut tree = RefTree::new(root_block);

    let entered = walker::walk_block(root, VisitPolicy::RELEASE, |edge| {
        tree.record(edge);
        true
    });

    if !entered {
        trace!(event = "release_opaque_root", type_name = root_block.type_name());
        return false;
    }

    let contained = tree.is_self_contained();
    if contained {
        log_cycle_release(root_block.type_name(), tree.len());
    } else {
        trace!(
            event = "release_held",
            type_name = root_block.type_name(),
            strong = root_block.strong(),
            objects = tree.len()
        );
    }
    contained
}

/// Give up one strong reference held on `block`.
///
/// # Safety
///
/// The caller owns one strong count on `block` and one handle count
/// that keeps it allocated for the duration of the call.
pub(crate) unsafe fn release_strong(block: NonNull<RefBlock>) {
    let b = block.as_ref();

    match b.strong() {
        // Already destroyed as part of a released cycle
        0 => {}
        1 => b.destroy(),
        _ => {
            if can_release_subgraph(block) {
                b.destroy();
            } else {
                b.decrement_strong();
            }
        }
    }
}

#[cfg(test)]
impl RefTree {
    /// Test helper: build a tree from explicit counts and edges
    fn from_parts(counts: &[(u16, u32)], edges: &[(usize, usize)]) -> Self {
        let mut tree = Self {
            nodes: counts
                .iter()
                .map(|&(declared, reachable)| RefNode {
                    declared,
                    reachable,
                    children: SmallVec::new(),
                })
                .collect(),
            index: HashMap::new(),
        };
        for &(from, to) in edges {
            tree.nodes[from].children.push(to);
        }
        tree
    }
}
