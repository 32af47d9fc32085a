//! Dependency graph over a batch of issues.
//!
//! Parent → children adjacency built from a flat list. Provides creation
//! order (parents first), cycle detection, depth and subtree expansion.
//! All traversals use explicit stacks so deep chains cannot exhaust the
//! call stack.

use crate::error::StructuralError;
use crate::types::Item;
use std::collections::HashMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Visit {
    InProgress,
    Done,
}

#[derive(Clone, Debug)]
pub struct IssueGraph {
    items: HashMap<String, Item>,
    /// Ids in input order.
    order: Vec<String>,
    /// `None` is the root sentinel.
    children: HashMap<Option<String>, Vec<String>>,
}

impl IssueGraph {
    /// Build the adjacency map. Sibling order follows input order.
    pub fn new(items: Vec<Item>) -> Result<Self, StructuralError> {
        let mut map = HashMap::with_capacity(items.len());
        let mut order = Vec::with_capacity(items.len());
        let mut children: HashMap<Option<String>, Vec<String>> = HashMap::new();

        for item in items {
            if map.contains_key(&item.id) {
                return Err(StructuralError::DuplicateId(item.id));
            }
            children
                .entry(item.parent_id.clone())
                .or_default()
                .push(item.id.clone());
            order.push(item.id.clone());
            map.insert(item.id.clone(), item);
        }

        Ok(Self {
            items: map,
            order,
            children,
        })
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Item> {
        self.items.get(id)
    }

    /// Items in input order.
    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.order.iter().filter_map(|id| self.items.get(id))
    }

    /// Direct children of `parent` (`None` for roots).
    pub fn children(&self, parent: Option<&str>) -> &[String] {
        self.children
            .get(&parent.map(str::to_owned))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn roots(&self) -> &[String] {
        self.children(None)
    }

    /// Every non-null parent id must name an item in this batch.
    pub fn validate_references(&self) -> Result<(), StructuralError> {
        for id in &self.order {
            let item = &self.items[id];
            if let Some(parent_id) = &item.parent_id {
                if !self.items.contains_key(parent_id) {
                    return Err(StructuralError::orphaned(id, parent_id));
                }
            }
        }
        Ok(())
    }

    /// Order in which every parent precedes all of its descendants.
    ///
    /// Depth-first over the forest (roots first, then any id not yet reached,
    /// which is how cycles with no root above them are found). A visit that
    /// lands on an in-progress node is a cycle and aborts the sort.
    pub fn topological_sort(&self) -> Result<Vec<String>, StructuralError> {
        let mut state: HashMap<&str, Visit> = HashMap::with_capacity(self.order.len());
        let mut finished: Vec<&str> = Vec::with_capacity(self.order.len());

        let starts = self
            .roots()
            .iter()
            .chain(self.order.iter())
            .map(String::as_str);

        for start in starts {
            if state.contains_key(start) {
                continue;
            }
            state.insert(start, Visit::InProgress);
            let mut stack: Vec<(&str, usize)> = vec![(start, 0)];

            while let Some(frame) = stack.last_mut() {
                let node = frame.0;
                let kids = self.children(Some(node));
                match kids.get(frame.1) {
                    Some(child) => {
                        frame.1 += 1;
                        match state.get(child.as_str()) {
                            Some(Visit::InProgress) => {
                                return Err(StructuralError::cycle(child.as_str()));
                            }
                            Some(Visit::Done) => {}
                            None => {
                                state.insert(child.as_str(), Visit::InProgress);
                                stack.push((child.as_str(), 0));
                            }
                        }
                    }
                    None => {
                        state.insert(node, Visit::Done);
                        finished.push(node);
                        stack.pop();
                    }
                }
            }
        }

        finished.reverse();
        Ok(finished.into_iter().map(str::to_owned).collect())
    }

    /// Parent hops from `id` up to its root. Roots (and unknown ids) are 0.
    pub fn depth(&self, id: &str) -> usize {
        let mut depth = 0;
        let mut current = id;
        // Bounded so a cyclic (unvalidated) graph still terminates.
        while depth <= self.order.len() {
            let Some(item) = self.items.get(current) else { break };
            let Some(parent) = item.parent_id.as_deref() else { break };
            depth += 1;
            current = parent;
        }
        depth
    }

    /// Pre-order expansion of the subtree under `id`, excluding `id` itself.
    pub fn all_descendants(&self, id: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut stack: Vec<&str> = self
            .children(Some(id))
            .iter()
            .rev()
            .map(String::as_str)
            .collect();

        while let Some(node) = stack.pop() {
            if out.len() > self.order.len() {
                break;
            }
            out.push(node.to_owned());
            stack.extend(self.children(Some(node)).iter().rev().map(String::as_str));
        }
        out
    }
}
