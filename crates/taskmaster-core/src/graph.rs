//! In-memory dependency view over one workspace.

use std::collections::HashMap;

use crate::address::Address;
use crate::task::Workspace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    Gray,
    Black,
}

/// Nodes are every task and subtask address; edges are dependency entries
/// (`node -> prerequisite`). Node order follows the document.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    order: Vec<Address>,
    edges: HashMap<Address, Vec<Address>>,
}

impl DependencyGraph {
    pub fn from_workspace(ws: &Workspace) -> Self {
        let mut graph = DependencyGraph::default();
        for task in &ws.tasks {
            graph.add_node(task.address(), &task.dependencies);
            for subtask in &task.subtasks {
                graph.add_node(Address::subtask(task.id, subtask.id), &subtask.dependencies);
            }
        }
        graph
    }

    fn add_node(&mut self, addr: Address, deps: &[Address]) {
        if self.edges.contains_key(&addr) {
            return;
        }
        self.order.push(addr);
        self.edges.insert(addr, deps.to_vec());
    }

    pub fn nodes(&self) -> &[Address] {
        &self.order
    }

    pub fn exists(&self, addr: Address) -> bool {
        self.edges.contains_key(&addr)
    }

    pub fn has_edge(&self, from: Address, to: Address) -> bool {
        self.dependencies(from).contains(&to)
    }

    pub fn dependencies(&self, addr: Address) -> &[Address] {
        self.edges.get(&addr).map(Vec::as_slice).unwrap_or(&[])
    }

    /// True when `to` is reachable from `from` by following dependencies.
    pub fn reaches(&self, from: Address, to: Address) -> bool {
        let mut seen = vec![from];
        let mut pending = vec![from];
        while let Some(node) = pending.pop() {
            for dep in self.dependencies(node) {
                if *dep == to {
                    return true;
                }
                if !seen.contains(dep) {
                    seen.push(*dep);
                    pending.push(*dep);
                }
            }
        }
        false
    }

    /// Cycles found by a depth-first walk. Each cycle starts at the node whose
    /// re-entry closed it and lists nodes in dependency order, so every element
    /// depends on the next and the last depends on the first. Self-loops and
    /// dangling targets are skipped.
    pub fn cycles(&self) -> Vec<Vec<Address>> {
        let mut color: HashMap<Address, Color> = HashMap::new();
        let mut cycles = Vec::new();

        for start in &self.order {
            if color.contains_key(start) {
                continue;
            }
            color.insert(*start, Color::Gray);
            let mut stack: Vec<(Address, usize)> = vec![(*start, 0)];

            while let Some(&(node, next)) = stack.last() {
                let deps = self.dependencies(node);
                if next >= deps.len() {
                    color.insert(node, Color::Black);
                    stack.pop();
                    continue;
                }
                if let Some(top) = stack.last_mut() {
                    top.1 += 1;
                }
                let dep = deps[next];
                if dep == node || !self.exists(dep) {
                    continue;
                }
                match color.get(&dep) {
                    None => {
                        color.insert(dep, Color::Gray);
                        stack.push((dep, 0));
                    }
                    Some(Color::Gray) => {
                        if let Some(pos) = stack.iter().position(|(addr, _)| *addr == dep) {
                            cycles.push(stack[pos..].iter().map(|(addr, _)| *addr).collect());
                        }
                    }
                    Some(Color::Black) => {}
                }
            }
        }

        cycles
    }

    /// Replaces `old` with `new` in every dependency list and re-keys the node.
    /// A list that already holds `new` keeps a single entry.
    pub fn rewrite_address(&mut self, old: Address, new: Address) {
        if old == new {
            return;
        }
        for deps in self.edges.values_mut() {
            if !deps.contains(&old) {
                continue;
            }
            let mut rewritten = Vec::with_capacity(deps.len());
            let mut seen_new = false;
            for dep in deps.drain(..) {
                let dep = if dep == old { new } else { dep };
                if dep == new {
                    if seen_new {
                        continue;
                    }
                    seen_new = true;
                }
                rewritten.push(dep);
            }
            *deps = rewritten;
        }
        if let Some(deps) = self.edges.remove(&old) {
            if let Some(slot) = self.order.iter_mut().find(|addr| **addr == old) {
                *slot = new;
            }
            self.edges.insert(new, deps);
        }
    }

    /// Deletes `addr` and strips it from every dependency list.
    /// Returns the nodes that lost an edge.
    pub fn remove_address(&mut self, addr: Address) -> Vec<Address> {
        self.edges.remove(&addr);
        self.order.retain(|node| *node != addr);
        let mut touched = Vec::new();
        for node in &self.order {
            if let Some(deps) = self.edges.get_mut(node) {
                let before = deps.len();
                deps.retain(|dep| *dep != addr);
                if deps.len() != before {
                    touched.push(*node);
                }
            }
        }
        touched
    }

    pub fn remove_edge(&mut self, from: Address, to: Address) -> bool {
        match self.edges.get_mut(&from) {
            Some(deps) => {
                let before = deps.len();
                deps.retain(|dep| *dep != to);
                deps.len() != before
            }
            None => false,
        }
    }

    pub(crate) fn set_dependencies(&mut self, addr: Address, deps: Vec<Address>) {
        if let Some(slot) = self.edges.get_mut(&addr) {
            *slot = deps;
        }
    }

    /// Writes the graph's dependency lists back into `ws`.
    pub fn apply_to(&self, ws: &mut Workspace) {
        for task in &mut ws.tasks {
            if let Some(deps) = self.edges.get(&task.address()) {
                task.dependencies = deps.clone();
            }
            let parent = task.id;
            for subtask in &mut task.subtasks {
                if let Some(deps) = self.edges.get(&Address::subtask(parent, subtask.id)) {
                    subtask.dependencies = deps.clone();
                }
            }
        }
    }
}
