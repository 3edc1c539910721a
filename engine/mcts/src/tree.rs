//! Arena-allocated search tree.
//!
//! Nodes live in one contiguous `Vec` and refer to each other by index, so
//! selection never chases pointers, a search allocates and frees exactly
//! once, and the structure is trivially acyclic. The tree belongs to a
//! single search and is discarded with it; nothing persists between moves.

use game_core::Game;

use crate::node::{Node, NodeId};

#[derive(Debug)]
pub struct Tree<G: Game> {
    nodes: Vec<Node<G>>,
    root: NodeId,
}

impl<G: Game> Tree<G> {
    pub fn new(root_game: G) -> Self {
        Self {
            nodes: vec![Node::new_root(root_game)],
            root: NodeId(0),
        }
    }

    #[inline]
    pub fn root(&self) -> NodeId {
        self.root
    }

    #[inline]
    pub fn get(&self, id: NodeId) -> &Node<G> {
        &self.nodes[id.0 as usize]
    }

    #[inline]
    pub fn get_mut(&mut self, id: NodeId) -> &mut Node<G> {
        &mut self.nodes[id.0 as usize]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn allocate(&mut self, node: Node<G>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    /// Append a child to `parent`. Callers add children in ascending action
    /// order; selection and extraction rely on it for deterministic ties.
    pub fn add_child(
        &mut self,
        parent: NodeId,
        action: usize,
        prior: f32,
        game: G,
        terminal: bool,
        terminal_value: f32,
    ) -> NodeId {
        let child = Node::new_child(parent, action, prior, game, terminal, terminal_value);
        let child_id = self.allocate(child);
        self.get_mut(parent).children.push((action, child_id));
        child_id
    }

    /// Highest-PUCT child of `node`, ties resolved to the lowest action
    /// index by the strict comparison.
    pub fn select_child(&self, node: NodeId, exploration: f32) -> Option<NodeId> {
        let parent = self.get(node);
        let parent_visits_sqrt =
            ((parent.visits + parent.virtual_visits) as f32).sqrt();

        let mut best: Option<(f32, NodeId)> = None;
        for &(_, child_id) in &parent.children {
            let score = self
                .get(child_id)
                .puct_score(parent_visits_sqrt, exploration);
            match best {
                Some((best_score, _)) if score <= best_score => {}
                _ => best = Some((score, child_id)),
            }
        }
        best.map(|(_, id)| id)
    }

    /// Back `value` up from `leaf` to the root, negating at every ply.
    pub fn backpropagate(&mut self, leaf: NodeId, value: f32) {
        let mut current = leaf;
        let mut value = value;

        while current.is_some() {
            let node = self.get_mut(current);
            node.visits += 1;
            node.value_sum += value;
            value = -value;
            current = node.parent;
        }
    }

    /// Mark every node of `path` as having one more traversal in flight.
    pub fn apply_virtual(&mut self, path: &[NodeId]) {
        for &id in path {
            self.get_mut(id).virtual_visits += 1;
        }
    }

    /// Release the virtual loss taken by [`Tree::apply_virtual`].
    pub fn revert_virtual(&mut self, path: &[NodeId]) {
        for &id in path {
            let node = self.get_mut(id);
            node.virtual_visits = node.virtual_visits.saturating_sub(1);
        }
    }

    /// Most-visited root action, ties to the lowest index.
    pub fn best_action(&self) -> Option<(usize, u32)> {
        let root = self.get(self.root);
        let mut best: Option<(usize, u32)> = None;
        for &(action, child_id) in &root.children {
            let visits = self.get(child_id).visits;
            match best {
                Some((_, best_visits)) if visits <= best_visits => {}
                _ => best = Some((action, visits)),
            }
        }
        best
    }

    /// Improved policy over the root's actions: the visit distribution
    /// cooled by `temperature`, zeros on actions without a child.
    ///
    /// `temperature == 0` returns the argmax one-hot. When no child has
    /// been visited yet (a deadline can cut a search that short), the mass
    /// is spread uniformly over the root's children.
    pub fn improved_policy(&self, policy_len: usize, temperature: f32) -> Vec<f32> {
        let root = self.get(self.root);
        let mut policy = vec![0.0; policy_len];

        if root.children.is_empty() {
            return policy;
        }

        if temperature < 1e-6 {
            if let Some((action, _)) = self.best_action() {
                policy[action] = 1.0;
            }
            return policy;
        }

        let cooled: Vec<f32> = root
            .children
            .iter()
            .map(|&(_, id)| {
                let visits = self.get(id).visits as f32;
                if temperature == 1.0 {
                    visits
                } else {
                    visits.powf(1.0 / temperature)
                }
            })
            .collect();

        let total: f32 = cooled.iter().sum();
        if total > 0.0 {
            for (&(action, _), &mass) in root.children.iter().zip(&cooled) {
                policy[action] = mass / total;
            }
        } else {
            let uniform = 1.0 / root.children.len() as f32;
            for &(action, _) in &root.children {
                policy[action] = uniform;
            }
        }

        policy
    }

    pub fn stats(&self) -> TreeStats {
        let root = self.get(self.root);
        TreeStats {
            total_nodes: self.nodes.len(),
            root_visits: root.visits,
            root_value: root.mean_value(),
            max_depth: self.max_depth(self.root, 0),
        }
    }

    fn max_depth(&self, node: NodeId, depth: u32) -> u32 {
        self.get(node)
            .children
            .iter()
            .map(|&(_, id)| self.max_depth(id, depth + 1))
            .max()
            .unwrap_or(depth)
    }
}

/// Summary of a finished search tree, for logging and inspection.
#[derive(Debug, Clone)]
pub struct TreeStats {
    pub total_nodes: usize,
    pub root_visits: u32,
    pub root_value: f32,
    pub max_depth: u32,
}
