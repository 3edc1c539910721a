//! Tree node representation.
//!
//! A node is the position reached by playing its `action` from the parent.
//! Visit statistics live on the node itself; the value sum is stored from
//! the node's own side-to-move perspective, so the parent negates the mean
//! when it compares children.

use game_core::Game;

/// Index into the node arena. A newtype keeps ids from mixing with counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u32);

impl NodeId {
    pub const NONE: NodeId = NodeId(u32::MAX);

    #[inline]
    pub fn is_none(self) -> bool {
        self == Self::NONE
    }

    #[inline]
    pub fn is_some(self) -> bool {
        !self.is_none()
    }
}

/// A node of the search tree.
#[derive(Debug, Clone)]
pub struct Node<G: Game> {
    /// Parent node, `NONE` for the root.
    pub parent: NodeId,

    /// Action that led here from the parent.
    pub action: usize,

    /// The position at this node.
    pub game: G,

    /// Completed visits through this node.
    pub visits: u32,

    /// Sum of backed-up values, from this node's side-to-move perspective.
    pub value_sum: f32,

    /// Prior probability of the edge from the parent, after masking.
    pub prior: f32,

    /// In-flight traversals currently holding a virtual loss on this edge.
    pub virtual_visits: u32,

    /// Whether the position is terminal.
    pub terminal: bool,

    /// Exact value of a terminal position, from this node's perspective.
    pub terminal_value: f32,

    /// `(action, child)` pairs in ascending action order; empty until the
    /// node is expanded. Terminal nodes never expand.
    pub children: Vec<(usize, NodeId)>,
}

impl<G: Game> Node<G> {
    pub fn new_root(game: G) -> Self {
        Self {
            parent: NodeId::NONE,
            action: 0,
            game,
            visits: 0,
            value_sum: 0.0,
            prior: 1.0,
            virtual_visits: 0,
            terminal: false,
            terminal_value: 0.0,
            children: Vec::new(),
        }
    }

    pub fn new_child(
        parent: NodeId,
        action: usize,
        prior: f32,
        game: G,
        terminal: bool,
        terminal_value: f32,
    ) -> Self {
        Self {
            parent,
            action,
            game,
            visits: 0,
            value_sum: 0.0,
            prior,
            virtual_visits: 0,
            terminal,
            terminal_value,
            children: Vec::new(),
        }
    }

    /// Mean backed-up value, `0.0` while unvisited.
    #[inline]
    pub fn mean_value(&self) -> f32 {
        if self.visits == 0 {
            0.0
        } else {
            self.value_sum / self.visits as f32
        }
    }

    /// PUCT selection score of this node as seen by its parent.
    ///
    /// The stored mean is negated because it is from this node's
    /// perspective, the opponent of the selecting parent. Every in-flight
    /// traversal counts as one extra visit that lost (for the parent),
    /// which is what discourages concurrent traversals from piling up.
    #[inline]
    pub fn puct_score(&self, parent_visits_sqrt: f32, exploration: f32) -> f32 {
        let visits = self.visits + self.virtual_visits;
        let q = if visits == 0 {
            0.0
        } else {
            -(self.value_sum + self.virtual_visits as f32) / visits as f32
        };
        let u = exploration * self.prior * parent_visits_sqrt / (1.0 + visits as f32);
        q + u
    }

    #[inline]
    pub fn is_expanded(&self) -> bool {
        !self.children.is_empty()
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.terminal || !self.is_expanded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use games_tictactoe::TicTacToe;

    #[test]
    fn node_id_sentinel() {
        assert!(NodeId::NONE.is_none());
        assert!(!NodeId::NONE.is_some());
        assert!(NodeId(0).is_some());
    }

    #[test]
    fn fresh_root() {
        let node = Node::new_root(TicTacToe::new());
        assert!(node.parent.is_none());
        assert_eq!(node.visits, 0);
        assert_eq!(node.prior, 1.0);
        assert!(node.is_leaf());
        assert!(!node.is_expanded());
    }

    #[test]
    fn mean_value_handles_the_unvisited_case() {
        let mut node = Node::new_root(TicTacToe::new());
        assert_eq!(node.mean_value(), 0.0);

        node.visits = 4;
        node.value_sum = 2.0;
        assert!((node.mean_value() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn puct_negates_the_child_perspective() {
        let mut node = Node::new_child(NodeId(0), 3, 0.5, TicTacToe::new(), false, 0.0);
        node.visits = 10;
        node.value_sum = 5.0; // Good for the child, bad for the parent.

        // q = -0.5, u = 1.0 * 0.5 * 10 / 11
        let score = node.puct_score(10.0, 1.0);
        assert!((score - (-0.5 + 5.0 / 11.0)).abs() < 1e-4);
    }

    #[test]
    fn virtual_visits_lower_the_score() {
        let mut node = Node::new_child(NodeId(0), 0, 0.5, TicTacToe::new(), false, 0.0);
        node.visits = 4;
        node.value_sum = 0.0;

        let unloaded = node.puct_score(4.0, 1.0);
        node.virtual_visits = 2;
        let loaded = node.puct_score(4.0, 1.0);

        assert!(loaded < unloaded);
    }

    #[test]
    fn terminal_nodes_are_leaves_even_with_children() {
        let mut node = Node::new_root(TicTacToe::new());
        node.children.push((0, NodeId(1)));
        assert!(!node.is_leaf());

        node.terminal = true;
        assert!(node.is_leaf());
    }
}
