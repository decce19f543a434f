//! Generic region quadtree over a node arena
//!
//! Leaves hold a fixed number of element slots (`None` is a free slot). A
//! full leaf splits into four children and never merges back. Per-node
//! behaviour (render buffers, registries) lives in a [`NodePayload`] that is
//! notified of slot changes and splits.

use glam::Vec2;

use super::Rect;

/// Leaves stop splitting below this depth; further inserts into a full leaf fail
pub const MAX_DEPTH: u32 = 16;

pub type NodeId = usize;

/// Strategy hooks for per-node state
pub trait NodePayload<E> {
    /// Payload of a fresh leaf with `capacity` slots
    fn new(capacity: usize) -> Self;

    fn element_added(&mut self, _slot: usize, _element: &E) {}

    fn element_removed(&mut self, _slot: usize) {}

    /// The node became internal; leaf-only state can be dropped
    fn split(&mut self) {}
}

impl<E> NodePayload<E> for () {
    fn new(_capacity: usize) -> Self {}
}

#[derive(Debug)]
pub struct QuadtreeNode<E, P> {
    rect: Rect,
    margin_rect: Rect,
    depth: u32,
    elements: Vec<Option<E>>,
    num_elements: usize,
    free_hint: usize,
    children: Option<[NodeId; 4]>,
    pub payload: P,
}

impl<E: Copy, P: NodePayload<E>> QuadtreeNode<E, P> {
    fn new(rect: Rect, margin_fraction: f32, depth: u32, capacity: usize) -> Self {
        Self {
            rect,
            margin_rect: rect.expanded(rect.size() * margin_fraction),
            depth,
            elements: vec![None; capacity],
            num_elements: 0,
            free_hint: 0,
            children: None,
            payload: P::new(capacity),
        }
    }

    pub fn rect(&self) -> &Rect {
        &self.rect
    }

    /// Rect plus the hysteresis band elements may drift into before migrating
    pub fn margin_rect(&self) -> &Rect {
        &self.margin_rect
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    pub fn children(&self) -> Option<[NodeId; 4]> {
        self.children
    }

    /// Element slots; empty for internal nodes
    pub fn elements(&self) -> &[Option<E>] {
        &self.elements
    }

    pub fn num_elements(&self) -> usize {
        self.num_elements
    }

    fn add_at_free_slot(&mut self, element: E) -> bool {
        let capacity = self.elements.len();
        if self.num_elements == capacity {
            return false;
        }
        let slot = (self.free_hint..capacity)
            .chain(0..self.free_hint)
            .find(|&slot| self.elements[slot].is_none());
        let Some(slot) = slot else {
            return false;
        };

        self.elements[slot] = Some(element);
        self.num_elements += 1;
        self.free_hint = (slot + 1) % capacity;
        self.payload.element_added(slot, &element);
        true
    }
}

#[derive(Debug)]
pub struct Quadtree<E, P = ()> {
    nodes: Vec<QuadtreeNode<E, P>>,
    max_elements_per_node: usize,
    max_total_elements: usize,
    margin_fraction: f32,
    count: usize,
    splits: usize,
    /// Elements a split could not place; the owner must release them
    orphans: Vec<E>,
}

impl<E: Copy, P: NodePayload<E>> Quadtree<E, P> {
    pub const ROOT: NodeId = 0;

    pub fn new(rect: Rect, max_elements_per_node: usize, max_total_elements: usize, margin_fraction: f32) -> Self {
        Self {
            nodes: vec![QuadtreeNode::new(rect, margin_fraction, 0, max_elements_per_node)],
            max_elements_per_node,
            max_total_elements,
            margin_fraction,
            count: 0,
            splits: 0,
            orphans: Vec::new(),
        }
    }

    pub fn rect(&self) -> &Rect {
        &self.nodes[Self::ROOT].rect
    }

    pub fn node(&self, id: NodeId) -> &QuadtreeNode<E, P> {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut QuadtreeNode<E, P> {
        &mut self.nodes[id]
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Elements stored in the whole tree
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn free_space(&self) -> usize {
        self.max_total_elements.saturating_sub(self.count)
    }

    /// Number of leaf splits so far
    pub fn splits(&self) -> usize {
        self.splits
    }

    /// Drain the elements dropped by splits since the last call
    pub fn take_orphans(&mut self) -> Vec<E> {
        std::mem::take(&mut self.orphans)
    }

    /// Insert `element` at the leaf containing its position. Fails when the
    /// tree is full, the position lies outside the root rect, or the target
    /// leaf is full at maximum depth.
    pub fn insert(&mut self, element: E, position_of: impl Fn(&E) -> Vec2) -> bool {
        if self.count >= self.max_total_elements {
            return false;
        }
        let position = position_of(&element);
        if !self.nodes[Self::ROOT].rect.contains(position) {
            return false;
        }

        let mut id = Self::ROOT;
        loop {
            if let Some(children) = self.nodes[id].children {
                match children.into_iter().find(|&child| self.nodes[child].rect.contains(position)) {
                    Some(child) => id = child,
                    None => return false,
                }
                continue;
            }

            if self.nodes[id].add_at_free_slot(element) {
                self.count += 1;
                return true;
            }
            if self.nodes[id].depth >= MAX_DEPTH {
                return false;
            }
            self.split(id, &position_of);
        }
    }

    /// Remove the element in `slot` of leaf `id`
    pub fn remove_at(&mut self, id: NodeId, slot: usize) -> Option<E> {
        let node = &mut self.nodes[id];
        let element = node.elements.get_mut(slot)?.take()?;
        node.num_elements -= 1;
        node.payload.element_removed(slot);
        self.count -= 1;
        Some(element)
    }

    /// Spawn four children and re-bucket the leaf's elements into them
    fn split(&mut self, id: NodeId, position_of: &impl Fn(&E) -> Vec2) {
        let (rect, depth) = (self.nodes[id].rect, self.nodes[id].depth);
        let center = rect.center();
        let half = rect.size() * 0.5;
        let child_rects = [
            Rect::new(rect.min.x, center.y, half.x, half.y),
            Rect::new(center.x, center.y, half.x, half.y),
            Rect::new(rect.min.x, rect.min.y, half.x, half.y),
            Rect::new(center.x, rect.min.y, half.x, half.y),
        ];

        let first = self.nodes.len();
        for child_rect in child_rects {
            self.nodes.push(QuadtreeNode::new(
                child_rect,
                self.margin_fraction,
                depth + 1,
                self.max_elements_per_node,
            ));
        }
        let children = [first, first + 1, first + 2, first + 3];

        let node = &mut self.nodes[id];
        let elements = std::mem::take(&mut node.elements);
        node.num_elements = 0;
        node.children = Some(children);
        node.payload.split();
        self.splits += 1;
        log::debug!("Quadtree node {} split at depth {} ({:?})", id, depth, rect);

        for element in elements.into_iter().flatten() {
            let position = position_of(&element);
            let child = children
                .into_iter()
                .find(|&child| self.nodes[child].rect.contains(position))
                .unwrap_or_else(|| nearest_child(&self.nodes, children, position));
            if !self.nodes[child].add_at_free_slot(element) {
                log::warn!("Quadtree node {} dropped an element on split", child);
                self.count -= 1;
                self.orphans.push(element);
            }
        }
    }

    /// Leaves overlapping `rect`, depth first in child order
    pub fn leaves_overlapping(&self, rect: &Rect) -> Vec<NodeId> {
        let mut leaves = Vec::new();
        let mut stack = vec![Self::ROOT];
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id];
            if !node.rect.overlaps(rect) {
                continue;
            }
            match node.children {
                Some(children) => stack.extend(children.into_iter().rev()),
                None => leaves.push(id),
            }
        }
        leaves
    }

    /// Every leaf, depth first in child order
    pub fn leaves(&self) -> Vec<NodeId> {
        let mut leaves = Vec::new();
        let mut stack = vec![Self::ROOT];
        while let Some(id) = stack.pop() {
            match self.nodes[id].children {
                Some(children) => stack.extend(children.into_iter().rev()),
                None => leaves.push(id),
            }
        }
        leaves
    }
}

/// Child whose center is closest to `position`; used for elements that drifted
/// outside the parent rect while still inside its margin
fn nearest_child<E, P>(nodes: &[QuadtreeNode<E, P>], children: [NodeId; 4], position: Vec2) -> NodeId {
    let mut best = children[0];
    let mut best_distance = f32::INFINITY;
    for child in children {
        let distance = nodes[child].rect.center().distance_squared(position);
        if distance < best_distance {
            best = child;
            best_distance = distance;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    type PointTree = Quadtree<Vec2>;

    fn position(point: &Vec2) -> Vec2 {
        *point
    }

    fn tree(max_per_node: usize, max_total: usize) -> PointTree {
        Quadtree::new(Rect::new(-100.0, -100.0, 200.0, 200.0), max_per_node, max_total, 0.1)
    }

    #[test]
    fn test_split_on_overflow() {
        let mut tree = tree(4, 100);
        let points = [
            Vec2::new(-50.0, 50.0),
            Vec2::new(50.0, 50.0),
            Vec2::new(-50.0, -50.0),
            Vec2::new(50.0, -50.0),
        ];
        for point in points {
            assert!(tree.insert(point, position));
        }
        assert_eq!(tree.splits(), 0);

        assert!(tree.insert(Vec2::new(10.0, 10.0), position));
        assert_eq!(tree.splits(), 1);
        assert_eq!(tree.count(), 5);

        let root = tree.node(PointTree::ROOT);
        assert!(!root.is_leaf());
        assert_eq!(root.num_elements(), 0);
        assert!(root.elements().is_empty());

        // Child order: upper-left, upper-right, lower-left, lower-right
        let children = root.children().unwrap();
        assert_eq!(tree.node(children[0]).elements().iter().flatten().count(), 1);
        assert_eq!(tree.node(children[1]).elements().iter().flatten().count(), 2);
        assert_eq!(tree.node(children[2]).num_elements(), 1);
        assert_eq!(tree.node(children[3]).num_elements(), 1);
    }

    #[test]
    fn test_rejects_outside_and_when_full() {
        let mut tree = tree(2, 3);
        assert!(!tree.insert(Vec2::new(100.0, 0.0), position));
        assert!(tree.insert(Vec2::new(1.0, 1.0), position));
        assert!(tree.insert(Vec2::new(2.0, 2.0), position));
        assert!(tree.insert(Vec2::new(-2.0, -2.0), position));
        assert_eq!(tree.free_space(), 0);
        assert!(!tree.insert(Vec2::new(-3.0, 3.0), position));
    }

    #[test]
    fn test_coincident_points_stop_at_max_depth() {
        let mut tree = tree(1, 10);
        assert!(tree.insert(Vec2::new(1.0, 1.0), position));
        assert!(!tree.insert(Vec2::new(1.0, 1.0), position));
        assert_eq!(tree.count(), 1);
        assert!(tree.leaves().iter().all(|&leaf| tree.node(leaf).depth() <= MAX_DEPTH));
    }

    #[test]
    fn test_remove_frees_slot() {
        let mut tree = tree(2, 10);
        tree.insert(Vec2::new(1.0, 1.0), position);
        tree.insert(Vec2::new(2.0, 2.0), position);
        assert_eq!(tree.remove_at(PointTree::ROOT, 0), Some(Vec2::new(1.0, 1.0)));
        assert_eq!(tree.remove_at(PointTree::ROOT, 0), None);
        assert_eq!(tree.count(), 1);
        assert!(tree.insert(Vec2::new(3.0, 3.0), position));
        assert_eq!(tree.splits(), 0);
    }

    #[test]
    fn test_split_hands_back_unplaced_elements() {
        let mut tree = tree(2, 10);
        assert!(tree.insert(Vec2::new(10.0, 10.0), position));
        assert!(tree.insert(Vec2::new(20.0, 20.0), position));

        // Children too small to take both points of the upper-right quadrant
        tree.max_elements_per_node = 1;
        tree.split(PointTree::ROOT, &position);

        assert_eq!(tree.count(), 1);
        assert_eq!(tree.take_orphans().len(), 1);
        assert!(tree.take_orphans().is_empty());
        let stored: usize = tree.leaves().iter().map(|&leaf| tree.node(leaf).num_elements()).sum();
        assert_eq!(stored, 1);
    }

    #[test]
    fn test_leaves_overlapping() {
        let mut tree = tree(1, 10);
        tree.insert(Vec2::new(-50.0, -50.0), position);
        tree.insert(Vec2::new(50.0, 50.0), position);
        let leaves = tree.leaves_overlapping(&Rect::new(10.0, 10.0, 5.0, 5.0));
        assert_eq!(leaves.len(), 1);
        assert!(tree.node(leaves[0]).rect().contains(Vec2::new(12.0, 12.0)));
        assert_eq!(tree.leaves().len(), 4);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_every_element_in_containing_leaf(
            points in prop::collection::vec((-100.0f32..100.0, -100.0f32..100.0), 0..200),
        ) {
            let mut tree = tree(4, 1000);
            let mut inserted = 0;
            for (x, y) in points {
                if tree.insert(Vec2::new(x, y), position) {
                    inserted += 1;
                }
            }

            let mut stored = 0;
            for leaf in tree.leaves() {
                let node = tree.node(leaf);
                for point in node.elements().iter().flatten() {
                    prop_assert!(node.rect().contains(*point));
                    stored += 1;
                }
            }
            prop_assert_eq!(stored, inserted);
            prop_assert_eq!(tree.count(), inserted);
        }
    }
}
