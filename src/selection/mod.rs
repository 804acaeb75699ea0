use std::sync::Arc;

use crate::scene::{Color, MaterialDescriptor, NodeId, SceneGraph};

/// Multiplier applied to the color of the hovered node.
pub const HIGHLIGHT_FACTOR: f32 = 0.8;

/// The node currently darkened by hover, with its pre-hover color.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Highlight {
    pub node: NodeId,
    pub saved_color: Color,
}

/// Tracks the single selected node and the single hover highlight.
///
/// Selection and highlight are independent. At most one node is darkened at a
/// time: a new hover restores the previous node before darkening the next one.
#[derive(Debug, Default)]
pub struct SelectionTracker {
    selected: Option<NodeId>,
    highlight: Option<Highlight>,
}

impl SelectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selected(&self) -> Option<NodeId> {
        self.selected
    }

    pub fn highlighted(&self) -> Option<Highlight> {
        self.highlight
    }

    /// Overwrites the selection. `None` clears it.
    pub fn select(&mut self, node: Option<NodeId>) {
        if self.selected != node {
            log::debug!("Selection {:?} -> {:?}", self.selected, node);
        }
        self.selected = node;
    }

    /// Moves the hover highlight to `node`. Hovering the highlighted node again
    /// does nothing; a node missing from the graph counts as `None`.
    pub fn hover(&mut self, graph: &mut SceneGraph, node: Option<NodeId>) {
        let node = node.filter(|id| graph.contains(*id));
        if node.is_some() && node == self.highlight.map(|h| h.node) {
            return;
        }

        self.restore(graph);

        if let Some(id) = node {
            if let Some(target) = graph.get(id) {
                let saved_color = target.material.color;
                let mut darkened = target.clone();
                darkened.material = Arc::new(MaterialDescriptor {
                    color: saved_color.scaled(HIGHLIGHT_FACTOR),
                    ..(*target.material).clone()
                });
                graph.replace(darkened);
                self.highlight = Some(Highlight {
                    node: id,
                    saved_color,
                });
                log::debug!("Highlighted {id}");
            }
        }
    }

    /// Drops selection and highlight without touching the graph. Used after
    /// the graph has been replaced wholesale.
    pub fn reset(&mut self) {
        self.selected = None;
        self.highlight = None;
    }

    /// The true color of `id`: the saved color while it is highlighted.
    pub fn base_color(&self, graph: &SceneGraph, id: NodeId) -> Option<Color> {
        match self.highlight {
            Some(h) if h.node == id => Some(h.saved_color),
            _ => graph.get(id).map(|node| node.material.color),
        }
    }

    /// Copy of `graph` with the hover darkening undone. Exports read this so
    /// the highlight never leaks into a file.
    pub fn unhighlighted(&self, graph: &SceneGraph) -> SceneGraph {
        let mut copy = graph.clone();
        let mut scratch = Self {
            selected: None,
            highlight: self.highlight,
        };
        scratch.restore(&mut copy);
        copy
    }

    /// Records `color` as the true color of `id` after a color edit. A
    /// highlighted node keeps its darkening on top of the new color; any other
    /// node is left alone.
    pub fn rebase(&mut self, graph: &mut SceneGraph, id: NodeId, color: Color) {
        let Some(highlight) = self.highlight.as_mut().filter(|h| h.node == id) else {
            return;
        };
        let Some(node) = graph.get(id) else {
            self.highlight = None;
            return;
        };
        highlight.saved_color = color;
        let mut rebased = node.clone();
        rebased.material = Arc::new(MaterialDescriptor {
            color: color.scaled(HIGHLIGHT_FACTOR),
            ..(*node.material).clone()
        });
        graph.replace(rebased);
        log::debug!("Rebased highlight of {id} on {}", color.to_hex());
    }

    fn restore(&mut self, graph: &mut SceneGraph) {
        let Some(highlight) = self.highlight.take() else {
            return;
        };
        let Some(node) = graph.get(highlight.node) else {
            return;
        };
        let mut restored = node.clone();
        restored.material = Arc::new(MaterialDescriptor {
            color: highlight.saved_color,
            ..(*node.material).clone()
        });
        graph.replace(restored);
        log::debug!("Restored {}", highlight.node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{GeometryKind, SceneNode};

    fn graph_with(colors: &[&str]) -> (SceneGraph, Vec<NodeId>) {
        let mut graph = SceneGraph::new();
        let ids = colors
            .iter()
            .map(|hex| {
                graph.add(SceneNode::new(
                    GeometryKind::Box.descriptor(),
                    MaterialDescriptor::default().with_color(Color::from_hex(hex).unwrap()),
                ))
            })
            .collect();
        (graph, ids)
    }

    fn color(graph: &SceneGraph, id: NodeId) -> Color {
        graph.get(id).unwrap().material.color
    }

    #[test]
    fn hover_sequence_leaves_no_residual_darkening() {
        let (mut graph, ids) = graph_with(&["#ff0000", "#00ff00"]);
        let original: Vec<Color> = ids.iter().map(|id| color(&graph, *id)).collect();
        let mut tracker = SelectionTracker::new();

        tracker.hover(&mut graph, Some(ids[0]));
        assert_eq!(color(&graph, ids[0]), original[0].scaled(HIGHLIGHT_FACTOR));

        tracker.hover(&mut graph, Some(ids[1]));
        assert_eq!(color(&graph, ids[0]), original[0]);
        assert_eq!(color(&graph, ids[1]), original[1].scaled(HIGHLIGHT_FACTOR));

        tracker.hover(&mut graph, None);
        assert_eq!(color(&graph, ids[0]), original[0]);
        assert_eq!(color(&graph, ids[1]), original[1]);
        assert!(tracker.highlighted().is_none());
    }

    #[test]
    fn repeated_hover_does_not_darken_twice() {
        let (mut graph, ids) = graph_with(&["#808080"]);
        let original = color(&graph, ids[0]);
        let mut tracker = SelectionTracker::new();

        for _ in 0..5 {
            tracker.hover(&mut graph, Some(ids[0]));
        }
        assert_eq!(color(&graph, ids[0]), original.scaled(HIGHLIGHT_FACTOR));
        assert_eq!(tracker.highlighted().unwrap().saved_color, original);

        tracker.hover(&mut graph, None);
        assert_eq!(color(&graph, ids[0]), original);
    }

    #[test]
    fn highlight_replaces_material_reference() {
        let (mut graph, ids) = graph_with(&["#ffffff"]);
        let before = graph.get(ids[0]).unwrap().material.clone();
        let mut tracker = SelectionTracker::new();

        tracker.hover(&mut graph, Some(ids[0]));
        assert!(!Arc::ptr_eq(&before, &graph.get(ids[0]).unwrap().material));
        assert_eq!(before.color, Color::WHITE);
    }

    #[test]
    fn selection_is_independent_of_highlight() {
        let (mut graph, ids) = graph_with(&["#ffffff", "#000000"]);
        let mut tracker = SelectionTracker::new();

        tracker.select(Some(ids[0]));
        tracker.hover(&mut graph, Some(ids[1]));
        assert_eq!(tracker.selected(), Some(ids[0]));

        tracker.select(Some(ids[1]));
        assert_eq!(tracker.selected(), Some(ids[1]));
        assert_eq!(tracker.highlighted().unwrap().node, ids[1]);

        tracker.select(None);
        assert_eq!(tracker.selected(), None);
    }

    #[test]
    fn hovering_unknown_node_restores_current() {
        let (mut graph, ids) = graph_with(&["#ff0000"]);
        let mut tracker = SelectionTracker::new();

        tracker.hover(&mut graph, Some(ids[0]));
        tracker.hover(&mut graph, Some(NodeId::new()));
        assert_eq!(color(&graph, ids[0]), Color::from_hex("#ff0000").unwrap());
        assert!(tracker.highlighted().is_none());
    }

    #[test]
    fn unhighlighted_copy_carries_true_colors() {
        let (mut graph, ids) = graph_with(&["#ff0000"]);
        let mut tracker = SelectionTracker::new();
        tracker.hover(&mut graph, Some(ids[0]));

        let copy = tracker.unhighlighted(&graph);
        assert_eq!(color(&copy, ids[0]), Color::from_hex("#ff0000").unwrap());
        assert_eq!(
            color(&graph, ids[0]),
            Color::from_hex("#ff0000").unwrap().scaled(HIGHLIGHT_FACTOR)
        );
        assert!(tracker.highlighted().is_some());
    }

    #[test]
    fn rebase_keeps_edited_color() {
        let (mut graph, ids) = graph_with(&["#ff0000"]);
        let mut tracker = SelectionTracker::new();
        tracker.hover(&mut graph, Some(ids[0]));

        let blue = Color::from_hex("#0000ff").unwrap();
        tracker.rebase(&mut graph, ids[0], blue);
        assert_eq!(tracker.highlighted().unwrap().saved_color, blue);
        assert_eq!(tracker.base_color(&graph, ids[0]), Some(blue));
        assert_eq!(color(&graph, ids[0]), blue.scaled(HIGHLIGHT_FACTOR));

        tracker.hover(&mut graph, None);
        assert_eq!(color(&graph, ids[0]), blue);
    }

    #[test]
    fn rebase_to_the_darkened_value_is_kept() {
        let (mut graph, ids) = graph_with(&["#ffffff"]);
        let mut tracker = SelectionTracker::new();
        tracker.hover(&mut graph, Some(ids[0]));

        let darkened = color(&graph, ids[0]);
        tracker.rebase(&mut graph, ids[0], darkened);
        tracker.hover(&mut graph, None);
        assert_eq!(color(&graph, ids[0]), darkened);
    }

    #[test]
    fn rebase_ignores_nodes_that_are_not_highlighted() {
        let (mut graph, ids) = graph_with(&["#ff0000", "#00ff00"]);
        let mut tracker = SelectionTracker::new();
        tracker.hover(&mut graph, Some(ids[0]));

        tracker.rebase(&mut graph, ids[1], Color::WHITE);
        assert_eq!(color(&graph, ids[1]), Color::from_hex("#00ff00").unwrap());
        assert_eq!(
            tracker.highlighted().unwrap().saved_color,
            Color::from_hex("#ff0000").unwrap()
        );
    }
}
