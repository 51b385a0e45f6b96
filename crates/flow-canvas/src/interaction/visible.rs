//! Per-flow visibility on the canvas

use serde::{Deserialize, Serialize};

/// Which flows of the document are rendered
///
/// Flows keep document order. A flow seen for the first time is visible.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VisibleFlows {
    flows: Vec<(String, bool)>,
}

impl VisibleFlows {
    pub fn new() -> Self {
        Self::default()
    }

    /// Align with the flows currently in the document
    pub fn sync(&mut self, ids: &[String]) {
        let previous = std::mem::take(&mut self.flows);
        self.flows = ids
            .iter()
            .map(|id| {
                let visible = previous.iter().find(|(known, _)| known == id).map_or(true, |(_, v)| *v);
                (id.clone(), visible)
            })
            .collect();
    }

    pub fn is_visible(&self, id: &str) -> bool {
        self.flows.iter().any(|(known, visible)| known == id && *visible)
    }

    pub fn show(&mut self, id: &str) {
        self.set(id, true);
    }

    pub fn hide(&mut self, id: &str) {
        self.set(id, false);
    }

    pub fn toggle(&mut self, id: &str) {
        if let Some((_, visible)) = self.flows.iter_mut().find(|(known, _)| known == id) {
            *visible = !*visible;
        }
    }

    pub fn show_all(&mut self) {
        self.flows.iter_mut().for_each(|(_, visible)| *visible = true);
    }

    pub fn hide_all(&mut self) {
        self.flows.iter_mut().for_each(|(_, visible)| *visible = false);
    }

    /// Ids of visible flows, in document order
    pub fn visible_ids(&self) -> Vec<&str> {
        self.flows
            .iter()
            .filter(|(_, visible)| *visible)
            .map(|(id, _)| id.as_str())
            .collect()
    }

    fn set(&mut self, id: &str, value: bool) {
        if let Some((_, visible)) = self.flows.iter_mut().find(|(known, _)| known == id) {
            *visible = value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_sync_keeps_flags() {
        let mut flows = VisibleFlows::new();
        flows.sync(&ids(&["route-1", "route-2"]));
        assert_eq!(flows.visible_ids(), vec!["route-1", "route-2"]);

        flows.hide("route-1");
        flows.sync(&ids(&["route-3", "route-1"]));
        assert!(!flows.is_visible("route-1"));
        assert!(flows.is_visible("route-3"));
        assert!(!flows.is_visible("route-2"));
    }

    #[test]
    fn test_toggle_and_bulk() {
        let mut flows = VisibleFlows::new();
        flows.sync(&ids(&["a", "b"]));

        flows.toggle("a");
        assert_eq!(flows.visible_ids(), vec!["b"]);
        flows.hide_all();
        assert!(flows.visible_ids().is_empty());
        flows.show("b");
        assert_eq!(flows.visible_ids(), vec!["b"]);
        flows.show_all();
        assert_eq!(flows.visible_ids(), vec!["a", "b"]);

        // Unknown ids are ignored
        flows.toggle("missing");
        assert_eq!(flows.visible_ids().len(), 2);
    }
}
