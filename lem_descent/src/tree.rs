//! Owned labeled tree built from KML markup, plus the pre-order traversal
//! helpers used to locate marker groups inside it.

use serde::Serialize;

use super::DescentError;

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
pub enum NodeKind {
    Document,
    Element,
    Text,
}

/// A node of the parsed document. Each node owns its children; text content
/// lives in `Text` children, mirroring how the markup nests it.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct LabeledNode {
    pub kind: NodeKind,
    pub name: String,
    pub text: Option<String>,
    pub children: Vec<LabeledNode>,
}

impl LabeledNode {
    pub fn element(name: impl Into<String>, children: Vec<LabeledNode>) -> Self {
        Self {
            kind: NodeKind::Element,
            name: name.into(),
            text: None,
            children,
        }
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self {
            kind: NodeKind::Text,
            name: String::new(),
            text: Some(value.into()),
            children: Vec::new(),
        }
    }

    pub fn is_element(&self) -> bool {
        self.kind == NodeKind::Element
    }

    /// First direct child element with the given local name.
    pub fn child(&self, name: &str) -> Option<&LabeledNode> {
        self.children
            .iter()
            .find(|c| c.is_element() && c.name == name)
    }
}

/// Parse markup text into an owned tree rooted at a `Document` node.
///
/// Whitespace-only text between elements is dropped; comments and processing
/// instructions are ignored. Namespaces are stripped to local names so KML
/// written with or without a default namespace reads the same.
pub fn parse_document(xml: &str) -> Result<LabeledNode, DescentError> {
    let doc = roxmltree::Document::parse(xml).map_err(|e| DescentError::Xml(e.to_string()))?;
    let root = doc.root();
    Ok(LabeledNode {
        kind: NodeKind::Document,
        name: String::new(),
        text: None,
        children: root.children().filter_map(convert_node).collect(),
    })
}

fn convert_node(node: roxmltree::Node) -> Option<LabeledNode> {
    if node.is_element() {
        Some(LabeledNode::element(
            node.tag_name().name(),
            node.children().filter_map(convert_node).collect(),
        ))
    } else if node.is_text() {
        node.text()
            .filter(|t| !t.trim().is_empty())
            .map(LabeledNode::text)
    } else {
        None
    }
}

/// Lazy depth-first, pre-order walk including the starting node.
pub struct Traverse<'a> {
    stack: Vec<&'a LabeledNode>,
}

impl<'a> Iterator for Traverse<'a> {
    type Item = &'a LabeledNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

pub fn traverse(node: &LabeledNode) -> Traverse<'_> {
    Traverse { stack: vec![node] }
}

/// First pre-order match. Stops walking as soon as one is found.
pub fn find<'a, F>(tree: &'a LabeledNode, predicate: F) -> Option<&'a LabeledNode>
where
    F: Fn(&LabeledNode) -> bool,
{
    traverse(tree).find(|node| predicate(node))
}

/// Every pre-order match, in document order.
pub fn filter<'a, F>(tree: &'a LabeledNode, predicate: F) -> Vec<&'a LabeledNode>
where
    F: Fn(&LabeledNode) -> bool,
{
    traverse(tree).filter(|node| predicate(node)).collect()
}

/// Text of the node's first child, if that child carries any.
pub fn get_string(node: &LabeledNode) -> Option<&str> {
    node.children.first().and_then(|c| c.text.as_deref())
}

/// Predicate matching nodes with a direct `<name>` child whose text equals `target`.
pub fn has_name(target: &str) -> impl Fn(&LabeledNode) -> bool + '_ {
    move |node: &LabeledNode| {
        node.child("name").is_some_and(|name| {
            name.children
                .iter()
                .any(|c| c.text.as_deref() == Some(target))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<kml xmlns="http://www.opengis.net/kml/2.2">
  <Document>
    <name>Descent</name>
    <!-- comment -->
    <Folder>
      <name>Other</name>
      <Placemark><name>A</name></Placemark>
    </Folder>
    <Folder>
      <name>Decent Markers</name>
      <Placemark><name>B</name></Placemark>
    </Folder>
  </Document>
</kml>"#;

    #[test]
    fn test_parse_keeps_order_and_local_names() {
        let tree = parse_document(SAMPLE).unwrap();
        assert_eq!(tree.kind, NodeKind::Document);
        assert_eq!(tree.children.len(), 1);
        let kml = &tree.children[0];
        assert_eq!(kml.name, "kml");
        let document = kml.child("Document").unwrap();
        let names: Vec<&str> = document.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["name", "Folder", "Folder"]);
        assert_eq!(get_string(document.child("name").unwrap()), Some("Descent"));
    }

    #[test]
    fn test_parse_rejects_malformed_markup() {
        let err = parse_document("<kml><Folder></kml>").unwrap_err();
        assert!(matches!(err, DescentError::Xml(_)));
    }

    #[test]
    fn test_traverse_is_preorder_including_root() {
        let tree = LabeledNode::element(
            "a",
            vec![
                LabeledNode::element("b", vec![LabeledNode::element("c", vec![])]),
                LabeledNode::element("d", vec![]),
            ],
        );
        let order: Vec<&str> = traverse(&tree).map(|n| n.name.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_find_returns_first_match() {
        let tree = parse_document(SAMPLE).unwrap();
        let folder = find(&tree, has_name("Decent Markers")).unwrap();
        assert_eq!(folder.name, "Folder");
        let placemark = folder.child("Placemark").unwrap();
        assert_eq!(get_string(placemark.child("name").unwrap()), Some("B"));
        assert!(find(&tree, has_name("Descent Markers")).is_none());
    }

    #[test]
    fn test_filter_collects_all_matches() {
        let tree = parse_document(SAMPLE).unwrap();
        let folders = filter(&tree, |n| n.is_element() && n.name == "Folder");
        assert_eq!(folders.len(), 2);
        let placemarks = filter(&tree, |n| n.name == "Placemark");
        let names: Vec<_> = placemarks
            .iter()
            .filter_map(|p| p.child("name").and_then(get_string))
            .collect();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[test]
    fn test_has_name_requires_name_child() {
        let bare = LabeledNode::element("Folder", vec![LabeledNode::text("Decent Markers")]);
        assert!(!has_name("Decent Markers")(&bare));
        let named = LabeledNode::element(
            "Folder",
            vec![
                LabeledNode::element("open", vec![LabeledNode::text("1")]),
                LabeledNode::element("name", vec![LabeledNode::text("Decent Markers")]),
            ],
        );
        assert!(has_name("Decent Markers")(&named));
    }

    #[test]
    fn test_get_string_handles_missing_text() {
        let empty = LabeledNode::element("name", vec![]);
        assert_eq!(get_string(&empty), None);
        let nested = LabeledNode::element("name", vec![LabeledNode::element("b", vec![])]);
        assert_eq!(get_string(&nested), None);
    }
}
