use std::collections::BTreeMap;

/// An element subtree captured from a configuration export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlNode {
    /// Element tag name.
    pub tag: String,
    /// XML attributes keyed by name.
    pub attributes: BTreeMap<String, String>,
    /// Child elements.
    pub children: Vec<XmlNode>,
    /// Optional text content.
    pub text: Option<String>,
}

impl XmlNode {
    /// Create a new XML node with no attributes, children, or text.
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attributes: BTreeMap::new(),
            children: Vec::new(),
            text: None,
        }
    }

    /// Return the value of the `name` attribute, as carried by `<entry>` blocks.
    pub fn entry_name(&self) -> Option<&str> {
        self.attributes.get("name").map(String::as_str)
    }

    /// Return the first child with the provided tag.
    pub fn get_child(&self, tag: &str) -> Option<&XmlNode> {
        self.children.iter().find(|child| child.tag == tag)
    }

    /// Return all children with the provided tag.
    pub fn get_children(&self, tag: &str) -> Vec<&XmlNode> {
        self.children
            .iter()
            .filter(|child| child.tag == tag)
            .collect()
    }

    /// Walk a nested child path and return terminal node text if found.
    pub fn get_text<'a>(&'a self, path: &[&str]) -> Option<&'a str> {
        if path.is_empty() {
            return self.text.as_deref();
        }

        let mut current = self;
        for segment in path {
            current = current.get_child(segment)?;
        }
        current.text.as_deref()
    }

    /// Collect the trimmed text of every `<member>` child.
    ///
    /// A node with no members but with text of its own yields that text, which
    /// covers single-valued fields such as `<translated-address>10.0.0.1</...>`.
    pub fn member_texts(&self) -> Vec<String> {
        let members: Vec<String> = self
            .get_children("member")
            .into_iter()
            .filter_map(|member| member.text.as_deref())
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .collect();
        if !members.is_empty() {
            return members;
        }
        match self.text.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => vec![text.to_string()],
            _ => Vec::new(),
        }
    }

    /// Depth-first search for every descendant with the provided tag.
    pub fn find_descendants<'a>(&'a self, tag: &str) -> Vec<&'a XmlNode> {
        let mut found = Vec::new();
        let mut pending: Vec<&XmlNode> = self.children.iter().rev().collect();
        while let Some(node) = pending.pop() {
            if node.tag == tag {
                found.push(node);
            }
            pending.extend(node.children.iter().rev());
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::XmlNode;

    fn text_node(tag: &str, text: &str) -> XmlNode {
        let mut node = XmlNode::new(tag);
        node.text = Some(text.to_string());
        node
    }

    #[test]
    fn get_text_walks_nested_path() {
        let mut root = XmlNode::new("root");
        let mut parent = XmlNode::new("parent");
        parent.children.push(text_node("child", "value"));
        root.children.push(parent);

        assert_eq!(root.get_text(&["parent", "child"]), Some("value"));
    }

    #[test]
    fn member_texts_prefers_members_over_own_text() {
        let mut source = XmlNode::new("source");
        source.children.push(text_node("member", " web "));
        source.children.push(text_node("member", "db"));
        assert_eq!(source.member_texts(), vec!["web", "db"]);

        let single = text_node("translated-address", "10.1.1.1");
        assert_eq!(single.member_texts(), vec!["10.1.1.1"]);
    }

    #[test]
    fn find_descendants_keeps_document_order() {
        let mut root = XmlNode::new("source-translation");
        let mut dynamic = XmlNode::new("dynamic-ip-and-port");
        dynamic.children.push(text_node("translated-address", "a"));
        root.children.push(dynamic);
        root.children.push(text_node("translated-address", "b"));

        let texts: Vec<_> = root
            .find_descendants("translated-address")
            .into_iter()
            .filter_map(|node| node.text.as_deref())
            .collect();
        assert_eq!(texts, vec!["a", "b"]);
    }
}
