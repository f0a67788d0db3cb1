//! Parameter tree shared by collectors and plugins
//!
//! A [`Node`] has a name, a string content and ordered children. YAML
//! documents map onto it as follows:
//!
//! - a mapping entry `key: value` becomes a child named `key`
//! - a sequence item that is a scalar becomes an unnamed child holding it
//! - a sequence item that is a mapping is flattened into named children
//!
//! ```rust
//! use gleaner::Node;
//!
//! let params = Node::from_yaml_str("Aggregator", "- node\n- svm<type=rw>\n").unwrap();
//! assert_eq!(params.all_child_contents(), vec!["node", "svm<type=rw>"]);
//! ```

use crate::error::Result;
use serde_yaml::Value as Yaml;

/// One node of a parameter tree
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Node {
    name: String,
    content: String,
    children: Vec<Node>,
}

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_content(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
            children: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn set_content(&mut self, content: impl Into<String>) {
        self.content = content.into();
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// First child named `name`
    pub fn child(&self, name: &str) -> Option<&Node> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut Node> {
        self.children.iter_mut().find(|c| c.name == name)
    }

    /// Content of the first child named `name`, when non-empty
    pub fn child_content(&self, name: &str) -> Option<&str> {
        self.child(name)
            .map(|c| c.content.as_str())
            .filter(|c| !c.is_empty())
    }

    /// Walk a path of child names
    pub fn path(&self, path: &[&str]) -> Option<&Node> {
        path.iter().try_fold(self, |node, name| node.child(name))
    }

    /// Contents of all children, in order
    pub fn all_child_contents(&self) -> Vec<&str> {
        self.children.iter().map(|c| c.content.as_str()).collect()
    }

    /// Names of all children, in order
    pub fn all_child_names(&self) -> Vec<&str> {
        self.children.iter().map(|c| c.name.as_str()).collect()
    }

    /// Append a child and return it
    pub fn new_child(&mut self, name: impl Into<String>, content: impl Into<String>) -> &mut Node {
        self.children.push(Node::with_content(name, content));
        let last = self.children.len() - 1;
        &mut self.children[last]
    }

    pub fn add_child(&mut self, child: Node) {
        self.children.push(child);
    }

    /// Parse a YAML document into a tree rooted at `name`
    pub fn from_yaml_str(name: impl Into<String>, yaml: &str) -> Result<Node> {
        let value: Yaml = serde_yaml::from_str(yaml)?;
        Ok(Node::from_yaml_value(name, &value))
    }

    /// Convert an already-parsed YAML value
    pub fn from_yaml_value(name: impl Into<String>, value: &Yaml) -> Node {
        let mut node = Node::new(name);
        match value {
            Yaml::Mapping(map) => {
                for (k, v) in map {
                    node.children.push(Node::from_yaml_value(scalar(k), v));
                }
            }
            Yaml::Sequence(items) => {
                for item in items {
                    match item {
                        Yaml::Mapping(map) => {
                            for (k, v) in map {
                                node.children.push(Node::from_yaml_value(scalar(k), v));
                            }
                        }
                        other => node.children.push(Node::from_yaml_value("", other)),
                    }
                }
            }
            Yaml::Tagged(tagged) => return Node::from_yaml_value(node.name, &tagged.value),
            other => node.content = scalar(other),
        }
        node
    }
}

fn scalar(value: &Yaml) -> String {
    match value {
        Yaml::Null => String::new(),
        Yaml::Bool(b) => b.to_string(),
        Yaml::Number(n) => n.to_string(),
        Yaml::String(s) => s.clone(),
        Yaml::Tagged(tagged) => scalar(&tagged.value),
        Yaml::Sequence(_) | Yaml::Mapping(_) => String::new(),
    }
}
