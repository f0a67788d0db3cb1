// Gleaner Plugins - Matrix transformation plugins
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! What ChangeLog tracks for an object

use crate::error::{PluginError, Result};
use gleaner::Node;
use log::{error, warn};
use serde::Deserialize;

/// Built-in tracking for the common objects
pub const DEFAULT_TEMPLATE: &str = r#"
ChangeLog:
  - object: svm
    track:
      - svm
      - state
      - type
      - anti_ransomware_state
  - object: node
    track:
      - node
      - location
      - healthy
  - object: volume
    track:
      - node
      - volume
      - svm
      - style
      - type
      - aggr
      - state
      - status
"#;

/// Tracking configuration of one object
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Entry {
    #[serde(default)]
    pub object: String,
    /// Label names and metric display names to watch
    #[serde(default)]
    pub track: Vec<String>,
    /// Labels identifying the object on each change row
    #[serde(default)]
    pub publish_labels: Vec<String>,
    /// Copy every label when no publish labels are known
    #[serde(skip)]
    pub include_all: bool,
}

#[derive(Debug, Deserialize)]
struct Template {
    #[serde(rename = "ChangeLog")]
    change_logs: Vec<Entry>,
}

impl Entry {
    /// Entry from a YAML document holding `track` and `publish_labels`
    pub fn from_yaml(object: &str, yaml: &str) -> Result<Entry> {
        let mut entry: Entry = serde_yaml::from_str(yaml)?;
        entry.object = object.to_string();
        Ok(entry)
    }

    /// Built-in entry for `object`, if there is one
    pub fn builtin(object: &str) -> Result<Option<Entry>> {
        let template: Template = serde_yaml::from_str(DEFAULT_TEMPLATE)?;
        Ok(template.change_logs.into_iter().find(|e| e.object == object))
    }

    /// Resolve the entry for `object`
    ///
    /// Plugin parameters with a `track` list override the built-in entry.
    /// Without publish labels, the collector's instance keys are used, or all
    /// labels when the collector exports all of them.
    pub fn resolve(object: &str, params: &Node, parent_params: &Node) -> Result<Entry> {
        let mut entry = match params.child("track") {
            Some(track) => Entry {
                object: object.to_string(),
                track: track.all_child_contents().into_iter().map(String::from).collect(),
                publish_labels: params
                    .child("publish_labels")
                    .map(|n| n.all_child_contents().into_iter().map(String::from).collect())
                    .unwrap_or_default(),
                include_all: false,
            },
            None => Entry::builtin(object)?.unwrap_or_default(),
        };
        if entry.track.is_empty() {
            return Err(PluginError::MissingParam(format!("track for object {}", object)));
        }

        if entry.publish_labels.is_empty() {
            if let Some(options) = parent_params.child("export_options") {
                if let Some(keys) = options.child("instance_keys") {
                    entry.publish_labels = keys
                        .all_child_contents()
                        .into_iter()
                        .map(String::from)
                        .collect();
                } else if let Some(raw) = options.child_content("include_all_labels") {
                    match raw.parse::<bool>() {
                        Ok(all) => entry.include_all = all,
                        Err(e) => error!("include_all_labels {:?}: {}", raw, e),
                    }
                }
            }
            if entry.publish_labels.is_empty() && !entry.include_all {
                warn!("ChangeLog {}: no publish labels", object);
            }
        }
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin() {
        let svm = Entry::builtin("svm").unwrap().unwrap();
        assert_eq!(svm.track, vec!["svm", "state", "type", "anti_ransomware_state"]);
        assert_eq!(Entry::builtin("node").unwrap().unwrap().track.len(), 3);
        assert_eq!(Entry::builtin("volume").unwrap().unwrap().track.len(), 8);
        assert!(Entry::builtin("lun").unwrap().is_none());
    }

    #[test]
    fn test_from_yaml() {
        let e = Entry::from_yaml("qtree", "track:\n  - qtree\npublish_labels:\n  - svm\n").unwrap();
        assert_eq!(e.object, "qtree");
        assert_eq!(e.track, vec!["qtree"]);
        assert_eq!(e.publish_labels, vec!["svm"]);
        assert!(Entry::from_yaml("qtree", "track: [").is_err());
    }

    #[test]
    fn test_resolve_override_and_keys() {
        let params = Node::from_yaml_str("ChangeLog", "track:\n  - svm\n  - size\n").unwrap();
        let parent = Node::from_yaml_str(
            "volume",
            "object: volume\nexport_options:\n  instance_keys:\n    - volume\n    - svm\n",
        )
        .unwrap();
        let e = Entry::resolve("volume", &params, &parent).unwrap();
        assert_eq!(e.track, vec!["svm", "size"]);
        assert_eq!(e.publish_labels, vec!["volume", "svm"]);
        assert!(!e.include_all);
    }

    #[test]
    fn test_resolve_include_all() {
        let parent = Node::from_yaml_str(
            "node",
            "export_options:\n  include_all_labels: true\n",
        )
        .unwrap();
        let e = Entry::resolve("node", &Node::new("ChangeLog"), &parent).unwrap();
        assert_eq!(e.track, vec!["node", "location", "healthy"]);
        assert!(e.publish_labels.is_empty());
        assert!(e.include_all);
    }

    #[test]
    fn test_resolve_unknown_object() {
        assert!(matches!(
            Entry::resolve("lun", &Node::new("ChangeLog"), &Node::new("lun")),
            Err(PluginError::MissingParam(_))
        ));
    }
}
