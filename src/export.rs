//! Export options: which instance labels become series keys

use crate::error::{MatrixError, Result};
use crate::node::Node;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Splits instance labels into identity keys and free labels
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportOptions {
    /// Labels that identify a series
    #[serde(default)]
    pub instance_keys: Vec<String>,

    /// Labels attached to a series without being part of its identity
    #[serde(default)]
    pub instance_labels: Vec<String>,

    /// Export every label as a free label
    #[serde(default)]
    pub include_all_labels: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            instance_keys: Vec::new(),
            instance_labels: Vec::new(),
            include_all_labels: true,
        }
    }
}

impl ExportOptions {
    /// Options with explicit instance keys
    pub fn with_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            instance_keys: keys.into_iter().map(Into::into).collect(),
            instance_labels: Vec::new(),
            include_all_labels: false,
        }
    }

    /// Read options from an `export_options` parameter node
    pub fn from_node(node: &Node) -> Result<Self> {
        let list = |name: &str| -> Vec<String> {
            node.child(name)
                .map(|c| {
                    c.all_child_contents()
                        .into_iter()
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default()
        };
        let include_all_labels = match node.child_content("include_all_labels") {
            Some(v) => v.parse::<bool>().map_err(|_| {
                MatrixError::invalid_param("include_all_labels", format!("not a bool: {}", v))
            })?,
            None => false,
        };
        Ok(Self {
            instance_keys: list("instance_keys"),
            instance_labels: list("instance_labels"),
            include_all_labels,
        })
    }

    /// Split `labels` into `(keys, free labels)`
    ///
    /// With `include_all_labels` every label is free and no key is declared.
    /// Labels missing from the bag are skipped.
    pub fn split_labels(
        &self,
        labels: &HashMap<String, String>,
    ) -> (BTreeMap<String, String>, BTreeMap<String, String>) {
        if self.include_all_labels {
            let all = labels.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
            return (BTreeMap::new(), all);
        }
        let pick = |names: &[String]| {
            names
                .iter()
                .filter_map(|k| labels.get(k).map(|v| (k.clone(), v.clone())))
                .collect::<BTreeMap<_, _>>()
        };
        (pick(&self.instance_keys), pick(&self.instance_labels))
    }
}
