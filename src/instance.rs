//! Instance: one row of a [`Matrix`](crate::Matrix)

use std::collections::HashMap;

/// Row identity, label bag and export flag
///
/// The `index` is assigned by the owning matrix and addresses the cell of
/// this row in every metric column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    index: usize,
    labels: HashMap<String, String>,
    exportable: bool,
}

impl Instance {
    /// Create an exportable instance with no labels
    pub fn new(index: usize) -> Self {
        Self {
            index,
            labels: HashMap::new(),
            exportable: true,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub(crate) fn set_index(&mut self, index: usize) {
        self.index = index;
    }

    /// Label value, `None` when absent
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    /// Label value, empty when absent
    pub fn label_or_empty(&self, key: &str) -> &str {
        self.label(key).unwrap_or("")
    }

    pub fn has_label(&self, key: &str) -> bool {
        self.labels.contains_key(key)
    }

    pub fn set_label(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.labels.insert(key.into(), value.into());
    }

    pub fn remove_label(&mut self, key: &str) -> Option<String> {
        self.labels.remove(key)
    }

    pub fn labels(&self) -> &HashMap<String, String> {
        &self.labels
    }

    /// Replace the whole label bag
    pub fn set_labels(&mut self, labels: HashMap<String, String>) {
        self.labels = labels;
    }

    pub fn is_exportable(&self) -> bool {
        self.exportable
    }

    pub fn set_exportable(&mut self, exportable: bool) {
        self.exportable = exportable;
    }

    /// Copy with the given export flag, keeping only `labels` when set
    pub fn clone_with(&self, exportable: bool, labels: Option<&[String]>) -> Self {
        let labels = match labels {
            Some(keys) => keys
                .iter()
                .filter_map(|k| self.labels.get(k).map(|v| (k.clone(), v.clone())))
                .collect(),
            None => self.labels.clone(),
        };
        Self {
            index: self.index,
            labels,
            exportable,
        }
    }

    /// Compare the `keys` labels of `self` against `prev`
    ///
    /// Returns `(current, previous)` maps holding only the labels whose
    /// values differ. A label absent on one side compares as empty.
    pub fn compare_diffs(
        &self,
        prev: &Instance,
        keys: &[String],
    ) -> (HashMap<String, String>, HashMap<String, String>) {
        let mut current = HashMap::new();
        let mut previous = HashMap::new();
        for key in keys {
            let cur = self.label_or_empty(key);
            let old = prev.label_or_empty(key);
            if cur != old {
                current.insert(key.clone(), cur.to_string());
                previous.insert(key.clone(), old.to_string());
            }
        }
        (current, previous)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_labels() {
        let mut inst = Instance::new(3);
        assert_eq!(inst.index(), 3);
        assert!(inst.is_exportable());

        inst.set_label("svm", "vs0");
        assert_eq!(inst.label("svm"), Some("vs0"));
        assert_eq!(inst.label_or_empty("node"), "");
        assert!(inst.has_label("svm"));

        assert_eq!(inst.remove_label("svm"), Some("vs0".to_string()));
        assert!(!inst.has_label("svm"));
    }

    #[test]
    fn test_clone_with_label_subset() {
        let mut inst = Instance::new(0);
        inst.set_label("uuid", "u1");
        inst.set_label("svm", "vs0");
        inst.set_label("node", "n1");

        let keep = vec!["uuid".to_string(), "svm".to_string(), "missing".to_string()];
        let copy = inst.clone_with(false, Some(&keep));
        assert_eq!(copy.labels().len(), 2);
        assert!(!copy.is_exportable());
        assert_eq!(copy.label("svm"), Some("vs0"));
        assert!(copy.label("node").is_none());
    }

    #[test]
    fn test_compare_diffs() {
        let mut prev = Instance::new(0);
        prev.set_label("svm", "s1");
        prev.set_label("type", "t1");
        let mut cur = Instance::new(0);
        cur.set_label("svm", "s2");
        cur.set_label("type", "t1");
        cur.set_label("state", "online");

        let keys = vec!["svm".to_string(), "type".to_string(), "state".to_string()];
        let (c, o) = cur.compare_diffs(&prev, &keys);
        assert_eq!(c.len(), 2);
        assert_eq!(c["svm"], "s2");
        assert_eq!(o["svm"], "s1");
        assert_eq!(o["state"], "");
    }
}
