use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

/// Errors raised by [`KvTree`] operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeError<K: Debug> {
    #[error("key {0:?} is already present in the tree")]
    DuplicateKey(K),

    #[error("key {0:?} not found")]
    KeyNotFound(K),

    #[error("parent key {0:?} not found")]
    ParentNotFound(K),

    #[error("moving {key:?} under {parent:?} would create a cycle")]
    Cycle { key: K, parent: K },
}

/// A node of the forest. The tree owns every node; links are keys, never references.
#[derive(Debug, Clone)]
pub struct TreeNode<K, V> {
    key: K,
    value: V,
    parent: Option<K>,
    children: Vec<K>,
}

impl<K, V> TreeNode<K, V> {
    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    pub fn value_mut(&mut self) -> &mut V {
        &mut self.value
    }

    /// Key of the parent node, `None` for roots.
    pub fn parent(&self) -> Option<&K> {
        self.parent.as_ref()
    }

    /// Child keys in attachment order.
    pub fn children(&self) -> &[K] {
        &self.children
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// Keyed forest with O(1) lookup.
///
/// Multiple roots are allowed. Keys are unique across the whole forest and
/// removing a node removes its entire subtree.
#[derive(Debug, Clone)]
pub struct KvTree<K, V> {
    nodes: HashMap<K, TreeNode<K, V>>,
    roots: Vec<K>,
}

impl<K, V> KvTree<K, V>
where
    K: Eq + Hash + Clone + Debug,
{
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            roots: Vec::new(),
        }
    }

    /// Insert a value as a root, or as the last child of `parent`.
    pub fn insert(&mut self, key: K, value: V, parent: Option<&K>) -> Result<(), TreeError<K>> {
        if self.nodes.contains_key(&key) {
            return Err(TreeError::DuplicateKey(key));
        }
        match parent {
            Some(parent_key) => {
                let parent_node = self
                    .nodes
                    .get_mut(parent_key)
                    .ok_or_else(|| TreeError::ParentNotFound(parent_key.clone()))?;
                parent_node.children.push(key.clone());
            }
            None => self.roots.push(key.clone()),
        }
        self.nodes.insert(
            key.clone(),
            TreeNode {
                key,
                value,
                parent: parent.cloned(),
                children: Vec::new(),
            },
        );
        Ok(())
    }

    pub fn get(&self, key: &K) -> Option<&TreeNode<K, V>> {
        self.nodes.get(key)
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut TreeNode<K, V>> {
        self.nodes.get_mut(key)
    }

    /// The value stored under `key`.
    pub fn value(&self, key: &K) -> Result<&V, TreeError<K>> {
        self.nodes
            .get(key)
            .map(|node| &node.value)
            .ok_or_else(|| TreeError::KeyNotFound(key.clone()))
    }

    pub fn contains(&self, key: &K) -> bool {
        self.nodes.contains_key(key)
    }

    /// Parent key of `key`, `None` for roots and unknown keys.
    pub fn parent(&self, key: &K) -> Option<&K> {
        self.nodes.get(key).and_then(|node| node.parent.as_ref())
    }

    /// Child keys of `key`, `None` if the key is unknown.
    pub fn children(&self, key: &K) -> Option<&[K]> {
        self.nodes.get(key).map(|node| node.children.as_slice())
    }

    /// Root keys in insertion order.
    pub fn roots(&self) -> &[K] {
        &self.roots
    }

    /// Every descendant of `key` in pre-order, excluding `key` itself.
    pub fn descendants(&self, key: &K) -> Vec<K> {
        let mut out = Vec::new();
        let mut stack: Vec<K> = match self.nodes.get(key) {
            Some(node) => node.children.iter().rev().cloned().collect(),
            None => return out,
        };
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.get(&current) {
                stack.extend(node.children.iter().rev().cloned());
            }
            out.push(current);
        }
        out
    }

    /// Whether `ancestor` lies on the path from `key` to its root.
    pub fn is_ancestor(&self, ancestor: &K, key: &K) -> bool {
        let mut cursor = self.parent(key);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.parent(current);
        }
        false
    }

    /// Move `key` (with its subtree) under `new_parent`, or make it a root.
    ///
    /// Rejects moves that would make a node its own ancestor, leaving the
    /// tree untouched.
    pub fn reparent(&mut self, key: &K, new_parent: Option<&K>) -> Result<(), TreeError<K>> {
        let current_parent = self
            .nodes
            .get(key)
            .ok_or_else(|| TreeError::KeyNotFound(key.clone()))?
            .parent
            .clone();

        if let Some(parent_key) = new_parent {
            if !self.nodes.contains_key(parent_key) {
                return Err(TreeError::ParentNotFound(parent_key.clone()));
            }
            if parent_key == key || self.is_ancestor(key, parent_key) {
                return Err(TreeError::Cycle {
                    key: key.clone(),
                    parent: parent_key.clone(),
                });
            }
        }

        if current_parent.as_ref() == new_parent {
            return Ok(());
        }

        match &current_parent {
            Some(old) => {
                if let Some(old_node) = self.nodes.get_mut(old) {
                    old_node.children.retain(|child| child != key);
                }
            }
            None => self.roots.retain(|root| root != key),
        }

        match new_parent {
            Some(parent_key) => {
                if let Some(parent_node) = self.nodes.get_mut(parent_key) {
                    parent_node.children.push(key.clone());
                }
            }
            None => self.roots.push(key.clone()),
        }

        if let Some(node) = self.nodes.get_mut(key) {
            node.parent = new_parent.cloned();
        }
        Ok(())
    }

    /// Remove `key` and its whole subtree.
    ///
    /// Returns the removed entries in post-order (children before their
    /// ancestors, `key` last).
    pub fn remove(&mut self, key: &K) -> Result<Vec<(K, V)>, TreeError<K>> {
        let parent = self
            .nodes
            .get(key)
            .ok_or_else(|| TreeError::KeyNotFound(key.clone()))?
            .parent
            .clone();

        match parent {
            Some(parent_key) => {
                if let Some(parent_node) = self.nodes.get_mut(&parent_key) {
                    parent_node.children.retain(|child| child != key);
                }
            }
            None => self.roots.retain(|root| root != key),
        }

        let mut removed = Vec::new();
        self.remove_subtree(key.clone(), &mut removed);
        Ok(removed)
    }

    fn remove_subtree(&mut self, key: K, removed: &mut Vec<(K, V)>) {
        let children = self
            .nodes
            .get_mut(&key)
            .map(|node| std::mem::take(&mut node.children))
            .unwrap_or_default();
        for child in children {
            self.remove_subtree(child, removed);
        }
        if let Some(node) = self.nodes.remove(&key) {
            removed.push((node.key, node.value));
        }
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.roots.clear();
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterate over every node in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = &TreeNode<K, V>> {
        self.nodes.values()
    }
}

impl<K, V> Default for KvTree<K, V>
where
    K: Eq + Hash + Clone + Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// a -> (b -> d), c
    fn sample() -> KvTree<&'static str, u32> {
        let mut tree = KvTree::new();
        tree.insert("a", 1, None).unwrap();
        tree.insert("b", 2, Some(&"a")).unwrap();
        tree.insert("c", 3, Some(&"a")).unwrap();
        tree.insert("d", 4, Some(&"b")).unwrap();
        tree
    }

    #[test]
    fn insert_then_get() {
        let tree = sample();
        let node = tree.get(&"d").unwrap();
        assert_eq!(*node.value(), 4);
        assert_eq!(node.parent(), Some(&"b"));
        assert_eq!(tree.children(&"a").unwrap(), &["b", "c"]);
        assert_eq!(tree.roots(), &["a"]);
        assert_eq!(tree.len(), 4);
    }

    #[test]
    fn duplicate_insert_fails() {
        let mut tree = sample();
        assert_eq!(tree.insert("b", 9, None), Err(TreeError::DuplicateKey("b")));
        assert_eq!(*tree.value(&"b").unwrap(), 2);
    }

    #[test]
    fn insert_under_missing_parent_fails() {
        let mut tree = sample();
        assert_eq!(
            tree.insert("x", 9, Some(&"missing")),
            Err(TreeError::ParentNotFound("missing"))
        );
        assert!(!tree.contains(&"x"));
    }

    #[test]
    fn value_of_missing_key_fails() {
        let tree = sample();
        assert_eq!(tree.value(&"zz"), Err(TreeError::KeyNotFound("zz")));
    }

    #[test]
    fn remove_cascades_post_order() {
        let mut tree = sample();
        let removed = tree.remove(&"a").unwrap();
        let keys: Vec<_> = removed.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec!["d", "b", "c", "a"]);
        for key in ["a", "b", "c", "d"] {
            assert!(tree.get(&key).is_none());
        }
        assert!(tree.is_empty());
        assert!(tree.roots().is_empty());
    }

    #[test]
    fn remove_detaches_from_parent() {
        let mut tree = sample();
        tree.remove(&"b").unwrap();
        assert_eq!(tree.children(&"a").unwrap(), &["c"]);
        assert!(!tree.contains(&"d"));
        assert_eq!(tree.remove(&"b"), Err(TreeError::KeyNotFound("b")));
    }

    #[test]
    fn reparent_moves_subtree() {
        let mut tree = sample();
        tree.reparent(&"b", Some(&"c")).unwrap();
        assert_eq!(tree.children(&"a").unwrap(), &["c"]);
        assert_eq!(tree.children(&"c").unwrap(), &["b"]);
        assert_eq!(tree.parent(&"d"), Some(&"b"));
        assert!(tree.is_ancestor(&"c", &"d"));
    }

    #[test]
    fn reparent_to_root_and_back() {
        let mut tree = sample();
        tree.reparent(&"b", None).unwrap();
        assert_eq!(tree.roots(), &["a", "b"]);
        assert!(tree.get(&"b").unwrap().is_root());
        tree.reparent(&"b", Some(&"a")).unwrap();
        assert_eq!(tree.roots(), &["a"]);
    }

    #[test]
    fn reparent_onto_self_leaves_tree_unchanged() {
        let mut tree = sample();
        let err = tree.reparent(&"b", Some(&"b")).unwrap_err();
        assert_eq!(err, TreeError::Cycle { key: "b", parent: "b" });
        assert_eq!(tree.parent(&"b"), Some(&"a"));
        assert_eq!(tree.children(&"a").unwrap(), &["b", "c"]);
        assert_eq!(tree.children(&"b").unwrap(), &["d"]);
    }

    #[test]
    fn reparent_under_descendant_is_rejected() {
        let mut tree = sample();
        assert!(matches!(
            tree.reparent(&"a", Some(&"d")),
            Err(TreeError::Cycle { .. })
        ));
        assert_eq!(tree.roots(), &["a"]);
        assert_eq!(tree.parent(&"d"), Some(&"b"));
    }

    #[test]
    fn reparent_errors_for_unknown_keys() {
        let mut tree = sample();
        assert_eq!(tree.reparent(&"q", None), Err(TreeError::KeyNotFound("q")));
        assert_eq!(
            tree.reparent(&"b", Some(&"q")),
            Err(TreeError::ParentNotFound("q"))
        );
    }

    #[test]
    fn descendants_pre_order() {
        let tree = sample();
        assert_eq!(tree.descendants(&"a"), vec!["b", "d", "c"]);
        assert!(tree.descendants(&"d").is_empty());
    }

    #[test]
    fn clear_empties_forest() {
        let mut tree = sample();
        tree.insert("r", 0, None).unwrap();
        tree.clear();
        assert!(tree.is_empty());
        assert!(tree.roots().is_empty());
    }
}
