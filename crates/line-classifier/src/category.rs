/// Category hierarchy stored as an arena.
///
/// Every node lives in one `Vec` owned by `CategoryTree` and is addressed by a
/// `CategoryId`. Children are kept as ordered id lists and the parent link is a plain id,
/// so the tree has a single owner and no reference cycles.
///
/// Levels are assigned on attachment (root = 0, child = parent + 1), which keeps the
/// depth invariant true for any tree built through `add_child`.
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Stable handle to a node of one `CategoryTree`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CategoryId(usize);

impl CategoryId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for CategoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Input for a node that has not been attached yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCategory {
    pub code: String,
    pub name: String,
    pub description: Option<String>,
}

impl NewCategory {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// One node of the taxonomy.
#[derive(Debug, Clone, Serialize)]
pub struct Category {
    code: String,
    name: String,
    level: u32,
    description: Option<String>,
    parent: Option<CategoryId>,
    children: Vec<CategoryId>,
}

impl Category {
    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Description for classifier context, falling back to the name.
    pub fn description_or_name(&self) -> &str {
        self.description
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .unwrap_or(&self.name)
    }

    pub fn parent(&self) -> Option<CategoryId> {
        self.parent
    }

    pub fn children(&self) -> &[CategoryId] {
        &self.children
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct CategoryTree {
    nodes: Vec<Category>,
}

impl CategoryTree {
    /// Create a tree holding only `root` at level 0.
    pub fn new(root: NewCategory) -> Self {
        Self {
            nodes: vec![Category {
                code: root.code,
                name: root.name,
                level: 0,
                description: root.description,
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    pub fn root(&self) -> CategoryId {
        CategoryId(0)
    }

    pub fn get(&self, id: CategoryId) -> Option<&Category> {
        self.nodes.get(id.0)
    }

    /// Like `get`, but an unknown id is an error.
    pub fn category(&self, id: CategoryId) -> Result<&Category, AppError> {
        self.get(id).ok_or(AppError::UnknownCategory(id))
    }

    /// Attach `child` under `parent`.
    ///
    /// When `parent` already has a child with the same code nothing changes and the
    /// existing sibling's id is returned.
    pub fn add_child(
        &mut self,
        parent: CategoryId,
        child: NewCategory,
    ) -> Result<CategoryId, AppError> {
        let level = self.category(parent)?.level + 1;
        if let Some(existing) = self.find_child_by_code(parent, &child.code) {
            return Ok(existing);
        }

        let id = CategoryId(self.nodes.len());
        self.nodes.push(Category {
            code: child.code,
            name: child.name,
            level,
            description: child.description,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent.0].children.push(id);
        Ok(id)
    }

    /// Children of `id` in insertion order; empty for leaves and unknown ids.
    pub fn children(&self, id: CategoryId) -> &[CategoryId] {
        self.get(id).map(Category::children).unwrap_or(&[])
    }

    pub fn parent(&self, id: CategoryId) -> Option<CategoryId> {
        self.get(id)?.parent
    }

    pub fn is_leaf(&self, id: CategoryId) -> bool {
        self.children(id).is_empty()
    }

    pub fn find_child_by_code(&self, parent: CategoryId, code: &str) -> Option<CategoryId> {
        self.children(parent)
            .iter()
            .copied()
            .find(|c| self.nodes[c.0].code == code)
    }

    /// Names of the ancestors of `id`, root first. Empty for the root.
    pub fn ancestors(&self, id: CategoryId) -> Vec<&str> {
        let mut names = Vec::new();
        let mut current = self.parent(id);
        while let Some(p) = current {
            names.push(self.nodes[p.0].name.as_str());
            current = self.nodes[p.0].parent;
        }
        names.reverse();
        names
    }

    /// Node ids in pre-order (parent before children, children in insertion order).
    pub fn preorder(&self) -> Vec<CategoryId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root()];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.children(id).iter().rev().copied());
        }
        order
    }

    pub fn iter(&self) -> impl Iterator<Item = (CategoryId, &Category)> + '_ {
        self.preorder()
            .into_iter()
            .map(move |id| (id, &self.nodes[id.0]))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false: a tree holds at least its root.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Deepest level present in the tree.
    pub fn depth(&self) -> u32 {
        self.nodes.iter().map(|n| n.level).max().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> (CategoryTree, CategoryId, CategoryId) {
        let mut tree = CategoryTree::new(NewCategory::new("root", "All Categories"));
        let a = tree
            .add_child(tree.root(), NewCategory::new("A", "Alpha"))
            .unwrap();
        let a1 = tree
            .add_child(a, NewCategory::new("A.1", "Alpha One").with_description("first"))
            .unwrap();
        tree.add_child(tree.root(), NewCategory::new("B", "Beta"))
            .unwrap();
        (tree, a, a1)
    }

    #[test]
    fn add_child_sets_level_and_parent() {
        let (tree, a, a1) = tree();
        let root = tree.get(tree.root()).unwrap();
        assert_eq!(root.level(), 0);
        assert_eq!(root.parent(), None);

        assert_eq!(tree.get(a).unwrap().level(), 1);
        assert_eq!(tree.parent(a), Some(tree.root()));
        assert_eq!(tree.get(a1).unwrap().level(), 2);
        assert_eq!(tree.parent(a1), Some(a));
        assert_eq!(tree.depth(), 2);
    }

    #[test]
    fn duplicate_code_is_a_no_op() {
        let (mut tree, a, a1) = tree();
        let again = tree
            .add_child(a, NewCategory::new("A.1", "Different name"))
            .unwrap();
        assert_eq!(again, a1);
        assert_eq!(tree.children(a), &[a1]);
        assert_eq!(tree.get(a1).unwrap().name(), "Alpha One");
        assert_eq!(tree.len(), 4);
    }

    #[test]
    fn same_code_under_different_parents_is_allowed() {
        let (mut tree, a, _) = tree();
        let b = tree.find_child_by_code(tree.root(), "B").unwrap();
        let under_b = tree.add_child(b, NewCategory::new("A.1", "Alpha One")).unwrap();
        assert_eq!(tree.parent(under_b), Some(b));
        assert_eq!(tree.children(a).len(), 1);
    }

    #[test]
    fn children_keep_insertion_order() {
        let (tree, a, _) = tree();
        let names: Vec<&str> = tree
            .children(tree.root())
            .iter()
            .map(|id| tree.get(*id).unwrap().name())
            .collect();
        assert_eq!(names, ["Alpha", "Beta"]);
        assert_eq!(tree.children(tree.root())[0], a);
    }

    #[test]
    fn unknown_parent_is_rejected() {
        let (mut tree, _, _) = tree();
        let err = tree
            .add_child(CategoryId(99), NewCategory::new("X", "X"))
            .unwrap_err();
        assert!(matches!(err, AppError::UnknownCategory(id) if id.index() == 99));
    }

    #[test]
    fn ancestors_are_root_first() {
        let (tree, _, a1) = tree();
        assert_eq!(tree.ancestors(a1), ["All Categories", "Alpha"]);
        assert!(tree.ancestors(tree.root()).is_empty());
    }

    #[test]
    fn preorder_visits_parents_first() {
        let (tree, _, _) = tree();
        let codes: Vec<&str> = tree.iter().map(|(_, c)| c.code()).collect();
        assert_eq!(codes, ["root", "A", "A.1", "B"]);
    }

    #[test]
    fn description_falls_back_to_name() {
        let (tree, a, a1) = tree();
        assert_eq!(tree.get(a).unwrap().description_or_name(), "Alpha");
        assert_eq!(tree.get(a1).unwrap().description_or_name(), "first");
    }

    #[test]
    fn unknown_ids_read_as_leaves() {
        let (tree, _, _) = tree();
        assert!(tree.children(CategoryId(42)).is_empty());
        assert!(tree.is_leaf(CategoryId(42)));
        assert_eq!(tree.parent(CategoryId(42)), None);
    }
}
