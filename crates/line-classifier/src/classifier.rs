/// The classification capability used at every level of the traversal.
///
/// A `Classifier` picks one category out of a `CandidateSet` (the children of the node the
/// traversal is standing on). Backend failures are not errors here: each strategy turns
/// them into either a fallback decision or `ClassifyOutcome::Unresolved`.
use async_trait::async_trait;
use serde::Serialize;

use crate::category::{Category, CategoryId, CategoryTree};
use crate::error::AppError;

/// One level of a classification path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationDecision {
    pub category: CategoryId,
    /// Reported by the strategy; nominally in [0, 1] but not checked.
    pub confidence: f64,
    pub warning: Option<String>,
}

impl ClassificationDecision {
    /// An empty or blank warning is stored as `None`.
    pub fn new(category: CategoryId, confidence: f64, warning: Option<String>) -> Self {
        Self {
            category,
            confidence,
            warning: warning.filter(|w| !w.trim().is_empty()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClassifyOutcome {
    Decided(ClassificationDecision),
    /// No candidate could be selected; the traversal stops here.
    Unresolved { reason: String },
}

impl ClassifyOutcome {
    pub fn selected(&self) -> Option<CategoryId> {
        match self {
            Self::Decided(d) => Some(d.category),
            Self::Unresolved { .. } => None,
        }
    }

    pub fn confidence(&self) -> f64 {
        match self {
            Self::Decided(d) => d.confidence,
            Self::Unresolved { .. } => 0.0,
        }
    }

    pub fn warning(&self) -> Option<&str> {
        match self {
            Self::Decided(d) => d.warning.as_deref(),
            Self::Unresolved { reason } => Some(reason),
        }
    }
}

/// A non-empty group of siblings: same parent, same level.
#[derive(Debug, Clone, Copy)]
pub struct CandidateSet<'a> {
    tree: &'a CategoryTree,
    ids: &'a [CategoryId],
    level: u32,
    parent: Option<CategoryId>,
}

impl<'a> CandidateSet<'a> {
    pub fn new(tree: &'a CategoryTree, ids: &'a [CategoryId]) -> Result<Self, AppError> {
        let (&first, rest) = ids.split_first().ok_or(AppError::EmptyCandidates)?;
        let head = tree.category(first)?;
        for &id in rest {
            let c = tree.category(id)?;
            if c.parent() != head.parent() || c.level() != head.level() {
                return Err(AppError::NotSiblings {
                    code: c.code().to_string(),
                });
            }
        }
        Ok(Self {
            tree,
            ids,
            level: head.level(),
            parent: head.parent(),
        })
    }

    /// The children of `parent`. Fails with `EmptyCandidates` on a leaf.
    pub fn children_of(tree: &'a CategoryTree, parent: CategoryId) -> Result<Self, AppError> {
        tree.category(parent)?;
        Self::new(tree, tree.children(parent))
    }

    pub fn tree(&self) -> &'a CategoryTree {
        self.tree
    }

    pub fn ids(&self) -> &'a [CategoryId] {
        self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Always false for a constructed set.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn first(&self) -> CategoryId {
        self.ids[0]
    }

    /// Candidate at a 0-based position.
    pub fn get(&self, index: usize) -> Option<CategoryId> {
        self.ids.get(index).copied()
    }

    pub fn contains(&self, id: CategoryId) -> bool {
        self.ids.contains(&id)
    }

    /// Level shared by all candidates.
    pub fn level(&self) -> u32 {
        self.level
    }

    /// Parent shared by all candidates; `None` only when the root itself is the candidate.
    pub fn parent(&self) -> Option<&'a Category> {
        self.tree.get(self.parent?)
    }

    pub fn find_by_name(&self, name: &str) -> Option<CategoryId> {
        self.iter().find(|(_, c)| c.name() == name).map(|(id, _)| id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (CategoryId, &'a Category)> + 'a {
        let tree = self.tree;
        self.ids
            .iter()
            .filter_map(move |&id| tree.get(id).map(|c| (id, c)))
    }
}

/// Chooses the best candidate for a line item.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, query: &str, candidates: &CandidateSet<'_>) -> ClassifyOutcome;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::NewCategory;

    fn tree() -> CategoryTree {
        let mut tree = CategoryTree::new(NewCategory::new("root", "All Categories"));
        let a = tree.add_child(tree.root(), NewCategory::new("A", "Alpha")).unwrap();
        tree.add_child(tree.root(), NewCategory::new("B", "Beta")).unwrap();
        tree.add_child(a, NewCategory::new("A.1", "Alpha One")).unwrap();
        tree
    }

    #[test]
    fn children_of_builds_sibling_set() {
        let tree = tree();
        let set = CandidateSet::children_of(&tree, tree.root()).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.level(), 1);
        assert_eq!(set.parent().unwrap().code(), "root");
        assert_eq!(set.find_by_name("Beta"), set.get(1));
        assert_eq!(set.find_by_name("Gamma"), None);
    }

    #[test]
    fn empty_candidates_fail_fast() {
        let tree = tree();
        let leaf = tree.find_child_by_code(tree.root(), "B").unwrap();
        assert!(matches!(
            CandidateSet::children_of(&tree, leaf),
            Err(AppError::EmptyCandidates)
        ));
        assert!(matches!(
            CandidateSet::new(&tree, &[]),
            Err(AppError::EmptyCandidates)
        ));
    }

    #[test]
    fn non_siblings_are_rejected() {
        let tree = tree();
        let a = tree.find_child_by_code(tree.root(), "A").unwrap();
        let a1 = tree.find_child_by_code(a, "A.1").unwrap();
        let ids = [a, a1];
        match CandidateSet::new(&tree, &ids) {
            Err(AppError::NotSiblings { code }) => assert_eq!(code, "A.1"),
            other => panic!("expected NotSiblings, got {other:?}"),
        }
    }

    #[test]
    fn foreign_ids_are_rejected() {
        let tree = tree();
        let small = CategoryTree::new(NewCategory::new("x", "X"));
        let ids = tree.children(tree.root()).to_vec();
        assert!(matches!(
            CandidateSet::new(&small, &ids),
            Err(AppError::UnknownCategory(_))
        ));
    }

    #[test]
    fn unresolved_outcome_reports_zero_confidence() {
        let outcome = ClassifyOutcome::Unresolved {
            reason: "backend down".to_string(),
        };
        assert_eq!(outcome.selected(), None);
        assert_eq!(outcome.confidence(), 0.0);
        assert_eq!(outcome.warning(), Some("backend down"));
    }

    #[test]
    fn blank_warning_is_dropped() {
        let tree = tree();
        let d = ClassificationDecision::new(tree.root(), 0.9, Some("  ".to_string()));
        assert_eq!(d.warning, None);
        let d = ClassificationDecision::new(tree.root(), 0.9, Some("close call".to_string()));
        assert_eq!(d.warning.as_deref(), Some("close call"));
    }
}
