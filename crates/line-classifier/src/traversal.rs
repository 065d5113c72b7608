/// Top-down classification of one line item.
///
/// Starting at a node, the classifier picks among the node's children, the traversal
/// descends into the pick and repeats until it stands on a leaf. There is no backtracking:
/// a line item costs exactly one classifier call per level descended.
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::category::{CategoryId, CategoryTree};
use crate::classifier::{CandidateSet, ClassificationDecision, Classifier, ClassifyOutcome};
use crate::error::AppError;

/// Where and why a traversal stopped before reaching a leaf.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Halt {
    /// Node whose children could not be decided between.
    pub at: CategoryId,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationPath {
    pub start: CategoryId,
    /// One decision per level descended, top first.
    pub steps: Vec<ClassificationDecision>,
    pub halt: Option<Halt>,
}

impl ClassificationPath {
    fn new(start: CategoryId) -> Self {
        Self {
            start,
            steps: Vec::new(),
            halt: None,
        }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Last node reached: the last selection, or the start when nothing was selected.
    pub fn terminal(&self) -> CategoryId {
        self.steps.last().map(|s| s.category).unwrap_or(self.start)
    }

    /// The leaf the traversal ended on, if it was not halted.
    pub fn leaf(&self, tree: &CategoryTree) -> Option<CategoryId> {
        let terminal = self.terminal();
        (self.halt.is_none() && tree.is_leaf(terminal)).then_some(terminal)
    }

    pub fn names<'t>(&self, tree: &'t CategoryTree) -> Vec<&'t str> {
        self.steps
            .iter()
            .filter_map(|s| tree.get(s.category))
            .map(|c| c.name())
            .collect()
    }

    /// Step warnings followed by the halt reason, if any.
    pub fn warnings(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter_map(|s| s.warning.as_deref())
            .chain(self.halt.iter().map(|h| h.reason.as_str()))
            .collect()
    }

    pub fn min_confidence(&self) -> Option<f64> {
        self.steps.iter().map(|s| s.confidence).reduce(f64::min)
    }
}

/// Classify `line_item` from `start` down to a leaf.
///
/// Fails when `start` is not in `tree` or when the classifier selects something outside
/// the candidate set. A classifier that cannot decide halts the path instead.
pub async fn classify_path<C>(
    tree: &CategoryTree,
    start: CategoryId,
    line_item: &str,
    classifier: &C,
) -> Result<ClassificationPath, AppError>
where
    C: Classifier + ?Sized,
{
    tree.category(start)?;
    let mut path = ClassificationPath::new(start);
    let mut current = start;

    while !tree.is_leaf(current) {
        let candidates = CandidateSet::children_of(tree, current)?;
        match classifier.classify(line_item, &candidates).await {
            ClassifyOutcome::Decided(decision) => {
                let chosen = tree.category(decision.category)?;
                if !candidates.contains(decision.category) {
                    return Err(AppError::SelectionOutsideCandidates {
                        code: chosen.code().to_string(),
                    });
                }
                debug!(
                    level = chosen.level(),
                    code = chosen.code(),
                    confidence = decision.confidence,
                    warning = decision.warning.as_deref().unwrap_or(""),
                    "level decided"
                );
                current = decision.category;
                path.steps.push(decision);
            }
            ClassifyOutcome::Unresolved { reason } => {
                warn!(level = candidates.level(), reason = %reason, "classification halted");
                path.halt = Some(Halt {
                    at: current,
                    reason,
                });
                break;
            }
        }
    }

    info!(
        steps = path.steps.len(),
        halted = path.halt.is_some(),
        "classification path complete"
    );
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::category::NewCategory;

    /// Picks the first candidate and counts calls.
    #[derive(Default)]
    struct FirstCandidate {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Classifier for FirstCandidate {
        async fn classify(&self, _query: &str, candidates: &CandidateSet<'_>) -> ClassifyOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            ClassifyOutcome::Decided(ClassificationDecision::new(
                candidates.first(),
                0.8,
                Some("stub".to_string()),
            ))
        }
    }

    /// Picks the last candidate until `level`, then gives up.
    struct GiveUpAt {
        level: u32,
    }

    #[async_trait]
    impl Classifier for GiveUpAt {
        async fn classify(&self, _query: &str, candidates: &CandidateSet<'_>) -> ClassifyOutcome {
            if candidates.level() == self.level {
                return ClassifyOutcome::Unresolved {
                    reason: "no similar category found".to_string(),
                };
            }
            ClassifyOutcome::Decided(ClassificationDecision::new(
                candidates.get(candidates.len() - 1).unwrap(),
                1.0,
                None,
            ))
        }
    }

    /// Always answers with the root, which is never a candidate.
    struct Rogue;

    #[async_trait]
    impl Classifier for Rogue {
        async fn classify(&self, _query: &str, candidates: &CandidateSet<'_>) -> ClassifyOutcome {
            ClassifyOutcome::Decided(ClassificationDecision::new(
                candidates.tree().root(),
                1.0,
                None,
            ))
        }
    }

    /// root -> {A, B}; A -> {A1, A2}
    fn two_level() -> CategoryTree {
        let mut tree = CategoryTree::new(NewCategory::new("root", "Root"));
        let a = tree.add_child(tree.root(), NewCategory::new("A", "A")).unwrap();
        tree.add_child(tree.root(), NewCategory::new("B", "B")).unwrap();
        tree.add_child(a, NewCategory::new("A1", "A1")).unwrap();
        tree.add_child(a, NewCategory::new("A2", "A2")).unwrap();
        tree
    }

    #[tokio::test]
    async fn first_candidate_descends_to_leaf() {
        let tree = two_level();
        let classifier = FirstCandidate::default();
        let path = classify_path(&tree, tree.root(), "X", &classifier).await.unwrap();

        assert_eq!(path.names(&tree), ["A", "A1"]);
        assert!(path.steps.iter().all(|s| s.confidence == 0.8));
        assert!(path.steps.iter().all(|s| s.warning.as_deref() == Some("stub")));
        assert_eq!(path.halt, None);
        assert_eq!(path.leaf(&tree), Some(path.terminal()));
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn each_step_is_a_child_of_the_previous() {
        let tree = two_level();
        let path = classify_path(&tree, tree.root(), "X", &FirstCandidate::default())
            .await
            .unwrap();
        let mut parent = tree.root();
        for step in &path.steps {
            assert!(tree.children(parent).contains(&step.category));
            parent = step.category;
        }
    }

    #[tokio::test]
    async fn single_child_levels_still_call_classifier() {
        let mut tree = CategoryTree::new(NewCategory::new("root", "Root"));
        let mut parent = tree.root();
        for depth in 1..=3 {
            parent = tree
                .add_child(parent, NewCategory::new(format!("c{depth}"), format!("C{depth}")))
                .unwrap();
        }

        let classifier = FirstCandidate::default();
        let path = classify_path(&tree, tree.root(), "X", &classifier).await.unwrap();
        assert_eq!(path.len(), 3);
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 3);
        assert_eq!(path.leaf(&tree), Some(parent));
    }

    #[tokio::test]
    async fn starting_on_a_leaf_yields_empty_path() {
        let tree = two_level();
        let b = tree.find_child_by_code(tree.root(), "B").unwrap();
        let classifier = FirstCandidate::default();
        let path = classify_path(&tree, b, "X", &classifier).await.unwrap();
        assert!(path.is_empty());
        assert_eq!(path.leaf(&tree), Some(b));
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn starting_mid_tree_only_classifies_below() {
        let tree = two_level();
        let a = tree.find_child_by_code(tree.root(), "A").unwrap();
        let path = classify_path(&tree, a, "X", &FirstCandidate::default())
            .await
            .unwrap();
        assert_eq!(path.names(&tree), ["A1"]);
    }

    #[tokio::test]
    async fn unresolved_halts_the_path() {
        let tree = two_level();
        let path = classify_path(&tree, tree.root(), "X", &GiveUpAt { level: 1 })
            .await
            .unwrap();
        assert!(path.is_empty());
        let halt = path.halt.as_ref().unwrap();
        assert_eq!(halt.at, tree.root());
        assert_eq!(path.warnings(), ["no similar category found"]);
        assert_eq!(path.leaf(&tree), None);
    }

    #[tokio::test]
    async fn unresolved_below_first_level_keeps_earlier_steps() {
        let mut tree = two_level();
        let b = tree.find_child_by_code(tree.root(), "B").unwrap();
        tree.add_child(b, NewCategory::new("B1", "B1")).unwrap();

        let path = classify_path(&tree, tree.root(), "X", &GiveUpAt { level: 2 })
            .await
            .unwrap();
        assert_eq!(path.names(&tree), ["B"]);
        assert_eq!(path.halt.as_ref().unwrap().at, b);
    }

    #[tokio::test]
    async fn selection_outside_candidates_is_an_error() {
        let tree = two_level();
        let err = classify_path(&tree, tree.root(), "X", &Rogue).await.unwrap_err();
        assert!(matches!(err, AppError::SelectionOutsideCandidates { code } if code == "root"));
    }

    #[tokio::test]
    async fn unknown_start_is_an_error() {
        let tree = two_level();
        let single = CategoryTree::new(NewCategory::new("x", "X"));
        let a1 = tree.preorder()[2];
        let err = classify_path(&single, a1, "X", &FirstCandidate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UnknownCategory(id) if id == a1));
    }

    #[test]
    fn min_confidence_over_steps() {
        let tree = two_level();
        let order = tree.preorder();
        let mut path = ClassificationPath::new(tree.root());
        assert_eq!(path.min_confidence(), None);
        path.steps.push(ClassificationDecision::new(order[1], 0.9, None));
        path.steps.push(ClassificationDecision::new(order[2], 0.4, None));
        assert_eq!(path.min_confidence(), Some(0.4));
    }
}
