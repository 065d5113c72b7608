/// Similarity-search classification.
///
/// The line item is matched against an index of category documents. The search is
/// narrowed to the candidates' level and to documents whose ancestor at the parent's depth
/// carries the parent's name, so the single best hit is expected to be one of the
/// candidates. The hit is mapped back to a candidate by name.
use std::sync::Arc;

use arrow_array::{Array, Float32Array, RecordBatch, StringArray, UInt32Array};
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::classifier::{CandidateSet, ClassificationDecision, Classifier, ClassifyOutcome};
use classify_common::embedding::Embedder;
use classify_common::error::CommonError;
use classify_common::vectordb::VectorDb;

/// Metadata predicate for an index search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexFilter {
    pub level: u32,
    /// `(depth, name)` pairs: the ancestor at `depth` must be called `name`.
    pub ancestors: Vec<(u32, String)>,
}

impl IndexFilter {
    /// Restrict a search to the siblings in `candidates`.
    pub fn for_candidates(candidates: &CandidateSet<'_>) -> Self {
        let ancestors = candidates
            .parent()
            .map(|p| vec![(p.level(), p.name().to_string())])
            .unwrap_or_default();
        Self {
            level: candidates.level(),
            ancestors,
        }
    }

    /// DataFusion SQL predicate over the index columns (`level`, `l0`, `l1`, ...).
    pub fn to_sql(&self) -> String {
        let mut clauses = vec![format!("level = {}", self.level)];
        for (depth, name) in &self.ancestors {
            clauses.push(format!("{} = '{}'", path_column(*depth), name.replace('\'', "''")));
        }
        clauses.join(" AND ")
    }
}

/// Column holding the name of the ancestor at `depth`.
pub fn path_column(depth: u32) -> String {
    format!("l{depth}")
}

/// A document returned by the index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexMatch {
    pub code: String,
    pub name: String,
    pub level: u32,
    /// Higher is more similar.
    pub score: f32,
}

#[async_trait]
pub trait SimilarityIndex: Send + Sync {
    async fn search(
        &self,
        query: &str,
        top_k: usize,
        filter: &IndexFilter,
    ) -> Result<Vec<IndexMatch>, CommonError>;
}

pub struct VectorClassifier {
    index: Arc<dyn SimilarityIndex>,
}

impl VectorClassifier {
    pub fn new(index: Arc<dyn SimilarityIndex>) -> Self {
        Self { index }
    }
}

#[async_trait]
impl Classifier for VectorClassifier {
    async fn classify(&self, query: &str, candidates: &CandidateSet<'_>) -> ClassifyOutcome {
        let filter = IndexFilter::for_candidates(candidates);
        let matches = match self.index.search(query, 1, &filter).await {
            Ok(matches) => matches,
            Err(e) => {
                warn!(error = %e, level = filter.level, "similarity search failed");
                return ClassifyOutcome::Unresolved {
                    reason: e.to_string(),
                };
            }
        };

        let Some(best) = matches.first() else {
            return ClassifyOutcome::Unresolved {
                reason: format!("no similar category found for filter {}", filter.to_sql()),
            };
        };

        match candidates.find_by_name(&best.name) {
            Some(id) => {
                debug!(name = %best.name, score = best.score, "similarity match");
                ClassifyOutcome::Decided(ClassificationDecision::new(id, 1.0, None))
            }
            None => ClassifyOutcome::Unresolved {
                reason: format!("best match '{}' is not among the candidates", best.name),
            },
        }
    }
}

/// `SimilarityIndex` backed by fastembed + LanceDB.
pub struct LanceIndex {
    embedder: Arc<Embedder>,
    vectordb: Arc<VectorDb>,
    table: String,
}

impl LanceIndex {
    pub fn new(embedder: Arc<Embedder>, vectordb: Arc<VectorDb>, table: &str) -> Self {
        Self {
            embedder,
            vectordb,
            table: table.to_string(),
        }
    }
}

#[async_trait]
impl SimilarityIndex for LanceIndex {
    async fn search(
        &self,
        query: &str,
        top_k: usize,
        filter: &IndexFilter,
    ) -> Result<Vec<IndexMatch>, CommonError> {
        let embedding = self.embedder.embed_query(query).await?;
        let sql = filter.to_sql();
        let batches = self
            .vectordb
            .search(&self.table, &embedding, top_k, Some(&sql))
            .await?;
        Ok(extract_matches(&batches))
    }
}

/// Read `code`, `name`, `level` and `_distance` out of search result batches.
///
/// Batches missing one of the metadata columns are skipped.
fn extract_matches(batches: &[RecordBatch]) -> Vec<IndexMatch> {
    let mut matches = Vec::new();
    for batch in batches {
        let code = column::<StringArray>(batch, "code");
        let name = column::<StringArray>(batch, "name");
        let level = column::<UInt32Array>(batch, "level");
        let distance = column::<Float32Array>(batch, "_distance");

        let (Some(code), Some(name), Some(level)) = (code, name, level) else {
            warn!("search result batch missing expected columns");
            continue;
        };

        for row in 0..batch.num_rows() {
            // cosine distance: 0 = identical
            let d = distance.map(|c| c.value(row)).unwrap_or(0.0);
            matches.push(IndexMatch {
                code: code.value(row).to_string(),
                name: name.value(row).to_string(),
                level: level.value(row),
                score: (1.0 - d).max(0.0),
            });
        }
    }
    matches
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Option<&'a T> {
    batch.column_by_name(name)?.as_any().downcast_ref::<T>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use arrow_array::ArrayRef;
    use arrow_schema::{DataType, Field, Schema};

    use crate::category::{CategoryTree, NewCategory};

    enum Reply {
        Matches(Vec<&'static str>),
        Fail,
    }

    struct StubIndex {
        reply: Reply,
        seen: Mutex<Vec<(usize, IndexFilter)>>,
    }

    impl StubIndex {
        fn new(reply: Reply) -> Arc<Self> {
            Arc::new(Self {
                reply,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl SimilarityIndex for StubIndex {
        async fn search(
            &self,
            _query: &str,
            top_k: usize,
            filter: &IndexFilter,
        ) -> Result<Vec<IndexMatch>, CommonError> {
            self.seen.lock().unwrap().push((top_k, filter.clone()));
            match &self.reply {
                Reply::Matches(names) => Ok(names
                    .iter()
                    .map(|n| IndexMatch {
                        code: n.to_string(),
                        name: n.to_string(),
                        level: filter.level,
                        score: 0.9,
                    })
                    .collect()),
                Reply::Fail => Err(CommonError::VectorDb("table not found".to_string())),
            }
        }
    }

    fn tree() -> CategoryTree {
        let mut tree = CategoryTree::new(NewCategory::new("root", "All Categories"));
        let e = tree
            .add_child(tree.root(), NewCategory::new("2", "Electronics"))
            .unwrap();
        tree.add_child(e, NewCategory::new("2.1", "Computers")).unwrap();
        tree.add_child(e, NewCategory::new("2.2", "Mobile Devices")).unwrap();
        tree
    }

    fn electronics(tree: &CategoryTree) -> CandidateSet<'_> {
        let e = tree.find_child_by_code(tree.root(), "2").unwrap();
        CandidateSet::children_of(tree, e).unwrap()
    }

    #[test]
    fn filter_scopes_by_level_and_parent_name() {
        let tree = tree();
        let filter = IndexFilter::for_candidates(&electronics(&tree));
        assert_eq!(filter.level, 2);
        assert_eq!(filter.ancestors, vec![(1, "Electronics".to_string())]);
        assert_eq!(filter.to_sql(), "level = 2 AND l1 = 'Electronics'");
    }

    #[test]
    fn filter_escapes_quotes() {
        let filter = IndexFilter {
            level: 3,
            ancestors: vec![(2, "Men's Wear".to_string())],
        };
        assert_eq!(filter.to_sql(), "level = 3 AND l2 = 'Men''s Wear'");
    }

    #[tokio::test]
    async fn best_match_selects_candidate_with_full_confidence() {
        let tree = tree();
        let candidates = electronics(&tree);
        let index = StubIndex::new(Reply::Matches(vec!["Mobile Devices"]));
        let classifier = VectorClassifier::new(index.clone());

        let outcome = classifier.classify("budget smartphone", &candidates).await;
        assert_eq!(outcome.selected(), candidates.get(1));
        assert_eq!(outcome.confidence(), 1.0);
        assert_eq!(outcome.warning(), None);

        let seen = index.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, 1, "only the single best match is requested");
    }

    #[tokio::test]
    async fn no_results_is_unresolved_with_warning() {
        let tree = tree();
        let candidates = electronics(&tree);
        let classifier = VectorClassifier::new(StubIndex::new(Reply::Matches(vec![])));

        let outcome = classifier.classify("anything", &candidates).await;
        assert_eq!(outcome.selected(), None);
        assert_eq!(outcome.confidence(), 0.0);
        assert!(!outcome.warning().unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn backend_error_is_unresolved_with_error_text() {
        let tree = tree();
        let candidates = electronics(&tree);
        let classifier = VectorClassifier::new(StubIndex::new(Reply::Fail));

        let outcome = classifier.classify("anything", &candidates).await;
        assert_eq!(outcome.confidence(), 0.0);
        assert!(outcome.warning().unwrap().contains("table not found"));
    }

    #[tokio::test]
    async fn match_outside_candidates_is_unresolved() {
        let tree = tree();
        let candidates = electronics(&tree);
        let classifier = VectorClassifier::new(StubIndex::new(Reply::Matches(vec!["Desks"])));

        let outcome = classifier.classify("standing desk", &candidates).await;
        assert_eq!(outcome.selected(), None);
        assert!(outcome.warning().unwrap().contains("Desks"));
    }

    #[test]
    fn extract_matches_reads_metadata_and_distance() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("code", DataType::Utf8, false),
            Field::new("name", DataType::Utf8, false),
            Field::new("level", DataType::UInt32, false),
            Field::new("_distance", DataType::Float32, true),
        ]));
        let columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from(vec!["2.1", "2.2"])),
            Arc::new(StringArray::from(vec!["Computers", "Mobile Devices"])),
            Arc::new(UInt32Array::from(vec![2, 2])),
            Arc::new(Float32Array::from(vec![0.25, 1.5])),
        ];
        let batch = RecordBatch::try_new(schema, columns).unwrap();

        let matches = extract_matches(&[batch]);
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].code, "2.1");
        assert_eq!(matches[0].name, "Computers");
        assert_eq!(matches[0].level, 2);
        assert!((matches[0].score - 0.75).abs() < 1e-6);
        assert_eq!(matches[1].score, 0.0);
    }

    #[test]
    fn extract_matches_skips_incomplete_batches() {
        let schema = Arc::new(Schema::new(vec![Field::new("code", DataType::Utf8, false)]));
        let batch = RecordBatch::try_new(
            schema,
            vec![Arc::new(StringArray::from(vec!["1"])) as ArrayRef],
        )
        .unwrap();
        assert!(extract_matches(&[batch]).is_empty());
    }
}
