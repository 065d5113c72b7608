/// Flattening a hierarchy into indexable documents, and back.
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::category::{CategoryTree, NewCategory};
use crate::error::AppError;

/// One category as stored in the similarity index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryDocument {
    pub code: String,
    pub name: String,
    pub level: u32,
    pub description: Option<String>,
    /// Ancestor names from the root down to the parent; `path.len() == level`.
    pub path: Vec<String>,
    /// Text that gets embedded.
    pub text: String,
}

impl CategoryDocument {
    /// Ancestor name at `depth`, if the document is deep enough to have one.
    pub fn ancestor(&self, depth: usize) -> Option<&str> {
        self.path.get(depth).map(String::as_str)
    }
}

pub fn document_text(code: &str, name: &str, description: Option<&str>) -> String {
    format!(
        "Category Name: {name}\nCode: {code}\nDescription: {}",
        description.unwrap_or_default()
    )
}

/// One document per node, pre-order.
pub fn hierarchy_to_documents(tree: &CategoryTree) -> Vec<CategoryDocument> {
    tree.iter()
        .map(|(id, category)| CategoryDocument {
            code: category.code().to_string(),
            name: category.name().to_string(),
            level: category.level(),
            description: category.description().map(str::to_string),
            path: tree.ancestors(id).into_iter().map(str::to_string).collect(),
            text: document_text(category.code(), category.name(), category.description()),
        })
        .collect()
}

/// Rebuild a tree from documents in pre-order (every parent before its children).
///
/// Parents are found by name path, so the first document must be the root and no two
/// documents may share a name path.
pub fn documents_to_tree(documents: &[CategoryDocument]) -> Result<CategoryTree, AppError> {
    let (root_doc, rest) = documents
        .split_first()
        .ok_or_else(|| AppError::Document("no documents".to_string()))?;
    if root_doc.level != 0 || !root_doc.path.is_empty() {
        return Err(AppError::Document(format!(
            "first document '{}' is not a root",
            root_doc.code
        )));
    }

    let mut tree = CategoryTree::new(new_category(root_doc));
    let mut by_path = HashMap::new();
    by_path.insert(vec![root_doc.name.clone()], tree.root());

    for doc in rest {
        if doc.level as usize != doc.path.len() || doc.level == 0 {
            return Err(AppError::Document(format!(
                "document '{}' has level {} but a path of {} names",
                doc.code,
                doc.level,
                doc.path.len()
            )));
        }
        let parent = *by_path.get(&doc.path).ok_or_else(|| {
            AppError::Document(format!(
                "parent '{}' of document '{}' not seen yet",
                doc.path.join(" > "),
                doc.code
            ))
        })?;
        let mut key = doc.path.clone();
        key.push(doc.name.clone());
        if by_path.contains_key(&key) {
            return Err(AppError::Document(format!(
                "document '{}' repeats the name path '{}'",
                doc.code,
                key.join(" > ")
            )));
        }
        let id = tree.add_child(parent, new_category(doc))?;
        by_path.insert(key, id);
    }

    Ok(tree)
}

fn new_category(doc: &CategoryDocument) -> NewCategory {
    let category = NewCategory::new(doc.code.as_str(), doc.name.as_str());
    match &doc.description {
        Some(d) => category.with_description(d.as_str()),
        None => category,
    }
}
