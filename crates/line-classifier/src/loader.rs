/// Hierarchy loaders for tab- or comma-separated tables.
///
/// Two layouts are understood:
///
/// - level paths: one row per path, columns `L1`, `L2`, ... (cell text is both code and name)
/// - parent links: columns `Code`, `Name`, `ParentCode` and optionally `Description`
///
/// Level-path tables always hang under a synthetic root. A link table keeps its own root
/// when it has exactly one top-level row, and gets the synthetic root otherwise.
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::str::FromStr;

use regex::Regex;
use tracing::{info, warn};

use crate::category::{CategoryId, CategoryTree, NewCategory};
use crate::error::AppError;

pub const ROOT_CODE: &str = "root";
pub const ROOT_NAME: &str = "All Categories";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HierarchyFormat {
    #[default]
    Levels,
    Links,
}

impl FromStr for HierarchyFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "levels" | "level" => Ok(Self::Levels),
            "links" | "link" => Ok(Self::Links),
            other => Err(AppError::Config(format!(
                "unknown hierarchy format '{other}' (expected 'levels' or 'links')"
            ))),
        }
    }
}

/// Header plus data rows. Rows carry their 1-based line number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<(usize, Vec<String>)>,
}

impl Table {
    pub fn column(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|h| h == name)
    }

    fn required(&self, name: &str) -> Result<usize, AppError> {
        self.column(name).ok_or_else(|| AppError::Load {
            line: 1,
            message: format!("missing column '{name}'"),
        })
    }
}

/// Split `text` into a header and rows.
///
/// The delimiter is a tab when the header contains one, a comma otherwise. Cells are
/// trimmed and blank lines skipped. Quoting is not supported.
pub fn parse_table(text: &str) -> Result<Table, AppError> {
    let mut lines = text
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim_end_matches('\r')))
        .filter(|(_, line)| !line.trim().is_empty());

    let (_, header_line) = lines.next().ok_or_else(|| AppError::Load {
        line: 1,
        message: "empty table".to_string(),
    })?;
    let delimiter = if header_line.contains('\t') { '\t' } else { ',' };
    let split = |line: &str| -> Vec<String> {
        line.split(delimiter).map(|c| c.trim().to_string()).collect()
    };

    Ok(Table {
        header: split(header_line),
        rows: lines.map(|(n, line)| (n, split(line))).collect(),
    })
}

fn synthetic_root() -> CategoryTree {
    CategoryTree::new(NewCategory::new(ROOT_CODE, ROOT_NAME))
}

fn cell(row: &[String], index: usize) -> &str {
    row.get(index).map(String::as_str).unwrap_or("")
}

/// Build a tree from level-path rows.
///
/// `L<n>` columns are taken in numeric order; other columns are ignored. A row's path ends
/// at its first empty level cell, and rows sharing a prefix share the nodes for it.
pub fn load_level_paths(text: &str) -> Result<CategoryTree, AppError> {
    let table = parse_table(text)?;
    let pattern = Regex::new(r"^L(\d+)$").map_err(|e| AppError::Load {
        line: 1,
        message: e.to_string(),
    })?;

    let mut levels: Vec<(u32, usize)> = table
        .header
        .iter()
        .enumerate()
        .filter_map(|(i, h)| {
            let n = pattern.captures(h)?.get(1)?.as_str().parse().ok()?;
            Some((n, i))
        })
        .collect();
    if levels.is_empty() {
        return Err(AppError::Load {
            line: 1,
            message: "no level columns (L1, L2, ...) in header".to_string(),
        });
    }
    levels.sort_unstable();

    let mut tree = synthetic_root();
    for (_, row) in &table.rows {
        let mut parent = tree.root();
        for &(_, index) in &levels {
            let value = cell(row, index);
            if value.is_empty() {
                break;
            }
            // Sibling codes are unique, so a repeated prefix resolves to the existing node.
            parent = tree.add_child(parent, NewCategory::new(value, value))?;
        }
    }

    info!(
        categories = tree.len(),
        rows = table.rows.len(),
        "hierarchy loaded from level paths"
    );
    Ok(tree)
}

struct LinkRow {
    line: usize,
    code: String,
    name: String,
    description: Option<String>,
    parent: String,
}

/// Build a tree from code / parent-code rows.
///
/// Rows may come in any order. A row with an empty or unknown `ParentCode` is top-level:
/// a single top-level row becomes the root itself, several hang under the synthetic root. Rows caught in a parent cycle are attached to the root with a warning, one at a
/// time, until the cycle is broken.
pub fn load_parent_links(text: &str) -> Result<CategoryTree, AppError> {
    let table = parse_table(text)?;
    let code_col = table.required("Code")?;
    let name_col = table.required("Name")?;
    let parent_col = table.required("ParentCode")?;
    let description_col = table.column("Description");

    let mut rows = Vec::with_capacity(table.rows.len());
    let mut seen = HashSet::new();
    for (line, row) in &table.rows {
        let code = cell(row, code_col);
        if code.is_empty() {
            return Err(AppError::Load {
                line: *line,
                message: "empty Code".to_string(),
            });
        }
        if !seen.insert(code.to_string()) {
            warn!(line, code, "duplicate code ignored");
            continue;
        }
        let name = cell(row, name_col);
        rows.push(LinkRow {
            line: *line,
            code: code.to_string(),
            name: (if name.is_empty() { code } else { name }).to_string(),
            description: description_col
                .map(|i| cell(row, i))
                .filter(|d| !d.is_empty())
                .map(str::to_string),
            parent: cell(row, parent_col).to_string(),
        });
    }

    let is_top_level = |row: &LinkRow| row.parent.is_empty() || !seen.contains(&row.parent);
    let mut placed: HashMap<String, CategoryId> = HashMap::new();
    let single_top_level = {
        let mut top = rows.iter().enumerate().filter(|(_, r)| is_top_level(*r));
        match (top.next(), top.next()) {
            (Some((index, _)), None) => Some(index),
            _ => None,
        }
    };
    let mut tree = match single_top_level {
        Some(index) => {
            let row = rows.remove(index);
            let tree = CategoryTree::new(new_category(&row));
            placed.insert(row.code, tree.root());
            tree
        }
        None => synthetic_root(),
    };
    let mut pending = rows;

    while !pending.is_empty() {
        let before = pending.len();
        let mut waiting = Vec::new();
        for row in pending {
            let parent = if is_top_level(&row) {
                Some(tree.root())
            } else {
                placed.get(&row.parent).copied()
            };
            match parent {
                Some(parent) => attach(&mut tree, &mut placed, parent, row)?,
                None => waiting.push(row),
            }
        }

        if waiting.len() == before {
            let row = waiting.remove(0);
            warn!(
                line = row.line,
                code = %row.code,
                parent = %row.parent,
                "parent chain does not resolve; attaching to root"
            );
            let root = tree.root();
            attach(&mut tree, &mut placed, root, row)?;
        }
        pending = waiting;
    }

    info!(categories = tree.len(), "hierarchy loaded from parent links");
    Ok(tree)
}

fn attach(
    tree: &mut CategoryTree,
    placed: &mut HashMap<String, CategoryId>,
    parent: CategoryId,
    row: LinkRow,
) -> Result<(), AppError> {
    let id = tree.add_child(parent, new_category(&row))?;
    placed.insert(row.code, id);
    Ok(())
}

fn new_category(row: &LinkRow) -> NewCategory {
    let category = NewCategory::new(row.code.as_str(), row.name.as_str());
    match &row.description {
        Some(d) => category.with_description(d.as_str()),
        None => category,
    }
}

pub fn load_str(text: &str, format: HierarchyFormat) -> Result<CategoryTree, AppError> {
    match format {
        HierarchyFormat::Levels => load_level_paths(text),
        HierarchyFormat::Links => load_parent_links(text),
    }
}

pub async fn load_file(path: &Path, format: HierarchyFormat) -> Result<CategoryTree, AppError> {
    let text = tokio::fs::read_to_string(path).await?;
    info!(path = %path.display(), ?format, "loading hierarchy");
    load_str(&text, format)
}
