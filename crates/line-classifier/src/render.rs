use std::fmt::Write;

use crate::category::{CategoryId, CategoryTree};

/// Box-drawing overview of the tree, one `name (code)` per line.
pub fn ascii_tree(tree: &CategoryTree) -> String {
    let mut out = String::new();
    if let Some(root) = tree.get(tree.root()) {
        let _ = writeln!(out, "{} ({})", root.name(), root.code());
    }
    render_children(tree, tree.root(), "", &mut out);
    out
}

fn render_children(tree: &CategoryTree, id: CategoryId, prefix: &str, out: &mut String) {
    let children = tree.children(id);
    for (i, &child) in children.iter().enumerate() {
        let Some(category) = tree.get(child) else {
            continue;
        };
        let last = i + 1 == children.len();
        let (branch, indent) = if last {
            ("└── ", "    ")
        } else {
            ("├── ", "│   ")
        };
        let _ = writeln!(out, "{prefix}{branch}{} ({})", category.name(), category.code());
        render_children(tree, child, &format!("{prefix}{indent}"), out);
    }
}
