/// Synthetic four-level hierarchy and labelled line items for demos and tests.
use crate::category::{CategoryTree, NewCategory};
use crate::error::AppError;

const LEVEL1: [(&str, [&str; 4]); 4] = [
    (
        "Office Supplies",
        [
            "Paper Products",
            "Writing Instruments",
            "Desk Accessories",
            "Other Office Supplies",
        ],
    ),
    (
        "Electronics",
        ["Computers", "Mobile Devices", "Peripherals", "Audio/Video"],
    ),
    (
        "Furniture",
        ["Office Chairs", "Desks", "Storage", "Meeting Room Furniture"],
    ),
    (
        "Clothing",
        ["Men's Wear", "Women's Wear", "Children's Wear", "Accessories"],
    ),
];

const GRADES: [&str; 3] = ["Standard", "Premium", "Economy"];

/// 1 root + 4 + 16 + 48 + 48 = 117 categories.
///
/// Codes are dotted positions (`"2.3.1"`); every grade has a single `"<grade> Variant"` leaf.
pub fn build_sample_hierarchy() -> Result<CategoryTree, AppError> {
    let mut tree = CategoryTree::new(
        NewCategory::new("root", "All Categories")
            .with_description("Root category for all classifications"),
    );

    for (i, (l1, l2_names)) in LEVEL1.iter().enumerate() {
        let l1_code = format!("{}", i + 1);
        let l1_id = tree.add_child(
            tree.root(),
            NewCategory::new(l1_code.as_str(), *l1).with_description(format!("{l1} category")),
        )?;

        for (j, l2) in l2_names.iter().enumerate() {
            let l2_code = format!("{l1_code}.{}", j + 1);
            let l2_id = tree.add_child(
                l1_id,
                NewCategory::new(l2_code.as_str(), *l2)
                    .with_description(format!("{l2} subcategory under {l1}")),
            )?;

            for (k, grade) in GRADES.iter().enumerate() {
                let l3_code = format!("{l2_code}.{}", k + 1);
                let l3_id = tree.add_child(
                    l2_id,
                    NewCategory::new(l3_code.as_str(), *grade)
                        .with_description(format!("{grade} grade for {l2}")),
                )?;

                let variant = format!("{grade} Variant");
                let description = format!("{variant} of {grade} in {l2}");
                tree.add_child(
                    l3_id,
                    NewCategory::new(format!("{l3_code}.1"), variant).with_description(description),
                )?;
            }
        }
    }

    Ok(tree)
}

/// A line item with its expected path (level 1 to leaf, by name).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelledItem {
    pub text: &'static str,
    pub expected: [&'static str; 4],
}

const fn item(text: &'static str, expected: [&'static str; 4]) -> LabelledItem {
    LabelledItem { text, expected }
}

pub fn sample_line_items() -> Vec<LabelledItem> {
    vec![
        item(
            "High quality standard paper reams",
            ["Office Supplies", "Paper Products", "Standard", "Standard Variant"],
        ),
        item(
            "Premium fountain pen",
            ["Office Supplies", "Writing Instruments", "Premium", "Premium Variant"],
        ),
        item(
            "Economy desk organizer",
            ["Office Supplies", "Desk Accessories", "Economy", "Economy Variant"],
        ),
        item(
            "Assorted office misc supplies",
            ["Office Supplies", "Other Office Supplies", "Standard", "Standard Variant"],
        ),
        item(
            "Latest model laptop",
            ["Electronics", "Computers", "Premium", "Premium Variant"],
        ),
        item(
            "Budget smartphone",
            ["Electronics", "Mobile Devices", "Economy", "Economy Variant"],
        ),
        item(
            "High fidelity headphones",
            ["Electronics", "Audio/Video", "Premium", "Premium Variant"],
        ),
        item(
            "USB hub for multiple devices",
            ["Electronics", "Peripherals", "Standard", "Standard Variant"],
        ),
        item(
            "Ergonomic office chair",
            ["Furniture", "Office Chairs", "Premium", "Premium Variant"],
        ),
        item(
            "Modern standing desk",
            ["Furniture", "Desks", "Standard", "Standard Variant"],
        ),
        item(
            "Modular storage cabinet",
            ["Furniture", "Storage", "Economy", "Economy Variant"],
        ),
        item(
            "Large conference table",
            ["Furniture", "Meeting Room Furniture", "Standard", "Standard Variant"],
        ),
        item(
            "Men's casual shirt",
            ["Clothing", "Men's Wear", "Standard", "Standard Variant"],
        ),
        item(
            "Elegant women's dress",
            ["Clothing", "Women's Wear", "Premium", "Premium Variant"],
        ),
        item(
            "Comfortable children's playwear",
            ["Clothing", "Children's Wear", "Economy", "Economy Variant"],
        ),
        item(
            "Designer sunglasses",
            ["Clothing", "Accessories", "Premium", "Premium Variant"],
        ),
        item(
            "Eco-friendly recycled paper",
            ["Office Supplies", "Paper Products", "Economy", "Economy Variant"],
        ),
        item(
            "Stylish ballpoint pen",
            ["Office Supplies", "Writing Instruments", "Standard", "Standard Variant"],
        ),
        item(
            "Compact desktop computer",
            ["Electronics", "Computers", "Economy", "Economy Variant"],
        ),
        item(
            "Wireless speaker system",
            ["Electronics", "Audio/Video", "Standard", "Standard Variant"],
        ),
    ]
}
