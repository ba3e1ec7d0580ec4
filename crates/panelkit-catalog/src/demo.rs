//! Canned data shown when there is no session.

use crate::{ModuleItem, ModuleOption};

/// The only option with demo items.
pub const DEMO_OPTIONS_ID: i64 = 1;

pub fn demo_options() -> Vec<ModuleOption> {
    vec![ModuleOption {
        id: DEMO_OPTIONS_ID,
        name: "Demo Options (Not Authenticated)".to_string(),
        status: "published".to_string(),
        description: Some(
            "This is demo data because you are not authenticated with Directus".to_string(),
        ),
    }]
}

pub fn demo_items() -> Vec<ModuleItem> {
    [
        (101, "Red Option", "#ff0000"),
        (102, "Green Option", "#00ff00"),
        (103, "Blue Option", "#0000ff"),
        (104, "Yellow Option", "#ffff00"),
    ]
    .into_iter()
    .map(|(id, label, color)| ModuleItem {
        id,
        label: label.to_string(),
        color: Some(color.to_string()),
        weight: Some(1),
    })
    .collect()
}
