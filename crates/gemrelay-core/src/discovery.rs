//! Model discovery: choose a usable model from what the provider advertises

use crate::providers::ModelInfo;

/// Substrings tried in order when picking a discovered model
pub const PREFERRED_FAMILIES: &[&str] = &["flash", "pro"];

/// Pick the first generateContent-capable model whose name contains `flash`,
/// else the first containing `pro`, else the first capable model.
pub fn pick_model(models: &[ModelInfo]) -> Option<&str> {
    let usable: Vec<&str> = models
        .iter()
        .filter(|m| m.supports_generate_content())
        .map(|m| m.name.as_str())
        .collect();

    PREFERRED_FAMILIES
        .iter()
        .find_map(|family| usable.iter().find(|name| name.contains(family)))
        .or_else(|| usable.first())
        .copied()
}
