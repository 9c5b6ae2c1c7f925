//! Stats report types and terminal formatting.

use serde::Serialize;
use std::fmt;

/// The result of computing manifest statistics.
#[derive(Clone, Debug, Serialize)]
pub struct StatsReport {
    pub data_type: String,
    pub images: usize,
    /// Images without labels (single-image) or not referenced by any
    /// annotation (multi-image).
    pub negative_images: usize,
    /// Labels across images, or annotated fields across annotations.
    pub labels: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative_annotations: Option<usize>,
    /// Sorted by instance count, descending.
    pub categories: Vec<CategoryCount>,
}

/// Per-category counts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CategoryCount {
    pub name: String,
    pub instances: usize,
    pub images: usize,
}

impl fmt::Display for StatsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "┌─ Manifest ────────────────────────────────────────┐")?;
        writeln!(f, "│ Task:            {:<32} │", truncate(&self.data_type, 32))?;
        writeln!(f, "│ Images:          {:>8}                         │", self.images)?;
        writeln!(
            f,
            "│ Negative images: {:>8}                         │",
            self.negative_images
        )?;
        writeln!(f, "│ Labels:          {:>8}                         │", self.labels)?;
        if let Some(annotations) = self.annotations {
            writeln!(f, "│ Annotations:     {:>8}                         │", annotations)?;
        }
        if let Some(negative) = self.negative_annotations {
            writeln!(f, "│ Negative annot.: {:>8}                         │", negative)?;
        }
        writeln!(f, "└───────────────────────────────────────────────────┘")?;

        if self.categories.is_empty() {
            return Ok(());
        }

        writeln!(f)?;
        let width = self
            .categories
            .iter()
            .map(|c| c.name.chars().count())
            .max()
            .unwrap_or(0)
            .clamp(8, 40);
        writeln!(f, "{:<width$}  {:>9}  {:>7}", "category", "instances", "images")?;
        for category in &self.categories {
            writeln!(
                f,
                "{:<width$}  {:>9}  {:>7}",
                truncate(&category.name, width),
                category.instances,
                category.images
            )?;
        }
        Ok(())
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let mut out: String = text.chars().take(max.saturating_sub(1)).collect();
        out.push('…');
        out
    }
}
