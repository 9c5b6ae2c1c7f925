use serde_json::{Map, Value};

/// Free-form metadata carried alongside manifest entities.
pub type AdditionalInfo = Map<String, Value>;

/// A category (class label).
///
/// After ingestion `id` is the category's dense 0-based position in its list.
#[derive(Clone, Debug, Default)]
pub struct CategoryManifest {
    pub id: usize,
    pub name: String,
    pub super_category: Option<String>,
    pub additional_info: AdditionalInfo,
}

impl CategoryManifest {
    pub fn new(id: usize, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            super_category: None,
            additional_info: AdditionalInfo::new(),
        }
    }

    pub fn with_super_category(mut self, super_category: impl Into<String>) -> Self {
        self.super_category = Some(super_category.into());
        self
    }
}

// Identity is (id, name, super_category); additional_info is not compared.
impl PartialEq for CategoryManifest {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.name == other.name
            && self.super_category == other.super_category
    }
}

impl Eq for CategoryManifest {}
