use serde::{Deserialize, Serialize};

/// An inventory resource record as supplied by the scanner collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Resource {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub full_name: String,
    /// Raw resource payload as stored in the inventory, if any.
    #[serde(default)]
    pub data: Option<String>,
}

impl Resource {
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        resource_type: impl Into<String>,
        full_name: impl Into<String>,
    ) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            id,
            resource_type: resource_type.into(),
            full_name: full_name.into(),
            data: None,
        }
    }

    #[must_use]
    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    #[must_use]
    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = Some(data.into());
        self
    }
}
