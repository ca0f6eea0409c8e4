use serde::{Deserialize, Serialize};

/// An authenticated user, as reported by the auth collaborator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub uid: String,
    pub email: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl Identity {
    /// Remote collection holding this user's favorites
    pub fn favorites_collection(&self) -> String {
        format!("users/{}/favorites", self.uid)
    }

    /// Name shown to the user, falling back to a generic label
    pub fn display_label(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or("Usuário")
    }
}
