//! Folder model

use serde::{Deserialize, Serialize};

use super::ids::FolderId;

/// A folder as listed by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    pub id: FolderId,
    #[serde(alias = "folder_name", alias = "folderName", alias = "title")]
    pub name: String,
}

impl Folder {
    pub fn new(id: impl Into<FolderId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_folder_accepts_alternate_name_key() {
        let folder: Folder = serde_json::from_str(r#"{"id": "f1", "folderName": "Work"}"#).unwrap();
        assert_eq!(folder, Folder::new("f1", "Work"));
    }
}
