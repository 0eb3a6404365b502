//! Cached folder directory

use std::collections::HashMap;

use crate::models::{Folder, FolderId};

/// Last known folder list, used to fill in display names
#[derive(Debug, Clone, Default)]
pub struct FolderCache {
    folders: Vec<Folder>,
    names: HashMap<FolderId, String>,
}

impl FolderCache {
    pub fn from_folders(folders: Vec<Folder>) -> Self {
        let names = folders
            .iter()
            .map(|folder| (folder.id.clone(), folder.name.clone()))
            .collect();
        Self { folders, names }
    }

    pub fn resolve_name(&self, id: &FolderId) -> Option<&str> {
        self.names.get(id).map(String::as_str)
    }

    pub fn list(&self) -> &[Folder] {
        &self.folders
    }

    pub fn is_empty(&self) -> bool {
        self.folders.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_name() {
        let cache = FolderCache::from_folders(vec![Folder::new("f1", "Work")]);
        assert_eq!(cache.resolve_name(&FolderId::from("f1")), Some("Work"));
        assert_eq!(cache.resolve_name(&FolderId::from("f2")), None);
        assert_eq!(cache.list().len(), 1);
    }
}
