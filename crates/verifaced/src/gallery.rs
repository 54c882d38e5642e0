//! Enrolled identity storage.
//!
//! The gallery maps person names to their reference embeddings. Matching
//! iterates a snapshot in enrollment order, which also breaks distance ties
//! in favour of the earliest enrollment.

use parking_lot::RwLock;
use veriface_core::{Embedding, KnownFace};

/// Storage backend for enrolled identities.
pub trait GalleryStore: Send + Sync {
    /// Look up one identity by name.
    fn fetch(&self, name: &str) -> Option<KnownFace>;
    /// All identities in enrollment order.
    fn snapshot(&self) -> Vec<KnownFace>;
    /// Enroll `name` with `embedding`. Re-enrolling an existing name
    /// replaces its embedding in place and returns the fresh record.
    fn insert(&self, name: &str, embedding: Embedding) -> KnownFace;
    /// Remove an identity; returns whether it existed.
    fn remove(&self, name: &str) -> bool;
    /// Enrolled names in enrollment order.
    fn names(&self) -> Vec<String>;
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory gallery. Contents live for the lifetime of the process.
#[derive(Default)]
pub struct MemoryGallery {
    faces: RwLock<Vec<KnownFace>>,
}

impl MemoryGallery {
    pub fn new() -> Self {
        Self::default()
    }
}

fn new_record(name: &str, embedding: Embedding) -> KnownFace {
    KnownFace {
        id: uuid::Uuid::new_v4().to_string(),
        name: name.to_string(),
        embedding,
        enrolled_at: chrono::Utc::now().to_rfc3339(),
    }
}

impl GalleryStore for MemoryGallery {
    fn fetch(&self, name: &str) -> Option<KnownFace> {
        self.faces
            .read()
            .iter()
            .find(|face| face.name == name)
            .cloned()
    }

    fn snapshot(&self) -> Vec<KnownFace> {
        self.faces.read().clone()
    }

    fn insert(&self, name: &str, embedding: Embedding) -> KnownFace {
        let record = new_record(name, embedding);
        let mut faces = self.faces.write();
        match faces.iter().position(|face| face.name == name) {
            // Re-enrollment keeps the original gallery position.
            Some(index) => faces[index] = record.clone(),
            None => faces.push(record.clone()),
        }
        record
    }

    fn remove(&self, name: &str) -> bool {
        let mut faces = self.faces.write();
        match faces.iter().position(|face| face.name == name) {
            Some(index) => {
                faces.remove(index);
                true
            }
            None => false,
        }
    }

    fn names(&self) -> Vec<String> {
        self.faces.read().iter().map(|face| face.name.clone()).collect()
    }

    fn len(&self) -> usize {
        self.faces.read().len()
    }
}
