// Artifact storage for uploads and saved execution output

pub mod artifacts;

pub use artifacts::{ArtifactStore, FsArtifactStore, NewArtifact};
