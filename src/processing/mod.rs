//! Skill data model, level compatibility, embeddings and text helpers

pub mod embeddings;
pub mod levels;
pub mod skill;
pub mod text;

pub use embeddings::{
    content_hash, cosine_similarity, CacheItem, Embedder, EmbeddingBackend, EmbeddingRegistry,
    HashingEmbedder, RepresentationMatrix, SimilarityCache,
};
pub use levels::LevelCompatibility;
pub use skill::{
    CourseProfile, Origin, Side, Skill, SkillCategory, SkillContext, SkillLevel, SkillSet,
    UnitProfile,
};
pub use text::SkillTextProcessor;
