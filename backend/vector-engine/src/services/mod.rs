pub mod catalog;
pub mod encoder;
pub mod metadata;
pub mod profiler;
pub mod ranking_client;
pub mod recommender;
pub mod similarity;
pub mod vector_store;

pub use catalog::{GenreCatalog, GenreSnapshot};
pub use metadata::MetadataService;
pub use profiler::{BehaviorProfiler, ProfileStore, SqlProfileStore};
pub use ranking_client::{HttpRankingClient, RankingClient, RankingRequest};
pub use recommender::{Recommender, RecommendationStore, SqlRecommendationStore};
pub use similarity::{CandidateSource, SimilarityRanker};
pub use vector_store::{CandidateFilter, VectorSpace, VectorStore};
