pub mod config;
pub mod db;
pub mod error;
pub mod jobs;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use error::{AppError, Result};
pub use jobs::EngineContext;
pub use services::{Recommender, SimilarityRanker, VectorStore};
