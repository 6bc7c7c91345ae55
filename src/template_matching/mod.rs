/// Template matching module for locating UI elements in screenshots
///
/// This module provides:
/// - ZNCC scoring (range [-1, 1], higher is better) on luma planes
/// - Coarse-to-fine pyramid search with exact full-resolution scores
/// - Greedy duplicate suppression for multi-match searches
/// - A directory-backed template store and optional debug overlays
pub mod debug;
mod kernel;
pub mod matcher;
pub mod region;
pub mod store;
pub mod types;


pub use debug::{DebugSink, DirectoryDebugSink, annotate_matches};
pub use matcher::{TemplateMatcher, match_all, match_best};
pub use region::SearchRegion;
pub use store::TemplateStore;
pub use types::{MatchResult, SearchStrategy, Template};
