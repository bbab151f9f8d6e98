// src/extract/mod.rs
pub mod heuristics;
pub mod html;

pub use heuristics::{expand_terms, fold, rank_links, score_links, ScoredLink};
pub use html::{extract_links, host_of, page_text};
