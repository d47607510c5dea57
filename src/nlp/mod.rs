pub mod sentences;
pub mod similarity;
pub mod stats;

pub use sentences::{char_len, split_paragraphs, split_sentences, Span};
pub use similarity::{cosine_similarity, mean_adjacent_similarity};
