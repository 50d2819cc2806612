//! Built-in catalog of reference papers, searchable by keyword.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::search::validate_query;

/// One catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paper {
    pub title: String,
    #[serde(rename = "abstract")]
    pub summary: String,
    pub authors: String,
}

impl Paper {
    fn new(title: &str, summary: &str, authors: &str) -> Self {
        Self {
            title: title.into(),
            summary: summary.into(),
            authors: authors.into(),
        }
    }

    /// Text block used in prompt context.
    pub fn to_snippet(&self) -> String {
        format!(
            "Title: {}\nAuthors: {}\nAbstract: {}",
            self.title, self.authors, self.summary
        )
    }

    fn matches(&self, needle: &str) -> bool {
        [&self.title, &self.summary, &self.authors]
            .iter()
            .any(|field| field.to_lowercase().contains(needle))
    }
}

/// Read-only paper catalog.
#[derive(Debug, Clone)]
pub struct PaperCatalog {
    papers: Vec<Paper>,
}

impl PaperCatalog {
    /// Catalog seeded with well-known language-model and retrieval papers.
    pub fn seeded() -> Self {
        Self::with_papers(vec![
            Paper::new(
                "Attention Is All You Need",
                "Introduces the Transformer, an architecture built solely on attention that became the basis of modern language models.",
                "Vaswani et al.",
            ),
            Paper::new(
                "BERT: Pre-training of Deep Bidirectional Transformers for Language Understanding",
                "Shows that bidirectional Transformer pre-training transfers well to a wide range of language understanding tasks.",
                "Devlin et al.",
            ),
            Paper::new(
                "Language Models are Few-Shot Learners",
                "Scaling a language model to 175B parameters yields strong few-shot performance without fine-tuning (GPT-3).",
                "Brown et al.",
            ),
            Paper::new(
                "Okapi at TREC-3",
                "Describes the BM25 ranking function used by search engines to score document relevance for a query.",
                "Robertson et al.",
            ),
            Paper::new(
                "A Neural Probabilistic Language Model",
                "An early neural approach to language modeling that learns distributed word representations.",
                "Bengio et al.",
            ),
            Paper::new(
                "Retrieval-Augmented Generation for Knowledge-Intensive NLP Tasks",
                "Combines a dense retriever with a sequence-to-sequence generator so answers are grounded in retrieved passages.",
                "Lewis et al.",
            ),
        ])
    }

    /// Catalog over an explicit list of papers.
    pub fn with_papers(papers: Vec<Paper>) -> Self {
        Self { papers }
    }

    /// Case-insensitive substring search over title, abstract and authors.
    ///
    /// Results keep catalog order.
    pub fn search(&self, query: &str) -> Result<Vec<Paper>> {
        let needle = validate_query(query)?.to_lowercase();
        Ok(self
            .papers
            .iter()
            .filter(|p| p.matches(&needle))
            .cloned()
            .collect())
    }
}

impl Default for PaperCatalog {
    fn default() -> Self {
        Self::seeded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_search_is_case_insensitive() {
        let catalog = PaperCatalog::seeded();
        let hits = catalog.search("transformer").unwrap();
        assert!(hits.len() >= 2);
        assert_eq!(hits[0].title, "Attention Is All You Need");
    }

    #[test]
    fn test_search_matches_authors() {
        let catalog = PaperCatalog::seeded();
        let hits = catalog.search("bengio").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].authors, "Bengio et al.");
    }

    #[test]
    fn test_search_without_match() {
        let catalog = PaperCatalog::seeded();
        assert!(catalog.search("weather in Paris").unwrap().is_empty());
    }

    #[test]
    fn test_empty_query_rejected() {
        let catalog = PaperCatalog::seeded();
        assert!(matches!(catalog.search("  "), Err(Error::InvalidParams(_))));
    }

    #[test]
    fn test_abstract_wire_name() {
        let paper = Paper::new("T", "A", "X");
        let wire = serde_json::to_value(&paper).unwrap();
        assert_eq!(wire["abstract"], "A");
    }
}
