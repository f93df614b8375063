/// N-gram phrase counting and word-graph generation.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use super::sentences;
use crate::errors::PhraseError;

/// Longest n-gram the counter accepts.
pub const MAX_NGRAM: usize = 6;

/// Inclusive range of n-gram lengths, written "min,max" on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NgramRange {
    pub min: usize,
    pub max: usize,
}

impl NgramRange {
    pub fn new(min: usize, max: usize) -> Result<Self, PhraseError> {
        if min == 0 || min > max || max > MAX_NGRAM {
            return Err(PhraseError::validation(
                "ngram_range",
                &format!("Range must satisfy 1 <= min <= max <= {}, got {},{}", MAX_NGRAM, min, max),
            ));
        }
        Ok(NgramRange { min, max })
    }
}

impl Default for NgramRange {
    fn default() -> Self {
        NgramRange { min: 1, max: 3 }
    }
}

impl fmt::Display for NgramRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.min, self.max)
    }
}

impl FromStr for NgramRange {
    type Err = PhraseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || PhraseError::validation("ngram_range", &format!("Expected \"min,max\", got {:?}", s));
        let (min, max) = s.split_once(',').ok_or_else(invalid)?;
        let min = min.trim().parse::<usize>().map_err(|_| invalid())?;
        let max = max.trim().parse::<usize>().map_err(|_| invalid())?;
        NgramRange::new(min, max)
    }
}

/// A phrase and how often it occurred in one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhraseCount {
    pub bag: String,
    pub count: u64,
}

/// Count every n-gram inside each sentence, in first-occurrence order.
pub fn count_phrases(text: &str, range: NgramRange) -> Vec<PhraseCount> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut counts: Vec<PhraseCount> = Vec::new();

    for sentence in sentences(text) {
        for n in range.min..=range.max {
            if n > sentence.len() {
                break;
            }
            for window in sentence.windows(n) {
                let bag = window.join(" ");
                match index.get(&bag) {
                    Some(&i) => counts[i].count += 1,
                    None => {
                        index.insert(bag.clone(), counts.len());
                        counts.push(PhraseCount { bag, count: 1 });
                    }
                }
            }
        }
    }

    counts
}

/// Directed link between two consecutive words.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordLink {
    pub from: String,
    pub to: String,
    pub count: u64,
}

/// Word counts plus consecutive-word links of a document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WordGraph {
    pub words: Vec<PhraseCount>,
    pub links: Vec<WordLink>,
}

pub fn word_graph(text: &str) -> WordGraph {
    let mut graph = WordGraph::default();
    let mut word_index: HashMap<String, usize> = HashMap::new();
    let mut link_index: HashMap<(String, String), usize> = HashMap::new();

    for sentence in sentences(text) {
        for word in &sentence {
            match word_index.get(word) {
                Some(&i) => graph.words[i].count += 1,
                None => {
                    word_index.insert(word.clone(), graph.words.len());
                    graph.words.push(PhraseCount { bag: word.clone(), count: 1 });
                }
            }
        }
        for pair in sentence.windows(2) {
            let key = (pair[0].clone(), pair[1].clone());
            match link_index.get(&key) {
                Some(&i) => graph.links[i].count += 1,
                None => {
                    link_index.insert(key, graph.links.len());
                    graph.links.push(WordLink {
                        from: pair[0].clone(),
                        to: pair[1].clone(),
                        count: 1,
                    });
                }
            }
        }
    }

    graph
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bags(counts: &[PhraseCount]) -> Vec<&str> {
        counts.iter().map(|c| c.bag.as_str()).collect()
    }

    #[test]
    fn test_hello_world_phrases() {
        let counts = count_phrases("hello world", NgramRange::default());
        assert_eq!(bags(&counts), vec!["hello", "world", "hello world"]);
        assert!(counts.iter().all(|c| c.count == 1));
    }

    #[test]
    fn test_repeated_phrases_accumulate() {
        let counts = count_phrases("big cat. big cat. big dog", NgramRange::new(1, 2).unwrap());
        let big_cat = counts.iter().find(|c| c.bag == "big cat").unwrap();
        let big = counts.iter().find(|c| c.bag == "big").unwrap();
        assert_eq!(big_cat.count, 2);
        assert_eq!(big.count, 3);
    }

    #[test]
    fn test_ngrams_do_not_cross_sentences() {
        let counts = count_phrases("alpha. beta", NgramRange::new(1, 2).unwrap());
        assert!(!bags(&counts).contains(&"alpha beta"));
    }

    #[test]
    fn test_range_limits_lengths() {
        let counts = count_phrases("a b c d", NgramRange::new(2, 3).unwrap());
        assert!(counts.iter().all(|c| {
            let n = c.bag.split(' ').count();
            (2..=3).contains(&n)
        }));
        assert_eq!(counts.len(), 5);
    }

    #[test]
    fn test_parse_ngram_range() {
        assert_eq!("1,3".parse::<NgramRange>().unwrap(), NgramRange { min: 1, max: 3 });
        assert_eq!(" 2 , 4 ".parse::<NgramRange>().unwrap(), NgramRange { min: 2, max: 4 });
        assert!("3,1".parse::<NgramRange>().is_err());
        assert!("0,2".parse::<NgramRange>().is_err());
        assert!("1,9".parse::<NgramRange>().is_err());
        assert!("13".parse::<NgramRange>().is_err());
        assert_eq!(NgramRange::default().to_string(), "1,3");
    }

    #[test]
    fn test_word_graph_links_consecutive_words() {
        let graph = word_graph("red fox. red fox jumps");
        let red = graph.words.iter().find(|w| w.bag == "red").unwrap();
        assert_eq!(red.count, 2);
        assert_eq!(graph.links.len(), 2);
        assert_eq!(graph.links[0], WordLink { from: "red".into(), to: "fox".into(), count: 2 });
        assert_eq!(graph.links[1].from, "fox");
        assert_eq!(graph.links[1].to, "jumps");
    }
}
