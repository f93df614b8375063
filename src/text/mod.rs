/// Document text extraction and tokenization
///
/// Turns an incoming document (plain text, HTML, or a URL to fetch) into
/// sentences of words. Counting lives in `ngram`, NER file parsing in `ner`.

pub mod ner;
pub mod ngram;

use scraper::Html;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::PhraseError;

const ZWNJ: char = '\u{200c}';

/// Characters that end a sentence; n-grams never span them.
const SENTENCE_BREAKS: &[char] = &[
    '.', ',', '!', '?', ';', ':', '\n', '\r', '\u{060c}', '\u{061b}', '\u{061f}',
];

/// Kind of payload posted to the doc-process endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DocType {
    #[default]
    Text,
    Html,
    Url,
}

impl DocType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocType::Text => "TEXT",
            DocType::Html => "HTML",
            DocType::Url => "URL",
        }
    }
}

impl fmt::Display for DocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocType {
    type Err = PhraseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TEXT" => Ok(DocType::Text),
            "HTML" => Ok(DocType::Html),
            "URL" => Ok(DocType::Url),
            other => Err(PhraseError::validation(
                "doc_type",
                &format!("Expected TEXT, HTML or URL, got {}", other),
            )),
        }
    }
}

/// Resolve a document to its plain text. URL documents are fetched and then
/// handled as HTML.
pub async fn extract_text(
    client: &reqwest::Client,
    document: &str,
    doc_type: DocType,
) -> Result<String, PhraseError> {
    match doc_type {
        DocType::Text => Ok(document.to_string()),
        DocType::Html => Ok(html_text(document)),
        DocType::Url => {
            let url = document.trim();
            tracing::debug!(url = %url, "Fetching document");
            let body = client
                .get(url)
                .send()
                .await?
                .error_for_status()?
                .text()
                .await?;
            Ok(html_text(&body))
        }
    }
}

/// Visible text of an HTML document, one line per text node.
pub fn html_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut lines: Vec<&str> = Vec::new();

    for node in document.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node
            .parent()
            .and_then(|parent| parent.value().as_element())
            .map(|el| matches!(el.name(), "script" | "style" | "noscript"))
            .unwrap_or(false);
        if hidden {
            continue;
        }
        let line = text.trim();
        if !line.is_empty() {
            lines.push(line);
        }
    }

    lines.join("\n")
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric()
        || c == ZWNJ
        || c == '\''
        || c == '-'
        // Arabic diacritics are combining marks, not alphanumeric
        || ('\u{064b}'..='\u{065f}').contains(&c)
        || c == '\u{0670}'
}

/// Words of a single sentence.
pub fn words(sentence: &str) -> Vec<String> {
    sentence
        .split(|c: char| !is_word_char(c))
        .map(|w| w.trim_matches(|c: char| c == '\'' || c == '-' || c == ZWNJ))
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// Split text into sentences of words, dropping empty sentences.
pub fn sentences(text: &str) -> Vec<Vec<String>> {
    text.split(|c: char| SENTENCE_BREAKS.contains(&c))
        .map(words)
        .filter(|sentence| !sentence.is_empty())
        .collect()
}

/// Collapse runs of whitespace inside each line and drop blank lines. Line
/// breaks survive since they end sentences.
pub fn squash_whitespace(text: &str) -> String {
    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_text_strips_tags() {
        assert_eq!(html_text("<p>hello world</p>"), "hello world");
    }

    #[test]
    fn test_html_text_skips_scripts() {
        let html = "<html><head><style>p { color: red }</style></head>\
                    <body><p>first</p><script>var x = 1;</script><div>second</div></body></html>";
        assert_eq!(html_text(html), "first\nsecond");
    }

    #[test]
    fn test_sentences_break_on_punctuation() {
        let result = sentences("Hello world. Second line, here!");
        assert_eq!(
            result,
            vec![
                vec!["Hello".to_string(), "world".to_string()],
                vec!["Second".to_string(), "line".to_string()],
                vec!["here".to_string()],
            ]
        );
    }

    #[test]
    fn test_words_keep_persian_and_zwnj() {
        let w = words("می\u{200c}روم به تهران؟");
        assert_eq!(w, vec!["می\u{200c}روم", "به", "تهران"]);
    }

    #[test]
    fn test_words_trim_edge_apostrophes() {
        assert_eq!(words("'quoted' don't - x"), vec!["quoted", "don't", "x"]);
    }

    #[test]
    fn test_squash_whitespace_keeps_lines() {
        assert_eq!(squash_whitespace("  a   b \n\n c\t d  "), "a b\nc d");
    }

    #[test]
    fn test_doc_type_parse() {
        assert_eq!("HTML".parse::<DocType>().unwrap(), DocType::Html);
        assert!("PDF".parse::<DocType>().is_err());
        assert_eq!(DocType::default(), DocType::Text);
    }

    #[tokio::test]
    async fn test_extract_text_passes_plain_text_through() {
        let client = reqwest::Client::new();
        let text = extract_text(&client, "plain body", DocType::Text).await.unwrap();
        assert_eq!(text, "plain body");
    }
}
