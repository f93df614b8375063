/// Named-entity extraction from tagged NER corpora.
///
/// NER files hold `<word><space or |><tag>` records where the word is written
/// in Arabic script and the tag follows the BIOES scheme (`B-PER`, `I-LOC`,
/// `O`, ...). Every word with a non-`O` tag becomes a known entity.

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

static RE_NER_RECORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\x{0600}-\x{06FF}]+(?:\s|\|)\w+-?(?:\w+)?").unwrap()
});

static RE_SPACES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r" +").unwrap());

/// Replace Arabic letter forms with their Persian equivalents.
pub fn normalize_arabic(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{064a}' | '\u{0649}' => '\u{06cc}',
            '\u{0643}' => '\u{06a9}',
            other => other,
        })
        .collect()
}

fn clean_record(record: &str) -> String {
    let record = record
        .replace(['\t', '|'], " ")
        .replace('\u{200c}', " ");
    RE_SPACES.replace_all(record.trim(), " ").into_owned()
}

fn is_entity_tag(tag: &str) -> bool {
    tag != "O" && tag.starts_with(['I', 'B', 'E', 'S'])
}

/// Unique named entities found in a NER file's text.
pub fn parse_ner_text(raw: &str) -> BTreeSet<String> {
    RE_NER_RECORD
        .find_iter(raw)
        .filter_map(|m| {
            let cleaned = clean_record(m.as_str());
            let mut parts = cleaned.split(' ');
            match (parts.next(), parts.next(), parts.next()) {
                (Some(word), Some(tag), None) if is_entity_tag(tag) => Some(normalize_arabic(word)),
                _ => None,
            }
        })
        .collect()
}
