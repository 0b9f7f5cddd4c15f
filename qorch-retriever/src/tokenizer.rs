//! BM25 tokenization: English word-boundary tokens (lowercased) mixed with
//! CJK character bigrams, so a corpus containing both scripts gets
//! meaningful term overlap in either direction.

use regex::Regex;
use std::sync::OnceLock;

fn word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[A-Za-z0-9]+").expect("static regex is valid"))
}

fn is_cjk(c: char) -> bool {
    matches!(c as u32,
        0x4E00..=0x9FFF   // CJK Unified Ideographs
        | 0x3400..=0x4DBF // CJK Extension A
        | 0x3040..=0x30FF // Hiragana/Katakana
        | 0xAC00..=0xD7A3 // Hangul syllables
    )
}

/// Tokenizes `text` into lowercased ASCII/word tokens plus CJK character
/// bigrams (consecutive CJK characters are paired; a lone trailing CJK
/// character yields a single-character token).
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens: Vec<String> = word_re()
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect();

    let cjk_chars: Vec<char> = text.chars().filter(|c| is_cjk(*c)).collect();
    if cjk_chars.len() == 1 {
        tokens.push(cjk_chars[0].to_string());
    } else {
        for window in cjk_chars.windows(2) {
            tokens.push(window.iter().collect());
        }
    }

    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_english_words_lowercased() {
        let tokens = tokenize("What is RAG?");
        assert_eq!(tokens, vec!["what", "is", "rag"]);
    }

    #[test]
    fn tokenizes_cjk_as_bigrams() {
        let tokens = tokenize("检索增强");
        assert_eq!(tokens, vec!["检索", "索增", "增强"]);
    }

    #[test]
    fn mixes_english_and_cjk() {
        let tokens = tokenize("RAG 检索系统");
        assert!(tokens.contains(&"rag".to_string()));
        assert!(tokens.contains(&"检索".to_string()));
        assert!(tokens.contains(&"索系".to_string()));
        assert!(tokens.contains(&"系统".to_string()));
    }
}
