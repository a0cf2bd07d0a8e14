use unicode_segmentation::UnicodeSegmentation;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tokens {
    pub words: Vec<String>,
    /// Character (not byte) offsets of each word within the phrase.
    pub char_offsets: Vec<usize>,
    /// Lowercased surface forms; no morphological analysis is done.
    pub lemmas: Vec<String>,
}

/// Collapses whitespace runs, including non-breaking spaces, to single spaces.
pub fn normalize_whitespace(text: &str) -> String {
    text.replace('\u{00a0}', " ")
        .split_whitespace()
        .collect::<Vec<&str>>()
        .join(" ")
}

pub fn split_sentences(text: &str) -> Vec<&str> {
    text.split_sentence_bounds()
        .map(str::trim)
        .filter(|sentence| !sentence.is_empty())
        .collect()
}

pub fn tokenize(text: &str, lingual: bool) -> Tokens {
    let mut tokens = Tokens::default();

    if lingual {
        for (byte_offset, word) in text.unicode_word_indices() {
            tokens.char_offsets.push(text[..byte_offset].chars().count());
            tokens.words.push(word.to_string());
            tokens.lemmas.push(word.to_lowercase());
        }
        return tokens;
    }

    let mut char_offset = 0;
    let mut in_word = false;
    let mut current = String::new();
    for ch in text.chars() {
        if ch.is_whitespace() {
            if in_word {
                tokens.words.push(std::mem::take(&mut current));
                in_word = false;
            }
        } else {
            if !in_word {
                tokens.char_offsets.push(char_offset);
                in_word = true;
            }
            current.push(ch);
        }
        char_offset += 1;
    }
    if in_word {
        tokens.words.push(current);
    }
    tokens.lemmas = tokens.words.iter().map(|word| word.to_lowercase()).collect();

    tokens
}

/// Alphanumeric sub-tokens used to line up HTML text with the PDF word layer.
pub fn alignment_tokens(text: &str) -> Vec<String> {
    text.split(|ch: char| !ch.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
        .collect()
}
