//! Inline vocabulary highlighting.
//!
//! Entries are matched longest word first against the untouched lesson text.
//! Every accepted match claims its byte range, and shorter words are only
//! accepted outside of claimed ranges, so a highlight can never nest inside
//! another one.

use regex::{Regex, RegexBuilder};
use serde::Serialize;
use serde::ser::{SerializeStruct, Serializer};
use std::collections::{BTreeMap, HashSet};
use std::ops::Range;
use tracing::debug;

use crate::{LessonError, VocabularyEntry};

/// A contiguous slice of the lesson text, optionally linked to a vocabulary entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment<'t> {
    pub text: &'t str,
    pub range: Range<usize>,
    pub entry_id: Option<u32>,
}

impl Segment<'_> {
    pub fn is_highlighted(&self) -> bool {
        self.entry_id.is_some()
    }
}

impl Serialize for Segment<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let fields = if self.entry_id.is_some() { 4 } else { 3 };
        let mut state = serializer.serialize_struct("Segment", fields)?;
        state.serialize_field("text", self.text)?;
        state.serialize_field("start", &self.range.start)?;
        state.serialize_field("end", &self.range.end)?;
        match self.entry_id {
            Some(id) => state.serialize_field("entry_id", &id)?,
            None => state.skip_field("entry_id")?,
        }
        state.end()
    }
}

struct WordPattern {
    entry_id: u32,
    regex: Regex,
}

/// Compiled highlighter for one vocabulary list.
pub struct Highlighter {
    patterns: Vec<WordPattern>,
}

impl Highlighter {
    pub fn new(entries: &[VocabularyEntry]) -> Result<Self, LessonError> {
        // Later entries reusing an id are unreachable through the index.
        let mut seen_ids = HashSet::with_capacity(entries.len());
        let mut ranked: Vec<(u32, &str)> = entries
            .iter()
            .filter(|entry| seen_ids.insert(entry.id))
            .map(|entry| (entry.id, entry.word.trim()))
            .filter(|(_, word)| !word.is_empty())
            .collect();
        // Stable, so equal lengths keep document order.
        ranked.sort_by(|a, b| b.1.chars().count().cmp(&a.1.chars().count()));

        let patterns = ranked
            .into_iter()
            .map(|(entry_id, word)| {
                RegexBuilder::new(&regex::escape(word))
                    .case_insensitive(true)
                    .build()
                    .map(|regex| WordPattern { entry_id, regex })
                    .map_err(|source| LessonError::Pattern {
                        word: word.to_string(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { patterns })
    }

    /// Number of entries that take part in matching.
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn highlight<'t>(&self, text: &'t str) -> Highlighted<'t> {
        // start -> (end, entry id); claims never overlap.
        let mut claims: BTreeMap<usize, (usize, u32)> = BTreeMap::new();

        for pattern in &self.patterns {
            let mut pos = 0;
            while pos <= text.len() {
                let Some(found) = pattern.regex.find_at(text, pos) else {
                    break;
                };
                if !is_whole_word(text, found.range()) || overlaps_claim(&claims, found.range()) {
                    pos = next_char_start(text, found.start());
                    continue;
                }
                claims.insert(found.start(), (found.end(), pattern.entry_id));
                pos = found.end();
            }
        }

        debug!(
            patterns = self.patterns.len(),
            highlights = claims.len(),
            "highlighted lesson text"
        );
        Highlighted {
            segments: build_segments(text, &claims),
        }
    }
}

/// Neither neighbour of `range` may be a word character.
fn is_whole_word(text: &str, range: Range<usize>) -> bool {
    let before = text[..range.start].chars().next_back();
    let after = text[range.end..].chars().next();
    !before.is_some_and(is_word_char) && !after.is_some_and(is_word_char)
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn overlaps_claim(claims: &BTreeMap<usize, (usize, u32)>, range: Range<usize>) -> bool {
    claims
        .range(..range.end)
        .next_back()
        .is_some_and(|(_, &(end, _))| end > range.start)
}

fn next_char_start(text: &str, from: usize) -> usize {
    from + text[from..].chars().next().map_or(1, char::len_utf8)
}

fn build_segments<'t>(text: &'t str, claims: &BTreeMap<usize, (usize, u32)>) -> Vec<Segment<'t>> {
    let mut segments = Vec::with_capacity(claims.len() * 2 + 1);
    let mut cursor = 0;
    for (&start, &(end, entry_id)) in claims {
        if start > cursor {
            segments.push(Segment {
                text: &text[cursor..start],
                range: cursor..start,
                entry_id: None,
            });
        }
        segments.push(Segment {
            text: &text[start..end],
            range: start..end,
            entry_id: Some(entry_id),
        });
        cursor = end;
    }
    if cursor < text.len() {
        segments.push(Segment {
            text: &text[cursor..],
            range: cursor..text.len(),
            entry_id: None,
        });
    }
    segments
}

/// Highlighter output: ordered segments covering the whole text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Highlighted<'t> {
    segments: Vec<Segment<'t>>,
}

impl<'t> Highlighted<'t> {
    pub fn segments(&self) -> &[Segment<'t>] {
        &self.segments
    }

    pub fn annotations(&self) -> impl Iterator<Item = &Segment<'t>> + '_ {
        self.segments.iter().filter(|segment| segment.is_highlighted())
    }

    pub fn plain_text(&self) -> String {
        self.segments.iter().map(|segment| segment.text).collect()
    }

    /// HTML markup of the whole text. `wrap` receives the entry id and the
    /// escaped highlight text; everything else is escaped as-is.
    pub fn render_html<F>(&self, mut wrap: F) -> String
    where
        F: FnMut(u32, &str) -> String,
    {
        let mut html = String::new();
        for segment in &self.segments {
            let escaped = html_escape(segment.text);
            match segment.entry_id {
                Some(id) => html.push_str(&wrap(id, &escaped)),
                None => html.push_str(&escaped),
            }
        }
        html
    }
}

pub(crate) fn html_escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: u32, word: &str) -> VocabularyEntry {
        VocabularyEntry {
            id,
            word: word.to_string(),
            definition: format!("definition of {word}"),
            examples: Vec::new(),
        }
    }

    fn highlighted_words<'a>(out: &'a Highlighted<'_>) -> Vec<(&'a str, u32)> {
        out.annotations()
            .map(|segment| (segment.text, segment.entry_id.unwrap()))
            .collect()
    }

    #[test]
    fn highlights_single_word_once() {
        let text = "The cat sat on the mat.";
        let highlighter = Highlighter::new(&[entry(1, "cat")]).unwrap();
        let out = highlighter.highlight(text);
        assert_eq!(highlighted_words(&out), vec![("cat", 1)]);
        assert_eq!(out.plain_text(), text);
        assert_eq!(out.segments().len(), 3);
        assert_eq!(out.segments()[1].range, 4..7);
    }

    #[test]
    fn does_not_match_inside_longer_words() {
        let text = "A category of cats, not a cat.";
        let highlighter = Highlighter::new(&[entry(1, "cat")]).unwrap();
        let out = highlighter.highlight(text);
        let ranges: Vec<_> = out.annotations().map(|s| s.range.clone()).collect();
        assert_eq!(ranges, vec![26..29]);
    }

    #[test]
    fn longer_word_wins_over_contained_word() {
        let text = "The reaction was quick.";
        let highlighter = Highlighter::new(&[entry(1, "act"), entry(2, "reaction")]).unwrap();
        let out = highlighter.highlight(text);
        assert_eq!(highlighted_words(&out), vec![("reaction", 2)]);
        assert_eq!(out.plain_text(), text);
    }

    #[test]
    fn multi_word_entry_masks_its_parts() {
        let text = "Please take off your shoes before you take them off.";
        let highlighter = Highlighter::new(&[entry(1, "off"), entry(2, "take off")]).unwrap();
        let out = highlighter.highlight(text);
        assert_eq!(highlighted_words(&out), vec![("take off", 2), ("off", 1)]);
    }

    #[test]
    fn case_insensitive_and_preserves_casing() {
        let text = "Act now. They ACT fast, and we act together.";
        let highlighter = Highlighter::new(&[entry(9, "act")]).unwrap();
        let out = highlighter.highlight(text);
        assert_eq!(
            highlighted_words(&out),
            vec![("Act", 9), ("ACT", 9), ("act", 9)]
        );
    }

    #[test]
    fn regex_metacharacters_are_literal() {
        let text = "See e.g the notes, or an egg.";
        let highlighter = Highlighter::new(&[entry(1, "e.g")]).unwrap();
        let out = highlighter.highlight(text);
        assert_eq!(highlighted_words(&out), vec![("e.g", 1)]);
        assert_eq!(out.plain_text(), text);
    }

    #[test]
    fn empty_words_are_skipped() {
        let highlighter = Highlighter::new(&[entry(1, ""), entry(2, "   "), entry(3, "sun")]).unwrap();
        assert_eq!(highlighter.len(), 1);
        let out = highlighter.highlight("The sun rises.");
        assert_eq!(highlighted_words(&out), vec![("sun", 3)]);
    }

    #[test]
    fn duplicate_words_go_to_first_entry() {
        let highlighter = Highlighter::new(&[entry(4, "Bank"), entry(5, "bank")]).unwrap();
        let out = highlighter.highlight("The bank by the river bank.");
        assert_eq!(highlighted_words(&out), vec![("bank", 4), ("bank", 4)]);
    }

    #[test]
    fn overlapping_candidate_retries_after_rejection() {
        // "b a" is claimed first; the "a a" candidate starting inside it is
        // rejected, and the later "a a" at the end must still be found.
        let text = "b a a";
        let highlighter = Highlighter::new(&[entry(1, "b a"), entry(2, "a a")]).unwrap();
        let out = highlighter.highlight(text);
        assert_eq!(highlighted_words(&out), vec![("b a", 1)]);

        let text = "b a a a";
        let out = highlighter.highlight(text);
        assert_eq!(highlighted_words(&out), vec![("b a", 1), ("a a", 2)]);
        assert_eq!(out.plain_text(), text);
    }

    #[test]
    fn words_with_edge_punctuation_match_whole() {
        let out = Highlighter::new(&[entry(1, "Mr.")]).unwrap().highlight("Hello Mr. Smith.");
        assert_eq!(highlighted_words(&out), vec![("Mr.", 1)]);

        let out = Highlighter::new(&[entry(2, "C++")]).unwrap().highlight("I like C++ a lot, not C++x.");
        assert_eq!(highlighted_words(&out), vec![("C++", 2)]);

        let text = "apples, pears, etc. and more";
        let out = Highlighter::new(&[entry(3, "etc.")]).unwrap().highlight(text);
        assert_eq!(highlighted_words(&out), vec![("etc.", 3)]);
        assert_eq!(out.plain_text(), text);
    }

    #[test]
    fn punctuated_word_needs_free_neighbours() {
        let out = Highlighter::new(&[entry(1, "Mr.")]).unwrap().highlight("XMr. and Mr.s");
        assert!(out.annotations().next().is_none());
    }

    #[test]
    fn repeated_id_only_matches_first_word() {
        let highlighter = Highlighter::new(&[entry(1, "first"), entry(1, "second")]).unwrap();
        assert_eq!(highlighter.len(), 1);
        let out = highlighter.highlight("the second one, then the first");
        assert_eq!(highlighted_words(&out), vec![("first", 1)]);
    }

    #[test]
    fn surrounding_whitespace_in_word_is_ignored() {
        let out = Highlighter::new(&[entry(1, " cat ")]).unwrap().highlight("A cat naps.");
        assert_eq!(highlighted_words(&out), vec![("cat", 1)]);
    }

    #[test]
    fn unicode_text_round_trips() {
        let text = "Café naïve résumé — café!";
        let highlighter = Highlighter::new(&[entry(1, "café"), entry(2, "résumé")]).unwrap();
        let out = highlighter.highlight(text);
        assert_eq!(
            highlighted_words(&out),
            vec![("Café", 1), ("résumé", 2), ("café", 1)]
        );
        assert_eq!(out.plain_text(), text);
    }

    #[test]
    fn every_whole_word_occurrence_is_covered_exactly_once() {
        let text = "act, react, reaction; Act! acting? act";
        let entries = [entry(1, "act"), entry(2, "react"), entry(3, "reaction")];
        let out = Highlighter::new(&entries).unwrap().highlight(text);

        let acts: Vec<_> = out
            .annotations()
            .filter(|s| s.entry_id == Some(1))
            .map(|s| s.range.clone())
            .collect();
        assert_eq!(acts, vec![0..3, 22..25, 35..38]);
        assert_eq!(out.annotations().filter(|s| s.entry_id == Some(2)).count(), 1);
        assert_eq!(out.annotations().filter(|s| s.entry_id == Some(3)).count(), 1);

        let mut cursor = 0;
        for segment in out.segments() {
            assert_eq!(segment.range.start, cursor);
            assert!(segment.range.end > segment.range.start);
            cursor = segment.range.end;
        }
        assert_eq!(cursor, text.len());
    }

    #[test]
    fn empty_text_yields_no_segments() {
        let out = Highlighter::new(&[entry(1, "cat")]).unwrap().highlight("");
        assert!(out.segments().is_empty());
        assert_eq!(out.plain_text(), "");
    }

    #[test]
    fn html_escapes_text_and_wraps_highlights() {
        let text = "<b>cat</b> & dog";
        let highlighter = Highlighter::new(&[entry(1, "cat")]).unwrap();
        let html = highlighter
            .highlight(text)
            .render_html(|id, word| format!(r#"<span class="vocab-highlight" data-id="{id}">{word}</span>"#));
        assert_eq!(
            html,
            r#"&lt;b&gt;<span class="vocab-highlight" data-id="1">cat</span>&lt;/b&gt; &amp; dog"#
        );
    }

    #[test]
    fn short_word_never_matches_inside_markup() {
        // A word equal to the span's attribute text must not be found there.
        let text = "class vocab data";
        let entries = [entry(1, "vocab"), entry(2, "class"), entry(3, "data")];
        let out = Highlighter::new(&entries).unwrap().highlight(text);
        assert_eq!(out.annotations().count(), 3);
        assert_eq!(out.plain_text(), text);
    }

    #[test]
    fn segments_serialize_with_offsets() {
        let out = Highlighter::new(&[entry(1, "cat")]).unwrap().highlight("a cat");
        let json = serde_json::to_value(out.segments()).unwrap();
        assert_eq!(
            json,
            serde_json::json!([
                {"text": "a ", "start": 0, "end": 2},
                {"text": "cat", "start": 2, "end": 5, "entry_id": 1}
            ])
        );
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn lesson_text() -> impl Strategy<Value = String> {
            let separators = vec![" ", ", ", "_", "-", ".\n", " é "];
            prop::collection::vec(("[a-cA-C]{1,4}", prop::sample::select(separators)), 0..16)
                .prop_map(|parts| {
                    parts
                        .into_iter()
                        .map(|(word, separator)| format!("{word}{separator}"))
                        .collect()
                })
        }

        fn vocabulary() -> impl Strategy<Value = Vec<VocabularyEntry>> {
            prop::collection::vec("[a-c]{1,3}( [a-c]{1,2})?", 0..6).prop_map(|words| {
                words
                    .iter()
                    .enumerate()
                    .map(|(id, word)| entry(id as u32, word))
                    .collect()
            })
        }

        proptest! {
            #[test]
            fn segments_tile_the_text(text in lesson_text(), entries in vocabulary()) {
                let out = Highlighter::new(&entries).unwrap().highlight(&text);
                prop_assert_eq!(out.plain_text(), text.clone());

                let mut cursor = 0;
                for segment in out.segments() {
                    prop_assert_eq!(segment.range.start, cursor);
                    prop_assert!(segment.range.end > segment.range.start);
                    prop_assert_eq!(segment.text, &text[segment.range.clone()]);
                    cursor = segment.range.end;
                }
                prop_assert_eq!(cursor, text.len());
            }

            #[test]
            fn annotations_match_their_entry_word(text in lesson_text(), entries in vocabulary()) {
                let out = Highlighter::new(&entries).unwrap().highlight(&text);
                for segment in out.annotations() {
                    let id = segment.entry_id.unwrap();
                    let word = &entries[id as usize].word;
                    prop_assert!(segment.text.eq_ignore_ascii_case(word));
                    prop_assert!(is_whole_word(&text, segment.range.clone()));
                }
            }

            #[test]
            fn single_word_every_occurrence_annotated(text in lesson_text(), word in "[a-c]{1,3}") {
                let out = Highlighter::new(&[entry(7, &word)]).unwrap().highlight(&text);
                let expected: Vec<_> = text
                    .char_indices()
                    .map(|(start, _)| start..start + word.len())
                    .filter(|range| {
                        text.get(range.clone())
                            .is_some_and(|candidate| candidate.eq_ignore_ascii_case(&word))
                            && is_whole_word(&text, range.clone())
                    })
                    .collect();
                let found: Vec<_> = out.annotations().map(|s| s.range.clone()).collect();
                prop_assert_eq!(found, expected);
            }
        }
    }
}
