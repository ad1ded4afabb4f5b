//! The diary draft accumulator and its transcript merge policy.
//!
//! Partial and final results are merged asymmetrically:
//!
//! * a `Final` text is a **committed segment** — appended to the draft,
//!   space-separated from what came before;
//! * a `Partial` text is an unstable estimate of the **current utterance
//!   only** — it replaces the previous partial (the open tail) and is
//!   superseded by the next `Partial` or `Final`.
//!
//! The committed prefix therefore always equals the space-joined finals in
//! arrival order, no matter how many partials were interleaved.
//!
//! Every incoming text is scanned (case-insensitively) for the configured
//! end phrase; when found, the phrase is stripped, any remaining content is
//! merged, and the caller is told to finalize.

// ---------------------------------------------------------------------------
// MergeOutcome
// ---------------------------------------------------------------------------

/// What a merge did with the incoming text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Text was trivial (at or below the minimum length) and was dropped.
    Ignored,
    /// The draft changed; recording continues.
    Updated,
    /// The end phrase was found — the session should finalize now.
    EndPhrase,
}

// ---------------------------------------------------------------------------
// DiaryDraft
// ---------------------------------------------------------------------------

/// Mutable accumulator for the entry being recorded.
///
/// Owned exclusively by the active session and mutated only on its control
/// path; created empty when recording begins and taken on finalize.
#[derive(Debug, Default)]
pub struct DiaryDraft {
    /// Space-joined `Final` segments, in arrival order.
    committed: String,
    /// Latest `Partial` of the utterance currently being spoken.
    open_tail: Option<String>,
}

impl DiaryDraft {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a `Partial` transcript.
    ///
    /// Replaces the open tail; the committed prefix is untouched.
    pub fn apply_partial(
        &mut self,
        text: &str,
        end_phrase: &str,
        min_len: usize,
    ) -> MergeOutcome {
        let text = text.trim();

        if let Some(rest) = strip_end_phrase(text, end_phrase) {
            self.open_tail = if rest.is_empty() { None } else { Some(rest) };
            return MergeOutcome::EndPhrase;
        }

        if text.chars().count() <= min_len {
            return MergeOutcome::Ignored;
        }

        self.open_tail = Some(text.to_string());
        MergeOutcome::Updated
    }

    /// Merge a `Final` transcript.
    ///
    /// The final supersedes any open tail of the same utterance and is
    /// appended to the committed prefix.
    pub fn apply_final(&mut self, text: &str, end_phrase: &str, min_len: usize) -> MergeOutcome {
        let text = text.trim();

        if let Some(rest) = strip_end_phrase(text, end_phrase) {
            self.open_tail = None;
            if !rest.is_empty() {
                self.push_committed(&rest);
            }
            return MergeOutcome::EndPhrase;
        }

        if text.chars().count() <= min_len {
            return MergeOutcome::Ignored;
        }

        self.open_tail = None;
        self.push_committed(text);
        MergeOutcome::Updated
    }

    /// The current merged text: committed segments plus the open tail.
    pub fn current(&self) -> String {
        match &self.open_tail {
            None => self.committed.clone(),
            Some(tail) if self.committed.is_empty() => tail.clone(),
            Some(tail) => format!("{} {}", self.committed, tail),
        }
    }

    /// Returns `true` when nothing has been accumulated.
    pub fn is_empty(&self) -> bool {
        self.committed.is_empty() && self.open_tail.is_none()
    }

    /// Take the merged text, leaving the draft empty.
    pub fn take(&mut self) -> String {
        let text = self.current();
        self.clear();
        text
    }

    /// Discard all content.
    pub fn clear(&mut self) {
        self.committed.clear();
        self.open_tail = None;
    }

    fn push_committed(&mut self, text: &str) {
        if !self.committed.is_empty() {
            self.committed.push(' ');
        }
        self.committed.push_str(text);
    }
}

// ---------------------------------------------------------------------------
// strip_end_phrase
// ---------------------------------------------------------------------------

/// Case-insensitive (ASCII) search for `phrase` in `text`.
///
/// Returns the remaining content with the phrase removed and the pieces
/// around it rejoined, or `None` when the phrase does not occur.
fn strip_end_phrase(text: &str, phrase: &str) -> Option<String> {
    let range = find_ignore_case(text, phrase)?;
    let prefix = text[..range.start].trim();
    let suffix = text[range.end..].trim();

    let rest = match (prefix.is_empty(), suffix.is_empty()) {
        (true, true) => String::new(),
        (false, true) => prefix.to_string(),
        (true, false) => suffix.to_string(),
        (false, false) => format!("{prefix} {suffix}"),
    };
    Some(rest)
}

/// Byte range of the first ASCII-case-insensitive occurrence of `phrase`.
fn find_ignore_case(text: &str, phrase: &str) -> Option<std::ops::Range<usize>> {
    if phrase.is_empty() {
        return None;
    }

    let needle: Vec<char> = phrase.chars().map(|c| c.to_ascii_lowercase()).collect();
    let haystack: Vec<(usize, char)> = text.char_indices().collect();

    if haystack.len() < needle.len() {
        return None;
    }

    for start in 0..=haystack.len() - needle.len() {
        let matched = needle
            .iter()
            .enumerate()
            .all(|(i, &p)| haystack[start + i].1.to_ascii_lowercase() == p);

        if matched {
            let (start_byte, _) = haystack[start];
            let (last_byte, last_char) = haystack[start + needle.len() - 1];
            return Some(start_byte..last_byte + last_char.len_utf8());
        }
    }

    None
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const END: &str = "that's it";
    const MIN: usize = 3;

    // ---- Partial replacement semantics -------------------------------------

    #[test]
    fn partials_replace_each_other() {
        let mut draft = DiaryDraft::new();
        draft.apply_partial("today I went", END, MIN);
        draft.apply_partial("today I went to the lake", END, MIN);
        assert_eq!(draft.current(), "today I went to the lake");
    }

    #[test]
    fn draft_equals_most_recent_partial() {
        let mut draft = DiaryDraft::new();
        for text in ["one thing", "another thing", "a third thing"] {
            draft.apply_partial(text, END, MIN);
        }
        assert_eq!(draft.current(), "a third thing");
    }

    // ---- Final append semantics --------------------------------------------

    #[test]
    fn finals_append_space_joined() {
        let mut draft = DiaryDraft::new();
        assert_eq!(draft.apply_final("hello world", END, MIN), MergeOutcome::Updated);
        assert_eq!(draft.apply_final("second sentence", END, MIN), MergeOutcome::Updated);
        assert_eq!(draft.current(), "hello world second sentence");
    }

    #[test]
    fn finals_append_regardless_of_interleaved_partials() {
        let mut draft = DiaryDraft::new();
        draft.apply_partial("hel", END, MIN + 10); // below min, ignored anyway
        draft.apply_partial("hello wor", END, MIN);
        draft.apply_final("hello world", END, MIN);
        draft.apply_partial("and th", END, MIN);
        draft.apply_partial("and then some", END, MIN);
        draft.apply_final("and then some more", END, MIN);
        assert_eq!(draft.current(), "hello world and then some more");
    }

    #[test]
    fn final_supersedes_open_partial() {
        let mut draft = DiaryDraft::new();
        draft.apply_final("first segment", END, MIN);
        draft.apply_partial("secon", END, MIN);
        draft.apply_final("second segment", END, MIN);
        // The stale partial must not appear anywhere.
        assert_eq!(draft.current(), "first segment second segment");
    }

    #[test]
    fn trailing_partial_is_included_in_current() {
        let mut draft = DiaryDraft::new();
        draft.apply_final("committed part", END, MIN);
        draft.apply_partial("still speaking", END, MIN);
        assert_eq!(draft.current(), "committed part still speaking");
    }

    // ---- End-phrase detection ----------------------------------------------

    #[test]
    fn end_phrase_detected_case_insensitively() {
        let mut draft = DiaryDraft::new();
        assert_eq!(
            draft.apply_final("goodnight THAT'S IT", END, MIN),
            MergeOutcome::EndPhrase
        );
        assert_eq!(draft.current(), "goodnight");
    }

    #[test]
    fn end_phrase_alone_leaves_existing_content() {
        let mut draft = DiaryDraft::new();
        draft.apply_final("hello world", END, MIN);
        assert_eq!(draft.apply_final("that's it", END, MIN), MergeOutcome::EndPhrase);
        assert_eq!(draft.current(), "hello world");
    }

    #[test]
    fn end_phrase_prefix_is_appended_with_separator() {
        let mut draft = DiaryDraft::new();
        draft.apply_final("first part", END, MIN);
        assert_eq!(
            draft.apply_final("last words that's it", END, MIN),
            MergeOutcome::EndPhrase
        );
        assert_eq!(draft.current(), "first part last words");
    }

    #[test]
    fn end_phrase_in_partial_finalizes_with_prefix() {
        let mut draft = DiaryDraft::new();
        draft.apply_final("earlier entry", END, MIN);
        draft.apply_partial("stale partial text", END, MIN);
        assert_eq!(
            draft.apply_partial("closing words that's it", END, MIN),
            MergeOutcome::EndPhrase
        );
        assert_eq!(draft.current(), "earlier entry closing words");
    }

    #[test]
    fn end_phrase_mid_text_keeps_both_sides() {
        let mut draft = DiaryDraft::new();
        assert_eq!(
            draft.apply_final("before that's it after", END, MIN),
            MergeOutcome::EndPhrase
        );
        assert_eq!(draft.current(), "before after");
    }

    // ---- Trivial-text filter -----------------------------------------------

    #[test]
    fn short_texts_are_ignored() {
        let mut draft = DiaryDraft::new();
        assert_eq!(draft.apply_final("ok", END, MIN), MergeOutcome::Ignored);
        assert_eq!(draft.apply_partial("um", END, MIN), MergeOutcome::Ignored);
        assert!(draft.is_empty());
    }

    #[test]
    fn exactly_min_len_is_ignored() {
        let mut draft = DiaryDraft::new();
        assert_eq!(draft.apply_final("abc", END, MIN), MergeOutcome::Ignored);
        assert!(draft.is_empty());
    }

    #[test]
    fn whitespace_only_is_ignored() {
        let mut draft = DiaryDraft::new();
        assert_eq!(draft.apply_final("   ", END, MIN), MergeOutcome::Ignored);
        assert!(draft.is_empty());
    }

    // ---- take / clear ------------------------------------------------------

    #[test]
    fn take_returns_text_and_empties_draft() {
        let mut draft = DiaryDraft::new();
        draft.apply_final("some entry", END, MIN);
        assert_eq!(draft.take(), "some entry");
        assert!(draft.is_empty());
        assert_eq!(draft.take(), "");
    }

    #[test]
    fn clear_discards_committed_and_tail() {
        let mut draft = DiaryDraft::new();
        draft.apply_final("committed", END, MIN);
        draft.apply_partial("tail text", END, MIN);
        draft.clear();
        assert!(draft.is_empty());
        assert_eq!(draft.current(), "");
    }

    // ---- strip_end_phrase / find_ignore_case -------------------------------

    #[test]
    fn find_is_case_insensitive() {
        assert!(find_ignore_case("say That'S It now", "that's it").is_some());
        assert!(find_ignore_case("nothing here", "that's it").is_none());
    }

    #[test]
    fn find_empty_phrase_matches_nothing() {
        assert!(find_ignore_case("anything", "").is_none());
    }

    #[test]
    fn strip_removes_only_the_phrase() {
        assert_eq!(
            strip_end_phrase("hello THAT'S IT world", "that's it").unwrap(),
            "hello world"
        );
        assert_eq!(strip_end_phrase("that's it", "that's it").unwrap(), "");
    }

    #[test]
    fn strip_handles_multibyte_text_around_phrase() {
        let rest = strip_end_phrase("café diary that's it", "that's it").unwrap();
        assert_eq!(rest, "café diary");
    }
}
