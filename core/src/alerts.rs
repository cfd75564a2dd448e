//! Red-flag vocabulary scan for free-text check-in notes.

pub const MAX_NOTE_CHARS: usize = 280;
pub const NOTE_EXCERPT_CHARS: usize = 120;

/// Lowercase phrases that route a note to human review.
pub const RED_FLAG_TERMS: &[&str] = &[
    "bladder",
    "bowel",
    "incontinen",
    "can't pee",
    "cannot pee",
    "saddle",
    "numb groin",
    "groin numb",
    "numbness between my legs",
    "getting weaker",
    "progressive weakness",
    "leg weakness",
    "foot drop",
    "fever",
    "chills",
    "night sweats",
    "weight loss",
    "losing weight",
    "trauma",
    "car accident",
    "bad fall",
    "history of cancer",
];

/// Terms found in `note`, in vocabulary order, without duplicates.
pub fn scan_note(note: &str) -> Vec<&'static str> {
    let haystack = note.to_lowercase().replace('\u{2019}', "'");
    RED_FLAG_TERMS
        .iter()
        .copied()
        .filter(|term| haystack.contains(term))
        .collect()
}

/// Trim and cap a submitted note at `MAX_NOTE_CHARS` characters.
pub fn normalize_note(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(truncate_chars(trimmed, MAX_NOTE_CHARS))
}

/// Bounded excerpt stored with an alert instead of the full note.
pub fn note_excerpt(note: &str) -> String {
    let trimmed = note.trim();
    if trimmed.chars().count() <= NOTE_EXCERPT_CHARS {
        return trimmed.to_string();
    }
    let mut excerpt = truncate_chars(trimmed, NOTE_EXCERPT_CHARS - 1);
    excerpt.push('…');
    excerpt
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
