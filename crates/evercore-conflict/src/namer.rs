//! Naming rule for the `MoveMine` resolution of notes.
//!
//! Given a note that lost a conflict, produces the title its demoted
//! duplicate should carry: the original title with a `" - conflicting"`
//! suffix, or — when the note has no title — the first twelve characters of
//! its plain-text content with an `"... - conflicting"` suffix.

use evercore_core::domain::Note;

const PLAIN_TEXT_PREFIX_CHARS: usize = 12;
const SUFFIX_WITH_TITLE: &str = " - conflicting";
const SUFFIX_WITHOUT_TITLE: &str = "... - conflicting";

/// Title for the note produced by a `MoveMine` resolution.
#[must_use]
pub fn conflicting_title(note: &Note) -> String {
    match note.title.as_deref() {
        Some(title) if !title.is_empty() => format!("{title}{SUFFIX_WITH_TITLE}"),
        _ => {
            let prefix = note.plain_text_prefix(PLAIN_TEXT_PREFIX_CHARS);
            format!("{prefix}{SUFFIX_WITHOUT_TITLE}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evercore_core::domain::LocalId;

    fn note(title: Option<&str>, content: Option<&str>) -> Note {
        Note {
            guid: None,
            local_id: LocalId::new(),
            update_sequence_num: None,
            is_dirty: true,
            is_locally_deleted: false,
            title: title.map(str::to_string),
            content: content.map(str::to_string),
            notebook_guid: None,
            tag_guids: vec![],
            resource_guids: vec![],
        }
    }

    #[test]
    fn titled_note_gets_suffix() {
        let n = note(Some("Draft"), None);
        assert_eq!(conflicting_title(&n), "Draft - conflicting");
    }

    #[test]
    fn untitled_note_uses_plain_text_prefix() {
        let n = note(None, Some("Shopping list for the week ahead"));
        assert_eq!(conflicting_title(&n), "Shopping lis... - conflicting");
    }

    #[test]
    fn untitled_empty_note_uses_empty_prefix() {
        let n = note(None, None);
        assert_eq!(conflicting_title(&n), "... - conflicting");
    }

    #[test]
    fn empty_title_is_treated_as_no_title() {
        let n = note(Some(""), Some("fallback text"));
        assert_eq!(conflicting_title(&n), "fallback tex... - conflicting");
    }
}
