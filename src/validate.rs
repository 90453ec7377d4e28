//! Structural validation of generated messages.
//!
//! A message must be two segments separated by a blank line: the main
//! message (2-4 sentences) and a contributor-thanks line. Validation runs
//! before any embedding is requested, so malformed candidates cost a
//! single chat call and nothing more.

use thiserror::Error;

const MIN_MESSAGE_CHARS: usize = 50;
const MAX_MESSAGE_CHARS: usize = 800;

/// Contributor categories the thanks segment must never mention.
const EXCLUDED_PHRASES: &[&str] = &["node operator", "pillar operator"];

/// At least one of these must appear in the thanks segment.
const APPRECIATION_KEYWORDS: &[&str] = &["thanks", "thank", "appreciation", "respect", "shout"];

#[derive(Debug, Error, PartialEq)]
pub enum FormatViolation {
    #[error("message is empty")]
    Empty,
    #[error("message is too short ({len} chars)")]
    TooShort { len: usize },
    #[error("message is too long ({len} chars)")]
    TooLong { len: usize },
    #[error("missing blank line separator between main message and thanks")]
    MissingSeparator,
    #[error("one of the two segments is empty")]
    EmptySegment,
    #[error("main message has fewer than two sentences")]
    TooFewSentences,
    #[error("thanks segment mentions excluded category '{0}'")]
    ExcludedMention(&'static str),
    #[error("thanks segment contains no appreciation keyword")]
    MissingAppreciation,
}

/// Checks the two-part structural contract of a generated message.
pub fn validate_message(text: &str) -> Result<(), FormatViolation> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(FormatViolation::Empty);
    }

    let len = trimmed.chars().count();
    if len < MIN_MESSAGE_CHARS {
        return Err(FormatViolation::TooShort { len });
    }
    if len > MAX_MESSAGE_CHARS {
        return Err(FormatViolation::TooLong { len });
    }

    let (main, thanks) = split_segments(trimmed).ok_or(FormatViolation::MissingSeparator)?;
    let main = main.trim();
    let thanks = thanks.trim();
    if main.is_empty() || thanks.is_empty() {
        return Err(FormatViolation::EmptySegment);
    }

    let sentence_marks = main.chars().filter(|c| matches!(c, '.' | '!' | '?')).count();
    if sentence_marks < 2 {
        return Err(FormatViolation::TooFewSentences);
    }

    let thanks_lower = thanks.to_lowercase();
    for &phrase in EXCLUDED_PHRASES {
        if thanks_lower.contains(phrase) {
            return Err(FormatViolation::ExcludedMention(phrase));
        }
    }

    if !APPRECIATION_KEYWORDS.iter().any(|k| thanks_lower.contains(k)) {
        return Err(FormatViolation::MissingAppreciation);
    }

    Ok(())
}

/// Splits at the first blank line (a line containing only whitespace).
/// Further blank lines stay inside the second segment.
fn split_segments(text: &str) -> Option<(String, String)> {
    let lines: Vec<&str> = text.lines().collect();
    let boundary = lines.iter().position(|line| line.trim().is_empty())?;
    let main = lines[..boundary].join("\n");
    let thanks = lines[boundary + 1..].join("\n");
    Some((main, thanks))
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = "The protocol keeps moving while markets sleep. Every release \
compounds on the last one.\n\nThanks to the developers and researchers doing the real work.";

    #[test]
    fn test_valid_message_passes() {
        assert_eq!(validate_message(VALID), Ok(()));
    }

    #[test]
    fn test_missing_separator_fails() {
        let text = "One long paragraph. With two sentences. Thanks to the builders anyway, \
this line never separates into two parts.";
        assert_eq!(validate_message(text), Err(FormatViolation::MissingSeparator));
    }

    #[test]
    fn test_whitespace_only_line_counts_as_blank() {
        let text = "The network hums along. Progress is quiet but real.\n   \n\
Thanks to the architects keeping it honest and steady today.";
        assert_eq!(validate_message(text), Ok(()));
    }

    #[test]
    fn test_length_bounds() {
        assert_eq!(
            validate_message("Too short.\n\nThanks."),
            Err(FormatViolation::TooShort { len: 19 })
        );
        let long = format!("{}{}", "a".repeat(900), "\n\nThanks to everyone.");
        assert!(matches!(
            validate_message(&long),
            Err(FormatViolation::TooLong { .. })
        ));
    }

    #[test]
    fn test_single_sentence_main_fails() {
        let text = "One sentence only without a second terminal mark here\n\n\
Thanks to the community managers holding the line as always.";
        assert_eq!(validate_message(text), Err(FormatViolation::TooFewSentences));
    }

    #[test]
    fn test_excluded_categories_rejected() {
        let text = "The chain produced blocks all week. Reliability is the baseline.\n\n\
Thanks to the Node Operators keeping the lights on.";
        assert_eq!(
            validate_message(text),
            Err(FormatViolation::ExcludedMention("node operator"))
        );

        let text = "The chain produced blocks all week. Reliability is the baseline.\n\n\
Respect to pillar operators everywhere.";
        assert_eq!(
            validate_message(text),
            Err(FormatViolation::ExcludedMention("pillar operator"))
        );
    }

    #[test]
    fn test_missing_appreciation_keyword_fails() {
        let text = "Shipping beats talking. The roadmap shortens one commit at a time.\n\n\
Developers and researchers did good things this week.";
        assert_eq!(validate_message(text), Err(FormatViolation::MissingAppreciation));
    }

    #[test]
    fn test_later_blank_lines_stay_in_second_segment() {
        let text = "First thought here. Second thought follows.\n\n\
Thanks to the shitposters on X.\n\nExtra trailing note.";
        assert_eq!(validate_message(text), Ok(()));
    }

}
