//! PII redaction applied before any text leaves the trust boundary.
//!
//! Two heuristics: an email pattern, and two consecutive capitalized words
//! treated as a person name. A capitalized pair that opens a sentence is left
//! alone so sentence-initial proper nouns survive; sentence-initial means the
//! nearest preceding non-whitespace character is absent or one of `.` `!` `?`.

pub const EMAIL_PLACEHOLDER: &str = "[REDACTED_EMAIL]";
pub const NAME_PLACEHOLDER: &str = "[REDACTED_NAME]";

/// Pure transform; identity on text with no matches.
pub fn redact_pii(text: &str) -> String {
    redact_names(&redact_emails(text))
}

fn is_email_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '.' | '-')
}

fn redact_emails(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;

    while i < chars.len() {
        if is_email_char(chars[i]) || chars[i] == '@' {
            let start = i;
            let mut saw_at = false;
            let mut before_at = 0usize;
            let mut after_at = 0usize;
            while i < chars.len() && (is_email_char(chars[i]) || chars[i] == '@') {
                if chars[i] == '@' {
                    saw_at = true;
                } else if saw_at {
                    after_at += 1;
                } else {
                    before_at += 1;
                }
                i += 1;
            }
            if saw_at && before_at > 0 && after_at > 0 {
                out.push_str(EMAIL_PLACEHOLDER);
            } else {
                out.extend(&chars[start..i]);
            }
        } else {
            out.push(chars[i]);
            i += 1;
        }
    }

    out
}

/// A capitalized word: one uppercase letter followed by one or more
/// lowercase letters, taken maximally.
fn capitalized_word_end(chars: &[char], start: usize) -> Option<usize> {
    if start >= chars.len() || !chars[start].is_uppercase() {
        return None;
    }
    let mut end = start + 1;
    while end < chars.len() && chars[end].is_lowercase() {
        end += 1;
    }
    if end > start + 1 {
        Some(end)
    } else {
        None
    }
}

fn starts_sentence(chars: &[char], word_start: usize) -> bool {
    let mut i = word_start;
    while i > 0 {
        i -= 1;
        if chars[i].is_whitespace() {
            continue;
        }
        return matches!(chars[i], '.' | '!' | '?');
    }
    true
}

fn redact_names(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;

    while i < chars.len() {
        let at_word_boundary = i == 0 || !chars[i - 1].is_alphanumeric();
        if at_word_boundary {
            if let Some(first_end) = capitalized_word_end(&chars, i) {
                let pair_end = (first_end < chars.len() && chars[first_end] == ' ')
                    .then(|| capitalized_word_end(&chars, first_end + 1))
                    .flatten();
                if let Some(second_end) = pair_end {
                    if !starts_sentence(&chars, i) {
                        out.push_str(NAME_PLACEHOLDER);
                        i = second_end;
                        continue;
                    }
                }
            }
        }
        out.push(chars[i]);
        i += 1;
    }

    out
}

#[cfg(test)]
mod tests {
    use super::{redact_pii, EMAIL_PLACEHOLDER, NAME_PLACEHOLDER};

    #[test]
    fn strips_email_addresses() {
        let redacted = redact_pii("contact me at jane.doe-1@example.co.uk please");
        assert_eq!(redacted, format!("contact me at {EMAIL_PLACEHOLDER} please"));
        assert!(!redacted.contains('@'));
    }

    #[test]
    fn strips_multiple_emails() {
        let redacted = redact_pii("a@b.com or c_d@e.org");
        assert_eq!(redacted, format!("{EMAIL_PLACEHOLDER} or {EMAIL_PLACEHOLDER}"));
    }

    #[test]
    fn lone_at_sign_is_not_an_email() {
        assert_eq!(redact_pii("meet @ noon"), "meet @ noon");
        assert_eq!(redact_pii("user@ and @host"), "user@ and @host");
    }

    #[test]
    fn strips_mid_sentence_name_pairs() {
        let redacted = redact_pii("my name is John Smith and I want a refund");
        assert_eq!(redacted, format!("my name is {NAME_PLACEHOLDER} and I want a refund"));
    }

    #[test]
    fn sentence_initial_pair_is_kept() {
        assert_eq!(redact_pii("Blue Widget arrived broken"), "Blue Widget arrived broken");
        assert_eq!(
            redact_pii("It broke. New Order please from Acme Corp"),
            format!("It broke. New Order please from {NAME_PLACEHOLDER}")
        );
    }

    #[test]
    fn identity_on_clean_text() {
        let text = "where is order 12345?";
        assert_eq!(redact_pii(text), text);
    }

    #[test]
    fn single_capitalized_word_is_kept() {
        assert_eq!(redact_pii("ask for Alice tomorrow"), "ask for Alice tomorrow");
    }
}
