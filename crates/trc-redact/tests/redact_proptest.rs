//! Property tests for redaction idempotence.

use proptest::prelude::*;
use trc_redact::redact;

proptest! {
    /// Redacting already-redacted text is a no-op, textually and in counts.
    #[test]
    fn idempotent_over_arbitrary_text(text in "[ -~\n]{0,200}") {
        let once = redact(&text);
        let twice = redact(&once.text);
        prop_assert_eq!(&twice.text, &once.text);
        prop_assert_eq!(twice.masked_entries, 0);
        prop_assert_eq!(twice.masked_chars, 0);
    }

    /// Every env-style secret is counted exactly once.
    #[test]
    fn counts_env_secrets(n in 1usize..6) {
        let mut input = String::new();
        for i in 0..n {
            input.push_str(&format!("KEY_{i}_TOKEN=value{i}\n"));
        }
        let r = redact(&input);
        prop_assert_eq!(r.masked_entries, n as u64);
    }

    /// Text with no secret shapes passes through unchanged.
    #[test]
    fn plain_words_untouched(words in proptest::collection::vec("[a-z]{1,10}", 0..20)) {
        let text = words.join(" ");
        let r = redact(&text);
        prop_assert_eq!(r.text, text);
        prop_assert_eq!(r.masked_entries, 0);
    }
}
