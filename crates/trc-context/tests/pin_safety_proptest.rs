//! Property tests for pin sanitization.

use proptest::prelude::*;
use trc_context::sanitize_pins;

proptest! {
    /// For any input pin list, no accepted pin is absolute, traverses with
    /// `..`, names a `.env` file, or carries a secret-looking substring.
    #[test]
    fn accepted_pins_are_always_safe(
        pins in proptest::collection::vec("[ -~]{0,40}", 0..30)
    ) {
        let result = sanitize_pins(&pins);
        prop_assert_eq!(
            result.accepted.len() as u64 + result.dropped,
            pins.len() as u64
        );
        for pin in &result.accepted {
            prop_assert!(!pin.starts_with('/'), "absolute pin survived: {pin}");
            prop_assert!(!pin.starts_with('\\'), "absolute pin survived: {pin}");
            prop_assert!(
                !pin.split(['/', '\\']).any(|part| part == ".."),
                "traversal survived: {pin}"
            );
            let file_name = pin.rsplit(['/', '\\']).next().unwrap_or(pin);
            prop_assert!(!file_name.starts_with(".env"), ".env pin survived: {pin}");
            let lowered = pin.to_ascii_lowercase();
            for marker in ["secret", "token", "password", "apikey"] {
                prop_assert!(!lowered.contains(marker), "secret pin survived: {pin}");
            }
        }
    }

    /// Safe relative paths always survive sanitization.
    #[test]
    fn safe_paths_survive(name in "[a-z][a-z0-9_]{0,12}", ext in "(rs|md|toml)") {
        let pin = format!("src/{name}.{ext}");
        prop_assume!(!["secret", "token", "password", "apikey"]
            .iter()
            .any(|m| pin.contains(m)));
        let result = sanitize_pins(&[pin.clone()]);
        prop_assert_eq!(result.accepted, vec![pin]);
        prop_assert_eq!(result.dropped, 0);
    }
}
