use std::borrow::Cow;

use tracing::trace;

/// Characters that delimit the fields of a StatsD line, and so cannot appear in a metric name.
const RESERVED: [char; 3] = [':', '|', '@'];

const REPLACEMENT: char = '_';

/// Cleans a metric name so that it can be embedded in a StatsD line.
///
/// Each of `:`, `|` and `@` is replaced with `_`. Every other character is left untouched, so the cleaned name always
/// has the same length as the original. When no replacement is needed, the name is borrowed as-is.
pub fn sanitize_name(name: &str) -> Cow<'_, str> {
    if !name.contains(&RESERVED[..]) {
        return Cow::Borrowed(name);
    }

    let cleaned: String =
        name.chars().map(|c| if RESERVED.contains(&c) { REPLACEMENT } else { c }).collect();
    trace!(original = name, sanitized = %cleaned, "Sanitized metric name.");

    Cow::Owned(cleaned)
}

#[cfg(test)]
mod tests {
    use std::borrow::Cow;

    use proptest::prelude::*;

    use super::sanitize_name;

    #[test]
    fn reserved_characters() {
        // Cases are defined as: input name, expected output.
        let cases = [
            ("foo", "foo"),
            ("foo.bar", "foo.bar"),
            ("foo:bar", "foo_bar"),
            ("foo|bar", "foo_bar"),
            ("foo@bar", "foo_bar"),
            (":|@", "___"),
            ("command.RETR.226", "command.RETR.226"),
            ("tls.cipher.AES:256|GCM@x", "tls.cipher.AES_256_GCM_x"),
            ("", ""),
        ];

        for (input, expected) in cases {
            assert_eq!(sanitize_name(input), expected);
        }
    }

    #[test]
    fn clean_names_are_borrowed() {
        assert!(matches!(sanitize_name("connection"), Cow::Borrowed("connection")));
        assert!(matches!(sanitize_name("connection:ftp"), Cow::Owned(_)));
    }

    proptest! {
        #[test]
        fn one_for_one_replacement(name in "[a-zA-Z0-9._:|@ -]{0,64}") {
            let sanitized = sanitize_name(&name);

            prop_assert_eq!(sanitized.len(), name.len());
            prop_assert!(!sanitized.contains(&[':', '|', '@'][..]));

            for (original, cleaned) in name.chars().zip(sanitized.chars()) {
                if matches!(original, ':' | '|' | '@') {
                    prop_assert_eq!(cleaned, '_');
                } else {
                    prop_assert_eq!(cleaned, original);
                }
            }
        }
    }
}
