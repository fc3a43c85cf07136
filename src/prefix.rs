//! Vendor-prefix pass over compiled CSS.
//!
//! Runs as an independent stage after stylesheet compilation and before the
//! output is written. Works on the compiler's expanded output, one
//! declaration per line. Idempotent: a declaration whose prefixed form is
//! already present in the same rule block is left alone.

/// Properties that still need vendor prefixes in the last two versions of
/// the major browsers, with the prefixes they need.
const PREFIXED: &[(&str, &[&str])] = &[
    ("appearance", &["-webkit-", "-moz-"]),
    ("backdrop-filter", &["-webkit-"]),
    ("box-decoration-break", &["-webkit-"]),
    ("clip-path", &["-webkit-"]),
    ("hyphens", &["-webkit-", "-ms-"]),
    ("mask", &["-webkit-"]),
    ("mask-image", &["-webkit-"]),
    ("tab-size", &["-moz-"]),
    ("text-size-adjust", &["-webkit-", "-moz-", "-ms-"]),
    ("user-select", &["-webkit-", "-moz-", "-ms-"]),
];

/// Insert vendor-prefixed duplicates before each declaration that needs
/// them, keeping the unprefixed declaration last.
pub fn apply(css: &str) -> String {
    let mut out = String::with_capacity(css.len());
    // Prefixed properties already present in the current rule block.
    let mut present: Vec<String> = Vec::new();

    for line in css.lines() {
        let trimmed = line.trim_start();

        // A block opener is a selector, never a declaration, even when the
        // element name collides with the table (`mask:hover {`).
        if trimmed.contains('{') {
            present.clear();
            out.push_str(line);
            out.push('\n');
            continue;
        }

        if let Some((prop, _)) = split_declaration(trimmed) {
            if prop.starts_with('-') {
                present.push(prop.to_string());
            } else if let Some((_, prefixes)) = PREFIXED.iter().find(|(p, _)| *p == prop) {
                let indent = &line[..line.len() - trimmed.len()];
                for prefix in *prefixes {
                    let prefixed = format!("{prefix}{prop}");
                    if present.iter().any(|p| *p == prefixed) {
                        continue;
                    }
                    out.push_str(indent);
                    out.push_str(&prefixed);
                    out.push_str(&trimmed[prop.len()..]);
                    out.push('\n');
                }
            }
        }

        out.push_str(line);
        out.push('\n');
    }

    out
}

/// Split a `property: value;` line, rejecting selectors and at-rules.
fn split_declaration(line: &str) -> Option<(&str, &str)> {
    let colon = line.find(':')?;
    let (prop, rest) = line.split_at(colon);
    let prop = prop.trim_end();

    let is_property = !prop.is_empty()
        && prop
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');

    if is_property { Some((prop, rest)) } else { None }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adds_prefixes_before_declaration() {
        let css = ".a {\n  user-select: none;\n}\n";
        let out = apply(css);
        let expected = ".a {\n  -webkit-user-select: none;\n  -moz-user-select: none;\n  -ms-user-select: none;\n  user-select: none;\n}\n";
        assert_eq!(out, expected);
    }

    #[test]
    fn is_idempotent() {
        let css = ".a {\n  user-select: none;\n  color: red;\n}\n";
        let once = apply(css);
        let twice = apply(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn leaves_unlisted_properties_alone() {
        let css = ".a {\n  color: red;\n  display: flex;\n}\n";
        assert_eq!(apply(css), css);
    }

    #[test]
    fn does_not_prefix_selectors_or_pseudo_classes() {
        let css = "a:hover {\n  color: red;\n}\n";
        assert_eq!(apply(css), css);
    }

    #[test]
    fn selector_named_like_a_property_stays_balanced() {
        // The SVG mask element collides with the prefix table.
        let css = "mask:hover {\n  color: red;\n}\n";
        let out = apply(css);
        assert_eq!(out, css);
        assert_eq!(
            out.matches('{').count(),
            out.matches('}').count()
        );
    }

    #[test]
    fn blocks_reset_presence_tracking() {
        let css = ".a {\n  -webkit-user-select: none;\n  user-select: none;\n}\n.b {\n  user-select: none;\n}\n";
        let out = apply(css);
        // .a already had the webkit form; .b gets all three.
        assert_eq!(out.matches("-webkit-user-select").count(), 2);
        assert_eq!(out.matches("-moz-user-select").count(), 2);
    }
}
