//! Conservative in-process minifiers.
//!
//! Both minifiers are pure text passes with no parser behind them, so they
//! only perform transformations that are safe without one. The trait seam
//! exists so the concatenation stage can be exercised with a no-op
//! substitute and compared byte-for-byte against plain concatenation.

/// A single-purpose output filter applied after concatenation.
pub trait Minify: Send + Sync {
    fn minify(&self, source: &str) -> String;
}

/// Strips comments and insignificant whitespace from CSS.
pub struct CssMinifier;

/// Strips full-line comments and blank lines from JavaScript. Newlines are
/// preserved so code relying on automatic semicolon insertion survives, and
/// `//` sequences inside strings or URLs are never touched.
pub struct JsMinifier;

/// Identity filter, used by tests.
pub struct NoopMinifier;

impl Minify for NoopMinifier {
    fn minify(&self, source: &str) -> String {
        source.to_string()
    }
}

impl Minify for CssMinifier {
    fn minify(&self, source: &str) -> String {
        let mut out = String::with_capacity(source.len());
        let mut chars = source.chars().peekable();
        let mut in_string: Option<char> = None;

        while let Some(c) = chars.next() {
            if let Some(quote) = in_string {
                out.push(c);
                if c == '\\' {
                    if let Some(next) = chars.next() {
                        out.push(next);
                    }
                } else if c == quote {
                    in_string = None;
                }
                continue;
            }

            match c {
                '"' | '\'' => {
                    in_string = Some(c);
                    out.push(c);
                }
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    let mut prev = '\0';
                    for c in chars.by_ref() {
                        if prev == '*' && c == '/' {
                            break;
                        }
                        prev = c;
                    }
                }
                c if c.is_whitespace() => {
                    // Whitespace is dropped entirely next to punctuation and
                    // collapsed to a single space otherwise. Space before a
                    // `:` survives, it may be a descendant pseudo selector.
                    while chars.peek().is_some_and(|c| c.is_whitespace()) {
                        chars.next();
                    }
                    let prev = out.chars().last();
                    let next = chars.peek().copied();
                    let after = matches!(
                        prev,
                        Some('{') | Some('}') | Some(';') | Some(':') | Some(',') | Some('>') | None
                    );
                    let before = matches!(
                        next,
                        Some('{') | Some('}') | Some(';') | Some(',') | Some('>') | None
                    );
                    if !after && !before {
                        out.push(' ');
                    }
                }
                ';' => {
                    // Last declaration in a block needs no semicolon.
                    let mut ahead = chars.clone();
                    if ahead.find(|c| !c.is_whitespace()) != Some('}') {
                        out.push(';');
                    }
                }
                _ => out.push(c),
            }
        }

        out
    }
}

impl Minify for JsMinifier {
    fn minify(&self, source: &str) -> String {
        let mut out = String::with_capacity(source.len());

        for line in source.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with("//") {
                continue;
            }

            out.push_str(line.trim_end());
            out.push('\n');
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn css_strips_comments_and_whitespace() {
        let css = "/* header */\n.a {\n  color: red;\n  margin: 0 auto;\n}\n";
        assert_eq!(CssMinifier.minify(css), ".a{color:red;margin:0 auto}");
    }

    #[test]
    fn css_preserves_string_contents() {
        let css = ".a { content: \"a  /* b */  c\"; }";
        assert_eq!(
            CssMinifier.minify(css),
            ".a{content:\"a  /* b */  c\"}"
        );
    }

    #[test]
    fn js_drops_full_line_comments_and_blanks() {
        let js = "// banner\nvar a = 1;\n\n  // indented comment\nvar b = 2;\n";
        assert_eq!(JsMinifier.minify(js), "var a = 1;\nvar b = 2;\n");
    }

    #[test]
    fn js_keeps_urls_and_inline_slashes() {
        let js = "var url = \"http://example.com\"; // kept, not a full-line comment\n";
        assert_eq!(JsMinifier.minify(js), js);
    }

    #[test]
    fn js_never_joins_lines() {
        let js = "var a = 1\nvar b = 2\n";
        assert_eq!(JsMinifier.minify(js), js);
    }

    #[test]
    fn noop_is_identity() {
        let src = "anything /* at */ all\n";
        assert_eq!(NoopMinifier.minify(src), src);
    }
}
