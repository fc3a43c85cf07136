//! Reference-aware concatenation of markup-linked assets.
//!
//! Markup files may enumerate their script and style references inside
//! build-annotation comment blocks:
//!
//! ```html
//! <!-- build:css css/main.min.css -->
//! <link rel="stylesheet" href="css/main.css">
//! <link rel="stylesheet" href="css/theme.css">
//! <!-- endbuild -->
//! ```
//!
//! Each block's references are concatenated in listed order into a single
//! output asset, minified by the filter matching the block's type only, and
//! the block is rewritten to one tag pointing at the new asset. A block
//! without references yields no asset and is passed through unchanged.

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};

use crate::Paths;
use crate::error::UserefError;
use crate::minify::Minify;

const BLOCK_OPEN: &str = "<!-- build:";
const BLOCK_CLOSE: &str = "<!-- endbuild";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Css,
    Js,
}

impl AssetKind {
    fn parse(token: &str) -> Option<Self> {
        match token {
            "css" => Some(Self::Css),
            "js" => Some(Self::Js),
            _ => None,
        }
    }

    fn tag(self, target: &str) -> String {
        match self {
            Self::Css => format!(r#"<link rel="stylesheet" href="{target}">"#),
            Self::Js => format!(r#"<script src="{target}"></script>"#),
        }
    }
}

/// One concatenated output asset extracted from a markup file.
#[derive(Debug)]
pub struct Asset {
    pub kind: AssetKind,
    /// Output path relative to the destination tree.
    pub target: Utf8PathBuf,
    /// Concatenation of the referenced sources in listed order, unminified.
    pub content: String,
}

/// Process every top-level markup file: write rewritten markup and the
/// minified concatenated assets into the destination tree.
pub fn build(
    paths: &Paths,
    css: &dyn Minify,
    js: &dyn Minify,
) -> Result<(), UserefError> {
    let pattern = paths.app.join("*.html");

    for entry in glob::glob(pattern.as_str())? {
        let markup = Utf8PathBuf::try_from(entry?)?;
        let source = fs::read_to_string(&markup)?;

        let (rewritten, assets) = rewrite(&source, &markup, &paths.app)?;

        for asset in assets {
            let minified = match asset.kind {
                AssetKind::Css => css.minify(&asset.content),
                AssetKind::Js => js.minify(&asset.content),
            };

            let out = paths.dist.join(&asset.target);
            if let Some(dir) = out.parent() {
                fs::create_dir_all(dir)?;
            }
            fs::write(&out, minified)?;
        }

        let name = markup.file_name().expect("glob yields files");
        fs::create_dir_all(&paths.dist)?;
        fs::write(paths.dist.join(name), rewritten)?;

        tracing::debug!("processed markup {}", markup);
    }

    Ok(())
}

/// Rewrite the build blocks of one markup file, returning the new markup
/// and the concatenated (not yet minified) assets. References are resolved
/// relative to `base`; a missing reference halts this file.
pub fn rewrite(
    source: &str,
    markup: &Utf8Path,
    base: &Utf8Path,
) -> Result<(String, Vec<Asset>), UserefError> {
    let mut out = String::with_capacity(source.len());
    let mut assets = Vec::new();

    let mut lines = source.lines().enumerate();

    while let Some((number, line)) = lines.next() {
        let Some(open) = line.find(BLOCK_OPEN) else {
            out.push_str(line);
            out.push('\n');
            continue;
        };

        let indent = &line[..open];
        let (kind, target) = parse_header(line, markup, number + 1)?;

        // Collect the block body up to the closing comment.
        let mut body = Vec::new();
        let mut closing = None;
        for (_, inner) in lines.by_ref() {
            if inner.contains(BLOCK_CLOSE) {
                closing = Some(inner);
                break;
            }
            body.push(inner);
        }
        let Some(closing) = closing else {
            return Err(UserefError::UnterminatedBlock {
                markup: markup.to_path_buf(),
                line: number + 1,
            });
        };

        let refs: Vec<&str> = body.iter().flat_map(|line| references(line)).collect();

        if refs.is_empty() {
            // Nothing to concatenate: the block stays as written.
            out.push_str(line);
            out.push('\n');
            for inner in &body {
                out.push_str(inner);
                out.push('\n');
            }
            out.push_str(closing);
            out.push('\n');
            continue;
        }

        let mut content = String::new();
        for reference in refs {
            let path = base.join(reference);
            if !path.exists() {
                return Err(UserefError::MissingAsset {
                    markup: markup.to_path_buf(),
                    asset: path,
                });
            }
            content.push_str(&fs::read_to_string(&path)?);
        }

        out.push_str(indent);
        out.push_str(&kind.tag(target.as_str()));
        out.push('\n');

        assets.push(Asset {
            kind,
            target,
            content,
        });
    }

    Ok((out, assets))
}

/// Parse `<!-- build:<kind> <target> -->`.
fn parse_header(
    line: &str,
    markup: &Utf8Path,
    number: usize,
) -> Result<(AssetKind, Utf8PathBuf), UserefError> {
    let bad = || UserefError::BadBlock {
        markup: markup.to_path_buf(),
        line: number,
        header: line.trim().to_string(),
    };

    let rest = &line[line.find(BLOCK_OPEN).unwrap() + BLOCK_OPEN.len()..];
    let rest = rest.strip_suffix("-->").ok_or_else(bad)?.trim();

    let mut parts = rest.split_whitespace();
    let kind = parts
        .next()
        .and_then(AssetKind::parse)
        .ok_or_else(bad)?;
    let target = parts.next().ok_or_else(bad)?;
    if parts.next().is_some() {
        return Err(bad());
    }

    Ok((kind, Utf8PathBuf::from(target)))
}

/// Extract `href`/`src` attribute values from one line, left to right.
fn references(line: &str) -> Vec<&str> {
    let mut refs = Vec::new();
    let mut rest = line;

    while let Some((at, attr)) = next_attribute(rest) {
        let start = at + attr.len();
        let Some(len) = rest[start..].find('"') else {
            break;
        };
        refs.push(&rest[start..start + len]);
        rest = &rest[start + len + 1..];
    }

    refs
}

/// Earliest `href="`/`src="` occurrence that sits on a tag or attribute
/// boundary, so `data-href="..."` never matches.
fn next_attribute(rest: &str) -> Option<(usize, &'static str)> {
    ["href=\"", "src=\""]
        .into_iter()
        .flat_map(|attr| {
            rest.match_indices(attr)
                .map(move |(at, _)| (at, attr))
                .find(|&(at, _)| {
                    at == 0 || rest[..at].ends_with(|c: char| c.is_whitespace() || c == '<')
                })
        })
        .min_by_key(|&(at, _)| at)
}

#[cfg(test)]
mod tests {
    use crate::minify::{CssMinifier, Minify, NoopMinifier};

    use super::*;

    fn app(dir: &tempfile::TempDir) -> Utf8PathBuf {
        let app = Utf8PathBuf::try_from(dir.path().join("app")).unwrap();
        fs::create_dir_all(app.join("js")).unwrap();
        fs::create_dir_all(app.join("css")).unwrap();
        app
    }

    #[test]
    fn concatenates_in_listed_order() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir);

        fs::write(app.join("js/a.js"), "var a = 1;\n").unwrap();
        fs::write(app.join("js/b.js"), "var b = 2;\n").unwrap();
        fs::write(app.join("js/c.js"), "var c = 3;\n").unwrap();

        let markup = "\
<!-- build:js js/app.min.js -->
<script src=\"js/a.js\"></script>
<script src=\"js/b.js\"></script>
<script src=\"js/c.js\"></script>
<!-- endbuild -->
";

        let (out, assets) =
            rewrite(markup, Utf8Path::new("index.html"), &app).unwrap();

        assert_eq!(assets.len(), 1);
        assert_eq!(assets[0].kind, AssetKind::Js);
        assert_eq!(assets[0].target, Utf8PathBuf::from("js/app.min.js"));
        // Byte-for-byte equal to concat(a, b, c); a no-op minifier would
        // write exactly these bytes.
        assert_eq!(assets[0].content, "var a = 1;\nvar b = 2;\nvar c = 3;\n");
        assert_eq!(
            NoopMinifier.minify(&assets[0].content),
            "var a = 1;\nvar b = 2;\nvar c = 3;\n"
        );
        assert_eq!(out, "<script src=\"js/app.min.js\"></script>\n");
    }

    #[test]
    fn css_block_rewrites_to_link_tag() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir);

        fs::write(app.join("css/main.css"), "body { color: red; }\n").unwrap();

        let markup = "  <!-- build:css css/main.min.css -->
  <link rel=\"stylesheet\" href=\"css/main.css\">
  <!-- endbuild -->
";

        let (out, assets) =
            rewrite(markup, Utf8Path::new("index.html"), &app).unwrap();

        assert_eq!(assets[0].kind, AssetKind::Css);
        assert_eq!(
            out,
            "  <link rel=\"stylesheet\" href=\"css/main.min.css\">\n"
        );
        assert_eq!(CssMinifier.minify(&assets[0].content), "body{color:red}");
    }

    #[test]
    fn empty_block_is_left_unchanged_and_emits_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir);

        let markup = "\
<!-- build:js js/app.min.js -->
<!-- some note -->
<!-- endbuild -->
";

        let (out, assets) =
            rewrite(markup, Utf8Path::new("index.html"), &app).unwrap();

        assert!(assets.is_empty());
        assert_eq!(out, markup);
    }

    #[test]
    fn references_scan_left_to_right_and_skip_data_attributes() {
        let line = r#"<script src="js/a.js"></script><link data-href="nope.css" href="css/b.css">"#;
        assert_eq!(references(line), vec!["js/a.js", "css/b.css"]);
    }

    #[test]
    fn refs_sharing_a_line_keep_listed_order() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir);

        fs::write(app.join("js/a.js"), "var a = 1;\n").unwrap();
        fs::write(app.join("js/b.js"), "var b = 2;\n").unwrap();

        let markup = "\
<!-- build:js js/app.min.js -->
<script src=\"js/a.js\"></script><script src=\"js/b.js\"></script>
<!-- endbuild -->
";

        let (_, assets) = rewrite(markup, Utf8Path::new("index.html"), &app).unwrap();
        assert_eq!(assets[0].content, "var a = 1;\nvar b = 2;\n");
    }

    #[test]
    fn empty_block_keeps_its_own_closing_line() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir);

        // Closing line indented differently from the opener.
        let markup = "<!-- build:js js/app.min.js -->\n<!-- some note -->\n    <!-- endbuild -->\n";

        let (out, assets) = rewrite(markup, Utf8Path::new("index.html"), &app).unwrap();
        assert!(assets.is_empty());
        assert_eq!(out, markup);
    }

    #[test]
    fn missing_reference_halts_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir);

        let markup = "\
<!-- build:js js/app.min.js -->
<script src=\"js/ghost.js\"></script>
<!-- endbuild -->
";

        let err = rewrite(markup, Utf8Path::new("index.html"), &app).unwrap_err();
        assert!(matches!(err, UserefError::MissingAsset { .. }));
        assert!(err.to_string().contains("ghost.js"));
    }

    #[test]
    fn unterminated_block_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir);

        let markup = "<!-- build:js js/app.min.js -->\n<script src=\"js/a.js\"></script>\n";
        let err = rewrite(markup, Utf8Path::new("index.html"), &app).unwrap_err();
        assert!(matches!(err, UserefError::UnterminatedBlock { line: 1, .. }));
    }

    #[test]
    fn unknown_kind_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir);

        let markup = "<!-- build:wasm js/app.wasm -->\n<!-- endbuild -->\n";
        let err = rewrite(markup, Utf8Path::new("index.html"), &app).unwrap_err();
        assert!(matches!(err, UserefError::BadBlock { .. }));
    }

    #[test]
    fn markup_outside_blocks_passes_through() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir);

        let markup = "<!doctype html>\n<title>x</title>\n";
        let (out, assets) =
            rewrite(markup, Utf8Path::new("index.html"), &app).unwrap();

        assert!(assets.is_empty());
        assert_eq!(out, markup);
    }
}
