//! Style compilation stage: SCSS entry point to prefixed CSS.

use std::fs;
use std::time::Instant;

use crate::Paths;
use crate::error::StyleError;
use crate::prefix;

/// Compile the stylesheet entry point, apply the vendor-prefix pass and
/// write the result next to the sources so the dev server can pick it up.
///
/// A syntax error anywhere, the entry point or an imported partial, fails
/// the stage before anything is written; there is never a partial output
/// file. The compiler's error already points at the offending file and line.
pub fn build(paths: &Paths) -> Result<(), StyleError> {
    let s = Instant::now();

    let entry = &paths.style_entry;
    if !entry.exists() {
        return Err(StyleError::MissingEntry(entry.clone()));
    }

    let compiled = grass::from_path(entry, &grass::Options::default())?;
    let prefixed = prefix::apply(&compiled);

    let out = paths
        .css
        .join(entry.file_stem().unwrap_or("main"))
        .with_extension("css");

    fs::create_dir_all(&paths.css)?;
    fs::write(&out, prefixed)?;

    tracing::info!("compiled {} -> {} {}", entry, out, crate::as_overhead(s));

    Ok(())
}

#[cfg(test)]
mod tests {
    use camino::Utf8PathBuf;

    use super::*;

    fn fixture(dir: &tempfile::TempDir) -> Paths {
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        let paths = Paths::new(root);
        fs::create_dir_all(&paths.styles).unwrap();
        paths
    }

    #[test]
    fn compiles_entry_with_partials() {
        let dir = tempfile::tempdir().unwrap();
        let paths = fixture(&dir);

        fs::write(paths.styles.join("_vars.scss"), "$accent: #ff0000;\n").unwrap();
        fs::write(
            &paths.style_entry,
            "@use 'vars';\nbody {\n  color: vars.$accent;\n  user-select: none;\n}\n",
        )
        .unwrap();

        build(&paths).unwrap();

        let css = fs::read_to_string(paths.css.join("main.css")).unwrap();
        assert!(!css.contains('$'), "preprocessor syntax left in output");
        assert!(css.contains("color: #ff0000") || css.contains("color: red"));
        assert!(css.contains("-webkit-user-select: none"));
    }

    #[test]
    fn partial_error_writes_nothing_and_names_the_partial() {
        let dir = tempfile::tempdir().unwrap();
        let paths = fixture(&dir);

        fs::write(paths.styles.join("_vars.scss"), "$accent red;\n").unwrap();
        fs::write(&paths.style_entry, "@use 'vars';\nbody { color: blue; }\n").unwrap();

        let err = build(&paths).unwrap_err();
        assert!(matches!(err, StyleError::Compile(_)));
        assert!(err.to_string().contains("_vars"), "error: {err}");
        assert!(!paths.css.join("main.css").exists());
    }

    #[test]
    fn missing_entry_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let paths = fixture(&dir);

        let err = build(&paths).unwrap_err();
        assert!(matches!(err, StyleError::MissingEntry(_)));
    }
}
