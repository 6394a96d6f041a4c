use std::fs;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::TaskError;
use crate::io::write_file;
use crate::task::{Selector, Source, Task, TaskContext, TaskResult};

/// Output path of the icon stack, relative to the output root.
pub const SPRITE: &str = "img/icons/stack.svg";

static PROLOG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<\?xml.*?\?>|<!DOCTYPE[^>]*>|<!--.*?-->").expect("Error compiling prolog regex")
});

static ROOT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^\s*<svg\b([^>]*)>(.*)</svg>\s*$").expect("Error compiling svg regex")
});

/// Attributes that the stack sets itself.
static DROPPED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\s(?:id|xmlns)\s*=\s*("[^"]*"|'[^']*')"#).expect("Error compiling attribute regex")
});

/// Icon id derived from the path below `img/`: `icons/arrow.svg` becomes
/// `icons-arrow`.
fn icon_id(source: &Source) -> String {
    let rel = source.rel.with_extension("");
    rel.components()
        .map(|c| c.as_str())
        .collect::<Vec<_>>()
        .join("-")
}

/// Nests every icon in one `<svg>` document. Each icon stays addressable by
/// fragment, e.g. `stack.svg#icons-arrow`.
pub fn stack_svgs<'a, I>(icons: I) -> Result<String, TaskError>
where
    I: IntoIterator<Item = (&'a Source, &'a str)>,
{
    let mut out = String::from(
        r#"<svg xmlns="http://www.w3.org/2000/svg"><style>:root svg:not(:target){display:none}</style>"#,
    );

    for (source, text) in icons {
        let text = PROLOG.replace_all(text, "");
        let caps = ROOT
            .captures(&text)
            .ok_or_else(|| TaskError::transform(&source.path, "no <svg> root element"))?;

        let attrs = DROPPED.replace_all(&caps[1], "");
        out.push_str(&format!(
            r#"<svg id="{}"{}>{}</svg>"#,
            icon_id(source),
            attrs.trim_end(),
            caps[2].trim()
        ));
    }

    out.push_str("</svg>");
    Ok(out)
}

/// Assembles every SVG below `img/` into a single icon stack.
pub struct Sprite;

impl Task for Sprite {
    fn name(&self) -> &str {
        "sprite"
    }

    fn execute(&self, ctx: &TaskContext) -> TaskResult {
        let sources = Selector::new(["img/**/*.svg"])?
            .base("img")
            .resolve(&ctx.config.source)?;

        if sources.is_empty() {
            return Ok(vec![]);
        }

        let texts = sources
            .iter()
            .map(|s| fs::read_to_string(&s.path).map_err(|e| TaskError::io(&s.path, e)))
            .collect::<Result<Vec<_>, _>>()?;

        let stack = stack_svgs(sources.iter().zip(texts.iter().map(String::as_str)))?;

        let path = ctx.config.output_path(SPRITE);
        write_file(&path, stack)?;

        Ok(vec![path])
    }
}

#[cfg(test)]
mod tests {
    use camino::Utf8PathBuf;

    use super::*;
    use crate::Config;
    use crate::task::Mode;

    fn source(rel: &str) -> Source {
        Source {
            path: Utf8PathBuf::from("source/img").join(rel),
            rel: rel.into(),
        }
    }

    #[test]
    fn test_stack_nests_icons() {
        let arrow = source("icons/arrow.svg");
        let logo = source("logo.svg");
        let icons = [
            (
                &arrow,
                r#"<?xml version="1.0"?><svg xmlns="http://www.w3.org/2000/svg" id="old" viewBox="0 0 8 8"><path d="M0 0h8"/></svg>"#,
            ),
            (&logo, "<!-- logo -->\n<svg viewBox='0 0 4 4'>\n  <circle r='2'/>\n</svg>\n"),
        ];

        let stack = stack_svgs(icons.iter().map(|(s, t)| (*s, *t))).unwrap();

        assert!(stack.starts_with(r#"<svg xmlns="http://www.w3.org/2000/svg"><style>"#));
        assert!(stack.contains(r#"<svg id="icons-arrow" viewBox="0 0 8 8"><path d="M0 0h8"/></svg>"#), "{stack}");
        assert!(stack.contains(r#"<svg id="logo" viewBox='0 0 4 4'><circle r='2'/></svg>"#), "{stack}");
        assert!(!stack.contains("old"));
        assert!(stack.ends_with("</svg></svg>"));
    }

    #[test]
    fn test_not_an_svg() {
        let bad = source("bad.svg");
        let err = stack_svgs([(&bad, "<html></html>")]).unwrap_err();
        assert!(err.to_string().contains("bad.svg"));
    }

    #[test]
    fn test_no_icons_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        let config = Config {
            source: root.join("source"),
            output: root.join("build"),
            ..Config::default()
        };
        let ctx = TaskContext {
            config: &config,
            mode: Mode::Build,
        };

        assert!(Sprite.execute(&ctx).unwrap().is_empty());
        assert!(!config.output_path(SPRITE).exists());
    }
}
