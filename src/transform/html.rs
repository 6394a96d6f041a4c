use std::fs;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::TaskError;
use crate::io::write_file;
use crate::task::{Mode, Selector, Task, TaskContext, TaskResult};

/// Elements whose content is whitespace-sensitive.
static RAW: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<pre\b.*?</pre\s*>|<textarea\b.*?</textarea\s*>|<script\b.*?</script\s*>|<style\b.*?</style\s*>")
        .expect("Error compiling raw element regex")
});

/// Tags whose surrounding whitespace never renders.
static BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?i)\s*(</?(?:!doctype|address|article|aside|base|blockquote|body|br|dd|details|dialog|div|dl|dt|",
        r"fieldset|figcaption|figure|footer|form|h[1-6]|head|header|hgroup|hr|html|li|link|main|meta|nav|",
        r"noscript|ol|option|p|picture|section|source|summary|table|tbody|td|tfoot|th|thead|title|tr|ul)\b[^>]*>)\s*",
    ))
    .expect("Error compiling block tag regex")
});

static SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("Error compiling whitespace regex"));

static BODY_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</body\s*>").expect("Error compiling body regex"));

/// Collapses whitespace outside of `pre`, `textarea`, `script` and `style`.
pub fn minify_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut last = 0;
    let mut after_block = false;

    for raw in RAW.find_iter(input) {
        // Only a textarea renders inline.
        let block = !raw
            .as_str()
            .get(1..9)
            .is_some_and(|tag| tag.eq_ignore_ascii_case("textarea"));

        let text = collapse(&input[last..raw.start()]);
        let text = if after_block { text.trim_start() } else { text.as_str() };
        out.push_str(if block { text.trim_end() } else { text });
        out.push_str(raw.as_str());

        after_block = block;
        last = raw.end();
    }

    let text = collapse(&input[last..]);
    out.push_str(if after_block { text.trim_start() } else { text.as_str() });

    out.trim().to_string()
}

/// Runs of whitespace become one space, which is then dropped next to block
/// level tags. Between inline elements the space stays.
fn collapse(text: &str) -> String {
    let text = SPACE.replace_all(text, " ");
    BLOCK.replace_all(&text, "${1}").into_owned()
}

fn client_script(port: u16) -> String {
    format!(
        r#"<script>(()=>{{const s=new WebSocket("ws://"+location.hostname+":{port}");s.onmessage=e=>{{const m=JSON.parse(e.data);if(m.kind==="css"){{for(const l of document.querySelectorAll('link[rel="stylesheet"]')){{const u=new URL(l.href);if(u.pathname===m.path){{u.searchParams.set("v",Date.now());l.href=u.href}}}}}}else location.reload()}}}})();</script>"#
    )
}

/// Injects the live-reload client before `</body>`, or at the end when the
/// document has no body end tag.
fn inject_client(html: &str, port: u16) -> String {
    let script = client_script(port);

    match BODY_END.find(html) {
        Some(end) => format!("{}{}{}", &html[..end.start()], script, &html[end.start()..]),
        None => format!("{html}{script}"),
    }
}

/// Minifies top-level markup pages. In dev mode the pages also get the
/// live-reload client.
pub struct Html;

impl Task for Html {
    fn name(&self) -> &str {
        "html"
    }

    fn execute(&self, ctx: &TaskContext) -> TaskResult {
        let sources = Selector::new(["*.html"])?.resolve(&ctx.config.source)?;
        let mut pages = Vec::with_capacity(sources.len());

        for source in sources {
            let text = fs::read_to_string(&source.path).map_err(|e| match e.kind() {
                std::io::ErrorKind::InvalidData => TaskError::transform(&source.path, "not valid UTF-8"),
                _ => TaskError::io(&source.path, e),
            })?;

            let mut html = minify_html(&text);
            if ctx.mode == Mode::Dev {
                html = inject_client(&html, ctx.config.reload_port);
            }

            pages.push((ctx.config.output_path(&source.rel), html));
        }

        let mut written = Vec::with_capacity(pages.len());
        for (path, html) in pages {
            write_file(&path, html)?;
            written.push(path);
        }

        Ok(written)
    }
}
