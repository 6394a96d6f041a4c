//! The two entry graphs of the asset pipeline.
//!
//! ```text
//! build = clean > copy > images:optimize > assets
//! dev   = clean > copy > images:copy > assets > serve(server > watch)
//!
//! assets = parallel(styles, html, script, sprite, webp)
//! ```

use crate::dev::{DevSession, WatchBinding};
use crate::engine::Runner;
use crate::error::ScheduleError;
use crate::graph::{Node, serial};
use crate::task::Selector;
use crate::transform::{
    Clean, CopyFiles, Html, OptimizeImages, Script, Sprite, Styles, Webp, image_selector,
};
use crate::{Blueprint, Registry};

/// Fonts and favicons, copied as they are.
fn copy_static() -> Result<CopyFiles, ScheduleError> {
    let selector = Selector::new(["fonts/**/*.woff2", "fonts/**/*.woff", "*.ico"])?;
    Ok(CopyFiles::new("copy", selector, ""))
}

fn common() -> Result<Blueprint, ScheduleError> {
    let mut blueprint = Blueprint::new();

    blueprint
        .add_task(Clean)?
        .add_task(copy_static()?)?
        .add_task(Styles)?
        .add_task(Html)?
        .add_task(Script)?
        .add_task(Sprite)?
        .add_task(Webp)?
        .parallel("assets", &["styles", "html", "script", "sprite", "webp"])?;

    Ok(blueprint)
}

pub fn build_registry() -> Result<Registry, ScheduleError> {
    let mut blueprint = common()?;

    blueprint
        .add_task(OptimizeImages)?
        .series("build", &["clean", "copy", "images:optimize", "assets"])?;

    blueprint.finish()
}

/// One-shot production build.
pub fn build() -> Result<Node, ScheduleError> {
    build_registry()?.get("build")
}

/// File patterns watched in dev mode and what each one re-runs.
pub fn bindings(session: &DevSession) -> Vec<WatchBinding> {
    vec![
        WatchBinding {
            name: "styles",
            globs: vec!["sass/**/*.scss"],
            node: serial([Node::leaf(Styles), session.inject()]).named("watch:styles"),
        },
        WatchBinding {
            name: "script",
            globs: vec!["js/script.js"],
            node: serial([Node::leaf(Script)]).named("watch:script"),
        },
        WatchBinding {
            name: "html",
            globs: vec!["*.html"],
            node: serial([Node::leaf(Html), session.reload()]).named("watch:html"),
        },
    ]
}

pub fn dev_registry(session: &DevSession, runner: &Runner) -> Result<Registry, ScheduleError> {
    let mut blueprint = common()?;

    blueprint
        .add_task(CopyFiles::new("images:copy", image_selector()?, "img"))?
        .add_node("server", session.server())?
        .add_node("watch", session.watcher(runner.clone(), bindings(session)))?
        .series("serve", &["server", "watch"])?
        .series("dev", &["clean", "copy", "images:copy", "assets", "serve"])?;

    blueprint.finish()
}

/// Development graph: builds once, then serves and watches.
pub fn dev(session: &DevSession, runner: &Runner) -> Result<Node, ScheduleError> {
    dev_registry(session, runner)?.get("dev")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::Config;
    use crate::task::Mode;

    #[test]
    fn test_build_shape() {
        assert_eq!(
            build().unwrap().to_string(),
            "build:serial(clean, copy, images:optimize, assets:parallel(styles, html, script, sprite, webp))"
        );
    }

    #[test]
    fn test_dev_shape() {
        let session = DevSession::new();
        let runner = Runner::new(Arc::new(Config::default()), Mode::Dev);

        assert_eq!(
            dev(&session, &runner).unwrap().to_string(),
            "dev:serial(clean, copy, images:copy, assets:parallel(styles, html, script, sprite, webp), serve:serial(server, watch))"
        );
    }

    #[test]
    fn test_bindings() {
        let session = DevSession::new();
        let shapes: Vec<_> = bindings(&session)
            .iter()
            .map(|b| (b.name, b.node.to_string()))
            .collect();

        assert_eq!(
            shapes,
            vec![
                ("styles", "watch:styles:serial(styles, inject)".to_string()),
                ("script", "watch:script:serial(script)".to_string()),
                ("html", "watch:html:serial(html, reload)".to_string()),
            ]
        );
    }
}
