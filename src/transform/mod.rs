//! Leaf tasks of the asset pipeline. Each one resolves its own input
//! selector below the source root and writes below the output root.

mod clean;
mod copy;
mod html;
mod images;
mod script;
mod sprite;
mod styles;

pub use crate::transform::clean::Clean;
pub use crate::transform::copy::CopyFiles;
pub use crate::transform::html::{Html, minify_html};
pub use crate::transform::images::{OptimizeImages, Webp, image_selector};
pub use crate::transform::script::Script;
pub use crate::transform::sprite::{SPRITE, Sprite, stack_svgs};
pub use crate::transform::styles::{STYLESHEET, Styles};
