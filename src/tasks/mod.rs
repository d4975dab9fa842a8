//! The stylesheet tasks and the graph that chains them.

mod compile;
pub mod lint;
mod minify;
pub(crate) mod prefix;
mod sourcemap;

use crate::engine::Blueprint;

/// Compiles, prefixes and writes the expanded stylesheet with its sourcemap.
pub const COMPILE: &str = "postcss";
/// Minifies the expanded stylesheet into its renamed sibling.
pub const MINIFY: &str = "css:minify";
/// Lints the Sass sources.
pub const LINT: &str = "sass:lint";
/// Public entry point for the whole chain.
pub const STYLES: &str = "styles";
/// Rebuilds `styles` on change. Not a graph node, the pipeline drives it.
pub const WATCH: &str = "watch";

/// The standard chain: `postcss` -> `css:minify` -> `sass:lint` -> `styles`.
pub fn blueprint() -> Blueprint {
    let mut blueprint = Blueprint::new();

    blueprint.task(COMPILE).run(compile::compile);
    blueprint.task(MINIFY).after([COMPILE]).run(minify::minify);
    blueprint.task(LINT).after([MINIFY]).run(lint::lint);
    blueprint.task(STYLES).after([LINT]).group();

    blueprint
}
