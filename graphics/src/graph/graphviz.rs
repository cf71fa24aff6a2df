//! Graphviz export of a frame graph.
//!
//! Passes are boxes named `P<id>`, resources are ellipses named `R<index>`.
//! Surviving passes are green and culled ones grey, cull-immune passes get a
//! bold border. Transient resources are skyblue, retained ones orange, and
//! culled resources are dashed. Edges go from a pass to every resource it
//! creates (labeled `create`) or writes, and from a resource to every pass
//! reading it.

use std::fmt;

use super::cull::CullResult;
use super::pass::PassRegistry;
use super::resource::ResourceRegistry;

/// DOT rendering of a culled frame graph.
pub struct Graphviz<'a> {
    passes: &'a PassRegistry,
    resources: &'a ResourceRegistry,
    cull: &'a CullResult,
}

impl<'a> Graphviz<'a> {
    pub fn new(
        passes: &'a PassRegistry,
        resources: &'a ResourceRegistry,
        cull: &'a CullResult,
    ) -> Self {
        Self {
            passes,
            resources,
            cull,
        }
    }
}

impl fmt::Display for Graphviz<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "digraph FrameGraph {{")?;
        writeln!(f, "  rankdir=LR;")?;

        for pass in self.passes.iter() {
            let color = if self.cull.is_pass_culled(pass.id()) {
                "grey"
            } else {
                "green"
            };
            let style = if pass.is_cull_immune() {
                "filled,bold"
            } else {
                "filled"
            };
            writeln!(
                f,
                "  {} [label=\"{}\", shape=box, style=\"{}\", fillcolor={}];",
                pass.id(),
                escape(pass.name()),
                style,
                color
            )?;
        }

        for (handle, resource) in self.resources.iter() {
            let color = if resource.is_transient() {
                "skyblue"
            } else {
                "orange"
            };
            let style = if self.cull.is_resource_culled(handle) {
                "filled,dashed"
            } else {
                "filled"
            };
            writeln!(
                f,
                "  R{} [label=\"{}\", shape=ellipse, style=\"{}\", fillcolor={}];",
                handle.index(),
                escape(resource.name()),
                style,
                color
            )?;
        }

        for pass in self.passes.iter() {
            for handle in pass.writes() {
                if pass.creates_resource(*handle) {
                    writeln!(f, "  {} -> R{} [label=\"create\"];", pass.id(), handle.index())?;
                } else {
                    writeln!(f, "  {} -> R{};", pass.id(), handle.index())?;
                }
            }
            for handle in pass.reads() {
                writeln!(f, "  R{} -> {};", handle.index(), pass.id())?;
            }
        }

        writeln!(f, "}}")
    }
}

fn escape(name: &str) -> String {
    name.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape() {
        assert_eq!(escape(r#"a "b" \c"#), r#"a \"b\" \\c"#);
    }
}
