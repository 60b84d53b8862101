//! DOT-language export of the wired graph topology.
//!
//! Used for debugging: `dot -Tsvg` renders the producer/consumer
//! structure with one node per algorithm and one edge per product flow.

use crate::graph::{Producer, WiredGraph};
use std::fmt::Write as _;

/// Attributes attached to a DOT node or edge.
#[derive(Debug, Clone, Default)]
pub struct Attributes {
    /// Outline color.
    pub color: String,
    /// Label color.
    pub fontcolor: String,
    /// Label size.
    pub fontsize: String,
    /// Display label.
    pub label: String,
    /// Node shape.
    pub shape: String,
    /// Drawing style.
    pub style: String,
}

fn maybe_comma(result: &str) -> &'static str {
    if result.is_empty() {
        ""
    } else {
        ", "
    }
}

/// Render attributes as a comma-separated list wrapped in `[ ... ]`.
#[must_use]
pub fn to_string(attrs: &Attributes) -> String {
    let mut result = String::new();
    if !attrs.color.is_empty() {
        result += &format!("color={}", attrs.color);
    }
    if !attrs.fontcolor.is_empty() {
        result = format!("{result}{}fontcolor={}", maybe_comma(&result), attrs.fontcolor);
    }
    if !attrs.fontsize.is_empty() {
        result = format!("{result}{}fontsize={}", maybe_comma(&result), attrs.fontsize);
    }
    if !attrs.label.is_empty() {
        result = format!("{result}{}label=\" {}\"", maybe_comma(&result), attrs.label);
    }
    if !attrs.shape.is_empty() {
        result = format!("{result}{}shape={}", maybe_comma(&result), attrs.shape);
    }
    if !attrs.style.is_empty() {
        result = format!("{result}{}style={}", maybe_comma(&result), attrs.style);
    }
    format!("[{result}]")
}

/// Wrap a name in parentheses, as used for implicit graph endpoints.
#[must_use]
pub fn parenthesized(name: &str) -> String {
    format!("({name})")
}

impl WiredGraph {
    /// Emit a DOT representation of the graph topology.
    #[must_use]
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph phlex {\n");

        if let Some(source) = &self.source {
            let attrs = Attributes {
                color: "blue".to_string(),
                label: source.name.clone(),
                shape: "ellipse".to_string(),
                ..Attributes::default()
            };
            let _ = writeln!(out, "  \"{}\" {};", source.name, to_string(&attrs));
        }
        if !self.base.products().is_empty() {
            let attrs = Attributes {
                label: parenthesized("driver"),
                shape: "ellipse".to_string(),
                style: "dashed".to_string(),
                ..Attributes::default()
            };
            let _ = writeln!(out, "  \"driver\" {};", to_string(&attrs));
        }

        for node in self.nodes() {
            let shape = match node.kind() {
                "transform" => "box",
                "reduce" => "hexagon",
                "observe" => "ellipse",
                "output" => "cylinder",
                _ => "box",
            };
            let attrs = Attributes {
                label: node.name().to_string(),
                shape: shape.to_string(),
                ..Attributes::default()
            };
            let _ = writeln!(out, "  \"{}\" {};", node.name(), to_string(&attrs));
        }

        for node in self.nodes() {
            for label in node.inputs() {
                let Some(producer) = self.producers.get(&label.name) else {
                    continue;
                };
                let from = match producer {
                    Producer::Driver => "driver".to_string(),
                    Producer::Source => self
                        .source
                        .as_ref()
                        .map_or_else(|| "driver".to_string(), |s| s.name.clone()),
                    Producer::Node(idx) => self.nodes[*idx].name().to_string(),
                };
                let attrs = Attributes {
                    label: label.name.clone(),
                    ..Attributes::default()
                };
                let _ = writeln!(
                    out,
                    "  \"{}\" -> \"{}\" {};",
                    from,
                    node.name(),
                    to_string(&attrs)
                );
            }
        }

        out.push_str("}\n");
        out
    }
}
