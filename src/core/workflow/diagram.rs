use crate::core::workflow::context::Context;
use crate::core::workflow::span::Span;
use petgraph::dot::Dot;
use petgraph::graph::DiGraph;
use std::fmt;

/// Node weight carrying span display information.
struct SpanNode {
    name: String,
    status: &'static str,
}

impl fmt::Display for SpanNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\\n{}", self.name, self.status)
    }
}

struct EdgeData;

impl fmt::Display for EdgeData {
    fn fmt(&self, _f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Ok(())
    }
}

fn build_trace_graph(spans: &[Span]) -> DiGraph<SpanNode, EdgeData> {
    let mut graph = DiGraph::new();
    let mut previous = None;
    for span in spans {
        let node = graph.add_node(SpanNode {
            name: escape_label(&truncate(&span.name, 60)),
            status: span.status.as_str(),
        });
        if let Some(prev) = previous {
            graph.add_edge(prev, node, EdgeData);
        }
        previous = Some(node);
    }
    graph
}

/// Render the execution trace as a Graphviz DOT string: one node per span
/// in execution order, edges between consecutive spans. This is a visual
/// trace, deliberately linear even when the run had parallel branches.
pub fn trace_to_dot(ctx: &Context) -> String {
    let graph = build_trace_graph(&ctx.spans);
    format!("{}", Dot::new(&graph))
}

/// Render the same linear trace as a Mermaid flowchart.
pub fn trace_to_mermaid(ctx: &Context) -> String {
    let mut out = String::from("flowchart TD\n");
    for (index, span) in ctx.spans.iter().enumerate() {
        let label = truncate(&span.name, 60).replace(['[', ']'], "_");
        out.push_str(&format!("    n{}[\"{} ({})\"]\n", index, label, span.status));
    }
    for index in 1..ctx.spans.len() {
        out.push_str(&format!("    n{} --> n{}\n", index - 1, index));
    }
    out
}

fn truncate(value: &str, limit: usize) -> String {
    if value.len() <= limit {
        return value.to_string();
    }
    // Span names carry caller-supplied task ids, so the cut must land on
    // a char boundary.
    let mut cut = limit;
    while !value.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &value[..cut])
}

fn escape_label(value: &str) -> String {
    value.replace('\"', "\\\"")
}
