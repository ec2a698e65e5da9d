use std::collections::HashMap;

use extract::{MalformedTriple, Triple};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;

/// Directed multigraph of entities, edges labelled with the predicate.
///
/// Nodes and edges keep insertion order, so building twice from the same
/// candidates yields equal graphs.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeGraph {
    graph: DiGraph<String, String>,
    entity_to_idx: HashMap<String, NodeIndex>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EdgeView<'a> {
    pub source: &'a str,
    pub target: &'a str,
    pub label: &'a str,
}

impl KnowledgeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Node for `name`, created on first reference. Names match by exact string equality.
    pub fn add_entity(&mut self, name: &str) -> NodeIndex {
        if let Some(&idx) = self.entity_to_idx.get(name) {
            return idx;
        }

        let idx = self.graph.add_node(name.to_string());
        self.entity_to_idx.insert(name.to_string(), idx);
        idx
    }

    /// Always adds a new edge; repeated triples become parallel edges.
    pub fn add_triple(&mut self, triple: &Triple) {
        let source = self.add_entity(&triple.subject);
        let target = self.add_entity(&triple.object);
        self.graph.add_edge(source, target, triple.predicate.clone());
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn contains_node(&self, name: &str) -> bool {
        self.entity_to_idx.contains_key(name)
    }

    pub fn node_index(&self, name: &str) -> Option<NodeIndex> {
        self.entity_to_idx.get(name).copied()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &str> + '_ {
        self.graph.node_indices().map(|idx| self.graph[idx].as_str())
    }

    pub fn edges(&self) -> impl Iterator<Item = EdgeView<'_>> + '_ {
        self.graph.edge_references().map(|edge| EdgeView {
            source: &self.graph[edge.source()],
            target: &self.graph[edge.target()],
            label: edge.weight(),
        })
    }

    /// Edges as node positions in insertion order: `(source, target, label)`.
    pub fn indexed_edges(&self) -> impl Iterator<Item = (usize, usize, &str)> + '_ {
        self.graph
            .edge_references()
            .map(|edge| (edge.source().index(), edge.target().index(), edge.weight().as_str()))
    }
}

impl PartialEq for KnowledgeGraph {
    fn eq(&self, other: &Self) -> bool {
        self.nodes().eq(other.nodes()) && self.edges().eq(other.edges())
    }
}

impl Eq for KnowledgeGraph {}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    pub graph: KnowledgeGraph,
    /// One entry per rejected candidate, in input order.
    pub skipped: Vec<MalformedTriple>,
}

/// Build a graph from candidate triple strings.
///
/// Each candidate that does not read as exactly three non-empty comma-separated
/// fields is skipped with one warning; building never fails.
pub fn build_report<I, S>(candidates: I) -> BuildReport
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut report = BuildReport::default();

    for candidate in candidates {
        match Triple::parse(candidate.as_ref()) {
            Ok(triple) => report.graph.add_triple(&triple),
            Err(malformed) => {
                tracing::warn!(
                    candidate = %malformed.candidate,
                    reason = %malformed.reason,
                    "Invalid triplet skipped"
                );
                report.skipped.push(malformed);
            }
        }
    }

    tracing::debug!(
        nodes = report.graph.node_count(),
        edges = report.graph.edge_count(),
        skipped = report.skipped.len(),
        "Built knowledge graph"
    );
    report
}

/// [`build_report`] without the diagnostics.
pub fn build_graph<I, S>(candidates: I) -> KnowledgeGraph
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    build_report(candidates).graph
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
    use extract::{MalformedReason, TRIPLE_DELIMITER, parse_triples};
    use proptest::prelude::*;

    fn edge<'a>(source: &'a str, label: &'a str, target: &'a str) -> EdgeView<'a> {
        EdgeView { source, target, label }
    }

    #[test]
    fn test_nevada_scenario() {
        let candidates = parse_triples(
            "(Nevada, is a, state)<|>(Nevada, is in, US)",
            TRIPLE_DELIMITER,
        );
        assert_eq!(candidates.len(), 2);

        let report = build_report(&candidates);
        let graph = &report.graph;

        assert!(report.skipped.is_empty());
        assert_eq!(graph.nodes().collect::<Vec<_>>(), vec!["Nevada", "state", "US"]);
        assert_eq!(
            graph.edges().collect::<Vec<_>>(),
            vec![edge("Nevada", "is a", "state"), edge("Nevada", "is in", "US")]
        );
    }

    #[test]
    fn test_short_candidate_is_skipped() {
        let candidates = parse_triples("(A,B)<|>(C,D,E)", TRIPLE_DELIMITER);

        let report = build_report(&candidates);

        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].candidate, "(A,B)");
        assert_eq!(report.skipped[0].reason, MalformedReason::FieldCount(2));
        assert_eq!(report.graph.edge_count(), 1);
        assert_eq!(report.graph.edges().next(), Some(edge("C", "D", "E")));
        assert!(!report.graph.contains_node("A"));
    }

    /// Counts WARN events seen by the subscriber it is installed in.
    struct WarnCounter(Arc<AtomicUsize>);

    impl<S: tracing::Subscriber> Layer<S> for WarnCounter {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            if *event.metadata().level() == tracing::Level::WARN {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    fn warnings_while(f: impl FnOnce()) -> usize {
        let count = Arc::new(AtomicUsize::new(0));
        let subscriber = tracing_subscriber::registry().with(WarnCounter(count.clone()));
        tracing::subscriber::with_default(subscriber, f);
        count.load(Ordering::SeqCst)
    }

    #[test]
    fn test_one_warning_per_skipped_candidate() {
        let candidates = ["(A,B)", "(C, D, E)", "(F, G, H, I)", "(J, , K)"];

        let mut report = BuildReport::default();
        let warnings = warnings_while(|| report = build_report(candidates));

        assert_eq!(report.skipped.len(), 3);
        assert_eq!(warnings, 3);
        assert_eq!(warnings_while(|| drop(build_graph(["(a, b, c)"]))), 0);
    }

    #[test]
    fn test_empty_input_gives_empty_graph() {
        let report = build_report(parse_triples("  \n ", TRIPLE_DELIMITER));

        assert!(report.graph.is_empty());
        assert_eq!(report.graph.edge_count(), 0);
        assert!(report.skipped.is_empty());
    }

    #[test]
    fn test_repeated_triples_accumulate() {
        let graph = build_graph(["(a, talks to, b)", "(a, talks to, b)", "(a, acks, b)"]);

        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.edge_count(), 3);
    }

    #[test]
    fn test_no_case_normalisation() {
        let graph = build_graph(["(DNS, uses, UDP)", "(dns, uses, udp)"]);

        assert_eq!(graph.node_count(), 4);
    }

    #[test]
    fn test_self_loop() {
        let graph = build_graph(["(host, pings, host)"]);

        assert_eq!(graph.node_count(), 1);
        assert_eq!(graph.edges().next(), Some(edge("host", "pings", "host")));
    }

    #[test]
    fn test_rebuild_is_structurally_equal() {
        let candidates = ["(a, b, c)", "junk", "(c, d, a)", "(a, b, c)"];

        assert_eq!(build_report(candidates), build_report(candidates));
        assert_ne!(build_graph(["(a, b, c)"]), build_graph(["(a, x, c)"]));
    }

    fn field() -> impl Strategy<Value = String> {
        "[A-Za-z0-9][A-Za-z0-9 ._-]{0,10}[A-Za-z0-9]"
    }

    proptest! {
        #[test]
        fn prop_well_formed_triple_yields_one_edge(
            a in field(), b in field(), c in field(),
            pad in " {0,3}",
        ) {
            let candidate = format!("{pad}{a},{pad}{b} ,{c}{pad}");
            let report = build_report([candidate.as_str()]);

            prop_assert!(report.skipped.is_empty());
            prop_assert_eq!(report.graph.edge_count(), 1);
            let only = report.graph.edges().next().unwrap();
            prop_assert_eq!(only, edge(a.trim(), b.trim(), c.trim()));
        }

        #[test]
        fn prop_wrong_field_count_yields_one_diagnostic(
            fields in proptest::collection::vec(field(), 1..8)
                .prop_filter("not three fields", |f| f.len() != 3),
        ) {
            let candidate = fields.join(", ");
            let report = build_report([candidate.as_str()]);

            prop_assert_eq!(report.graph.edge_count(), 0);
            prop_assert!(report.graph.is_empty());
            prop_assert_eq!(report.skipped.len(), 1);
        }
    }
}
