use crate::ids::NodeId;
use crate::presentation::Generator;
use crate::word_graph::WordGraph;

/// Traces `word` from `start` through `graph`, stopping at the first
/// undefined edge. Returns the node reached and how many letters were
/// consumed; `consumed == word.len()` means the whole word traced.
pub fn trace_defined_prefix(graph: &WordGraph, start: NodeId, word: &[Generator]) -> (NodeId, usize) {
    let mut cur = start;
    for (i, &g) in word.iter().enumerate() {
        match graph.target(cur, g) {
            Some(v) => cur = v,
            None => return (cur, i),
        }
    }
    (cur, word.len())
}
