//! # Binding Ordering
//!
//! Bindings are often processed in phases: interceptors by group, observers by life
//! cycle group. A phase is a tag value, and a configured list says which phases come
//! first. [`compare_by_order`] is the rule:
//!
//! 1. A missing value counts as `""`.
//! 2. If either value is in the order list, compare by index. A value that is not listed
//!    has index `-1` and therefore sorts before every listed value.
//! 3. Otherwise symbols sort before strings, and values of the same kind compare by
//!    their string form (`Symbol(desc)` for symbols).
//!
//! [`sort_bindings_by_phase`] applies it with a stable sort, so bindings that share a
//! phase keep their input order.
//!
//! [`sort_list_of_groups`] is a different tool: it merges several partial orders of
//! group names into one total order and rejects contradictions.

use crate::binding::Binding;
use crate::error::{ContextError, ContextResult};
use crate::tags::TagValue;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

/// Orders two bindings.
pub type BindingComparator = Arc<dyn Fn(&Binding, &Binding) -> Ordering + Send + Sync>;

/// Wraps a closure as a [`BindingComparator`].
pub fn binding_comparator<F>(f: F) -> BindingComparator
where
    F: Fn(&Binding, &Binding) -> Ordering + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Compares two phase values against a configured order.
pub fn compare_by_order(a: Option<&TagValue>, b: Option<&TagValue>, order: &[TagValue]) -> Ordering {
    let empty = TagValue::Text(String::new());
    let a = a.unwrap_or(&empty);
    let b = b.unwrap_or(&empty);

    let index = |v: &TagValue| -> i64 {
        order
            .iter()
            .position(|o| o == v)
            .map(|i| i as i64)
            .unwrap_or(-1)
    };
    let (i1, i2) = (index(a), index(b));
    if i1 != -1 || i2 != -1 {
        return i1.cmp(&i2);
    }

    match (a.is_symbol(), b.is_symbol()) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => a.to_string().cmp(&b.to_string()),
    }
}

/// Creates a comparator that orders bindings by the value of `phase_tag_name`.
pub fn compare_bindings_by_tag<I, V>(phase_tag_name: &str, order: I) -> BindingComparator
where
    I: IntoIterator<Item = V>,
    V: Into<TagValue>,
{
    let tag = phase_tag_name.to_string();
    let order: Vec<TagValue> = order.into_iter().map(Into::into).collect();
    Arc::new(move |a: &Binding, b: &Binding| {
        compare_by_order(a.tag_value(&tag).as_ref(), b.tag_value(&tag).as_ref(), &order)
    })
}

/// Sorts bindings by phase, unknown phases first, stable within a phase.
pub fn sort_bindings_by_phase(bindings: &mut [Binding], phase_tag_name: &str, order: &[TagValue]) {
    bindings.sort_by(|a, b| {
        compare_by_order(
            a.tag_value(phase_tag_name).as_ref(),
            b.tag_value(phase_tag_name).as_ref(),
            order,
        )
    });
}

/// Merges several ordered lists of groups into one order.
///
/// Each list contributes an edge between each pair of neighbours. The result is a
/// topological order of all groups; a contradiction such as `[a, b]` with `[b, a]`
/// fails with [`ContextError::CyclicGroupOrder`].
pub fn sort_list_of_groups<S: AsRef<str>>(lists: &[Vec<S>]) -> ContextResult<Vec<String>> {
    let lists: Vec<Vec<String>> = lists
        .iter()
        .map(|l| l.iter().map(|g| g.as_ref().to_string()).collect())
        .collect();
    match lists.len() {
        0 => return Ok(Vec::new()),
        1 => return Ok(lists.into_iter().next().unwrap_or_default()),
        _ => {}
    }

    let mut edges = Vec::new();
    for groups in lists {
        let mut groups = groups;
        if groups.is_empty() {
            continue;
        }
        // A lone group still needs an edge to show up in the result.
        if groups.len() == 1 {
            groups.push(String::new());
        }
        for pair in groups.windows(2) {
            edges.push((pair[0].clone(), pair[1].clone()));
        }
    }

    let sorted = toposort(&edges)?;
    Ok(sorted.into_iter().filter(|g| !g.is_empty()).collect())
}

struct TopoSort<'a> {
    nodes: Vec<&'a str>,
    index: HashMap<&'a str, usize>,
    outgoing: HashMap<&'a str, Vec<&'a str>>,
    visited: Vec<bool>,
    sorted: Vec<Option<&'a str>>,
    cursor: usize,
}

fn toposort(edges: &[(String, String)]) -> ContextResult<Vec<String>> {
    let mut nodes: Vec<&str> = Vec::new();
    let mut index = HashMap::new();
    let mut outgoing: HashMap<&str, Vec<&str>> = HashMap::new();
    for (from, to) in edges {
        for node in [from.as_str(), to.as_str()] {
            if !index.contains_key(node) {
                index.insert(node, nodes.len());
                nodes.push(node);
            }
            outgoing.entry(node).or_default();
        }
        let targets = outgoing.entry(from.as_str()).or_default();
        if !targets.contains(&to.as_str()) {
            targets.push(to.as_str());
        }
    }

    let count = nodes.len();
    let mut sort = TopoSort {
        nodes,
        index,
        outgoing,
        visited: vec![false; count],
        sorted: vec![None; count],
        cursor: count,
    };
    let mut predecessors = Vec::new();
    for i in (0..count).rev() {
        if !sort.visited[i] {
            let node = sort.nodes[i];
            sort.visit(node, &mut predecessors)?;
        }
    }
    Ok(sort.sorted.into_iter().flatten().map(str::to_string).collect())
}

impl<'a> TopoSort<'a> {
    fn visit(&mut self, node: &'a str, predecessors: &mut Vec<&'a str>) -> ContextResult<()> {
        if predecessors.contains(&node) {
            return Err(ContextError::CyclicGroupOrder(node.to_string()));
        }
        let i = self.index[node];
        if self.visited[i] {
            return Ok(());
        }
        self.visited[i] = true;

        let children = self.outgoing.get(node).cloned().unwrap_or_default();
        if !children.is_empty() {
            predecessors.push(node);
            for child in children.into_iter().rev() {
                self.visit(child, predecessors)?;
            }
            predecessors.pop();
        }
        self.cursor -= 1;
        self.sorted[self.cursor] = Some(node);
        Ok(())
    }
}
