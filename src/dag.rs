//! Directed acyclic graph of jobs with parallel execution.
//!
//! Nodes are deduplicated by fingerprint, so work shared between several
//! parents runs exactly once per graph run. Results of the requested roots
//! are streamed back in input order as soon as each contiguous prefix is
//! complete.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::stream::{self, BoxStream, FuturesOrdered, StreamExt};
use futures::FutureExt;
use tokio::sync::OnceCell;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, TraincueError};

/// A unit of work in the graph.
///
/// Two nodes with the same fingerprint are the same job: the first insertion
/// wins and later insertions alias it. `run` receives the results of the
/// node's children, in the order the edges were added.
#[async_trait]
pub trait Node<T>: Send + Sync {
    fn fingerprint(&self) -> String;
    fn name(&self) -> String;
    async fn run(&self, cancel: &CancellationToken, inputs: &[T]) -> Result<T>;
}

pub struct Dag<T> {
    index: HashMap<String, usize>,
    nodes: Vec<Arc<NodeState<T>>>,
}

struct NodeState<T> {
    id: usize,
    name: String,
    inner: Arc<dyn Node<T>>,
    children: RwLock<Vec<Arc<NodeState<T>>>>,
    cell: OnceCell<T>,
}

impl<T> Default for Dag<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Dag<T> {
    pub fn new() -> Self {
        Self {
            index: HashMap::new(),
            nodes: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl<T> Dag<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Adds a chain of connected nodes, first node being the parent.
    ///
    /// A single-element chain adds the node without edges.
    pub fn add_chain(&mut self, nodes: &[Arc<dyn Node<T>>]) -> Result<()> {
        if nodes.len() == 1 {
            self.insert(nodes[0].clone());
            return Ok(());
        }
        for pair in nodes.windows(2) {
            self.add_edge(pair[0].clone(), pair[1].clone())?;
        }
        Ok(())
    }

    /// Adds an edge "parent depends on child", inserting either node if
    /// absent. A duplicate edge is a no-op; an edge that would close a cycle
    /// is rejected.
    pub fn add_edge(&mut self, parent: Arc<dyn Node<T>>, child: Arc<dyn Node<T>>) -> Result<()> {
        let pid = self.insert(parent);
        let cid = self.insert(child);

        let parent_state = self.nodes[pid].clone();
        let child_state = self.nodes[cid].clone();

        if has_child(&parent_state, cid) {
            return Ok(());
        }
        if has_path(&child_state, pid) {
            return Err(TraincueError::CyclicDependency {
                parent: parent_state.name.clone(),
                child: child_state.name.clone(),
            });
        }

        parent_state
            .children
            .write()
            .expect("lock poisoned")
            .push(child_state);
        Ok(())
    }

    /// Evaluates all nodes that have no parent. In a graph with more than one
    /// node, a node with neither parents nor children is reported as orphaned.
    pub fn run_root_nodes(&self, cancel: &CancellationToken) -> BoxStream<'static, Result<T>> {
        match self.root_states() {
            Ok(states) => run_states(states, cancel.clone()),
            Err(e) => stream::once(futures::future::ready(Err(e))).boxed(),
        }
    }

    /// Evaluates the given nodes, yielding their results in input order.
    /// Nodes that were never inserted into the graph are skipped.
    pub fn run(
        &self,
        cancel: &CancellationToken,
        nodes: &[Arc<dyn Node<T>>],
    ) -> BoxStream<'static, Result<T>> {
        let states = nodes
            .iter()
            .filter_map(|n| self.index.get(&n.fingerprint()))
            .map(|&id| self.nodes[id].clone())
            .collect();
        run_states(states, cancel.clone())
    }

    fn insert(&mut self, node: Arc<dyn Node<T>>) -> usize {
        let fingerprint = node.fingerprint();
        if let Some(&id) = self.index.get(&fingerprint) {
            return id;
        }
        let id = self.nodes.len();
        self.index.insert(fingerprint, id);
        self.nodes.push(Arc::new(NodeState {
            id,
            name: node.name(),
            inner: node,
            children: RwLock::new(Vec::new()),
            cell: OnceCell::new(),
        }));
        id
    }

    fn root_states(&self) -> Result<Vec<Arc<NodeState<T>>>> {
        let mut is_child = vec![false; self.nodes.len()];
        for state in &self.nodes {
            for child in state.children.read().expect("lock poisoned").iter() {
                is_child[child.id] = true;
            }
        }

        let mut roots = Vec::new();
        for state in &self.nodes {
            if is_child[state.id] {
                continue;
            }
            if self.nodes.len() > 1 && state.children.read().expect("lock poisoned").is_empty() {
                return Err(TraincueError::OrphanedNode(state.name.clone()));
            }
            roots.push(state.clone());
        }
        Ok(roots)
    }
}

impl<T> fmt::Display for Dag<T> {
    /// Renders the graph in Graphviz dot format.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "digraph dag {{")?;
        for state in &self.nodes {
            writeln!(
                f,
                "    \"{}\" [label=\"name: {}\\nid: {}\"];",
                state.id, state.name, state.id
            )?;
        }
        for state in &self.nodes {
            for child in state.children.read().expect("lock poisoned").iter() {
                writeln!(f, "    \"{}\" -> \"{}\";", state.id, child.id)?;
            }
        }
        write!(f, "}}")
    }
}

fn has_child<T>(parent: &Arc<NodeState<T>>, child_id: usize) -> bool {
    parent
        .children
        .read()
        .expect("lock poisoned")
        .iter()
        .any(|c| c.id == child_id)
}

/// DFS from `src` looking for the node with id `dst`.
fn has_path<T>(src: &Arc<NodeState<T>>, dst: usize) -> bool {
    let mut seen = HashSet::new();
    seen.insert(src.id);
    let mut stack = vec![src.clone()];
    while let Some(state) = stack.pop() {
        if state.id == dst {
            return true;
        }
        for child in state.children.read().expect("lock poisoned").iter() {
            if seen.insert(child.id) {
                stack.push(child.clone());
            }
        }
    }
    false
}

fn run_states<T>(
    states: Vec<Arc<NodeState<T>>>,
    cancel: CancellationToken,
) -> BoxStream<'static, Result<T>>
where
    T: Clone + Send + Sync + 'static,
{
    let mut ordered = FuturesOrdered::new();
    for state in states {
        ordered.push_back(tokio::spawn(run_node(state, cancel.clone())));
    }
    ordered
        .map(|joined| match joined {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => Err(TraincueError::Cancelled),
        })
        .scan(false, |failed, item| {
            if *failed {
                return futures::future::ready(None);
            }
            *failed = item.is_err();
            futures::future::ready(Some(item))
        })
        .boxed()
}

fn run_node<T>(state: Arc<NodeState<T>>, cancel: CancellationToken) -> BoxFuture<'static, Result<T>>
where
    T: Clone + Send + Sync + 'static,
{
    async move {
        if cancel.is_cancelled() {
            return Err(TraincueError::Cancelled);
        }
        let inner = state.clone();
        let value = state
            .cell
            .get_or_try_init(move || async move {
                let children = inner.children.read().expect("lock poisoned").clone();
                let inputs = run_children(children, &cancel).await?;
                inner.inner.run(&cancel, &inputs).await
            })
            .await?;
        Ok(value.clone())
    }
    .boxed()
}

/// Runs all children in parallel. The first failure cancels the remaining
/// siblings and is returned once they have wound down.
async fn run_children<T>(
    children: Vec<Arc<NodeState<T>>>,
    cancel: &CancellationToken,
) -> Result<Vec<T>>
where
    T: Clone + Send + Sync + 'static,
{
    if children.is_empty() {
        return Ok(Vec::new());
    }

    let count = children.len();
    let scope = cancel.child_token();
    let mut set = JoinSet::new();
    for (i, child) in children.into_iter().enumerate() {
        let scope = scope.clone();
        set.spawn(async move { (i, run_node(child, scope).await) });
    }

    let mut results: Vec<Option<T>> = (0..count).map(|_| None).collect();
    let mut first_err = None;
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((i, Ok(value))) => results[i] = Some(value),
            Ok((_, Err(e))) => {
                scope.cancel();
                first_err.get_or_insert(e);
            }
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => {
                first_err.get_or_insert(TraincueError::Cancelled);
            }
        }
    }
    if let Some(e) = first_err {
        return Err(e);
    }
    Ok(results
        .into_iter()
        .map(|r| r.expect("child finished without result"))
        .collect())
}
