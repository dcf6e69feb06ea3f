//! Network bootstrap.
//!
//! Starts a list of nodes and optionally seeds a full mesh between them.
//! Seeding treats every ordered pair (A, B) as an independent chain:
//!
//! ```text
//! A dials B  ->  A publishes about(A)  ->  A publishes contact(B, following)
//! ```
//!
//! Chains are started in list order and run without barriers between them.
//! A failing stage ends its own chain only.

use crate::node::start_node;
use corelib::message::CONTACT;
use corelib::{
    ClientFactory, Content, Error, FeedId, FollowGraph, LogEntryRef, NodeConfig, NodeHandle,
    Result, StreamMode,
};
use futures::future::join_all;
use futures::TryStreamExt;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use streaming::MessageStream;

/// Stage of a seeding chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum SeedStage {
    Link,
    About,
    Contact,
}

impl SeedStage {
    fn after(completed: u8) -> Self {
        match completed {
            0 => SeedStage::Link,
            1 => SeedStage::About,
            _ => SeedStage::Contact,
        }
    }
}

impl fmt::Display for SeedStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            SeedStage::Link => "link",
            SeedStage::About => "about",
            SeedStage::Contact => "contact",
        };
        f.write_str(stage)
    }
}

/// A seeding chain that stopped early.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PairFailure {
    pub from: String,
    pub to: String,
    pub stage: SeedStage,
    pub error: Error,
}

/// What a seeding run achieved.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub links: usize,
    pub abouts: usize,
    pub contacts: usize,
    pub failures: Vec<PairFailure>,
}

impl SeedReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Nodes started by a bootstrap run, in start order.
#[derive(Clone, Debug, Default)]
pub struct Cluster {
    nodes: Vec<NodeHandle>,
}

impl Cluster {
    pub fn new(nodes: Vec<NodeHandle>) -> Self {
        Self { nodes }
    }

    pub fn handles(&self) -> &[NodeHandle] {
        &self.nodes
    }

    pub fn by_name(&self, name: &str) -> Option<&NodeHandle> {
        self.nodes.iter().find(|n| n.name() == name)
    }

    pub fn by_id(&self, id: &FeedId) -> Option<&NodeHandle> {
        self.nodes.iter().find(|n| n.id() == id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Follow graph declared by the cluster's nodes.
    ///
    /// Replays the `contact` records each node authored on its own log.
    /// Replicated copies are skipped so a record counts once.
    pub async fn follow_graph(&self) -> Result<FollowGraph> {
        let mut graph = FollowGraph::new();
        for node in &self.nodes {
            let contacts: Vec<_> = MessageStream::subscribe(node, CONTACT, StreamMode::HISTORY)
                .try_collect()
                .await?;
            for message in contacts.iter().filter(|m| &m.author == node.id()) {
                graph.apply(message);
            }
        }
        Ok(graph)
    }

    /// Close every connection.
    pub fn close(&self) {
        for node in &self.nodes {
            node.close();
        }
    }
}

/// Starts nodes and seeds the follow graph between them.
#[derive(Clone, Debug)]
pub struct NetworkBootstrap {
    factory: ClientFactory,
    seed: bool,
}

impl NetworkBootstrap {
    pub fn new(factory: ClientFactory) -> Self {
        Self {
            factory,
            seed: false,
        }
    }

    /// Whether [`run`](Self::run) seeds the mesh after starting the nodes.
    pub fn seed(mut self, seed: bool) -> Self {
        self.seed = seed;
        self
    }

    /// Start every node, then seed if requested.
    pub async fn run(
        &self,
        nodes: Vec<(String, NodeConfig)>,
    ) -> Result<(Cluster, Option<SeedReport>)> {
        let cluster = self.start(nodes).await?;
        let report = if self.seed {
            Some(self.seed_cluster(&cluster).await)
        } else {
            None
        };
        Ok((cluster, report))
    }

    /// Start the nodes one after the other, in list order.
    ///
    /// A node that fails to start is logged and left out. Fails with
    /// [`Error::NoNodes`] only when no node started.
    pub async fn start(&self, nodes: Vec<(String, NodeConfig)>) -> Result<Cluster> {
        let requested = nodes.len();
        let mut started = Vec::with_capacity(requested);

        for (name, config) in nodes {
            match start_node(&self.factory, &name, config).await {
                Ok(handle) => started.push(handle),
                Err(err) => tracing::error!(node = %name, error = %err, "node failed to start"),
            }
        }

        if started.is_empty() {
            return Err(Error::NoNodes);
        }
        tracing::info!(started = started.len(), requested, "nodes started");
        Ok(Cluster::new(started))
    }

    /// Seed every ordered pair of the cluster.
    pub async fn seed_cluster(&self, cluster: &Cluster) -> SeedReport {
        let nodes = cluster.handles();
        let mut chains = Vec::with_capacity(nodes.len() * nodes.len().saturating_sub(1));

        for from in nodes {
            for to in nodes {
                if from.id() == to.id() {
                    continue;
                }
                chains.push(seed_pair(from, to));
            }
        }

        let mut report = SeedReport::default();
        for (completed, failure) in join_all(chains).await {
            report.links += usize::from(completed >= 1);
            report.abouts += usize::from(completed >= 2);
            report.contacts += usize::from(completed >= 3);
            report.failures.extend(failure);
        }

        tracing::info!(
            links = report.links,
            abouts = report.abouts,
            contacts = report.contacts,
            failures = report.failures.len(),
            "seeding finished"
        );
        report
    }
}

/// Run one pair's chain. Resolves to the number of completed stages and the
/// failure that stopped it, if any.
async fn seed_pair(from: &NodeHandle, to: &NodeHandle) -> (u8, Option<PairFailure>) {
    let completed = Arc::new(AtomicU8::new(0));
    let link = from.link_to(to);
    let about = Content::about(from.id(), from.name());
    let contact = Content::contact(to.id(), true);

    let chain = {
        let announcer = from.clone();
        let follower = from.clone();
        from.add_gossip_peer(link)
            .map(stage_done::<()>(&completed))
            .and_then(move |_| announcer.publish(about.clone()))
            .map(stage_done::<LogEntryRef>(&completed))
            .and_then(move |_| follower.publish(contact.clone()))
            .map(stage_done::<LogEntryRef>(&completed))
    };

    match chain.into_future().await {
        Ok(()) => (completed.load(Ordering::SeqCst), None),
        Err(error) => {
            let done = completed.load(Ordering::SeqCst);
            let stage = SeedStage::after(done);
            tracing::warn!(
                from = %from.name(),
                to = %to.name(),
                %stage,
                error = %error,
                "seeding pair failed"
            );
            let failure = PairFailure {
                from: from.name().to_string(),
                to: to.name().to_string(),
                stage,
                error,
            };
            (done, Some(failure))
        }
    }
}

fn stage_done<T: 'static>(completed: &Arc<AtomicU8>) -> impl Fn(T) + Send + Sync + 'static {
    let completed = Arc::clone(completed);
    move |_| {
        completed.fetch_add(1, Ordering::SeqCst);
    }
}
