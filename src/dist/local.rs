//! In-process process group: every rank is an OS thread.
//!
//! Ranks are connected by one `mpsc` channel per ordered pair, so a rank only
//! ever waits on the peer it expects a message from. When a rank exits or
//! panics its endpoint is dropped, its channels disconnect, and any peer
//! waiting on it fails with a distribution failure instead of hanging.

use std::fmt;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::thread;

use crate::{
    dist::comm::Communicator,
    error::{configuration_error, distribution_failure, Result},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Collective {
    Broadcast,
    Scatter,
    Gather,
}

impl fmt::Display for Collective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Collective::Broadcast => write!(f, "broadcast"),
            Collective::Scatter => write!(f, "scatter"),
            Collective::Gather => write!(f, "gather"),
        }
    }
}

struct Envelope {
    kind: Collective,
    payload: Vec<f64>,
}

/// One rank's view of a [`LocalGroup`].
pub struct LocalEndpoint {
    rank: usize,
    size: usize,
    outboxes: Vec<Option<Sender<Envelope>>>,
    inboxes: Vec<Option<Receiver<Envelope>>>,
}

impl LocalEndpoint {
    fn send(&self, dest: usize, kind: Collective, payload: Vec<f64>) -> Result<()> {
        log::trace!("rank {} -> {dest}: {kind} of {} elements", self.rank, payload.len());
        let outbox = self.outboxes[dest]
            .as_ref()
            .ok_or_else(|| distribution_failure(self.rank, "cannot send to self"))?;
        outbox
            .send(Envelope { kind, payload })
            .map_err(|_| distribution_failure(self.rank, format!("rank {dest} is unreachable during {kind}")))
    }

    fn recv(&self, src: usize, kind: Collective) -> Result<Vec<f64>> {
        let inbox = self.inboxes[src]
            .as_ref()
            .ok_or_else(|| distribution_failure(self.rank, "cannot receive from self"))?;
        let envelope = inbox.recv().map_err(|_| {
            distribution_failure(self.rank, format!("rank {src} disconnected during {kind}"))
        })?;
        if envelope.kind != kind {
            return Err(distribution_failure(
                self.rank,
                format!("expected {kind} from rank {src}, received {}", envelope.kind),
            ));
        }
        log::trace!("rank {} <- {src}: {kind} of {} elements", self.rank, envelope.payload.len());
        Ok(envelope.payload)
    }

    fn check_root(&self, root: usize) -> Result<()> {
        if root >= self.size {
            return Err(configuration_error(format!(
                "root {root} is outside a group of {}",
                self.size
            )));
        }
        Ok(())
    }
}

impl Communicator for LocalEndpoint {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn broadcast(&self, root: usize, data: Option<Vec<f64>>) -> Result<Vec<f64>> {
        self.check_root(root)?;
        if self.rank != root {
            return self.recv(root, Collective::Broadcast);
        }

        let data = data.ok_or_else(|| configuration_error("broadcast root supplied no data"))?;
        for dest in (0..self.size).filter(|&r| r != root) {
            self.send(dest, Collective::Broadcast, data.clone())?;
        }
        Ok(data)
    }

    fn scatter(&self, root: usize, chunks: Option<Vec<Vec<f64>>>) -> Result<Vec<f64>> {
        self.check_root(root)?;
        if self.rank != root {
            return self.recv(root, Collective::Scatter);
        }

        let chunks = chunks.ok_or_else(|| configuration_error("scatter root supplied no chunks"))?;
        if chunks.len() != self.size {
            return Err(configuration_error(format!(
                "scatter needs {} chunks, got {}",
                self.size,
                chunks.len()
            )));
        }

        let mut own = Vec::new();
        for (dest, chunk) in chunks.into_iter().enumerate() {
            if dest == root {
                own = chunk;
            } else {
                self.send(dest, Collective::Scatter, chunk)?;
            }
        }
        Ok(own)
    }

    fn gather(&self, root: usize, chunk: Vec<f64>) -> Result<Option<Vec<Vec<f64>>>> {
        self.check_root(root)?;
        if self.rank != root {
            self.send(root, Collective::Gather, chunk)?;
            return Ok(None);
        }

        let mut own = Some(chunk);
        let mut gathered = Vec::with_capacity(self.size);
        for src in 0..self.size {
            if src == root {
                gathered.push(own.take().unwrap_or_default());
            } else {
                gathered.push(self.recv(src, Collective::Gather)?);
            }
        }
        Ok(Some(gathered))
    }
}

/// A fully connected group of `size` in-process ranks.
pub struct LocalGroup {
    endpoints: Vec<LocalEndpoint>,
}

impl LocalGroup {
    pub fn new(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(configuration_error("process count must be positive"));
        }

        let mut outboxes: Vec<Vec<Option<Sender<Envelope>>>> =
            (0..size).map(|_| (0..size).map(|_| None).collect()).collect();
        let mut inboxes: Vec<Vec<Option<Receiver<Envelope>>>> =
            (0..size).map(|_| (0..size).map(|_| None).collect()).collect();

        for src in 0..size {
            for dest in (0..size).filter(|&d| d != src) {
                let (tx, rx) = channel();
                outboxes[src][dest] = Some(tx);
                inboxes[dest][src] = Some(rx);
            }
        }

        let endpoints = outboxes
            .into_iter()
            .zip(inboxes)
            .enumerate()
            .map(|(rank, (outboxes, inboxes))| LocalEndpoint {
                rank,
                size,
                outboxes,
                inboxes,
            })
            .collect();

        Ok(LocalGroup { endpoints })
    }

    pub fn size(&self) -> usize {
        self.endpoints.len()
    }

    pub fn into_endpoints(self) -> Vec<LocalEndpoint> {
        self.endpoints
    }

    /// Runs `f` once per rank, each on its own thread, and returns the
    /// per-rank results in rank order.
    ///
    /// The first failing rank's error is returned; a rank that panics is
    /// reported as a distribution failure.
    pub fn run<F, R>(self, f: F) -> Result<Vec<R>>
    where
        F: Fn(LocalEndpoint) -> Result<R> + Sync,
        R: Send,
    {
        let outcomes: Vec<Result<R>> = thread::scope(|scope| {
            let handles: Vec<_> = self
                .endpoints
                .into_iter()
                .map(|endpoint| {
                    let rank = endpoint.rank;
                    let f = &f;
                    let handle = thread::Builder::new()
                        .name(format!("distmm-rank-{rank}"))
                        .spawn_scoped(scope, move || f(endpoint));
                    (rank, handle)
                })
                .collect();

            handles
                .into_iter()
                .map(|(rank, handle)| match handle {
                    Ok(handle) => handle
                        .join()
                        .unwrap_or_else(|_| Err(distribution_failure(rank, "rank panicked"))),
                    Err(e) => Err(distribution_failure(
                        rank,
                        format!("cannot spawn rank thread: {e}"),
                    )),
                })
                .collect()
        });

        outcomes.into_iter().collect()
    }
}

/// Spawns a [`LocalGroup`] of `size` ranks and runs `f` on each.
pub fn run_local<F, R>(size: usize, f: F) -> Result<Vec<R>>
where
    F: Fn(LocalEndpoint) -> Result<R> + Sync,
    R: Send,
{
    LocalGroup::new(size)?.run(f)
}
