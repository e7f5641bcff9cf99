//! In-process rank runtime.
//!
//! [`World::run`] spawns one tokio task per rank and hands each a
//! [`Comm`]: the thin messenger the merge engine talks to. Messages are
//! typed events on unbounded channels, so `send` is fire-and-forget and
//! never suspends; delivery between a given source and destination is in
//! send order. [`Comm::barrier`] is the only point where inbound events run:
//! after the rendezvous every in-flight send is already queued, the rank
//! drains its inbox through the caller's handler, and a second rendezvous
//! keeps any rank from racing into the next phase.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Barrier;

use crate::meshlines::error::{MeshError, MeshResult};

/// Per-rank handle onto the world
///
/// Owned by exactly one rank task; it is not `Clone`, which is what keeps
/// the inbox single-consumer.
pub struct Comm<M> {
    rank: usize,
    peers: Vec<UnboundedSender<M>>,
    inbox: UnboundedReceiver<M>,
    rendezvous: Arc<Barrier>,
    reduce_cell: Arc<AtomicU64>,
}

impl<M: Send + 'static> Comm<M> {
    /// Rank id of this handle, 0-based
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Number of ranks in the world
    pub fn size(&self) -> usize {
        self.peers.len()
    }

    /// Fire-and-forget delivery of one message to `dest`
    ///
    /// The message is handled on the destination rank the next time it
    /// drains its inbox inside [`Comm::barrier`]; the sender learns nothing
    /// about when that happens.
    pub fn send(&self, dest: usize, message: M) -> MeshResult<()> {
        let peer = self.peers.get(dest).ok_or_else(|| {
            MeshError::comm(format!(
                "destination rank {} outside world of {} ranks",
                dest,
                self.peers.len()
            ))
        })?;

        peer.send(message)
            .map_err(|_| MeshError::comm(format!("rank {} is no longer receiving", dest)))
    }

    /// Collective quiescence point
    ///
    /// Returns only after every rank has entered the barrier and every
    /// message sent before it was drained on its destination. The handler
    /// runs serialized with the rank's own logic. A handler error does not
    /// cut the drain short (the remaining events are still consumed and
    /// both rendezvous complete, so peers are not left hanging); the first
    /// error is returned afterwards.
    pub async fn barrier<F>(&mut self, mut on_message: F) -> MeshResult<()>
    where
        F: FnMut(M) -> MeshResult<()>,
    {
        self.rendezvous.wait().await;

        let mut first_error = None;
        while let Ok(message) = self.inbox.try_recv() {
            if let Err(error) = on_message(message) {
                first_error.get_or_insert(error);
            }
        }

        self.rendezvous.wait().await;

        match first_error {
            None => Ok(()),
            Some(error) => Err(error),
        }
    }

    /// Sum `value` across all ranks; every rank receives the total
    pub async fn all_reduce_sum(&self, value: u64) -> u64 {
        // first rendezvous: prior uses of the cell are complete everywhere
        self.rendezvous.wait().await;
        if self.rank == 0 {
            self.reduce_cell.store(0, Ordering::SeqCst);
        }
        // second rendezvous: the reset is visible before anyone adds
        self.rendezvous.wait().await;
        self.reduce_cell.fetch_add(value, Ordering::SeqCst);
        // third rendezvous: every contribution has landed
        self.rendezvous.wait().await;
        self.reduce_cell.load(Ordering::SeqCst)
    }
}

/// Builder for an in-process world of ranks
pub struct World;

impl World {
    /// Run `task` once per rank and collect every rank's outcome
    ///
    /// The returned vector is indexed by rank. A task that panics is
    /// reported as an internal error in its slot; the other ranks keep
    /// their own results.
    pub async fn run<M, T, F, Fut>(size: usize, task: F) -> Vec<MeshResult<T>>
    where
        M: Send + 'static,
        T: Send + 'static,
        F: Fn(Comm<M>) -> Fut,
        Fut: Future<Output = MeshResult<T>> + Send + 'static,
    {
        if size == 0 {
            return Vec::new();
        }

        let mut peers = Vec::with_capacity(size);
        let mut inboxes = Vec::with_capacity(size);
        for _ in 0..size {
            let (sender, receiver) = mpsc::unbounded_channel();
            peers.push(sender);
            inboxes.push(receiver);
        }

        let barrier = Arc::new(Barrier::new(size));
        let reduce_cell = Arc::new(AtomicU64::new(0));

        let mut handles = Vec::with_capacity(size);
        for (rank, inbox) in inboxes.into_iter().enumerate() {
            let comm = Comm {
                rank,
                peers: peers.clone(),
                inbox,
                rendezvous: Arc::clone(&barrier),
                reduce_cell: Arc::clone(&reduce_cell),
            };
            handles.push(tokio::spawn(task(comm)));
        }

        join_all(handles)
            .await
            .into_iter()
            .map(|joined| match joined {
                Ok(result) => result,
                Err(error) => Err(MeshError::internal(format!("rank task failed: {}", error))),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn barrier_delivers_all_messages_before_returning() {
        let results = World::run(4, |mut comm: Comm<u64>| async move {
            // everyone sends its rank to every other peer
            for dest in 0..comm.size() {
                if dest != comm.rank() {
                    comm.send(dest, comm.rank() as u64)?;
                }
            }

            let mut received = Vec::new();
            comm.barrier(|message| {
                received.push(message);
                Ok(())
            })
            .await?;

            received.sort_unstable();
            Ok(received)
        })
        .await;

        for (rank, result) in results.into_iter().enumerate() {
            let mut expected: Vec<u64> = (0..4).filter(|r| *r != rank as u64).collect();
            expected.sort_unstable();
            assert_eq!(result.unwrap(), expected);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn send_order_is_preserved_per_peer() {
        let results = World::run(2, |mut comm: Comm<u64>| async move {
            if comm.rank() == 0 {
                for value in 0..100 {
                    comm.send(1, value)?;
                }
            }

            let mut received = Vec::new();
            comm.barrier(|message| {
                received.push(message);
                Ok(())
            })
            .await?;
            Ok(received)
        })
        .await;

        assert_eq!(results[0].as_ref().unwrap().len(), 0);
        let on_rank_1 = results[1].as_ref().unwrap();
        assert_eq!(*on_rank_1, (0..100).collect::<Vec<u64>>());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn all_reduce_sums_every_rank() {
        let results = World::run(4, |comm: Comm<()>| async move {
            Ok(comm.all_reduce_sum(comm.rank() as u64 + 1).await)
        })
        .await;

        for result in results {
            assert_eq!(result.unwrap(), 1 + 2 + 3 + 4);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn repeated_reductions_do_not_bleed_into_each_other() {
        let results = World::run(3, |comm: Comm<()>| async move {
            let first = comm.all_reduce_sum(1).await;
            let second = comm.all_reduce_sum(10).await;
            Ok((first, second))
        })
        .await;

        for result in results {
            assert_eq!(result.unwrap(), (3, 30));
        }
    }
}
