//! Idle connection exchange, keyed by shard.
//!
//! On sharded servers every connection lands on one shard and pools want
//! shard-affined connections. A pool that ends up holding a connection to a
//! shard it does not need deposits it here; a pool short on that shard
//! withdraws it later. The marketplace owns every idle connection it holds
//! until it is withdrawn or closed.
//!
//! The marketplace itself is plain data: methods take `&mut self` and the
//! owner ([`Host`](crate::host::Host)) supplies the lock.

use crate::connection::{Connection, ExportedConnection, IoContext, ShardId};
use std::collections::{HashMap, VecDeque};

pub struct ConnectionMarketplace<C: Connection> {
    idle: HashMap<ShardId, VecDeque<ExportedConnection<C>>>,
}

impl<C: Connection> ConnectionMarketplace<C> {
    pub fn new() -> Self {
        Self {
            idle: HashMap::new(),
        }
    }

    /// Take ownership of `connection` and park it on its shard's list.
    pub fn deposit(&mut self, connection: C) {
        let exported = ExportedConnection::new(connection);
        self.idle
            .entry(exported.shard_id())
            .or_default()
            .push_back(exported);
        metrics::counter!("marketplace.deposited").increment(1);
    }

    /// Remove up to `max_count` of the oldest idle connections on `shard_id`.
    ///
    /// Unknown or empty shards yield an empty vec. A shortfall is not
    /// signalled; compare the returned length with what was asked for.
    pub fn withdraw(&mut self, shard_id: ShardId, max_count: usize) -> Vec<ExportedConnection<C>> {
        let Some(list) = self.idle.get_mut(&shard_id) else {
            return Vec::new();
        };
        let count = max_count.min(list.len());
        let withdrawn: Vec<_> = list.drain(..count).collect();
        metrics::counter!("marketplace.withdrawn").increment(withdrawn.len() as u64);
        withdrawn
    }

    /// Re-activate every idle connection on `ctx` and close it.
    ///
    /// Returns how many connections were closed.
    pub fn close_all(&mut self, ctx: &dyn IoContext) -> usize {
        let mut closed = 0;
        for list in self.idle.values_mut() {
            for exported in list.drain(..) {
                exported.import(ctx).close();
                closed += 1;
            }
        }
        metrics::counter!("marketplace.closed").increment(closed as u64);
        closed
    }

    pub fn idle_count(&self, shard_id: ShardId) -> usize {
        self.idle.get(&shard_id).map_or(0, VecDeque::len)
    }

    pub fn total_idle(&self) -> usize {
        self.idle.values().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_idle() == 0
    }

    /// Shards that currently have idle connections, ascending.
    pub fn shards(&self) -> Vec<ShardId> {
        let mut shards: Vec<_> = self
            .idle
            .iter()
            .filter(|(_, list)| !list.is_empty())
            .map(|(shard, _)| *shard)
            .collect();
        shards.sort_unstable();
        shards
    }
}

impl<C: Connection> Default for ConnectionMarketplace<C> {
    fn default() -> Self {
        Self::new()
    }
}
