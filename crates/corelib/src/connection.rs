//! Connection handle contract.
//!
//! The core never opens or speaks on connections. It only parks already
//! established ones while no pool owns them, so all it needs from the
//! connection layer is the small [`Connection`] trait below.

use std::fmt;

/// Server-side shard a connection is affined to.
pub type ShardId = i32;

/// Execution context a dormant connection must be bound to before use.
pub trait IoContext: Send + Sync {
    /// Name used in diagnostics.
    fn name(&self) -> &str;
}

/// An established connection as seen by the host core.
pub trait Connection: Send {
    fn shard_id(&self) -> ShardId;

    /// Unbind from the current I/O context; the connection is going idle.
    fn detach(&mut self);

    /// Bind to `ctx` so the connection can be driven again.
    fn attach(&mut self, ctx: &dyn IoContext);

    fn close(&mut self);
}

impl<C: Connection + ?Sized> Connection for Box<C> {
    fn shard_id(&self) -> ShardId {
        (**self).shard_id()
    }

    fn detach(&mut self) {
        (**self).detach()
    }

    fn attach(&mut self, ctx: &dyn IoContext) {
        (**self).attach(ctx)
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// Type-erased connection stored by hosts.
pub type BoxedConnection = Box<dyn Connection>;

/// A detached connection in transit between pools.
///
/// Move-only: whoever holds the handle is the only owner of the connection,
/// and [`import`](Self::import) consumes it, so a connection can never be
/// re-activated twice.
pub struct ExportedConnection<C: Connection> {
    shard_id: ShardId,
    connection: C,
}

impl<C: Connection> ExportedConnection<C> {
    pub fn new(mut connection: C) -> Self {
        connection.detach();
        Self {
            shard_id: connection.shard_id(),
            connection,
        }
    }

    pub fn shard_id(&self) -> ShardId {
        self.shard_id
    }

    /// Re-activate the connection on `ctx` and hand it back.
    pub fn import(mut self, ctx: &dyn IoContext) -> C {
        self.connection.attach(ctx);
        self.connection
    }
}

impl<C: Connection> fmt::Debug for ExportedConnection<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportedConnection")
            .field("shard_id", &self.shard_id)
            .finish_non_exhaustive()
    }
}
