//! Serialised write path in front of a storage backend.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, error, info, warn};
use parking_lot::{Mutex, RwLock, RwLockReadGuard};

use super::{Cache, ChannelRecord, EndpointRecord, StorageBackend, StorageError};
use crate::channel::{Channel, ChannelKey};
use crate::endpoint::{Endpoint, Location};

const WORKER_NAME: &str = "wireless-storage";

/// A topology mutation waiting for the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    /// Stores a new channel together with its initial endpoints.
    CreateChannel(Channel),
    /// Replaces the owner list of a channel.
    UpdateChannel {
        /// Channel name.
        channel: String,
        /// Complete owner list after the change.
        owners: Vec<String>,
    },
    /// Deletes a channel and every endpoint on it.
    DeleteChannel {
        /// Channel name.
        channel: String,
    },
    /// Adds an endpoint to an existing channel.
    CreateEndpoint {
        /// Channel name.
        channel: String,
        /// Endpoint to store.
        endpoint: Endpoint,
    },
    /// Removes the endpoint at `location`.
    RemoveEndpoint {
        /// Channel name.
        channel: String,
        /// Location of the endpoint.
        location: Location,
    },
}

impl WriteOp {
    /// Name of the channel the operation touches.
    #[must_use]
    pub fn channel_name(&self) -> &str {
        match self {
            Self::CreateChannel(channel) => &channel.name,
            Self::UpdateChannel { channel, .. }
            | Self::DeleteChannel { channel }
            | Self::CreateEndpoint { channel, .. }
            | Self::RemoveEndpoint { channel, .. } => channel,
        }
    }

    /// Lookup key of the channel the operation touches.
    #[must_use]
    pub fn key(&self) -> ChannelKey {
        ChannelKey::new(self.channel_name())
    }

    fn persist(&self, backend: &mut dyn StorageBackend) -> Result<(), StorageError> {
        let key = self.key();
        match self {
            Self::CreateChannel(channel) => {
                backend.insert_channel(&ChannelRecord::from(channel))?;
                let stored = channel.endpoints.iter().try_for_each(|endpoint| {
                    backend.insert_endpoint(&key, &EndpointRecord::new(&channel.name, endpoint))
                });
                if let Err(err) = stored {
                    if let Err(rollback) = backend.delete_channel(&key) {
                        error!("cannot roll back channel `{}`: {rollback}", channel.name);
                    }
                    return Err(err);
                }
                Ok(())
            }
            Self::UpdateChannel { channel, owners } => backend.update_channel(
                &key,
                &ChannelRecord {
                    name: channel.clone(),
                    owners: owners.clone(),
                },
            ),
            Self::DeleteChannel { .. } => backend.delete_channel(&key),
            Self::CreateEndpoint { channel, endpoint } => {
                backend.insert_endpoint(&key, &EndpointRecord::new(channel, endpoint))
            }
            Self::RemoveEndpoint { location, .. } => backend.delete_endpoint(&key, location),
        }
    }
}

/// Counters describing what happened to queued writes.
#[derive(Debug, Default)]
pub struct WriteStats {
    applied: AtomicU64,
    failed: AtomicU64,
    rejected: AtomicU64,
}

impl WriteStats {
    /// Writes the backend accepted.
    #[must_use]
    pub fn applied(&self) -> u64 {
        self.applied.load(Ordering::Relaxed)
    }

    /// Writes the backend refused. They were logged and dropped.
    #[must_use]
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Writes submitted after the gateway closed.
    #[must_use]
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }
}

enum Command {
    Write(WriteOp),
    Flush(Sender<()>),
    Shutdown,
}

/// Owns the backend worker and the committed cache.
///
/// Writes are queued without blocking and applied by a single worker thread
/// in submission order. The cache is patched only once the backend has
/// accepted a write; a refused write is logged, counted and dropped.
///
/// # Examples
///
/// ```
/// use wireless::storage::{MemoryBackend, StorageGateway, WriteOp};
/// use wireless::{Channel, ChannelKey};
///
/// let gateway = StorageGateway::open(Box::new(MemoryBackend::new()))?;
/// gateway.enqueue(WriteOp::CreateChannel(Channel::new("Red", "alice")))?;
/// gateway.flush()?;
/// assert!(gateway.cache().channel(&ChannelKey::new("red")).is_some());
/// gateway.close()?;
/// # Ok::<(), wireless::storage::StorageError>(())
/// ```
pub struct StorageGateway {
    sender: Mutex<Option<Sender<Command>>>,
    worker: Mutex<Option<JoinHandle<Result<(), StorageError>>>>,
    cache: Arc<RwLock<Cache>>,
    retired: Arc<Mutex<Vec<Location>>>,
    stats: Arc<WriteStats>,
}

impl StorageGateway {
    /// Opens `backend`, loads the cache and starts the worker.
    ///
    /// # Errors
    /// Returns the backend's error when it cannot be opened or read, or
    /// [`StorageError::Worker`] when the worker thread cannot be spawned.
    pub fn open(mut backend: Box<dyn StorageBackend>) -> Result<Self, StorageError> {
        backend.init()?;
        let channels = backend.list_channels()?;
        info!("loaded {} channels from storage", channels.len());

        let cache = Arc::new(RwLock::new(Cache::from_channels(channels)));
        let retired = Arc::new(Mutex::new(Vec::new()));
        let stats = Arc::new(WriteStats::default());
        let (sender, receiver) = mpsc::channel();
        let shared = Shared {
            cache: Arc::clone(&cache),
            retired: Arc::clone(&retired),
            stats: Arc::clone(&stats),
        };
        let worker = thread::Builder::new()
            .name(WORKER_NAME.to_owned())
            .spawn(move || run_worker(backend, &receiver, &shared))
            .map_err(StorageError::Worker)?;

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
            cache,
            retired,
            stats,
        })
    }

    /// Queues `op` behind every write submitted before it.
    ///
    /// # Errors
    /// Returns [`StorageError::Closed`] once the gateway has been closed. The
    /// rejection is counted in [`WriteStats::rejected`].
    pub fn enqueue(&self, op: WriteOp) -> Result<(), StorageError> {
        let sender = self.sender.lock();
        let sent = sender
            .as_ref()
            .is_some_and(|tx| tx.send(Command::Write(op)).is_ok());
        if sent {
            Ok(())
        } else {
            self.stats.rejected.fetch_add(1, Ordering::Relaxed);
            Err(StorageError::Closed)
        }
    }

    /// Read access to the committed cache.
    ///
    /// Never waits for queued writes; hold the guard briefly, the worker
    /// needs the write lock after each operation.
    #[must_use]
    pub fn cache(&self) -> RwLockReadGuard<'_, Cache> {
        self.cache.read()
    }

    /// Takes the locations whose endpoints committed writes have removed
    /// from the cache since the last call.
    #[must_use]
    pub fn take_retired(&self) -> Vec<Location> {
        std::mem::take(&mut *self.retired.lock())
    }

    /// Write counters.
    #[must_use]
    pub fn stats(&self) -> &WriteStats {
        &self.stats
    }

    /// Blocks until every write queued before this call has been attempted.
    ///
    /// # Errors
    /// Returns [`StorageError::Closed`] when the gateway is closed or the
    /// worker has stopped.
    pub fn flush(&self) -> Result<(), StorageError> {
        let (ack, done) = mpsc::channel();
        {
            let sender = self.sender.lock();
            let tx = sender.as_ref().ok_or(StorageError::Closed)?;
            tx.send(Command::Flush(ack))
                .map_err(|_| StorageError::Closed)?;
        }
        done.recv().map_err(|_| StorageError::Closed)
    }

    /// Drains the queue, stops the worker and closes the backend.
    ///
    /// Writes queued before the call are still applied. Calling `close` again
    /// is a no-op.
    ///
    /// # Errors
    /// Propagates the backend's close error, or [`StorageError::Closed`] if
    /// the worker panicked.
    pub fn close(&self) -> Result<(), StorageError> {
        if let Some(sender) = self.sender.lock().take() {
            if sender.send(Command::Shutdown).is_err() {
                debug!("storage worker already stopped");
            }
        }
        let Some(worker) = self.worker.lock().take() else {
            return Ok(());
        };
        match worker.join() {
            Ok(result) => {
                info!(
                    "storage closed: {} writes applied, {} failed",
                    self.stats.applied(),
                    self.stats.failed()
                );
                result
            }
            Err(_) => {
                error!("storage worker panicked");
                Err(StorageError::Closed)
            }
        }
    }
}

impl std::fmt::Debug for StorageGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageGateway")
            .field("open", &self.sender.lock().is_some())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl Drop for StorageGateway {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!("failed to close storage cleanly: {err}");
        }
    }
}

/// State the worker shares with the gateway handle.
struct Shared {
    cache: Arc<RwLock<Cache>>,
    retired: Arc<Mutex<Vec<Location>>>,
    stats: Arc<WriteStats>,
}

fn run_worker(
    mut backend: Box<dyn StorageBackend>,
    receiver: &Receiver<Command>,
    shared: &Shared,
) -> Result<(), StorageError> {
    let Shared {
        cache,
        retired,
        stats,
    } = shared;
    for command in receiver {
        match command {
            Command::Write(op) => {
                match op.persist(backend.as_mut()) {
                    Ok(()) => {
                        debug!("applied {op:?}");
                        stats.applied.fetch_add(1, Ordering::Relaxed);
                        let removed = cache.write().apply(&op);
                        if !removed.is_empty() {
                            retired.lock().extend(removed);
                        }
                    }
                    Err(err) => {
                        warn!("dropping write to channel `{}`: {err}", op.channel_name());
                        stats.failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
            Command::Flush(ack) => {
                if ack.send(()).is_err() {
                    debug!("flush requester went away");
                }
            }
            Command::Shutdown => break,
        }
    }
    backend.close()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::Role;
    use crate::storage::{MemoryBackend, MockStorageBackend};
    use rstest::{fixture, rstest};

    fn endpoint(x: i32) -> Endpoint {
        Endpoint::new(Location::new("world", x, 0, 0), "alice", Role::Receiver)
    }

    fn red() -> Channel {
        let mut channel = Channel::new("Red", "alice");
        channel.endpoints.push(endpoint(0));
        channel
    }

    #[fixture]
    fn memory() -> MemoryBackend {
        MemoryBackend::new()
    }

    /// Refuses every endpoint insert, otherwise behaves like memory.
    struct RefusingBackend(MemoryBackend);

    impl StorageBackend for RefusingBackend {
        fn init(&mut self) -> Result<(), StorageError> {
            self.0.init()
        }
        fn list_channels(&mut self) -> Result<Vec<Channel>, StorageError> {
            self.0.list_channels()
        }
        fn channel(&mut self, key: &ChannelKey) -> Result<Option<Channel>, StorageError> {
            self.0.channel(key)
        }
        fn insert_channel(&mut self, record: &ChannelRecord) -> Result<(), StorageError> {
            self.0.insert_channel(record)
        }
        fn update_channel(
            &mut self,
            key: &ChannelKey,
            record: &ChannelRecord,
        ) -> Result<(), StorageError> {
            self.0.update_channel(key, record)
        }
        fn delete_channel(&mut self, key: &ChannelKey) -> Result<(), StorageError> {
            self.0.delete_channel(key)
        }
        fn insert_endpoint(
            &mut self,
            _key: &ChannelKey,
            _record: &EndpointRecord,
        ) -> Result<(), StorageError> {
            Err(StorageError::InvalidRecord("refused".to_owned()))
        }
        fn delete_endpoint(
            &mut self,
            key: &ChannelKey,
            location: &Location,
        ) -> Result<(), StorageError> {
            self.0.delete_endpoint(key, location)
        }
    }

    #[rstest]
    fn writes_apply_in_submission_order(memory: MemoryBackend) {
        let gateway = StorageGateway::open(Box::new(memory.clone())).expect("open gateway");
        let ops = [
            WriteOp::CreateChannel(red()),
            WriteOp::CreateEndpoint {
                channel: "red".to_owned(),
                endpoint: endpoint(1),
            },
            WriteOp::UpdateChannel {
                channel: "Red".to_owned(),
                owners: vec!["alice".to_owned(), "bob".to_owned()],
            },
            WriteOp::RemoveEndpoint {
                channel: "Red".to_owned(),
                location: Location::new("world", 0, 0, 0),
            },
        ];
        for op in ops {
            gateway.enqueue(op).expect("enqueue");
        }
        gateway.flush().expect("flush");

        let mut expected = Channel::new("Red", "alice");
        expected.owners.push("bob".to_owned());
        expected.endpoints.push(endpoint(1));
        assert_eq!(memory.snapshot(), vec![expected.clone()]);
        assert_eq!(gateway.cache().channel(&ChannelKey::new("red")), Some(&expected));
        assert_eq!(gateway.stats().applied(), 4);
    }

    #[rstest]
    fn refused_write_leaves_cache_untouched() {
        let gateway = StorageGateway::open(Box::new(RefusingBackend(MemoryBackend::new())))
            .expect("open gateway");
        gateway
            .enqueue(WriteOp::CreateChannel(Channel::new("Red", "alice")))
            .expect("enqueue");
        gateway
            .enqueue(WriteOp::CreateEndpoint {
                channel: "Red".to_owned(),
                endpoint: endpoint(3),
            })
            .expect("enqueue");
        gateway.flush().expect("flush");

        assert_eq!(gateway.stats().applied(), 1);
        assert_eq!(gateway.stats().failed(), 1);
        assert!(gateway.cache().channel_at(&Location::new("world", 3, 0, 0)).is_none());
        let cached = gateway.cache().channel(&ChannelKey::new("red")).cloned();
        assert_eq!(cached.map(|c| c.endpoints.len()), Some(0));
    }

    #[rstest]
    fn refused_endpoint_rolls_back_new_channel(memory: MemoryBackend) {
        let gateway =
            StorageGateway::open(Box::new(RefusingBackend(memory.clone()))).expect("open gateway");
        gateway
            .enqueue(WriteOp::CreateChannel(red()))
            .expect("enqueue");
        gateway.flush().expect("flush");

        assert_eq!(gateway.stats().failed(), 1);
        assert!(memory.snapshot().is_empty());
        assert!(gateway.cache().is_empty());
    }

    #[rstest]
    fn committed_removals_are_reported_once(memory: MemoryBackend) {
        let gateway = StorageGateway::open(Box::new(memory)).expect("open gateway");
        gateway.enqueue(WriteOp::CreateChannel(red())).expect("enqueue");
        gateway
            .enqueue(WriteOp::RemoveEndpoint {
                channel: "red".to_owned(),
                location: Location::new("world", 0, 0, 0),
            })
            .expect("enqueue");
        gateway.flush().expect("flush");

        assert_eq!(gateway.take_retired(), vec![Location::new("world", 0, 0, 0)]);
        assert!(gateway.take_retired().is_empty());
    }

    #[rstest]
    fn close_drains_pending_writes(memory: MemoryBackend) {
        let gateway = StorageGateway::open(Box::new(memory.clone())).expect("open gateway");
        gateway
            .enqueue(WriteOp::CreateChannel(Channel::new("Red", "alice")))
            .expect("enqueue");
        for x in 0..20 {
            gateway
                .enqueue(WriteOp::CreateEndpoint {
                    channel: "Red".to_owned(),
                    endpoint: endpoint(x),
                })
                .expect("enqueue");
        }
        gateway.close().expect("close");
        gateway.close().expect("second close is a no-op");

        let stored = memory.snapshot();
        assert_eq!(stored.first().map(|c| c.endpoints.len()), Some(20));
    }

    #[rstest]
    fn closed_gateway_rejects_work(memory: MemoryBackend) {
        let gateway = StorageGateway::open(Box::new(memory)).expect("open gateway");
        gateway.close().expect("close");
        let result = gateway.enqueue(WriteOp::DeleteChannel {
            channel: "red".to_owned(),
        });
        assert!(matches!(result, Err(StorageError::Closed)));
        assert!(matches!(gateway.flush(), Err(StorageError::Closed)));
        assert_eq!(gateway.stats().rejected(), 1);
    }

    #[rstest]
    fn init_failure_is_fatal() {
        let mut backend = MockStorageBackend::new();
        backend.expect_init().returning(|| Err(StorageError::NotOpen));
        backend.expect_list_channels().never();
        let result = StorageGateway::open(Box::new(backend));
        assert!(matches!(result, Err(StorageError::NotOpen)));
    }

    #[rstest]
    fn cache_loads_existing_channels() {
        let gateway = StorageGateway::open(Box::new(MemoryBackend::with_channels([red()])))
            .expect("open gateway");
        assert_eq!(gateway.cache().len(), 1);
        assert!(gateway.cache().channel_at(&Location::new("World", 0, 0, 0)).is_some());
    }
}
