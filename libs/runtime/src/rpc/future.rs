//! Pending remote calls
//!
//! The [`FutureTable`] maps future ids to the waiting caller. An entry is
//! removed by whichever resolution reaches it first, so a future resolves at
//! most once and late responses find nothing.

use crate::error::CallError;
use codec::{TypeCategory, WireType};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::IntoFuture;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;
use types::{current_timestamp_ms, Payload, RemoteFunctionIdentifier};

/// Raw outcome delivered to a waiting future
pub type CallOutcome = std::result::Result<Option<Payload>, CallError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FutureState {
    Pending = 0,
    Succeeded = 1,
    Failed = 2,
}

impl FutureState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => FutureState::Succeeded,
            2 => FutureState::Failed,
            _ => FutureState::Pending,
        }
    }
}

struct PendingCall {
    identifier: RemoteFunctionIdentifier,
    sender: oneshot::Sender<CallOutcome>,
    state: Arc<AtomicU8>,
}

static FUTURE_COUNTER: AtomicU64 = AtomicU64::new(1);

pub struct FutureTable {
    prefix: String,
    pending: Mutex<HashMap<String, PendingCall>>,
}

impl FutureTable {
    /// `prefix` namespaces future ids, normally the runtime name
    pub fn new(prefix: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            prefix: prefix.into(),
            pending: Mutex::new(HashMap::new()),
        })
    }

    fn next_id(&self) -> String {
        let counter = FUTURE_COUNTER.fetch_add(1, Ordering::Relaxed);
        format!("{}_{}_{}", self.prefix, counter, current_timestamp_ms())
    }

    /// Create a pending entry and the future that waits on it
    pub fn register<R: WireType>(self: &Arc<Self>, identifier: RemoteFunctionIdentifier) -> RemoteFuture<R> {
        let (sender, receiver) = oneshot::channel();
        let state = Arc::new(AtomicU8::new(FutureState::Pending as u8));
        let id = self.next_id();

        self.pending.lock().insert(
            id.clone(),
            PendingCall {
                identifier: identifier.clone(),
                sender,
                state: state.clone(),
            },
        );

        RemoteFuture {
            id,
            identifier,
            receiver,
            state,
            table: Arc::downgrade(self),
            timeout: None,
            _marker: PhantomData,
        }
    }

    /// Resolve `future_id`; false if it was already resolved or never existed
    pub fn resolve(&self, future_id: &str, outcome: CallOutcome) -> bool {
        let Some(call) = self.pending.lock().remove(future_id) else {
            return false;
        };
        let state = if outcome.is_ok() {
            FutureState::Succeeded
        } else {
            FutureState::Failed
        };
        call.state.store(state as u8, Ordering::Release);
        if call.sender.send(outcome).is_err() {
            debug!(future_id, function = %call.identifier, "Caller stopped waiting before resolution");
        }
        true
    }

    pub fn remove(&self, future_id: &str) -> bool {
        self.pending.lock().remove(future_id).is_some()
    }

    pub fn contains(&self, future_id: &str) -> bool {
        self.pending.lock().contains_key(future_id)
    }

    /// Fail every pending call with [`CallError::Abandoned`]
    pub fn abandon_all(&self) -> usize {
        let drained: Vec<PendingCall> = self.pending.lock().drain().map(|(_, call)| call).collect();
        let count = drained.len();
        for call in drained {
            call.state.store(FutureState::Failed as u8, Ordering::Release);
            let _ = call.sender.send(Err(CallError::Abandoned));
        }
        count
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}

impl std::fmt::Debug for FutureTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FutureTable")
            .field("prefix", &self.prefix)
            .field("pending", &self.len())
            .finish()
    }
}

/// Typed handle to the return value of a remote call.
///
/// Await it directly or through [`RemoteFuture::wait`]. Dropping it before
/// resolution removes its table entry.
pub struct RemoteFuture<R> {
    id: String,
    identifier: RemoteFunctionIdentifier,
    receiver: oneshot::Receiver<CallOutcome>,
    state: Arc<AtomicU8>,
    table: Weak<FutureTable>,
    timeout: Option<Duration>,
    _marker: PhantomData<fn() -> R>,
}

impl<R: WireType> RemoteFuture<R> {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn identifier(&self) -> &RemoteFunctionIdentifier {
        &self.identifier
    }

    pub fn state(&self) -> FutureState {
        FutureState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_finished(&self) -> bool {
        self.state() != FutureState::Pending
    }

    /// Fail with [`CallError::TimedOut`] if no response arrives in `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub async fn wait(mut self) -> Result<R, CallError> {
        let received = match self.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, &mut self.receiver).await {
                Ok(received) => received,
                Err(_) => {
                    let removed = self
                        .table
                        .upgrade()
                        .is_some_and(|table| table.remove(&self.id));
                    if removed {
                        self.state.store(FutureState::Failed as u8, Ordering::Release);
                        return Err(CallError::TimedOut {
                            timeout_ms: timeout.as_millis() as u64,
                        });
                    }
                    // Resolved between the timeout firing and the removal
                    (&mut self.receiver).await
                }
            },
            None => (&mut self.receiver).await,
        };

        match received {
            Ok(Ok(Some(payload))) => R::decode(&payload).map_err(CallError::Decode),
            Ok(Ok(None)) if R::CATEGORY == TypeCategory::Void => {
                R::decode(&Payload::new(R::type_tag(), Vec::new())).map_err(CallError::Decode)
            }
            Ok(Ok(None)) => Err(CallError::MissingReturnValue {
                identifier: self.identifier.to_string(),
            }),
            Ok(Err(error)) => Err(error),
            Err(_) => Err(CallError::Abandoned),
        }
    }

    /// Run `callback` with the result once it arrives
    pub fn then<F>(self, callback: F) -> JoinHandle<()>
    where
        F: FnOnce(Result<R, CallError>) + Send + 'static,
    {
        tokio::spawn(async move { callback(self.wait().await) })
    }
}

impl<R: WireType> IntoFuture for RemoteFuture<R> {
    type Output = Result<R, CallError>;
    type IntoFuture = BoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.wait())
    }
}

impl<R> Drop for RemoteFuture<R> {
    fn drop(&mut self) {
        if self.state.load(Ordering::Acquire) == FutureState::Pending as u8 {
            if let Some(table) = self.table.upgrade() {
                table.remove(&self.id);
            }
        }
    }
}

impl<R> std::fmt::Debug for RemoteFuture<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteFuture")
            .field("id", &self.id)
            .field("identifier", &self.identifier)
            .field("state", &FutureState::from_u8(self.state.load(Ordering::Acquire)))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use types::ExecutionStatus;

    fn identifier() -> RemoteFunctionIdentifier {
        RemoteFunctionIdentifier::runtime("MIDDLEWARE_CORE", "is_connected")
    }

    #[tokio::test]
    async fn test_resolve_delivers_value() {
        let table = FutureTable::new("RUNTIME_RUST");
        let future = table.register::<bool>(identifier());
        assert!(future.id().starts_with("RUNTIME_RUST_"));
        assert_eq!(future.state(), FutureState::Pending);

        let payload = true.encode().unwrap();
        assert!(table.resolve(future.id(), Ok(Some(payload))));
        assert!(future.await.unwrap());
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_second_resolution_is_ignored() {
        let table = FutureTable::new("RUNTIME_RUST");
        let future = table.register::<bool>(identifier());
        let id = future.id().to_string();

        let failure = CallError::Failed {
            identifier: identifier().to_string(),
            status: ExecutionStatus::FailedMismatchingParameters,
        };
        assert!(table.resolve(&id, Err(failure)));
        assert!(!table.resolve(&id, Ok(Some(true.encode().unwrap()))));

        assert_eq!(future.state(), FutureState::Failed);
        let err = future.await.unwrap_err();
        assert_eq!(err.status(), Some(ExecutionStatus::FailedMismatchingParameters));
    }

    #[test]
    fn test_concurrent_resolution_has_single_winner() {
        for _ in 0..64 {
            let table = FutureTable::new("RUNTIME_RUST");
            let future = table.register::<bool>(identifier());
            let id = future.id().to_string();
            let barrier = Arc::new(Barrier::new(2));

            let success = {
                let (table, id, barrier) = (table.clone(), id.clone(), barrier.clone());
                std::thread::spawn(move || {
                    barrier.wait();
                    table.resolve(&id, Ok(Some(true.encode().unwrap())))
                })
            };
            let failure = {
                let (table, id, barrier) = (table.clone(), id.clone(), barrier.clone());
                std::thread::spawn(move || {
                    barrier.wait();
                    table.resolve(&id, Err(CallError::Abandoned))
                })
            };

            let success_won = success.join().unwrap();
            let failure_won = failure.join().unwrap();
            assert!(success_won ^ failure_won);

            let expected = if success_won {
                FutureState::Succeeded
            } else {
                FutureState::Failed
            };
            assert_eq!(future.state(), expected);
            let result = tokio_test::block_on(future.wait());
            assert_eq!(result.is_ok(), success_won);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fails_and_discards_late_response() {
        let table = FutureTable::new("RUNTIME_RUST");
        let future = table
            .register::<bool>(identifier())
            .with_timeout(Duration::from_millis(100));
        let id = future.id().to_string();

        let err = future.await.unwrap_err();
        assert!(matches!(err, CallError::TimedOut { timeout_ms: 100 }));
        assert!(!table.contains(&id));
        assert!(!table.resolve(&id, Ok(Some(true.encode().unwrap()))));
    }

    #[tokio::test]
    async fn test_dropping_future_reclaims_entry() {
        let table = FutureTable::new("RUNTIME_RUST");
        let future = table.register::<i64>(identifier());
        assert_eq!(table.len(), 1);
        drop(future);
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_void_return_without_payload() {
        let table = FutureTable::new("RUNTIME_RUST");
        let future = table.register::<()>(identifier());
        table.resolve(future.id(), Ok(None));
        future.await.unwrap();

        let future = table.register::<i64>(identifier());
        table.resolve(future.id(), Ok(None));
        assert!(matches!(future.await, Err(CallError::MissingReturnValue { .. })));
    }

    #[tokio::test]
    async fn test_abandon_all() {
        let table = FutureTable::new("RUNTIME_RUST");
        let first = table.register::<bool>(identifier());
        let second = table.register::<bool>(identifier());
        assert_eq!(table.abandon_all(), 2);
        assert!(matches!(first.await, Err(CallError::Abandoned)));
        assert!(matches!(second.await, Err(CallError::Abandoned)));
    }
}
