//! Result delivery: awaitable handles, event streams and completion callbacks
//!
//! Every operation returns a [`TxHandle`]. Awaiting the handle drives the
//! protocol to completion; nothing is sent to the node before that.
//! Progress is observable two ways at once:
//!
//! - [`TxHandle::subscribe`] yields an [`EventStream`] of [`TxEvent`]s
//! - a [`CompletionCallback`] registered through the call options
//!
//! Any failure is emitted as [`TxEvent::Error`] and passed to the callback
//! before the awaited future resolves with the same error.

use std::fmt;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use futures::{FutureExt, Stream};
use parking_lot::Mutex;
use runeth_primitives::{Address, H256};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::node::Receipt;
use crate::TxError;

/// Lifecycle event of one invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxEvent {
    /// The node accepted the transaction
    TransactionHash(H256),
    /// A further block was mined on top of the receipt's block
    Confirmation {
        /// Blocks mined since inclusion, starting at 1
        count: u64,
        /// The mined receipt
        receipt: Receipt,
    },
    /// The transaction was mined
    Receipt(Receipt),
    /// The invocation failed
    Error(TxError),
}

/// Stream of [`TxEvent`]s for one invocation.
///
/// Ends once the invocation finishes. Dropping it only unsubscribes.
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<TxEvent>,
}

impl Stream for EventStream {
    type Item = TxEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Value handed to a [`CompletionCallback`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// Partial progress: the transaction was submitted
    Submitted(H256),
    /// Terminal: a submitted transaction was mined
    Receipt(Receipt),
    /// Terminal: a read-only call returned
    Value(Value),
    /// Terminal: a contract was deployed
    Deployed {
        /// Address of the new contract
        address: Address,
        /// Creation receipt
        receipt: Receipt,
    },
}

/// Caller-supplied completion callback.
///
/// Read-only calls invoke it once. Submissions invoke it with
/// [`Completion::Submitted`] and then once more with the terminal result.
/// A failure before any hash exists produces only the error.
pub struct CompletionCallback(Mutex<Box<dyn FnMut(Result<Completion, TxError>) + Send>>);

impl CompletionCallback {
    /// Wrap a closure
    pub fn new<F>(f: F) -> Self
    where
        F: FnMut(Result<Completion, TxError>) + Send + 'static,
    {
        Self(Mutex::new(Box::new(f)))
    }

    fn invoke(&mut self, result: Result<Completion, TxError>) {
        (self.0.get_mut())(result)
    }
}

impl fmt::Debug for CompletionCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CompletionCallback")
    }
}

/// A deployed contract and its creation receipt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deployment {
    /// Address of the new contract
    pub address: Address,
    /// Creation receipt
    pub receipt: Receipt,
}

/// Result of a binding invocation whose kind is decided by the ABI
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxOutcome {
    /// A mutating method was mined
    Receipt(Receipt),
    /// A constant method returned
    Value(Value),
}

impl TxOutcome {
    /// The receipt, for mutating methods
    pub fn receipt(&self) -> Option<&Receipt> {
        match self {
            TxOutcome::Receipt(r) => Some(r),
            TxOutcome::Value(_) => None,
        }
    }

    /// The decoded value, for constant methods
    pub fn value(&self) -> Option<&Value> {
        match self {
            TxOutcome::Value(v) => Some(v),
            TxOutcome::Receipt(_) => None,
        }
    }
}

struct SinkState {
    events: mpsc::UnboundedSender<TxEvent>,
    callback: Option<CompletionCallback>,
}

/// Producer side shared by the protocol driver
#[derive(Clone)]
pub(crate) struct EventSink(Arc<Mutex<SinkState>>);

impl EventSink {
    fn new(events: mpsc::UnboundedSender<TxEvent>, callback: Option<CompletionCallback>) -> Self {
        Self(Arc::new(Mutex::new(SinkState { events, callback })))
    }

    /// Emit an event; a dropped subscriber is not an error
    pub(crate) fn emit(&self, event: TxEvent) {
        let _ = self.0.lock().events.send(event);
    }

    /// Report the transaction hash to the stream and the callback
    pub(crate) fn submitted(&self, hash: H256) {
        let mut state = self.0.lock();
        let _ = state.events.send(TxEvent::TransactionHash(hash));
        if let Some(cb) = state.callback.as_mut() {
            cb.invoke(Ok(Completion::Submitted(hash)));
        }
    }

    fn finish(&self, result: Result<Completion, TxError>) {
        let mut state = self.0.lock();
        if let Err(err) = &result {
            let _ = state.events.send(TxEvent::Error(err.clone()));
        }
        if let Some(mut cb) = state.callback.take() {
            cb.invoke(result);
        }
    }
}

/// Awaitable handle for one invocation.
///
/// `await` it (or pass it to `tokio::spawn` via `into_future`) to run the
/// invocation. Call [`subscribe`](Self::subscribe) first to observe events.
#[must_use = "a TxHandle does nothing unless awaited"]
pub struct TxHandle<T> {
    events: Option<EventStream>,
    future: BoxFuture<'static, Result<T, TxError>>,
}

impl<T: Send + 'static> TxHandle<T> {
    /// Build a handle around a protocol driver.
    ///
    /// `complete` maps a successful result to the terminal callback value.
    /// The driver's error, if any, is emitted before the future resolves.
    pub(crate) fn drive<F, Fut>(
        callback: Option<CompletionCallback>,
        complete: fn(&T) -> Completion,
        driver: F,
    ) -> Self
    where
        F: FnOnce(EventSink) -> Fut,
        Fut: Future<Output = Result<T, TxError>> + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = EventSink::new(tx, callback);
        let fut = driver(sink.clone());

        let future = async move {
            let result = fut.await;
            match &result {
                Ok(value) => sink.finish(Ok(complete(value))),
                Err(err) => sink.finish(Err(err.clone())),
            }
            result
        };

        Self {
            events: Some(EventStream { rx }),
            future: future.boxed(),
        }
    }

    /// A handle that fails with `err` once awaited
    pub(crate) fn failed(err: TxError, callback: Option<CompletionCallback>) -> Self {
        Self::drive(callback, |_| Completion::Value(Value::Null), move |_| async move {
            Err(err)
        })
    }

    /// Take the event stream. Returns `None` if already taken.
    pub fn subscribe(&mut self) -> Option<EventStream> {
        self.events.take()
    }

    /// Transform the successful result, keeping the event stream.
    pub fn map<U, F>(self, f: F) -> TxHandle<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        TxHandle {
            events: self.events,
            future: self.future.map(|r| r.map(f)).boxed(),
        }
    }
}

impl<T: 'static> IntoFuture for TxHandle<T> {
    type Output = Result<T, TxError>;
    type IntoFuture = BoxFuture<'static, Result<T, TxError>>;

    fn into_future(self) -> Self::IntoFuture {
        self.future
    }
}

impl<T> fmt::Debug for TxHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TxHandle")
            .field("subscribed", &self.events.is_none())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::sync::Mutex as StdMutex;

    fn receipt(hash: H256) -> Receipt {
        Receipt {
            transaction_hash: hash,
            block_number: Some(7),
            block_hash: None,
            status: true,
            gas_used: 21000,
            cumulative_gas_used: 21000,
            contract_address: None,
        }
    }

    fn recorder() -> (CompletionCallback, Arc<StdMutex<Vec<Result<Completion, TxError>>>>) {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let seen2 = Arc::clone(&seen);
        let cb = CompletionCallback::new(move |r| seen2.lock().unwrap().push(r));
        (cb, seen)
    }

    #[tokio::test]
    async fn test_nothing_runs_until_awaited() {
        let ran = Arc::new(StdMutex::new(false));
        let ran2 = Arc::clone(&ran);
        let handle: TxHandle<u32> = TxHandle::drive(None, |_| Completion::Value(Value::Null), move |_| async move {
            *ran2.lock().unwrap() = true;
            Ok(1)
        });
        assert!(!*ran.lock().unwrap());
        assert_eq!(handle.await.unwrap(), 1);
        assert!(*ran.lock().unwrap());
    }

    #[tokio::test]
    async fn test_submission_events_and_callback() {
        let hash = H256::from_bytes([1u8; 32]);
        let (cb, seen) = recorder();

        let mut handle = TxHandle::drive(Some(cb), |r: &Receipt| Completion::Receipt(r.clone()), move |sink| async move {
            sink.submitted(hash);
            let r = receipt(hash);
            sink.emit(TxEvent::Receipt(r.clone()));
            Ok(r)
        });
        let events = handle.subscribe().unwrap();
        assert!(handle.subscribe().is_none());

        let got = handle.await.unwrap();
        let events: Vec<TxEvent> = events.collect().await;

        assert_eq!(events, vec![TxEvent::TransactionHash(hash), TxEvent::Receipt(got.clone())]);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], Ok(Completion::Submitted(hash)));
        assert_eq!(seen[1], Ok(Completion::Receipt(got)));
    }

    #[tokio::test]
    async fn test_failure_is_emitted_once_everywhere() {
        let (cb, seen) = recorder();
        let mut handle: TxHandle<Receipt> = TxHandle::failed(TxError::NoAccountAvailable, Some(cb));
        let events = handle.subscribe().unwrap();

        assert_eq!(handle.await, Err(TxError::NoAccountAvailable));
        let events: Vec<TxEvent> = events.collect().await;
        assert_eq!(events, vec![TxEvent::Error(TxError::NoAccountAvailable)]);
        assert_eq!(*seen.lock().unwrap(), vec![Err(TxError::NoAccountAvailable)]);
    }

    #[tokio::test]
    async fn test_dropped_subscriber_does_not_affect_result() {
        let hash = H256::from_bytes([2u8; 32]);
        let mut handle = TxHandle::drive(None, |r: &Receipt| Completion::Receipt(r.clone()), move |sink| async move {
            sink.submitted(hash);
            Ok(receipt(hash))
        });
        drop(handle.subscribe());
        assert_eq!(handle.await.unwrap().transaction_hash, hash);
    }

    #[tokio::test]
    async fn test_map_keeps_event_stream() {
        let hash = H256::from_bytes([3u8; 32]);
        let mut handle = TxHandle::drive(None, |r: &Receipt| Completion::Receipt(r.clone()), move |sink| async move {
            sink.submitted(hash);
            Ok(receipt(hash))
        })
        .map(|r| r.gas_used);
        let events = handle.subscribe().unwrap();
        assert_eq!(handle.await.unwrap(), 21000);
        let events: Vec<TxEvent> = events.collect().await;
        assert_eq!(events, vec![TxEvent::TransactionHash(hash)]);
    }

    #[test]
    fn test_outcome_accessors() {
        let outcome = TxOutcome::Value(Value::Bool(true));
        assert_eq!(outcome.value(), Some(&Value::Bool(true)));
        assert!(outcome.receipt().is_none());
    }
}
