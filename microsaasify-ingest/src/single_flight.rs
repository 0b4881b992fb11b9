//! Coalescing of concurrent operations on the same key.
//!
//! The first caller for a key spawns the operation on the runtime; every
//! caller that arrives while it is running gets a clone of the same shared
//! future and therefore the same result. The spawned task runs to completion
//! even if every caller stops waiting, and removes its own entry when done.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinError;

/// A running operation; await it to get the shared result.
pub type Flight<T, E> = Shared<BoxFuture<'static, Result<T, E>>>;

struct Entry<T, E> {
    id: u64,
    flight: Flight<T, E>,
}

type FlightMap<K, T, E> = Arc<Mutex<HashMap<K, Entry<T, E>>>>;

pub struct SingleFlight<K, T, E> {
    flights: FlightMap<K, T, E>,
    next_id: AtomicU64,
}

impl<K, T, E> Default for SingleFlight<K, T, E> {
    fn default() -> Self {
        Self {
            flights: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }
}

fn lock<K, T, E>(
    flights: &Mutex<HashMap<K, Entry<T, E>>>,
) -> MutexGuard<'_, HashMap<K, Entry<T, E>>> {
    flights.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<K, T, E> SingleFlight<K, T, E>
where
    K: Eq + Hash + Clone + Send + 'static,
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + From<JoinError> + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Joins the flight running for `key`, or starts one with `make`.
    ///
    /// Returns the flight and whether this call started it. `make` is only
    /// invoked when no flight is running. Must be called within a tokio runtime.
    pub fn run<F, Fut>(&self, key: K, make: F) -> (Flight<T, E>, bool)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let mut flights = lock(&self.flights);
        if let Some(entry) = flights.get(&key) {
            return (entry.flight.clone(), false);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let operation = make();
        let registry = Arc::clone(&self.flights);
        let task_key = key.clone();

        let handle = tokio::spawn(async move {
            let result = operation.await;
            let mut flights = lock(&registry);
            if flights.get(&task_key).is_some_and(|e| e.id == id) {
                flights.remove(&task_key);
            }
            result
        });

        let flight = async move {
            match handle.await {
                Ok(result) => result,
                Err(join_err) => Err(E::from(join_err)),
            }
        }
        .boxed()
        .shared();

        flights.insert(
            key,
            Entry {
                id,
                flight: flight.clone(),
            },
        );
        (flight, true)
    }

    /// Returns the running flight for `key`, if any.
    pub fn get(&self, key: &K) -> Option<Flight<T, E>> {
        lock(&self.flights).get(key).map(|e| e.flight.clone())
    }

    pub fn in_flight(&self, key: &K) -> bool {
        lock(&self.flights).contains_key(key)
    }

    /// Whether any running flight's key matches `pred`.
    pub fn any_in_flight(&self, pred: impl Fn(&K) -> bool) -> bool {
        lock(&self.flights).keys().any(pred)
    }

    /// Number of running flights.
    pub fn len(&self) -> usize {
        lock(&self.flights).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
