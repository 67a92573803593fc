// Copyright (c) 2022 RBB S.r.l
// opensource@mintlayer.org
// SPDX-License-Identifier: MIT
// Licensed under the MIT License;
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// https://github.com/mintlayer/mintlayer-core/blob/master/LICENSE
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Listener registries whose callbacks run on a chosen [Executor].
//!
//! Each registration carries the executor its callback is handed to. Registries are fired
//! without holding the lock of the object that owns them, so a listener is free to call back
//! into that object even on a [SameThreadExecutor].

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use logging::log;
use parking_lot::{Condvar, Mutex, RwLock};

pub type Task = Box<dyn FnOnce() + Send + 'static>;

pub type EventHandler<E> = Arc<dyn Fn(E) + Send + Sync>;

/// Something that can run tasks.
pub trait Executor: Send + Sync {
    fn execute(&self, task: Task);
}

/// Runs the task immediately on the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct SameThreadExecutor;

impl Executor for SameThreadExecutor {
    fn execute(&self, task: Task) {
        task()
    }
}

#[derive(Default)]
struct PendingTasks {
    count: Mutex<usize>,
    drained: Condvar,
}

impl PendingTasks {
    fn increment(&self) {
        *self.count.lock() += 1;
    }

    fn decrement(&self) {
        let mut count = self.count.lock();
        *count -= 1;
        if *count == 0 {
            self.drained.notify_all();
        }
    }

    fn wait_for_zero(&self) {
        let mut count = self.count.lock();
        while *count > 0 {
            self.drained.wait(&mut count);
        }
    }
}

/// A sequential executor backed by a single background thread.
///
/// Tasks run one at a time in submission order.
pub struct UserThread {
    pool: slave_pool::ThreadPool,
    pending: Arc<PendingTasks>,
}

impl UserThread {
    pub fn new() -> std::io::Result<Self> {
        let pool = slave_pool::ThreadPool::new();
        // More than one thread would allow tasks to overtake each other
        pool.set_threads(1)?;
        Ok(Self {
            pool,
            pending: Arc::new(PendingTasks::default()),
        })
    }

    /// Block until every task submitted so far has finished.
    pub fn wait_for_all_events(&self) {
        self.pending.wait_for_zero();
    }
}

impl Executor for UserThread {
    fn execute(&self, task: Task) {
        self.pending.increment();
        let pending = Arc::clone(&self.pending);
        self.pool.spawn(move || {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(task));
            if result.is_err() {
                log::error!("A task running on the user thread panicked");
            }
            pending.decrement();
        });
    }
}

/// Identifies a listener. Ids are unique process-wide, so one listener can be registered with
/// several registries under the same id and later removed from all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    pub fn new() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(0);
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ListenerId {
    fn default() -> Self {
        Self::new()
    }
}

struct Registration<E> {
    id: ListenerId,
    handler: EventHandler<E>,
    executor: Arc<dyn Executor>,
}

impl<E> Clone for Registration<E> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            handler: Arc::clone(&self.handler),
            executor: Arc::clone(&self.executor),
        }
    }
}

/// A copy-on-write list of (listener, executor) pairs.
///
/// Broadcasting iterates over a snapshot, so listeners may be added or removed concurrently
/// (including from inside a listener) without affecting an event that is already being fired.
pub struct ListenerRegistry<E> {
    registrations: RwLock<Arc<Vec<Registration<E>>>>,
}

impl<E: Clone + Send + 'static> ListenerRegistry<E> {
    pub fn new() -> Self {
        Self {
            registrations: RwLock::new(Arc::new(Vec::new())),
        }
    }

    pub fn add(&self, handler: EventHandler<E>, executor: Arc<dyn Executor>) -> ListenerId {
        let id = ListenerId::new();
        self.add_with_id(id, handler, executor);
        id
    }

    /// Register a listener under an id obtained elsewhere. A registration with the same id is
    /// replaced.
    pub fn add_with_id(&self, id: ListenerId, handler: EventHandler<E>, executor: Arc<dyn Executor>) {
        let mut registrations = self.registrations.write();
        let mut updated: Vec<_> = registrations.iter().filter(|r| r.id != id).cloned().collect();
        updated.push(Registration {
            id,
            handler,
            executor,
        });
        *registrations = Arc::new(updated);
    }

    /// Register every listener of `other` here as well, keeping their ids and executors.
    pub fn copy_from(&self, other: &ListenerRegistry<E>) {
        let snapshot = Arc::clone(&other.registrations.read());
        for registration in snapshot.iter() {
            self.add_with_id(
                registration.id,
                Arc::clone(&registration.handler),
                Arc::clone(&registration.executor),
            );
        }
    }

    /// Returns `true` if the listener was registered.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut registrations = self.registrations.write();
        if !registrations.iter().any(|r| r.id == id) {
            return false;
        }
        let updated: Vec<_> = registrations.iter().filter(|r| r.id != id).cloned().collect();
        *registrations = Arc::new(updated);
        true
    }

    pub fn len(&self) -> usize {
        self.registrations.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Queue `event` to every registered listener on its executor.
    pub fn broadcast(&self, event: E) {
        let snapshot = Arc::clone(&self.registrations.read());
        for registration in snapshot.iter() {
            let handler = Arc::clone(&registration.handler);
            let event = event.clone();
            registration.executor.execute(Box::new(move || handler(event)));
        }
    }
}

impl<E: Clone + Send + 'static> Default for ListenerRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}
