//! The process-wide broadcast hub. Grounded on the teacher's
//! `tokio::sync::broadcast`-based subscription loop (`lib.rs::subscribe`),
//! but broadcast is lossy on lag (`RecvError::Lagged`) — unacceptable here,
//! since the coalescing law requires every commit's changes to reach every
//! matching subscriber. Each subscriber instead gets its own pump task with
//! a one-slot outgoing channel backed by an unbounded spillover buffer, so
//! producers never block and nothing is ever dropped.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use pathtree_core::{Matcher, ObservedChanges};
use tokio::sync::mpsc;

struct Subscriber {
	matcher: Matcher,
	incoming: mpsc::UnboundedSender<ObservedChanges>,
}

/// The shared subscriber map and dispatch logic. One instance per open
/// database.
pub struct ObserverHub {
	next_id: AtomicU64,
	subscribers: RwLock<HashMap<u64, Subscriber>>,
}

impl Default for ObserverHub {
	fn default() -> Self {
		ObserverHub { next_id: AtomicU64::new(0), subscribers: RwLock::new(HashMap::new()) }
	}
}

impl ObserverHub {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	/// Registers a new subscriber and spawns its delivery pump. The returned
	/// channel is primed with one empty `ObservedChanges` so the first
	/// receive can double as a readiness signal.
	pub fn observe(self: &Arc<Self>, matcher: Matcher) -> (mpsc::Receiver<ObservedChanges>, Subscription) {
		let id = self.next_id.fetch_add(1, Ordering::Relaxed);
		let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
		let (outgoing_tx, outgoing_rx) = mpsc::channel(1);

		incoming_tx.send(ObservedChanges::new()).ok();

		self.subscribers.write().unwrap_or_else(std::sync::PoisonError::into_inner).insert(
			id,
			Subscriber { matcher, incoming: incoming_tx },
		);

		tokio::spawn(pump(incoming_rx, outgoing_tx));

		(outgoing_rx, Subscription { hub: Arc::clone(self), id })
	}

	/// Dispatches a commit's coalesced changes to every matching subscriber.
	/// O(subscribers × changes), per the matcher filter applied to each.
	pub fn broadcast(&self, changes: &ObservedChanges) {
		if changes.is_empty() {
			return;
		}
		let subscribers = self.subscribers.read().unwrap_or_else(std::sync::PoisonError::into_inner);
		for subscriber in subscribers.values() {
			let filtered = changes.filter_for(&subscriber.matcher);
			if !filtered.is_empty() {
				subscriber.incoming.send(filtered).ok();
			}
		}
	}

	fn unsubscribe(&self, id: u64) {
		self.subscribers.write().unwrap_or_else(std::sync::PoisonError::into_inner).remove(&id);
	}
}

/// The cancellation handle for one subscription. Dropping the subscriber's
/// incoming sender (by removing it from the map) closes the spillover input;
/// the pump then drains whatever is buffered and closes the outgoing
/// channel on its own.
pub struct Subscription {
	hub: Arc<ObserverHub>,
	id: u64,
}

impl Subscription {
	/// Idempotent: a second call is a no-op.
	pub fn cancel(&self) {
		self.hub.unsubscribe(self.id);
	}
}

async fn pump(mut incoming: mpsc::UnboundedReceiver<ObservedChanges>, outgoing: mpsc::Sender<ObservedChanges>) {
	let mut buffer: VecDeque<ObservedChanges> = VecDeque::new();
	let mut incoming_open = true;

	loop {
		if buffer.is_empty() {
			if !incoming_open {
				break;
			}
			match incoming.recv().await {
				Some(item) => buffer.push_back(item),
				None => break,
			}
			continue;
		}

		if !incoming_open {
			let Some(item) = buffer.pop_front() else { break };
			if outgoing.send(item).await.is_err() {
				return;
			}
			continue;
		}

		let Some(head) = buffer.front().cloned() else { unreachable!("buffer checked non-empty above") };
		tokio::select! {
			biased;
			sent = outgoing.send(head) => {
				if sent.is_err() {
					return;
				}
				buffer.pop_front();
			}
			item = incoming.recv() => {
				match item {
					Some(item) => buffer.push_back(item),
					None => incoming_open = false,
				}
			}
		}
	}
}


// vim: ts=4
