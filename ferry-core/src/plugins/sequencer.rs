//! Per-name operation ordering
//!
//! Every load/unload for a plugin name takes a [`Ticket`] at the moment the
//! request is accepted. Tickets for the same name are served strictly in
//! issue order; different names never wait on each other.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

struct SlotState {
    next: u64,
    serving: u64,
    /// Tickets dropped before their turn, skipped when reached
    abandoned: BTreeSet<u64>,
}

struct Slot {
    state: Mutex<SlotState>,
    serving: watch::Sender<u64>,
}

impl Slot {
    fn new() -> Self {
        let (serving, _) = watch::channel(0);
        Self {
            state: Mutex::new(SlotState {
                next: 0,
                serving: 0,
                abandoned: BTreeSet::new(),
            }),
            serving,
        }
    }

    fn issue(&self) -> u64 {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let number = state.next;
        state.next += 1;
        number
    }

    fn finish(&self, number: u64) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if number != state.serving {
            state.abandoned.insert(number);
            return;
        }

        state.serving += 1;
        loop {
            let serving = state.serving;
            if !state.abandoned.remove(&serving) {
                break;
            }
            state.serving += 1;
        }
        self.serving.send_replace(state.serving);
    }

    fn is_idle(&self) -> bool {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.serving == state.next
    }
}

/// Issues per-name tickets
#[derive(Default)]
pub struct Sequencer {
    slots: Mutex<HashMap<String, Arc<Slot>>>,
}

impl Sequencer {
    /// Create a sequencer with no outstanding tickets
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the next ticket for `name`
    pub fn ticket(&self, name: &str) -> Ticket {
        let mut slots = self.lock_pruned();
        issue(&mut slots, name)
    }

    /// Take tickets for two names as one step.
    ///
    /// No other caller can take a ticket for either name in between, so
    /// two-name operations are ordered consistently with single-name ones.
    pub fn ticket_pair(&self, first: &str, second: &str) -> (Ticket, Ticket) {
        let mut slots = self.lock_pruned();
        let first = issue(&mut slots, first);
        let second = issue(&mut slots, second);
        (first, second)
    }

    fn lock_pruned(&self) -> MutexGuard<'_, HashMap<String, Arc<Slot>>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.retain(|_, slot| Arc::strong_count(slot) > 1 || !slot.is_idle());
        slots
    }

    /// Number of names with outstanding tickets
    #[cfg(test)]
    fn active_names(&self) -> usize {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.values().filter(|slot| !slot.is_idle()).count()
    }
}

fn issue(slots: &mut HashMap<String, Arc<Slot>>, name: &str) -> Ticket {
    let slot = slots
        .entry(name.to_string())
        .or_insert_with(|| Arc::new(Slot::new()))
        .clone();
    let number = slot.issue();
    Ticket {
        name: name.to_string(),
        number,
        slot,
    }
}

/// A place in the queue for one name.
///
/// Dropping a ticket (waited on or not) gives up its place.
pub struct Ticket {
    name: String,
    number: u64,
    slot: Arc<Slot>,
}

impl Ticket {
    /// Name this ticket orders
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Position in the name's queue
    pub fn number(&self) -> u64 {
        self.number
    }

    /// Wait until every earlier ticket for the name has been dropped
    pub async fn wait(self) -> TicketGuard {
        let mut serving = self.slot.serving.subscribe();
        let number = self.number;
        if serving.wait_for(|current| *current >= number).await.is_err() {
            tracing::warn!(plugin = %self.name, "Sequencer slot closed while waiting");
        }
        TicketGuard { ticket: self }
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        self.slot.finish(self.number);
    }
}

impl std::fmt::Debug for Ticket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ticket")
            .field("name", &self.name)
            .field("number", &self.number)
            .finish()
    }
}

/// Exclusive turn for a name; the next ticket is served when this drops
#[derive(Debug)]
pub struct TicketGuard {
    ticket: Ticket,
}

impl TicketGuard {
    /// Name this guard holds
    pub fn name(&self) -> &str {
        self.ticket.name()
    }
}
