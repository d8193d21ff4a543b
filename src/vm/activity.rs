// Oryx Activities
// An activity is one thread of execution. Activities block on their own
// parker, never on the object they are waiting for; guard reservations and
// variable dependents only decide who gets unparked.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub type ActivityId = u64;

static NEXT_ACTIVITY: AtomicU64 = AtomicU64::new(1);

/// Token-based parking primitive. An unpark that arrives before the matching
/// park leaves a token behind, so the wake-up is never lost.
#[derive(Default)]
struct Parker {
    token: Mutex<bool>,
    cv: Condvar,
}

impl Parker {
    fn park(&self) {
        let mut token = self.token.lock();
        while !*token {
            self.cv.wait(&mut token);
        }
        *token = false;
    }

    fn unpark(&self) {
        let mut token = self.token.lock();
        *token = true;
        self.cv.notify_one();
    }
}

pub struct Activity {
    id: ActivityId,
    name: String,
    parker: Parker,
}

impl Activity {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_ACTIVITY.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            parker: Parker::default(),
        })
    }

    pub fn id(&self) -> ActivityId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Block until another activity unparks us (or consume a pending wake-up)
    pub fn park(&self) {
        self.parker.park();
    }

    pub fn unpark(&self) {
        self.parker.unpark();
    }
}

impl std::fmt::Debug for Activity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Activity#{}({})", self.id, self.name)
    }
}

#[derive(Default)]
struct ReservationState {
    owner: Option<Arc<Activity>>,
    count: usize,
    waiters: VecDeque<Arc<Activity>>,
}

/// The guard lock of one (object, scope) pair.
///
/// Reentrant for the owning activity; other activities queue FIFO and are
/// handed ownership directly on release.
#[derive(Default)]
pub struct Reservation {
    state: Mutex<ReservationState>,
}

impl Reservation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reserve(&self, activity: &Arc<Activity>) {
        self.reserve_nested(activity, 1);
    }

    /// Acquire with a nesting count (used to restore a fully released guard)
    pub fn reserve_nested(&self, activity: &Arc<Activity>, count: usize) {
        {
            let mut state = self.state.lock();
            match state.owner.as_ref().map(|o| o.id()) {
                None => {
                    state.owner = Some(activity.clone());
                    state.count = count;
                    return;
                }
                Some(owner) if owner == activity.id() => {
                    state.count += count;
                    return;
                }
                Some(_) => state.waiters.push_back(activity.clone()),
            }
        }

        loop {
            activity.park();
            let mut state = self.state.lock();
            if state.owner.as_ref().map(|o| o.id()) == Some(activity.id()) {
                // handed over with a count of one
                state.count = count;
                return;
            }
        }
    }

    /// Drop one nesting level; returns false if `activity` is not the owner
    pub fn release(&self, activity: &Arc<Activity>) -> bool {
        let mut state = self.state.lock();
        if state.owner.as_ref().map(|o| o.id()) != Some(activity.id()) {
            return false;
        }
        state.count -= 1;
        if state.count == 0 {
            Self::hand_off(&mut state);
        }
        true
    }

    /// Release every nesting level held by `activity`, returning how many there were
    pub fn release_all(&self, activity: &Arc<Activity>) -> usize {
        let mut state = self.state.lock();
        if state.owner.as_ref().map(|o| o.id()) != Some(activity.id()) {
            return 0;
        }
        let count = state.count;
        state.count = 0;
        Self::hand_off(&mut state);
        count
    }

    fn hand_off(state: &mut ReservationState) {
        match state.waiters.pop_front() {
            Some(next) => {
                state.owner = Some(next.clone());
                state.count = 1;
                next.unpark();
            }
            None => state.owner = None,
        }
    }

    pub fn owner(&self) -> Option<ActivityId> {
        self.state.lock().owner.as_ref().map(|o| o.id())
    }

    pub fn is_held_by(&self, activity: &Activity) -> bool {
        self.owner() == Some(activity.id())
    }

    pub fn waiting(&self) -> usize {
        self.state.lock().waiters.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_unpark_before_park_is_kept() {
        let activity = Activity::new("main");
        activity.unpark();
        // would block forever if the token were lost
        activity.park();
    }

    #[test]
    fn test_reservation_is_reentrant() {
        let activity = Activity::new("main");
        let reservation = Reservation::new();
        reservation.reserve(&activity);
        reservation.reserve(&activity);
        assert!(reservation.is_held_by(&activity));
        assert!(reservation.release(&activity));
        assert!(reservation.is_held_by(&activity));
        assert!(reservation.release(&activity));
        assert_eq!(reservation.owner(), None);
    }

    #[test]
    fn test_release_by_non_owner_fails() {
        let a = Activity::new("a");
        let b = Activity::new("b");
        let reservation = Reservation::new();
        reservation.reserve(&a);
        assert!(!reservation.release(&b));
        assert!(reservation.is_held_by(&a));
    }

    #[test]
    fn test_waiter_gets_ownership_on_release() {
        let a = Activity::new("a");
        let reservation = Arc::new(Reservation::new());
        reservation.reserve(&a);

        let shared = reservation.clone();
        let handle = thread::spawn(move || {
            let b = Activity::new("b");
            shared.reserve(&b);
            let owned = shared.is_held_by(&b);
            shared.release(&b);
            owned
        });

        while reservation.waiting() == 0 {
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(reservation.release_all(&a), 1);
        assert!(handle.join().unwrap());
        assert_eq!(reservation.owner(), None);
    }
}
