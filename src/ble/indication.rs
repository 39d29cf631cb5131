//! Indication Timeout Tracking
//!
//! Bookkeeping for unacknowledged indications. Each slot owns a radio soft
//! timer slot id and bumps its generation on every start, so a fire queued for
//! an earlier indication never matches the one in flight. The manager arms and
//! disarms the radio timer and turns the outcomes into upper-layer events.

use embassy_time::Instant;

use crate::ble::radio::TimerId;

/// First soft timer slot used for indication timers, slot `n` uses `BASE + n`
pub const INDICATION_TIMER_BASE: u8 = 0x10;

/// An indication waiting for confirmation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndicationTimer {
    /// Connection the indication was sent on
    pub conn_handle: u16,
    /// Radio soft timer guarding the confirmation
    pub timer: TimerId,
    /// When the confirmation is considered lost
    pub deadline: Instant,
}

/// No timer could be started for the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NoSlot;

/// Per-connection indication timers, at most one per connection
pub struct IndicationTimeoutTracker<const N: usize> {
    slots: [Option<IndicationTimer>; N],
    generations: [u8; N],
}

impl<const N: usize> IndicationTimeoutTracker<N> {
    /// Slot ids must fit in the low byte of a `TimerId`
    const SLOTS_FIT: () = assert!(N <= (u8::MAX - INDICATION_TIMER_BASE) as usize + 1);

    pub const fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::SLOTS_FIT;
        Self {
            slots: [None; N],
            generations: [0; N],
        }
    }

    /// Timer id of a slot at a given generation
    pub const fn timer_for_slot(slot: usize, generation: u8) -> TimerId {
        TimerId::new(INDICATION_TIMER_BASE + slot as u8, generation)
    }

    /// Whether a timer id belongs to this tracker, whatever its generation
    pub fn owns(&self, timer: TimerId) -> bool {
        let slot = timer.slot();
        slot >= INDICATION_TIMER_BASE && ((slot - INDICATION_TIMER_BASE) as usize) < N
    }

    /// Reserve a timer for an indication sent on `conn_handle`
    pub fn start(&mut self, conn_handle: u16, deadline: Instant) -> Result<TimerId, NoSlot> {
        if self.pending(conn_handle).is_some() {
            warn!("INDICATION: Connection {} already has an indication in flight", conn_handle);
            return Err(NoSlot);
        }

        let Some(slot) = self.slots.iter().position(Option::is_none) else {
            error!("INDICATION: No free timer slot for connection {}", conn_handle);
            return Err(NoSlot);
        };

        let generation = self.generations[slot];
        self.generations[slot] = generation.wrapping_add(1);
        let timer = Self::timer_for_slot(slot, generation);
        self.slots[slot] = Some(IndicationTimer {
            conn_handle,
            timer,
            deadline,
        });

        debug!("INDICATION: Timer {} armed for connection {}", timer.0, conn_handle);
        Ok(timer)
    }

    /// Release the timer of a confirmed indication
    pub fn confirm(&mut self, conn_handle: u16) -> Option<IndicationTimer> {
        let released = self.take(conn_handle);
        if released.is_none() {
            // Late confirmation after a timeout already fired
            debug!("INDICATION: Confirmation on connection {} with no pending indication", conn_handle);
        }
        released
    }

    /// Release the slot owning a fired timer, `None` for stale fires
    pub fn on_timer_fired(&mut self, timer: TimerId) -> Option<IndicationTimer> {
        let Some(slot) = self
            .slots
            .iter()
            .position(|s| matches!(s, Some(t) if t.timer == timer))
        else {
            debug!("INDICATION: Ignoring stale timer {:#x}", timer.0);
            return None;
        };

        let expired = self.slots[slot].take();
        if let Some(t) = &expired {
            warn!("INDICATION: Confirmation timeout on connection {}", t.conn_handle);
        }
        expired
    }

    /// Drop any pending timer for a connection without reporting it
    pub fn cancel(&mut self, conn_handle: u16) -> Option<IndicationTimer> {
        self.take(conn_handle)
    }

    /// Pending indication of a connection
    pub fn pending(&self, conn_handle: u16) -> Option<&IndicationTimer> {
        self.slots
            .iter()
            .flatten()
            .find(|t| t.conn_handle == conn_handle)
    }

    /// Number of armed timers
    pub fn active_count(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    fn take(&mut self, conn_handle: u16) -> Option<IndicationTimer> {
        self.slots
            .iter_mut()
            .find(|s| matches!(s, Some(t) if t.conn_handle == conn_handle))
            .and_then(Option::take)
    }
}

impl<const N: usize> Default for IndicationTimeoutTracker<N> {
    fn default() -> Self {
        Self::new()
    }
}
