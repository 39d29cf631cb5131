//! Connection Management
//!
//! Fixed-capacity table of live CHIPoBLE connections. Slots are allocated
//! first-free and owned exclusively by the manager.

/// Per-connection record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnectionState {
    /// Connection handle assigned by the radio
    pub conn_handle: u16,
    /// Bonding handle reported with the connection
    pub bonding_handle: u8,
    /// Indications enabled on the TX characteristic
    pub subscribed: bool,
    /// Negotiated ATT MTU, 0 until exchanged
    pub mtu: u16,
    /// Slot in use
    pub allocated: bool,
    pub(crate) close_requested: bool,
}

impl ConnectionState {
    const EMPTY: Self = Self {
        conn_handle: 0,
        bonding_handle: 0,
        subscribed: false,
        mtu: 0,
        allocated: false,
        close_requested: false,
    };

    /// Whether the local side asked the radio to close this link
    pub fn close_requested(&self) -> bool {
        self.close_requested
    }
}

/// Connection management errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectionError {
    /// Every slot is allocated
    TableFull,
    /// The handle is already tracked
    DuplicateHandle,
    /// No connection with that handle
    ConnectionNotFound,
}

/// Fixed pool of connection records
pub struct ConnectionTable<const N: usize> {
    slots: [ConnectionState; N],
}

impl<const N: usize> ConnectionTable<N> {
    pub const fn new() -> Self {
        Self {
            slots: [ConnectionState::EMPTY; N],
        }
    }

    /// Allocate the first free slot for a new connection
    pub fn add(&mut self, conn_handle: u16, bonding_handle: u8) -> Result<usize, ConnectionError> {
        if self.find(conn_handle).is_some() {
            warn!("CONNECTION: Handle {} already tracked", conn_handle);
            return Err(ConnectionError::DuplicateHandle);
        }

        let Some(slot) = self.slots.iter().position(|s| !s.allocated) else {
            error!("CONNECTION: Failed to add connection {} - table full", conn_handle);
            return Err(ConnectionError::TableFull);
        };

        self.slots[slot] = ConnectionState {
            conn_handle,
            bonding_handle,
            allocated: true,
            ..ConnectionState::EMPTY
        };

        debug!("CONNECTION: Added connection {} in slot {}", conn_handle, slot);
        Ok(slot)
    }

    /// Free the slot of a connection, returning whether it existed
    pub fn remove(&mut self, conn_handle: u16) -> bool {
        match self.slot_of(conn_handle) {
            Some(slot) => {
                self.slots[slot] = ConnectionState::EMPTY;
                debug!("CONNECTION: Removed connection {} from slot {}", conn_handle, slot);
                true
            }
            None => false,
        }
    }

    /// Get connection state by handle
    pub fn find(&self, conn_handle: u16) -> Option<&ConnectionState> {
        self.slots.iter().find(|s| s.allocated && s.conn_handle == conn_handle)
    }

    /// Get mutable connection state by handle
    pub fn find_mut(&mut self, conn_handle: u16) -> Option<&mut ConnectionState> {
        self.slots
            .iter_mut()
            .find(|s| s.allocated && s.conn_handle == conn_handle)
    }

    /// Number of allocated slots
    pub fn count(&self) -> usize {
        self.slots.iter().filter(|s| s.allocated).count()
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn is_full(&self) -> bool {
        self.count() >= N
    }

    /// Iterate over allocated connections
    pub fn iter(&self) -> impl Iterator<Item = &ConnectionState> + '_ {
        self.slots.iter().filter(|s| s.allocated)
    }

    fn slot_of(&self, conn_handle: u16) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.allocated && s.conn_handle == conn_handle)
    }
}

impl<const N: usize> Default for ConnectionTable<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_free_slot_is_reused() {
        let mut table = ConnectionTable::<3>::new();
        assert_eq!(table.add(10, 0), Ok(0));
        assert_eq!(table.add(11, 0), Ok(1));
        assert_eq!(table.add(12, 0), Ok(2));

        assert!(table.remove(11));
        assert_eq!(table.add(13, 1), Ok(1));
        assert_eq!(table.find(13).map(|c| c.bonding_handle), Some(1));
    }

    #[test]
    fn test_new_connection_starts_clean() {
        let mut table = ConnectionTable::<1>::new();
        table.add(5, 2).unwrap();
        {
            let conn = table.find_mut(5).unwrap();
            conn.subscribed = true;
            conn.mtu = 185;
            conn.close_requested = true;
        }
        assert!(table.remove(5));

        table.add(6, 0).unwrap();
        let conn = table.find(6).unwrap();
        assert!(!conn.subscribed);
        assert_eq!(conn.mtu, 0);
        assert!(!conn.close_requested());
    }

    #[test]
    fn test_duplicate_handle_rejected() {
        let mut table = ConnectionTable::<2>::new();
        table.add(7, 0).unwrap();
        assert_eq!(table.add(7, 0), Err(ConnectionError::DuplicateHandle));
        assert_eq!(table.count(), 1);
    }
}
