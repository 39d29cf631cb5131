mod common;

use std::collections::BTreeSet;

use chipoble_manager::ble::connection::{ConnectionError, ConnectionTable};
use chipoble_manager::config::MAX_CONNECTIONS;
use chipoble_manager::error::BleError;
use proptest::prelude::*;

mod tests {
    use chipoble_manager::ble::events::ConnectionErrorReason;
    use chipoble_manager::ble::gatt::{HCI_LOCAL_HOST_TERMINATED, HCI_REMOTE_USER_TERMINATED};

    use super::*;
    use crate::common::*;

    #[test]
    fn test_connection_pool_management() {
        let mut table = ConnectionTable::<MAX_CONNECTIONS>::new();

        for handle in 0..MAX_CONNECTIONS as u16 {
            assert!(table.add(handle, 0).is_ok(), "Failed to add connection {}", handle);
        }
        assert!(table.is_full());
        assert_eq!(table.add(99, 0), Err(ConnectionError::TableFull));
        assert_eq!(BleError::from(ConnectionError::TableFull), BleError::ResourceExhausted);

        assert!(table.remove(1));
        assert!(!table.remove(1), "Handle removed twice");
        assert_eq!(table.add(100, 0), Ok(1));
        assert_eq!(table.count(), MAX_CONNECTIONS);
    }

    #[test]
    fn test_manager_tracks_opened_connections() {
        let mut manager = booted_manager();
        open(&mut manager, 3);
        open(&mut manager, 4);

        assert_eq!(manager.connection_count(), 2);
        let conn = manager.connection(3).unwrap();
        assert!(!conn.subscribed);
        assert_eq!(conn.mtu, 0);

        // Table full, third link is not tracked
        open(&mut manager, 5);
        assert_eq!(manager.connection_count(), 2);
        assert!(manager.connection(5).is_none());
    }

    #[test]
    fn test_remote_disconnect_reported() {
        let mut manager = booted_manager();
        open(&mut manager, 1);
        manager.listener_mut().events.clear();

        close(&mut manager, 1, HCI_REMOTE_USER_TERMINATED);

        assert_eq!(manager.connection_count(), 0);
        assert_eq!(
            manager.listener_mut().take(),
            vec![TransportEvent::ConnectionError(1, ConnectionErrorReason::RemoteDisconnect)]
        );
    }

    #[test]
    fn test_local_host_termination_reported_as_local() {
        let mut manager = booted_manager();
        open(&mut manager, 1);
        manager.listener_mut().events.clear();

        close(&mut manager, 1, HCI_LOCAL_HOST_TERMINATED);

        assert_eq!(
            manager.listener_mut().take(),
            vec![TransportEvent::ConnectionError(1, ConnectionErrorReason::LocalDisconnect)]
        );
    }

    #[test]
    fn test_requested_close_reported_as_local() {
        let mut manager = booted_manager();
        open(&mut manager, 2);
        manager.listener_mut().events.clear();

        manager.close_connection(2).unwrap();
        assert!(manager.radio().calls.contains(&RadioCall::CloseConnection(2)));
        assert!(manager.connection(2).unwrap().close_requested());
        // Still tracked until the radio reports the closure
        assert_eq!(manager.connection_count(), 1);

        // Radio reports a generic reason code
        close(&mut manager, 2, HCI_REMOTE_USER_TERMINATED);
        assert_eq!(
            manager.listener_mut().take(),
            vec![TransportEvent::ConnectionError(2, ConnectionErrorReason::LocalDisconnect)]
        );
    }

    #[test]
    fn test_close_unknown_connection() {
        let mut manager = booted_manager();
        assert_eq!(manager.close_connection(9), Err(BleError::InvalidArgument));
        assert!(manager.radio().calls.is_empty());
    }

    #[test]
    fn test_close_failure_clears_request() {
        let mut manager = booted_manager();
        open(&mut manager, 1);
        manager.radio_mut().fail_close = Some(chipoble_manager::SdStatus::INVALID_STATE);

        assert_eq!(manager.close_connection(1), Err(BleError::IncorrectState));
        assert!(!manager.connection(1).unwrap().close_requested());
    }

    #[test]
    fn test_close_of_untracked_connection_is_ignored() {
        let mut manager = booted_manager();
        open(&mut manager, 1);
        manager.listener_mut().events.clear();

        close(&mut manager, 7, HCI_REMOTE_USER_TERMINATED);
        assert_eq!(manager.connection_count(), 1);
        assert!(manager.listener().events.is_empty());
    }

    #[test]
    fn test_mtu_lookup() {
        let mut manager = booted_manager();
        open(&mut manager, 1);

        // Unknown connection
        assert_eq!(manager.get_mtu(8), 0);

        // Falls back to the radio until an exchange is seen
        manager.radio_mut().negotiated_mtu = 23;
        assert_eq!(manager.get_mtu(1), 23);

        manager.handle_event(chipoble_manager::RadioEvent::MtuExchanged { conn_handle: 1, mtu: 247 });
        assert_eq!(manager.get_mtu(1), 247);
        assert_eq!(manager.connection(1).unwrap().mtu, 247);
    }

    proptest! {
        #[test]
        fn test_connection_state_consistency(
            ops in prop::collection::vec((any::<bool>(), 0u16..6), 1..40)
        ) {
            let mut table = ConnectionTable::<3>::new();
            let mut model = BTreeSet::new();

            for (add, handle) in ops {
                if add {
                    let result = table.add(handle, 0);
                    if model.contains(&handle) {
                        prop_assert_eq!(result, Err(ConnectionError::DuplicateHandle));
                    } else if model.len() == 3 {
                        prop_assert_eq!(result, Err(ConnectionError::TableFull));
                    } else {
                        prop_assert!(result.is_ok());
                        model.insert(handle);
                    }
                } else {
                    prop_assert_eq!(table.remove(handle), model.remove(&handle));
                }

                prop_assert_eq!(table.count(), model.len());
                prop_assert!(table.count() <= table.capacity());
                for handle in 0u16..6 {
                    prop_assert_eq!(table.find(handle).is_some(), model.contains(&handle));
                }
            }
        }
    }

    proptest! {
        #[test]
        fn test_connection_handle_uniqueness(
            handles in prop::collection::vec(0u16..100, 1..10)
        ) {
            let mut table = ConnectionTable::<4>::new();
            for handle in handles {
                let _ = table.add(handle, 0);
            }

            let tracked: Vec<u16> = table.iter().map(|c| c.conn_handle).collect();
            let unique: BTreeSet<u16> = tracked.iter().copied().collect();
            prop_assert_eq!(tracked.len(), unique.len());
        }
    }
}
