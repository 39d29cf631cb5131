//! BLE Transport Implementation
//!
//! CHIPoBLE connection management on top of a vendor radio stack: the
//! connection table, indication confirmation timers, the advertising tier
//! state machine and the event plumbing between radio context and the
//! protocol task.

pub mod adv_data;
pub mod advertising;
pub mod connection;
pub mod dispatcher;
pub mod events;
pub mod gatt;
pub mod indication;
pub mod manager;
pub mod radio;
