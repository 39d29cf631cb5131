//! BLE Advertising Controller
//!
//! Advertising tier state machine for CHIPoBLE. Advertising starts in the fast
//! tier, drops to the slow tier after the fast window and, when configured,
//! to the extended tier after the slow window. The windows only run while no
//! central is connected. [`AdvertisingController::drive_state`] is the single
//! place that reconciles the wanted state with the radio.

use crate::ble::adv_data::{self, AdvertisingPayload, DeviceIdentification, DeviceName};
use crate::ble::radio::{self, AdvertisingParams, RadioService, TimerId};
use crate::config::{BleConfig, FullTablePolicy, IntervalRange};
use crate::error::BleError;

/// Soft timer slot driving tier escalation
pub const ADV_ESCALATION_SLOT: u8 = 0x01;

/// Advertising cadence tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AdvertisingTier {
    Fast,
    Slow,
    Extended,
}

/// Requested advertising mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AdvertisingMode {
    Fast,
    Slow,
}

/// CHIPoBLE service mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ServiceMode {
    Enabled,
    Disabled,
}

/// Observable advertising state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AdvertisingState {
    /// CHIPoBLE service disabled
    Disabled,
    /// Service enabled, radio not advertising
    Off,
    FastAdvertising,
    SlowAdvertising,
    ExtendedAdvertising,
}

/// Inputs owned by other components that decide the wanted state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriveInputs {
    /// Radio stack reported boot
    pub stack_ready: bool,
    /// Live connections
    pub connection_count: usize,
    /// Connection table capacity
    pub max_connections: usize,
}

/// What the radio is currently doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
struct ActiveAdvertising {
    tier: AdvertisingTier,
    connectable: bool,
}

/// Advertising controller state
pub struct AdvertisingController {
    fast_interval: IntervalRange,
    slow_interval: IntervalRange,
    extended_interval: IntervalRange,
    fast_window: embassy_time::Duration,
    slow_window: Option<embassy_time::Duration>,
    when_full: FullTablePolicy,
    rotate_random_address: bool,
    identification: DeviceIdentification,
    generated_name: DeviceName,
    explicit_name: Option<DeviceName>,

    service_mode: ServiceMode,
    /// Set by a fatal configuration failure, blocks re-enabling the service
    faulted: bool,
    advertising_enabled: bool,
    mode: AdvertisingMode,
    /// Tier to advertise in when advertising
    tier: AdvertisingTier,
    /// Tier whose escalation timer is armed, with the id it was armed under
    armed_for: Option<(AdvertisingTier, TimerId)>,
    /// Generation for the next escalation timer
    escalation_generation: u8,
    /// What the radio was last told to do
    active: Option<ActiveAdvertising>,
    /// Payload or timing changed while advertising
    refresh_needed: bool,
    /// Next start begins a new advertising session
    new_session: bool,
}

impl AdvertisingController {
    pub fn new(config: &BleConfig) -> Result<Self, BleError> {
        let generated_name = adv_data::generated_device_name(
            config.device_name_prefix,
            config.discriminator,
            config.device_name_suffix_len,
        )?;

        Ok(Self {
            fast_interval: config.fast_interval,
            slow_interval: config.slow_interval,
            extended_interval: config.extended_interval,
            fast_window: config.fast_window,
            slow_window: config.slow_window,
            when_full: config.when_full,
            rotate_random_address: config.rotate_random_address,
            identification: DeviceIdentification {
                discriminator: config.discriminator,
                vendor_id: config.vendor_id,
                product_id: config.product_id,
                additional_data: config.additional_data,
            },
            generated_name,
            explicit_name: None,
            service_mode: ServiceMode::Enabled,
            faulted: false,
            advertising_enabled: false,
            mode: AdvertisingMode::Fast,
            tier: AdvertisingTier::Fast,
            armed_for: None,
            escalation_generation: 0,
            active: None,
            refresh_needed: false,
            new_session: true,
        })
    }

    /// Current observable state
    pub fn state(&self) -> AdvertisingState {
        if self.service_mode != ServiceMode::Enabled {
            return AdvertisingState::Disabled;
        }
        match self.active {
            None => AdvertisingState::Off,
            Some(ActiveAdvertising { tier: AdvertisingTier::Fast, .. }) => AdvertisingState::FastAdvertising,
            Some(ActiveAdvertising { tier: AdvertisingTier::Slow, .. }) => AdvertisingState::SlowAdvertising,
            Some(ActiveAdvertising {
                tier: AdvertisingTier::Extended,
                ..
            }) => AdvertisingState::ExtendedAdvertising,
        }
    }

    /// Radio is advertising
    pub fn is_advertising(&self) -> bool {
        self.active.is_some()
    }

    /// Tier of the running advertisement
    pub fn active_tier(&self) -> Option<AdvertisingTier> {
        self.active.map(|a| a.tier)
    }

    /// Whether the running advertisement accepts connections
    pub fn is_connectable(&self) -> Option<bool> {
        self.active.map(|a| a.connectable)
    }

    pub fn service_mode(&self) -> ServiceMode {
        self.service_mode
    }

    pub fn is_advertising_enabled(&self) -> bool {
        self.advertising_enabled
    }

    pub fn mode(&self) -> AdvertisingMode {
        self.mode
    }

    /// Device name placed in the scan response
    pub fn device_name(&self) -> &str {
        match &self.explicit_name {
            Some(name) => name.as_str(),
            None => self.generated_name.as_str(),
        }
    }

    /// Change the service mode; re-enabling after a fatal failure is refused
    pub fn set_service_mode<R: RadioService>(&mut self, mode: ServiceMode, radio: &mut R) -> Result<(), BleError> {
        if mode == ServiceMode::Enabled && self.faulted {
            warn!("ADVERTISING: Service faulted earlier, refusing to re-enable");
            return Err(BleError::IncorrectState);
        }
        if mode != self.service_mode {
            info!("ADVERTISING: Service mode {:?}", mode);
            self.service_mode = mode;
            match mode {
                ServiceMode::Enabled => self.new_session = true,
                ServiceMode::Disabled => {
                    self.disarm(radio);
                    self.reset_tier();
                }
            }
        }
        Ok(())
    }

    /// Turn advertising on or off
    pub fn set_advertising_enabled<R: RadioService>(&mut self, enabled: bool, radio: &mut R) -> Result<(), BleError> {
        if self.service_mode != ServiceMode::Enabled {
            return Err(BleError::IncorrectState);
        }
        if enabled == self.advertising_enabled {
            return Ok(());
        }

        debug!("ADVERTISING: {}", if enabled { "enable requested" } else { "disable requested" });
        self.advertising_enabled = enabled;
        if enabled {
            self.new_session = true;
        } else {
            self.disarm(radio);
        }
        self.reset_tier();
        Ok(())
    }

    /// Restart in the given mode
    pub fn set_advertising_mode<R: RadioService>(&mut self, mode: AdvertisingMode, radio: &mut R) {
        self.mode = mode;
        self.disarm(radio);
        self.reset_tier();
        self.refresh_needed = true;
    }

    /// Set an explicit device name, `None` or empty reverts to the generated one
    pub fn set_device_name(&mut self, name: Option<&str>) -> Result<(), BleError> {
        self.explicit_name = match name {
            Some(name) if !name.is_empty() => Some(adv_data::device_name_from(name)?),
            _ => None,
        };
        self.refresh_needed = true;
        Ok(())
    }

    /// The link layer stops connectable advertising when a central connects
    pub fn on_connection_opened(&mut self) {
        if let Some(active) = self.active {
            if active.connectable {
                debug!("ADVERTISING: Stopped by incoming connection");
                self.active = None;
            }
        }
    }

    /// Escalation timer currently armed
    pub fn escalation_timer(&self) -> Option<TimerId> {
        self.armed_for.map(|(_, timer)| timer)
    }

    /// Handle a fired soft timer, returns false for timers it does not own
    pub fn on_timer_fired(&mut self, timer: TimerId) -> bool {
        if timer.slot() != ADV_ESCALATION_SLOT {
            return false;
        }

        let armed = match self.armed_for {
            Some((tier, armed_timer)) if armed_timer == timer => tier,
            _ => {
                debug!("ADVERTISING: Ignoring stale escalation timer {:#x}", timer.0);
                return true;
            }
        };
        self.armed_for = None;

        match armed {
            AdvertisingTier::Fast if self.tier == AdvertisingTier::Fast => {
                info!("ADVERTISING: Fast window elapsed, moving to slow tier");
                self.tier = AdvertisingTier::Slow;
            }
            AdvertisingTier::Slow if self.tier == AdvertisingTier::Slow && self.slow_window.is_some() => {
                info!("ADVERTISING: Slow window elapsed, moving to extended tier");
                self.tier = AdvertisingTier::Extended;
            }
            _ => debug!("ADVERTISING: Escalation timer for {:?} tier no longer applies", armed),
        }
        true
    }

    /// Payload for a tier, vendor and product ids are hidden in the extended tier
    pub fn payload_for(&self, tier: AdvertisingTier) -> Result<AdvertisingPayload, BleError> {
        let id = match tier {
            AdvertisingTier::Extended => self.identification.redacted(),
            _ => self.identification,
        };
        adv_data::build_payload(&id, self.device_name())
    }

    /// Bring the radio to the wanted advertising state
    ///
    /// Issues nothing when the radio already matches. Any failure to configure
    /// or start advertising disables the service for the rest of the session.
    pub fn drive_state<R: RadioService>(&mut self, inputs: DriveInputs, radio: &mut R) -> Result<(), BleError> {
        let desired = self.desired(inputs);

        if self.active != desired || (self.refresh_needed && desired.is_some()) {
            if self.active.take().is_some() {
                debug!("ADVERTISING: Stopping advertising");
                if let Err(e) = radio.stop_advertising() {
                    let e: BleError = e.into();
                    warn!("ADVERTISING: Stop failed ({:?}), treating radio as stopped", e);
                }
            }

            if let Some(target) = desired {
                if let Err(e) = self.start(target, radio) {
                    error!("ADVERTISING: Failed to start advertising ({:?}), disabling CHIPoBLE service", e);
                    self.fail_stop(radio);
                    return Err(e);
                }
            }
        }
        self.refresh_needed = false;

        self.sync_escalation(inputs.connection_count, radio);
        Ok(())
    }

    /// Tier windows only elapse while advertising with nobody connected
    fn sync_escalation<R: RadioService>(&mut self, connection_count: usize, radio: &mut R) {
        match self.active {
            Some(active) if connection_count == 0 => self.arm_escalation(active.tier, radio),
            _ => self.disarm(radio),
        }
    }

    fn desired(&self, inputs: DriveInputs) -> Option<ActiveAdvertising> {
        if self.service_mode != ServiceMode::Enabled || !inputs.stack_ready || !self.advertising_enabled {
            return None;
        }

        let full = inputs.connection_count >= inputs.max_connections;
        if full && self.when_full == FullTablePolicy::Stop {
            return None;
        }

        Some(ActiveAdvertising {
            tier: self.tier,
            connectable: !full,
        })
    }

    fn start<R: RadioService>(&mut self, target: ActiveAdvertising, radio: &mut R) -> Result<(), BleError> {
        let payload = self.payload_for(target.tier)?;
        let interval = self.interval_for(target.tier);
        let params = AdvertisingParams {
            interval_min: interval.min,
            interval_max: interval.max,
            connectable: target.connectable,
        };

        if self.new_session && self.rotate_random_address {
            let mut addr = [0u8; 6];
            radio::status(radio.fill_random(&mut addr))?;
            // Random static address: two most significant bits set
            addr[5] |= 0xC0;
            radio::status(radio.set_random_device_address(addr))?;
        }
        self.new_session = false;

        info!(
            "ADVERTISING: Starting {:?} tier ({}-{}), connectable={}",
            target.tier, params.interval_min, params.interval_max, params.connectable
        );
        radio::status(radio.start_advertising(&params, &payload))?;
        self.active = Some(target);
        Ok(())
    }

    fn arm_escalation<R: RadioService>(&mut self, tier: AdvertisingTier, radio: &mut R) {
        match self.armed_for {
            Some((armed, _)) if armed == tier => return,
            Some(_) => self.disarm(radio),
            None => {}
        }
        let window = match tier {
            AdvertisingTier::Fast => Some(self.fast_window),
            AdvertisingTier::Slow => self.slow_window,
            AdvertisingTier::Extended => None,
        };
        let Some(window) = window else {
            return;
        };

        let timer = TimerId::new(ADV_ESCALATION_SLOT, self.escalation_generation);
        self.escalation_generation = self.escalation_generation.wrapping_add(1);

        match radio.start_soft_timer(timer, window) {
            Ok(()) => self.armed_for = Some((tier, timer)),
            Err(e) => {
                let e: BleError = e.into();
                warn!("ADVERTISING: Could not arm escalation timer ({:?}), staying in {:?} tier", e, tier);
            }
        }
    }

    fn disarm<R: RadioService>(&mut self, radio: &mut R) {
        if let Some((_, timer)) = self.armed_for.take() {
            if let Err(e) = radio.stop_soft_timer(timer) {
                let e: BleError = e.into();
                debug!("ADVERTISING: Stopping escalation timer failed ({:?})", e);
            }
        }
    }

    fn reset_tier(&mut self) {
        self.tier = match self.mode {
            AdvertisingMode::Fast => AdvertisingTier::Fast,
            AdvertisingMode::Slow => AdvertisingTier::Slow,
        };
    }

    fn interval_for(&self, tier: AdvertisingTier) -> IntervalRange {
        match tier {
            AdvertisingTier::Fast => self.fast_interval,
            AdvertisingTier::Slow => self.slow_interval,
            AdvertisingTier::Extended => self.extended_interval,
        }
    }

    fn fail_stop<R: RadioService>(&mut self, radio: &mut R) {
        self.faulted = true;
        self.service_mode = ServiceMode::Disabled;
        self.active = None;
        self.disarm(radio);
    }
}
