// Provisioning Lifecycle Controller
// Decides between the provisioned path (connect with stored credentials)
// and the provisioning path (advertise over BLE and serve lifecycle
// events until the session ends).

// Import Embassy time utilities for async delays
use embassy_time::{Duration, Timer};

// Import ESP-IDF event loop for handling system events
// The provisioning manager posts its lifecycle notifications here
use esp_idf_svc::eventloop::{EspSubscription, EspSystemEventLoop, System};

// Import peripheral trait for hardware access
use esp_idf_svc::hal::peripheral::Peripheral;

// Import NVS partition for WiFi driver storage needs
use esp_idf_svc::nvs::EspDefaultNvsPartition;

// Import ESP-IDF error type and the raw mode call
use esp_idf_svc::sys::{self, EspError};

// Import WiFi driver types
// - BlockingWifi: Synchronous WiFi operations wrapper
// - EspWifi: Low-level WiFi driver
use esp_idf_svc::wifi::{BlockingWifi, EspWifi};

// Import logging macros
use log::{error, info, warn};

use crate::config::ProvisioningConfig;
use crate::lifecycle::{self, Action, LIFECYCLE_EVENT_CHANNEL, LifecycleEvent};
use crate::prov_manager::ProvisioningManager;

// The controller owns every handle the lifecycle needs; nothing in here is
// shared or locked.
pub struct ProvisioningController {
    config: ProvisioningConfig,           // Immutable identity and security choice
    wifi: BlockingWifi<EspWifi<'static>>, // ESP-IDF WiFi driver wrapper
    manager: ProvisioningManager,         // Vendor provisioning manager handle
    _events: EspSubscription<'static, System>, // Dropping this unregisters the callback
}

impl ProvisioningController {
    pub fn new(
        modem: impl Peripheral<P = esp_idf_svc::hal::modem::Modem> + 'static,
        sys_loop: EspSystemEventLoop,
        nvs: EspDefaultNvsPartition,
        config: ProvisioningConfig,
    ) -> Result<Self, EspError> {
        info!("Initializing provisioning controller");

        // Initialize WiFi driver with the default station interface
        let wifi = EspWifi::new(modem, sys_loop.clone(), Some(nvs))?;
        let wifi = BlockingWifi::wrap(wifi, sys_loop.clone())?;

        // Station mode only; the driver's stored configuration is left untouched
        EspError::convert(unsafe { sys::esp_wifi_set_mode(sys::wifi_mode_t_WIFI_MODE_STA) })?;

        let manager = ProvisioningManager::init()?;

        // Forward lifecycle notifications out of the event-loop context.
        // The callback runs on the event loop task; it must return quickly
        // and never block.
        let events = sys_loop.subscribe::<LifecycleEvent, _>(|event| {
            if LIFECYCLE_EVENT_CHANNEL.try_send(event).is_err() {
                warn!("Lifecycle event queue full, dropping notification");
            }
        })?;

        info!("Provisioning controller initialized");

        Ok(Self {
            config,
            wifi,
            manager,
            _events: events,
        })
    }

    /// Runs the lifecycle to completion, then parks so the station and the
    /// event subscription stay alive.
    pub async fn run(&mut self) -> Result<(), EspError> {
        match startup_path(self.manager.is_provisioned()?) {
            StartupPath::ConnectStored => {
                info!("Already provisioned. Connecting to Wi-Fi...");
                self.manager.release();
                self.connect_station()?;
            }
            StartupPath::ServeProvisioning => {
                info!("Starting BLE provisioning...");
                self.manager
                    .set_ble_service_uuid(self.config.service_uuid_le())?;
                self.manager.start_provisioning(
                    self.config.security,
                    &self.config.proof_of_possession,
                    &self.config.device_name,
                )?;
                info!(
                    "Provisioning service '{}' advertising",
                    self.config.device_name
                );
                self.serve_lifecycle().await;
            }
        }

        // Keep the station and the event subscription alive
        loop {
            Timer::after(Duration::from_secs(60)).await;
        }
    }

    // Drains lifecycle events until the session ends and the manager is
    // released.
    async fn serve_lifecycle(&mut self) {
        loop {
            let event = LIFECYCLE_EVENT_CHANNEL.receive().await;
            event.log();
            match lifecycle::reaction(&event) {
                Action::None => {}
                Action::StartWifi => {
                    // The manager already applied the accepted credentials
                    // to the driver; starting the station is enough.
                    if let Err(err) = self.wifi.start() {
                        error!("Failed to start Wi-Fi after acceptance: {}", err);
                    }
                }
                Action::ReleaseManager => {
                    self.manager.release();
                    break;
                }
            }
        }
    }

    // Provisioned path: the driver loads credentials from NVS on start.
    fn connect_station(&mut self) -> Result<(), EspError> {
        self.wifi.start()?;
        info!("Wi-Fi started, connecting with stored credentials");
        self.wifi.connect()?;
        self.wifi.wait_netif_up()?;
        let ip_info = self.wifi.wifi().sta_netif().get_ip_info()?;
        info!("Wi-Fi connected, IP: {}", ip_info.ip);
        Ok(())
    }
}

/// Which way `run` goes after the stored-credentials query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupPath {
    ConnectStored,     // Credentials in NVS; bring the station up directly
    ServeProvisioning, // Advertise over BLE and serve the session
}

/// Policy mapping the stored-credentials flag to a startup path. Pure so
/// the branch can be checked without a radio, like `lifecycle::reaction`.
pub fn startup_path(provisioned: bool) -> StartupPath {
    if provisioned {
        StartupPath::ConnectStored
    } else {
        StartupPath::ServeProvisioning
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provisioned_devices_reconnect_without_advertising() {
        assert_eq!(startup_path(true), StartupPath::ConnectStored);
    }

    #[test]
    fn fresh_devices_advertise_for_provisioning() {
        assert_eq!(startup_path(false), StartupPath::ServeProvisioning);
    }
}
