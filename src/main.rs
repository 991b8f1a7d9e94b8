// BLE Wi-Fi Provisioning Firmware
// Boot-time lifecycle: bring up NVS and the system event loop, then hand
// control to the provisioning controller. Fatal startup errors are logged
// and the chip restarts after a short delay.

mod config;
mod controller;
mod lifecycle;
mod prov_manager;
mod storage;

use anyhow::Result;

use embassy_executor::Spawner;
use embassy_time::{Duration, Timer};

use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::peripherals::Peripherals;
use esp_idf_svc::log::EspLogger;

use log::{error, info};

use crate::config::ProvisioningConfig;
use crate::controller::ProvisioningController;

#[embassy_executor::main]
async fn main(_spawner: Spawner) {
    // It is necessary to call this function once. Otherwise some patches to the runtime
    // implemented by esp-idf-sys might not link properly. See https://github.com/esp-rs/esp-idf-template/issues/71
    esp_idf_svc::sys::link_patches();

    // Bind the log crate to the ESP Logging facilities
    EspLogger::initialize_default();

    info!("BLE Wi-Fi provisioning firmware starting");

    if let Err(err) = run().await {
        // Leave the failure on the console before resetting
        error!("Fatal startup error: {:?}", err);
        Timer::after(Duration::from_secs(10)).await;
        unsafe { esp_idf_svc::sys::esp_restart() };
    }
}

async fn run() -> Result<()> {
    let peripherals = Peripherals::take()?;
    let sys_loop = EspSystemEventLoop::take()?;
    let nvs = storage::init_nvs()?;

    let config = ProvisioningConfig::default();
    let mut controller = ProvisioningController::new(peripherals.modem, sys_loop, nvs, config)?;
    controller.run().await?;
    Ok(())
}
