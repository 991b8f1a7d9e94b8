// Provisioning Manager Wrapper
// Safe wrapper around the ESP-IDF provisioning manager. The vendor API is
// a process-wide singleton; this type owns its lifetime, the buffers it
// keeps raw pointers into, and the release latch guarding deinit.

// Import raw ESP-IDF bindings for the provisioning manager FFI surface
use esp_idf_svc::sys as esp_idf_sys;
use esp_idf_svc::sys::EspError;

// Import logging macros
use log::{debug, error, info};

// Standard library imports
use std::ffi::CString;

use crate::config::SecurityLevel;

pub struct ProvisioningManager {
    released: bool,
    // The vendor API stores the proof-of-possession pointer for the whole
    // provisioning session; the CString must outlive it.
    proof_of_possession: Option<CString>,
    // Same for the service UUID handed to the BLE scheme.
    service_uuid: Option<Box<[u8; 16]>>,
}

impl ProvisioningManager {
    /// Initializes the vendor provisioning manager with the BLE transport
    /// scheme. The scheme handler returns Bluetooth Classic memory to the
    /// heap once BLE transport is up.
    pub fn init() -> Result<Self, EspError> {
        let config = esp_idf_sys::wifi_prov_mgr_config_t {
            scheme: unsafe { esp_idf_sys::wifi_prov_scheme_ble },
            scheme_event_handler: esp_idf_sys::wifi_prov_event_handler_t {
                event_cb: Some(esp_idf_sys::wifi_prov_scheme_ble_event_cb_free_btdm),
                user_data: core::ptr::null_mut(),
            },
            app_event_handler: esp_idf_sys::wifi_prov_event_handler_t {
                event_cb: None,
                user_data: core::ptr::null_mut(),
            },
        };
        call_prov_api(
            || unsafe { esp_idf_sys::wifi_prov_mgr_init(config) },
            "wifi_prov_mgr_init",
        )?;
        info!("Provisioning manager initialized (BLE scheme)");
        Ok(Self {
            released: false,
            proof_of_possession: None,
            service_uuid: None,
        })
    }

    /// Asks the manager whether station credentials are already stored in
    /// NVS from an earlier session.
    pub fn is_provisioned(&self) -> Result<bool, EspError> {
        let mut provisioned = false;
        call_prov_api(
            || unsafe { esp_idf_sys::wifi_prov_mgr_is_provisioned(&mut provisioned) },
            "wifi_prov_mgr_is_provisioned",
        )?;
        Ok(provisioned)
    }

    /// Sets the 128-bit service UUID the BLE scheme advertises. The scheme
    /// keeps the pointer, so the buffer is boxed and retained here.
    pub fn set_ble_service_uuid(&mut self, uuid: [u8; 16]) -> Result<(), EspError> {
        let mut uuid = Box::new(uuid);
        call_prov_api(
            || unsafe { esp_idf_sys::wifi_prov_scheme_ble_set_service_uuid(uuid.as_mut_ptr()) },
            "wifi_prov_scheme_ble_set_service_uuid",
        )?;
        self.service_uuid = Some(uuid);
        Ok(())
    }

    /// Starts BLE advertising under the given device name and begins the
    /// provisioning session.
    pub fn start_provisioning(
        &mut self,
        security: SecurityLevel,
        proof_of_possession: &str,
        device_name: &str,
    ) -> Result<(), EspError> {
        let invalid_arg = || EspError::from_infallible::<{ esp_idf_sys::ESP_ERR_INVALID_ARG }>();
        let secret = CString::new(proof_of_possession).map_err(|_| invalid_arg())?;
        let service_name = CString::new(device_name).map_err(|_| invalid_arg())?;

        let sec_params = match security {
            SecurityLevel::NoSecurity => core::ptr::null(),
            SecurityLevel::ProofOfPossession => secret.as_ptr() as *const core::ffi::c_void,
        };
        call_prov_api(
            || unsafe {
                esp_idf_sys::wifi_prov_mgr_start_provisioning(
                    security_to_raw(security),
                    sec_params,
                    service_name.as_ptr(),
                    core::ptr::null(),
                )
            },
            "wifi_prov_mgr_start_provisioning",
        )?;
        // Keep the secret alive for the session; the manager holds the pointer
        self.proof_of_possession = Some(secret);
        info!("Provisioning session started as '{}'", device_name);
        Ok(())
    }

    /// Deinitializes the vendor manager and frees its resources. Callable
    /// any number of times; only the first call reaches the vendor API.
    pub fn release(&mut self) {
        if !take_release(&mut self.released) {
            debug!("Provisioning manager already released");
            return;
        }
        info!("Releasing provisioning manager");
        unsafe { esp_idf_sys::wifi_prov_mgr_deinit() };
    }
}

impl Drop for ProvisioningManager {
    fn drop(&mut self) {
        self.release();
    }
}

// Runs one provisioning FFI call and converts its status code.
fn call_prov_api<F>(f: F, context: &str) -> Result<(), EspError>
where
    F: FnOnce() -> esp_idf_sys::esp_err_t,
{
    let result = f();
    match EspError::from(result) {
        Some(err) => {
            error!("{} failed: {}", context, err);
            Err(err)
        }
        None => Ok(()),
    }
}

// Returns true exactly once per latch.
fn take_release(released: &mut bool) -> bool {
    !core::mem::replace(released, true)
}

fn security_to_raw(security: SecurityLevel) -> esp_idf_sys::wifi_prov_security_t {
    match security {
        SecurityLevel::NoSecurity => esp_idf_sys::wifi_prov_security_WIFI_PROV_SECURITY_0,
        SecurityLevel::ProofOfPossession => esp_idf_sys::wifi_prov_security_WIFI_PROV_SECURITY_1,
    }
}
