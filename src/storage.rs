// NVS Flash Bring-up
// Initializes the default NVS partition, recovering once from the two
// recoverable corruption states by erasing and re-initializing.

// Import ESP-IDF's NVS (Non-Volatile Storage) functionality
// The Wi-Fi driver and the provisioning manager both persist state here
use esp_idf_svc::nvs::EspDefaultNvsPartition;

// Import ESP-IDF error type and the raw flash init calls
use esp_idf_svc::sys::{self, EspError};

// Import logging macros
use log::{info, warn};

/// Brings up NVS flash and hands out the default partition handle the
/// Wi-Fi driver stores its credentials in.
pub fn init_nvs() -> Result<EspDefaultNvsPartition, EspError> {
    init_flash_with_recovery(
        || EspError::convert(unsafe { sys::nvs_flash_init() }),
        || {
            warn!("NVS partition unusable (no free pages or newer version), erasing");
            EspError::convert(unsafe { sys::nvs_flash_erase() })
        },
    )?;
    info!("NVS flash initialized");
    EspDefaultNvsPartition::take()
}

// The erase closure is FnOnce; recovery runs at most once.
fn init_flash_with_recovery(
    mut init: impl FnMut() -> Result<(), EspError>,
    erase: impl FnOnce() -> Result<(), EspError>,
) -> Result<(), EspError> {
    match init() {
        Ok(()) => Ok(()),
        Err(err) if needs_erase(err) => {
            erase()?;
            init()
        }
        Err(err) => Err(err),
    }
}

fn needs_erase(err: EspError) -> bool {
    matches!(
        err.code(),
        sys::ESP_ERR_NVS_NO_FREE_PAGES | sys::ESP_ERR_NVS_NEW_VERSION_FOUND
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn no_free_pages() -> EspError {
        EspError::from_infallible::<{ sys::ESP_ERR_NVS_NO_FREE_PAGES }>()
    }

    fn new_version() -> EspError {
        EspError::from_infallible::<{ sys::ESP_ERR_NVS_NEW_VERSION_FOUND }>()
    }

    #[test]
    fn clean_init_needs_no_erase() {
        let inits = Cell::new(0);
        let result = init_flash_with_recovery(
            || {
                inits.set(inits.get() + 1);
                Ok(())
            },
            || panic!("erase must not run when init succeeds"),
        );
        assert!(result.is_ok());
        assert_eq!(inits.get(), 1);
    }

    #[test]
    fn no_free_pages_triggers_exactly_one_erase_cycle() {
        let inits = Cell::new(0);
        let erases = Cell::new(0);
        let result = init_flash_with_recovery(
            || {
                inits.set(inits.get() + 1);
                if inits.get() == 1 {
                    Err(no_free_pages())
                } else {
                    Ok(())
                }
            },
            || {
                erases.set(erases.get() + 1);
                Ok(())
            },
        );
        assert!(result.is_ok());
        assert_eq!(inits.get(), 2);
        assert_eq!(erases.get(), 1);
    }

    #[test]
    fn new_version_also_recovers() {
        let inits = Cell::new(0);
        let result = init_flash_with_recovery(
            || {
                inits.set(inits.get() + 1);
                if inits.get() == 1 {
                    Err(new_version())
                } else {
                    Ok(())
                }
            },
            || Ok(()),
        );
        assert!(result.is_ok());
        assert_eq!(inits.get(), 2);
    }

    #[test]
    fn unrelated_failures_do_not_erase() {
        let result = init_flash_with_recovery(
            || Err(EspError::from_infallible::<{ sys::ESP_FAIL }>()),
            || panic!("erase must not run for unrelated failures"),
        );
        assert!(result.is_err());
    }

    #[test]
    fn recovery_failure_is_fatal() {
        let inits = Cell::new(0);
        let result = init_flash_with_recovery(
            || {
                inits.set(inits.get() + 1);
                Err(no_free_pages())
            },
            || Ok(()),
        );
        assert!(result.is_err());
        assert_eq!(inits.get(), 2);
    }

    #[test]
    fn only_storage_corruption_codes_recover() {
        assert!(needs_erase(no_free_pages()));
        assert!(needs_erase(new_version()));
        assert!(!needs_erase(EspError::from_infallible::<{ sys::ESP_FAIL }>()));
    }
}
