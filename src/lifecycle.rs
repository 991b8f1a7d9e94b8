// Provisioning Lifecycle Events
// Owned event model for the vendor provisioning manager's notifications,
// the channel that carries them out of the event-loop callback, and the
// reaction policy mapping each event to a controller action.

use core::ffi;

// Import Embassy's critical section mutex for thread-safe access
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;

// Import event loop integration traits for custom event sources
use esp_idf_svc::eventloop::{EspEvent, EspEventDeserializer, EspEventSource};

// Import raw event constants and payload types
use esp_idf_svc::sys;

// Import logging macros
use log::{debug, error, info};

const LIFECYCLE_CHANNEL_SIZE: usize = 8; // Buffer a short burst of notifications

// Filled by the event-loop subscription, drained by the controller loop
pub static LIFECYCLE_EVENT_CHANNEL: Channel<
    CriticalSectionRawMutex,
    LifecycleEvent,
    LIFECYCLE_CHANNEL_SIZE,
> = Channel::new();

/// Station credentials delivered during provisioning, decoded from the
/// driver's fixed-size NUL-padded arrays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedCredentials {
    pub ssid: String,
    pub password: String,
}

impl ReceivedCredentials {
    fn from_sta_config(config: &sys::wifi_sta_config_t) -> Self {
        Self {
            ssid: decode_padded(&config.ssid),
            password: decode_padded(&config.password),
        }
    }
}

fn decode_padded(bytes: &[u8]) -> String {
    let len = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..len]).into_owned()
}

/// Why the received credentials were rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    AuthError,
    ApNotFound,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::AuthError => "Auth Error",
            FailureReason::ApNotFound => "AP Not Found",
        }
    }

    fn from_raw(reason: sys::wifi_prov_sta_fail_reason_t) -> Self {
        if reason == sys::wifi_prov_sta_fail_reason_t_WIFI_PROV_STA_AUTH_ERROR {
            FailureReason::AuthError
        } else {
            FailureReason::ApNotFound
        }
    }
}

/// Lifecycle notifications posted by the provisioning manager. IDs outside
/// the five documented ones land in Unknown and are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    Started,
    CredentialsReceived(ReceivedCredentials),
    CredentialsAccepted,
    CredentialsRejected(FailureReason),
    Ended,
    Unknown(i32),
}

impl LifecycleEvent {
    #[allow(non_upper_case_globals)]
    fn decode(event_id: i32, payload: Option<&ffi::c_void>) -> Self {
        match event_id as u32 {
            sys::wifi_prov_cb_event_t_WIFI_PROV_START => Self::Started,
            sys::wifi_prov_cb_event_t_WIFI_PROV_CRED_RECV => match payload {
                Some(data) => {
                    let config =
                        unsafe { &*(data as *const ffi::c_void as *const sys::wifi_sta_config_t) };
                    Self::CredentialsReceived(ReceivedCredentials::from_sta_config(config))
                }
                None => Self::Unknown(event_id),
            },
            sys::wifi_prov_cb_event_t_WIFI_PROV_CRED_FAIL => match payload {
                Some(data) => {
                    let reason = unsafe {
                        *(data as *const ffi::c_void as *const sys::wifi_prov_sta_fail_reason_t)
                    };
                    Self::CredentialsRejected(FailureReason::from_raw(reason))
                }
                None => Self::Unknown(event_id),
            },
            sys::wifi_prov_cb_event_t_WIFI_PROV_CRED_SUCCESS => Self::CredentialsAccepted,
            sys::wifi_prov_cb_event_t_WIFI_PROV_END => Self::Ended,
            _ => Self::Unknown(event_id),
        }
    }

    /// Console line for the notification.
    pub fn log(&self) {
        match self {
            LifecycleEvent::Started => info!("Provisioning started"),
            LifecycleEvent::CredentialsReceived(credentials) => info!(
                "Received SSID: {}, Password: {}",
                credentials.ssid, credentials.password
            ),
            LifecycleEvent::CredentialsAccepted => {
                info!("Provisioning successful. Connecting to Wi-Fi...")
            }
            LifecycleEvent::CredentialsRejected(reason) => {
                error!("Provisioning failed! Reason: {}", reason.as_str())
            }
            LifecycleEvent::Ended => info!("Provisioning ended, releasing manager"),
            LifecycleEvent::Unknown(id) => debug!("Ignoring provisioning event id {}", id),
        }
    }
}

// One event base covers every provisioning notification; subscribing to
// the base registers for all IDs beneath it.
unsafe impl EspEventSource for LifecycleEvent {
    fn source() -> Option<&'static ffi::CStr> {
        Some(unsafe { ffi::CStr::from_ptr(sys::WIFI_PROV_EVENT) })
    }
}

impl EspEventDeserializer for LifecycleEvent {
    type Data<'d> = LifecycleEvent;

    fn deserialize<'d>(data: &EspEvent<'d>) -> Self::Data<'d> {
        Self::decode(data.event_id, data.payload)
    }
}

/// Side effect the controller performs in response to an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    None,
    StartWifi,
    ReleaseManager,
}

/// Policy mapping lifecycle events to controller actions. Pure so dispatch
/// can be checked without a radio; no wildcard arm, so a new variant will
/// not compile until it is placed here.
pub fn reaction(event: &LifecycleEvent) -> Action {
    match event {
        LifecycleEvent::Started
        | LifecycleEvent::CredentialsReceived(_)
        | LifecycleEvent::CredentialsRejected(_)
        | LifecycleEvent::Unknown(_) => Action::None,
        LifecycleEvent::CredentialsAccepted => Action::StartWifi,
        LifecycleEvent::Ended => Action::ReleaseManager,
    }
}
