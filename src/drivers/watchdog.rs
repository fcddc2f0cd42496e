//! Task Watchdog Timer (TWDT) driver.
//!
//! Resets the device if the control loop stops feeding it.  The timeout
//! must exceed the longest single tick, which is bounded by one outbound
//! HTTP call.

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

use log::{info, warn};

pub struct Watchdog {
    timeout_ms: u32,
    subscribed: bool,
}

impl Watchdog {
    /// Subscribe the calling task with the given timeout.
    #[cfg(target_os = "espidf")]
    pub fn subscribe(timeout_ms: u32) -> Self {
        // SAFETY: TWDT calls from the main task before the loop starts.
        let subscribed = unsafe {
            let cfg = esp_task_wdt_config_t {
                timeout_ms,
                idle_core_mask: 0,
                trigger_panic: true,
            };
            let ret = esp_task_wdt_reconfigure(&cfg);
            if ret != ESP_OK {
                warn!("Watchdog: reconfigure returned {} (may already be configured)", ret);
            }
            esp_task_wdt_add(core::ptr::null_mut()) == ESP_OK
        };
        if subscribed {
            info!("Watchdog: subscribed ({} ms timeout, panic on trigger)", timeout_ms);
        } else {
            warn!("Watchdog: failed to subscribe, loop stalls will not reset");
        }
        Self {
            timeout_ms,
            subscribed,
        }
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn subscribe(timeout_ms: u32) -> Self {
        info!("Watchdog(sim): {} ms timeout not enforced", timeout_ms);
        if timeout_ms == 0 {
            warn!("Watchdog(sim): zero timeout");
        }
        Self {
            timeout_ms,
            subscribed: false,
        }
    }

    pub fn timeout_ms(&self) -> u32 {
        self.timeout_ms
    }

    /// Feed once per control loop iteration.
    pub fn feed(&self) {
        #[cfg(target_os = "espidf")]
        if self.subscribed {
            // SAFETY: resets the current task's TWDT entry; no shared state.
            unsafe {
                esp_task_wdt_reset();
            }
        }
        #[cfg(not(target_os = "espidf"))]
        let _ = self.subscribed;
    }
}
