//! Wi-Fi state saved across deep sleep and shutdown
//!
//! Wi-Fi is turned off before the system sleeps or shuts down. A marker file records whether
//! it was on so it can be turned back on when the system comes back, without overriding a
//! choice the user made in the meantime.
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use car_power_interface::system::WifiManager;
use log::{info, warn};

/// Name of the marker file in the system car directory
pub const WIFI_STATE_FILENAME: &str = "wifi_state";
const WIFI_STATE_MODIFIED: &str = "forcibly_disabled";
const WIFI_STATE_ORIGINAL: &str = "original";

/// Wi-Fi control with a persistent modified marker
pub struct WifiState<'a> {
    manager: &'a dyn WifiManager,
    marker: PathBuf,
}

impl<'a> WifiState<'a> {
    pub fn new(manager: &'a dyn WifiManager, car_dir: &Path) -> Self {
        Self {
            manager,
            marker: car_dir.join(WIFI_STATE_FILENAME),
        }
    }

    pub fn marker_path(&self) -> &Path {
        &self.marker
    }

    /// Returns true if Wi-Fi was forcibly disabled and should be restored
    ///
    /// A marker with unexpected content is deleted.
    pub fn read_modified(&self) -> bool {
        let content = match fs::read_to_string(&self.marker) {
            Ok(content) => content,
            Err(e) => {
                warn!("Failed to read {}: {e}", self.marker.display());
                return false;
            }
        };

        match content.lines().next().map(str::trim) {
            Some(WIFI_STATE_MODIFIED) => true,
            Some(WIFI_STATE_ORIGINAL) => false,
            line => {
                warn!("Invalid Wi-Fi state {line:?}, deleting {}", self.marker.display());
                if let Err(e) = fs::remove_file(&self.marker) {
                    warn!("Failed to delete {}: {e}", self.marker.display());
                }
                false
            }
        }
    }

    fn save_modified(&self, forcibly_disabled: bool) {
        let state = if forcibly_disabled {
            WIFI_STATE_MODIFIED
        } else {
            WIFI_STATE_ORIGINAL
        };
        if let Err(e) = write_atomic(&self.marker, format!("{state}\n").as_bytes()) {
            warn!("Writing {} failed: {e}", self.marker.display());
        }
    }

    /// Turn Wi-Fi back on if it was forcibly disabled
    pub fn restore(&self) {
        if !self.read_modified() {
            return;
        }
        if !self.manager.is_wifi_enabled() {
            info!("Wi-Fi has been enabled to restore the last setting");
            self.manager.set_wifi_enabled(true);
        }
        self.save_modified(false);
    }

    /// Turn Wi-Fi off, remembering whether it was on
    pub fn disable(&self) {
        let enabled = self.manager.is_wifi_enabled();
        if enabled != self.read_modified() {
            self.save_modified(enabled);
        }
        if !enabled {
            return;
        }
        self.manager.set_wifi_enabled(false);
        info!("Wi-Fi has been disabled and the last setting was saved");
    }
}

/// Write through a temporary file so a crash never leaves a truncated marker
fn write_atomic(path: &Path, content: &[u8]) -> io::Result<()> {
    let tmp = path.with_extension("new");
    fs::write(&tmp, content)?;
    fs::rename(&tmp, path)
}
