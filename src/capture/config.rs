//! CSI capture policy applied to the radio once the link is up.

use serde::{Deserialize, Serialize};

/// Largest value accepted for [`CaptureConfig::shift`].
pub const MAX_SHIFT: u8 = 15;

/// Which training fields the radio reports CSI for, and how it scales them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Report CSI from the legacy long training field
    pub lltf_en: bool,
    /// Report CSI from the HT long training field
    pub htltf_en: bool,
    /// Report CSI from the second HT-LTF of STBC frames
    pub stbc_htltf2_en: bool,
    /// Merge L-LTF and HT-LTF when both are present
    pub ltf_merge_en: bool,
    /// Smooth adjacent subcarriers in hardware
    pub channel_filter_en: bool,
    /// Use `shift` instead of automatic scaling
    pub manu_scale: bool,
    /// Manual left-shift applied to the raw values (0..=15)
    pub shift: u8,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            lltf_en: true,
            htltf_en: true,
            stbc_htltf2_en: true,
            ltf_merge_en: true,
            channel_filter_en: false,
            manu_scale: false,
            shift: 0,
        }
    }
}

impl CaptureConfig {
    /// Check field ranges.
    pub fn validate(&self) -> Result<(), String> {
        if self.shift > MAX_SHIFT {
            return Err(format!(
                "Invalid capture.shift {}. Must be 0-{}",
                self.shift, MAX_SHIFT
            ));
        }
        if !(self.lltf_en || self.htltf_en) {
            return Err("capture must enable at least one of lltf_en, htltf_en".to_string());
        }
        Ok(())
    }
}
