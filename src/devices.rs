//! Device profiles for page checks
//!
//! Device names from the audit file resolve to a viewport through a total
//! lookup: unknown names fall back to the desktop profile.

use serde::{Deserialize, Serialize};

const MOBILE_USER_AGENT: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) \
AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";

const ANDROID_USER_AGENT: &str = "Mozilla/5.0 (Linux; Android 13; Pixel 5) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Mobile Safari/537.36";

const TABLET_USER_AGENT: &str = "Mozilla/5.0 (iPad; CPU OS 17_0 like Mac OS X) \
AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";

/// Browser viewport and emulation settings for one device
///
/// # Examples
///
/// ```rust
/// use page_audit::resolve_device;
///
/// let (mobile, known) = resolve_device("mobile");
/// assert!(known);
/// assert!(mobile.mobile);
/// assert_eq!(mobile.width, 375);
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DeviceProfile {
    /// Viewport width in CSS pixels
    pub width: u32,

    /// Viewport height in CSS pixels
    pub height: u32,

    /// Device pixel ratio
    pub device_scale_factor: f64,

    /// Emulate a mobile device (touch, mobile layout viewport)
    pub mobile: bool,

    /// User-Agent to present, if the profile needs a specific one
    pub user_agent: Option<String>,
}

impl Default for DeviceProfile {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            device_scale_factor: 1.0,
            mobile: false,
            user_agent: None,
        }
    }
}

impl DeviceProfile {
    fn handheld(width: u32, height: u32, device_scale_factor: f64, user_agent: &str) -> Self {
        Self {
            width,
            height,
            device_scale_factor,
            mobile: true,
            user_agent: Some(user_agent.to_string()),
        }
    }
}

/// Resolve a device name, returning the profile and whether the name was recognised
pub fn resolve_device(name: &str) -> (DeviceProfile, bool) {
    let profile = match name.trim().to_ascii_lowercase().as_str() {
        "desktop" => DeviceProfile::default(),
        "laptop" => DeviceProfile {
            width: 1366,
            height: 768,
            ..Default::default()
        },
        "mobile" | "iphone se" => DeviceProfile::handheld(375, 667, 2.0, MOBILE_USER_AGENT),
        "iphone 12" => DeviceProfile::handheld(390, 844, 3.0, MOBILE_USER_AGENT),
        "pixel 5" => DeviceProfile::handheld(393, 851, 2.75, ANDROID_USER_AGENT),
        "tablet" | "ipad mini" => DeviceProfile::handheld(768, 1024, 2.0, TABLET_USER_AGENT),
        _ => return (DeviceProfile::default(), false),
    };
    (profile, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_desktop_profile() {
        let (profile, known) = resolve_device("desktop");
        assert!(known);
        assert_eq!(profile, DeviceProfile::default());
        assert_eq!(profile.width, 1920);
        assert!(!profile.mobile);
    }

    #[test]
    fn test_named_devices_are_case_insensitive() {
        let (profile, known) = resolve_device("iPhone 12");
        assert!(known);
        assert_eq!((profile.width, profile.height), (390, 844));
        assert_eq!(profile.device_scale_factor, 3.0);
        assert!(profile.user_agent.is_some());

        let (pixel, known) = resolve_device("PIXEL 5");
        assert!(known);
        assert!(pixel.mobile);
    }

    #[test]
    fn test_unknown_device_falls_back_to_desktop() {
        let (profile, known) = resolve_device("smart fridge");
        assert!(!known);
        assert_eq!(profile, DeviceProfile::default());
    }
}
