//! # Microphone Priming
//!
//! On some mobile platforms the recognizer fails silently unless the app first
//! asks for raw microphone access itself. Priming requests a stream only to
//! trigger the OS permission prompt, releases it right away, and then waits a
//! short settle delay so the hardware is free again before the recognizer
//! claims it.
//!
//! Whether priming is needed is decided from the platform signature (user agent,
//! platform string, touch points), not by probing capabilities.

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Priming failed: the user (or the OS) refused microphone access.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PrimingError {
    #[error("microphone permission denied")]
    PermissionDenied,
}

/// An acquired raw microphone stream. It is only held long enough to release it.
pub trait MicrophoneStream: Send {
    fn release(self: Box<Self>);
}

/// The external "request raw microphone access" call.
pub trait MicrophonePrimer: Send + Sync {
    /// Whether raw microphone access can be requested at all on this platform.
    fn is_available(&self) -> bool {
        true
    }

    /// Ask for audio access. Resolves once the user has answered the prompt.
    fn request_access(&self) -> BoxFuture<'static, Result<Box<dyn MicrophoneStream>, PrimingError>>;
}

/// What the platform reports about itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformSignature {
    pub user_agent: String,
    pub platform: String,
    pub max_touch_points: u32,
}

impl PlatformSignature {
    /// iPhone/iPad/iPod user agents, or an iPad that reports itself as a Mac
    /// ("MacIntel" with a touch screen).
    pub fn is_ios(&self) -> bool {
        let mobile_agent = ["iPad", "iPhone", "iPod"]
            .iter()
            .any(|device| self.user_agent.contains(device));
        let desktop_mode_ipad = self.platform == "MacIntel" && self.max_touch_points > 1;
        mobile_agent || desktop_mode_ipad
    }
}

/// When to run the priming step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimingPolicy {
    /// Decide from the platform signature
    Auto,
    Always,
    Never,
}

impl Default for PrimingPolicy {
    fn default() -> Self {
        PrimingPolicy::Auto
    }
}

impl std::str::FromStr for PrimingPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" | "automatic" => Ok(PrimingPolicy::Auto),
            "always" | "on" => Ok(PrimingPolicy::Always),
            "never" | "off" => Ok(PrimingPolicy::Never),
            _ => Err(format!("Unknown priming policy: {}", s)),
        }
    }
}

impl PrimingPolicy {
    /// Whether a start request should go through priming first.
    pub fn requires_priming(&self, signature: &PlatformSignature, primer: &dyn MicrophonePrimer) -> bool {
        if !primer.is_available() {
            return false;
        }
        match self {
            PrimingPolicy::Auto => signature.is_ios(),
            PrimingPolicy::Always => true,
            PrimingPolicy::Never => false,
        }
    }
}

/// Stream stand-in for primers that have nothing to release.
#[derive(Debug, Default)]
pub struct ReleasedStream;

impl MicrophoneStream for ReleasedStream {
    fn release(self: Box<Self>) {}
}

/// Primer that answers every request the same way, immediately.
#[derive(Debug, Clone)]
pub struct StaticPrimer {
    granted: bool,
}

impl StaticPrimer {
    pub fn granting() -> Self {
        Self { granted: true }
    }

    #[cfg(test)]
    pub fn denying() -> Self {
        Self { granted: false }
    }
}

impl MicrophonePrimer for StaticPrimer {
    fn request_access(&self) -> BoxFuture<'static, Result<Box<dyn MicrophoneStream>, PrimingError>> {
        let granted = self.granted;
        Box::pin(async move {
            if granted {
                Ok(Box::new(ReleasedStream) as Box<dyn MicrophoneStream>)
            } else {
                Err(PrimingError::PermissionDenied)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signature(user_agent: &str, platform: &str, touch: u32) -> PlatformSignature {
        PlatformSignature {
            user_agent: user_agent.to_string(),
            platform: platform.to_string(),
            max_touch_points: touch,
        }
    }

    #[test]
    fn test_ios_detection() {
        assert!(signature("Mozilla/5.0 (iPhone; CPU iPhone OS 17_0)", "iPhone", 5).is_ios());
        assert!(signature("Mozilla/5.0 (Macintosh)", "MacIntel", 5).is_ios());
        assert!(!signature("Mozilla/5.0 (Macintosh)", "MacIntel", 0).is_ios());
        assert!(!signature("Mozilla/5.0 (Linux; Android 14)", "Linux armv8l", 5).is_ios());
        assert!(!PlatformSignature::default().is_ios());
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("auto".parse::<PrimingPolicy>().unwrap(), PrimingPolicy::Auto);
        assert_eq!("ALWAYS".parse::<PrimingPolicy>().unwrap(), PrimingPolicy::Always);
        assert_eq!("off".parse::<PrimingPolicy>().unwrap(), PrimingPolicy::Never);
        assert!("sometimes".parse::<PrimingPolicy>().is_err());
    }

    #[test]
    fn test_policy_decision() {
        let primer = StaticPrimer::granting();
        let ios = signature("iPad", "iPad", 5);
        let desktop = PlatformSignature::default();

        assert!(PrimingPolicy::Auto.requires_priming(&ios, &primer));
        assert!(!PrimingPolicy::Auto.requires_priming(&desktop, &primer));
        assert!(PrimingPolicy::Always.requires_priming(&desktop, &primer));
        assert!(!PrimingPolicy::Never.requires_priming(&ios, &primer));
    }

    struct MissingPrimer;

    impl MicrophonePrimer for MissingPrimer {
        fn is_available(&self) -> bool {
            false
        }

        fn request_access(&self) -> BoxFuture<'static, Result<Box<dyn MicrophoneStream>, PrimingError>> {
            Box::pin(async {
                Err::<Box<dyn MicrophoneStream>, _>(PrimingError::PermissionDenied)
            })
        }
    }

    #[test]
    fn test_no_priming_without_microphone_api() {
        let ios = signature("iPhone", "iPhone", 5);
        assert!(!PrimingPolicy::Always.requires_priming(&ios, &MissingPrimer));
    }

    #[tokio::test]
    async fn test_static_primer() {
        assert!(StaticPrimer::granting().request_access().await.is_ok());
        assert!(matches!(
            StaticPrimer::denying().request_access().await,
            Err(PrimingError::PermissionDenied)
        ));
    }
}
