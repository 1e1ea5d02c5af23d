//! Host-facing decoder configuration.

/// How strictly the decoder enforces spec conformance before falling back to
/// best-effort handling of a deviation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StdCompliance {
    VeryStrict,
    Strict,
    Normal,
    Unofficial,
    Experimental,
}

impl Default for StdCompliance {
    fn default() -> Self {
        Self::Normal
    }
}

/// Options accepted by [`crate::Decoder::open`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DecoderConfig {
    /// Crop to the default display window from the SPS VUI.
    pub apply_default_display_window: bool,
    /// Accept profile IDCs outside the set this decoder claims to support.
    pub allow_profile_mismatch: bool,
    /// Controls how many spec deviations are tolerated before a NAL/slice is
    /// treated as an error rather than a best-effort skip.
    pub strict_std_compliance: StdCompliance,
    /// Emit frames with the `CORRUPT` flag instead of dropping them.
    pub output_corrupt: bool,
    /// Emit frames even before the first keyframe has been decoded.
    pub show_all_frames: bool,
    /// Upper bound on parallel workers (tile/WPP); 0 = auto.
    pub threads: u32,
    /// Apply H.274 film grain synthesis (if present) before output.
    pub apply_film_grain: bool,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            apply_default_display_window: true,
            allow_profile_mismatch: false,
            strict_std_compliance: StdCompliance::Normal,
            output_corrupt: false,
            show_all_frames: false,
            threads: 0,
            apply_film_grain: false,
        }
    }
}

impl DecoderConfig {
    /// Whether an `UnsupportedFeature` NAL should be skipped silently
    /// (best-effort) rather than surfaced to the caller.
    pub fn best_effort(&self) -> bool {
        matches!(
            self.strict_std_compliance,
            StdCompliance::Normal | StdCompliance::Unofficial | StdCompliance::Experimental
        )
    }

    pub fn resolved_thread_count(&self) -> u32 {
        if self.threads == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get() as u32)
                .unwrap_or(1)
        } else {
            self.threads
        }
    }
}
