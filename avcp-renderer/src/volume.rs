//! Conversion between a device's native volume range and percent

/// A device's native volume bounds (`Volume` state variable `allowedValueRange`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VolumeRange {
    pub min: u16,
    pub max: u16,
}

impl VolumeRange {
    pub const fn new(min: u16, max: u16) -> Self {
        Self { min, max }
    }

    /// The full `ui2` range, used when a device does not advertise bounds
    pub const fn full() -> Self {
        Self::new(0, u16::MAX)
    }

    fn span(&self) -> u32 {
        u32::from(self.max.saturating_sub(self.min))
    }

    /// Convert a percentage (clamped to 0..=100) to a native value,
    /// rounding half up
    pub fn to_native(&self, percent: u8) -> u16 {
        let span = self.span();
        if span == 0 {
            return self.min;
        }
        let percent = u32::from(percent.min(100));
        let offset = (percent * span + 50) / 100;
        // offset <= span, so this stays within min..=max
        self.min.saturating_add(offset as u16)
    }

    /// Convert a native value (clamped to the range) to a percentage,
    /// rounding half up
    pub fn to_percent(&self, native: u16) -> u8 {
        let span = self.span();
        if span == 0 {
            return 0;
        }
        let offset = u32::from(native.clamp(self.min, self.max) - self.min);
        ((offset * 100 + span / 2) / span) as u8
    }
}

impl Default for VolumeRange {
    fn default() -> Self {
        Self::full()
    }
}
