use std::time::Duration;

use crate::session::ConfirmPresence;

pub const DEFAULT_FLASH_INTERVAL: Duration = Duration::from_millis(350);

const LED_G_BIT: u8 = 1;
const LED_B_BIT: u8 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedColor {
    Black,
    Green,
    Blue,
}

impl LedColor {
    /// Value for the device LED register.
    pub const fn bits(self) -> u8 {
        match self {
            Self::Black => 0,
            Self::Green => 1 << LED_G_BIT,
            Self::Blue => 1 << LED_B_BIT,
        }
    }
}

pub trait Indicator {
    fn set(&mut self, color: LedColor);
}

/// Physical confirmation input (the touch sensor on the device).
pub trait PresenceSensor {
    /// Drop any latched event.
    fn clear_event(&mut self);

    /// Block for up to `cadence` and report whether an event is latched.
    fn wait_event(&mut self, cadence: Duration) -> bool;
}

/// Flashes the indicator until the sensor reports a touch.
///
/// There is no timeout and nothing can cancel the wait.
pub struct PresenceGate<S, I> {
    sensor: S,
    indicator: I,
    color: LedColor,
    interval: Duration,
}

impl<S: PresenceSensor, I: Indicator> PresenceGate<S, I> {
    pub fn new(sensor: S, indicator: I) -> Self {
        Self {
            sensor,
            indicator,
            color: LedColor::Green,
            interval: DEFAULT_FLASH_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn indicator(&self) -> &I {
        &self.indicator
    }

    pub fn indicator_mut(&mut self) -> &mut I {
        &mut self.indicator
    }

    pub fn sensor(&self) -> &S {
        &self.sensor
    }

    #[cfg_attr(feature = "no-touch", allow(dead_code))]
    fn wait_touch_flashing(&mut self) {
        let mut led_on = false;
        // A stale touch must not count as confirmation.
        self.sensor.clear_event();
        loop {
            self.indicator
                .set(if led_on { self.color } else { LedColor::Black });
            if self.sensor.wait_event(self.interval) {
                break;
            }
            led_on = !led_on;
        }
        self.sensor.clear_event();
    }
}

impl<S: PresenceSensor, I: Indicator> ConfirmPresence for PresenceGate<S, I> {
    #[cfg(not(feature = "no-touch"))]
    fn confirm(&mut self) {
        log::info!("waiting for touch");
        self.wait_touch_flashing();
        log::debug!("touch confirmed");
    }

    #[cfg(feature = "no-touch")]
    fn confirm(&mut self) {
        log::warn!("presence gate disabled at build time, signing without touch");
    }
}

#[cfg(all(test, not(feature = "no-touch")))]
mod tests {
    use super::*;

    /// Confirms on the `touch_after`-th wait.
    struct ScriptedSensor {
        touch_after: usize,
        waits: usize,
        clears: usize,
        cadence: Option<Duration>,
    }

    impl ScriptedSensor {
        fn new(touch_after: usize) -> Self {
            Self {
                touch_after,
                waits: 0,
                clears: 0,
                cadence: None,
            }
        }
    }

    impl PresenceSensor for ScriptedSensor {
        fn clear_event(&mut self) {
            self.clears += 1;
        }

        fn wait_event(&mut self, cadence: Duration) -> bool {
            self.waits += 1;
            self.cadence = Some(cadence);
            self.waits >= self.touch_after
        }
    }

    #[derive(Default)]
    struct RecordingIndicator(Vec<LedColor>);

    impl Indicator for RecordingIndicator {
        fn set(&mut self, color: LedColor) {
            self.0.push(color);
        }
    }

    #[test]
    fn immediate_touch_clears_before_and_after() {
        let mut gate = PresenceGate::new(ScriptedSensor::new(1), RecordingIndicator::default());
        gate.confirm();
        assert_eq!(gate.sensor().waits, 1);
        assert_eq!(gate.sensor().clears, 2);
        assert_eq!(gate.indicator().0, vec![LedColor::Black]);
    }

    #[test]
    fn flashes_green_while_waiting() {
        let mut gate = PresenceGate::new(ScriptedSensor::new(4), RecordingIndicator::default())
            .with_interval(Duration::from_millis(5));
        gate.confirm();
        assert_eq!(gate.sensor().waits, 4);
        assert_eq!(gate.sensor().cadence, Some(Duration::from_millis(5)));
        assert_eq!(
            gate.indicator().0,
            vec![LedColor::Black, LedColor::Green, LedColor::Black, LedColor::Green]
        );
    }

    #[test]
    fn led_bits_match_register_layout() {
        assert_eq!(LedColor::Black.bits(), 0);
        assert_eq!(LedColor::Green.bits(), 0b010);
        assert_eq!(LedColor::Blue.bits(), 0b001);
    }
}
