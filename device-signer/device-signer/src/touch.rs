use anyhow::{Context, Result};
use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};
use signer_core::presence::{Indicator, LedColor, PresenceSensor};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

const POLL_STEP: Duration = Duration::from_millis(10);

static TOUCHED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_touch(_: nix::libc::c_int) {
    TOUCHED.store(true, Ordering::SeqCst);
}

/// Host stand-in for the touch sensor: `SIGUSR1` is a touch.
pub struct SignalTouchSensor {
    _installed: (),
}

impl SignalTouchSensor {
    pub fn install() -> Result<Self> {
        let action = SigAction::new(
            SigHandler::Handler(on_touch),
            SaFlags::SA_RESTART,
            SigSet::empty(),
        );
        // SAFETY: the handler only stores to an atomic.
        unsafe { sigaction(Signal::SIGUSR1, &action) }
            .context("failed to install SIGUSR1 handler")?;
        log::info!("touch: send SIGUSR1 to pid {}", std::process::id());
        Ok(Self { _installed: () })
    }
}

impl PresenceSensor for SignalTouchSensor {
    fn clear_event(&mut self) {
        TOUCHED.store(false, Ordering::SeqCst);
    }

    fn wait_event(&mut self, cadence: Duration) -> bool {
        let deadline = Instant::now() + cadence;
        loop {
            if TOUCHED.load(Ordering::SeqCst) {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            std::thread::sleep(POLL_STEP.min(deadline - now));
        }
    }
}

/// Logs LED changes instead of driving hardware.
#[derive(Default)]
pub struct LogIndicator {
    current: Option<LedColor>,
}

impl Indicator for LogIndicator {
    fn set(&mut self, color: LedColor) {
        if self.current != Some(color) {
            log::trace!("led {color:?} ({:#05b})", color.bits());
            self.current = Some(color);
        }
    }
}
