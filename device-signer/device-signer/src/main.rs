mod config;
mod fifo;
mod touch;

use anyhow::Result;
use signer_core::SignerApp;
use signer_core::presence::PresenceGate;

fn main() -> Result<()> {
    env_logger::init();

    let config = config::load()?;
    log::debug!("{config:?}");

    let source = signer_core::detect_source(config.secret.path.as_deref())?;
    let secret = source.device_secret()?;

    let gate = PresenceGate::new(touch::SignalTouchSensor::install()?, touch::LogIndicator::default())
        .with_interval(config.presence.flash_interval());
    let mut app = SignerApp::new(secret, gate);

    fifo::serve(&mut app, &config.transport)?;

    Ok(())
}
