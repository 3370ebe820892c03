use anyhow::{Context, Result};
use nix::sys::stat::Mode;
use nix::unistd::mkfifo;
use signer_core::SignerApp;
use signer_core::presence::{Indicator, PresenceSensor};
use std::fs;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::config::TransportConfig;

fn create_fifo(path: &Path, mode: Mode) -> Result<()> {
    if path.exists() {
        fs::remove_file(path)
            .with_context(|| format!("failed to remove stale FIFO {}", path.display()))?;
    }
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }
    mkfifo(path, mode)
        .with_context(|| format!("failed to create FIFO at {}", path.display()))
}

/// Serve the signer protocol over a command FIFO and a response FIFO.
///
/// The host opens the command FIFO for writing and the response FIFO for
/// reading. When it goes away both are recreated and the loop waits for the
/// next host. Only failures to set up the FIFOs end the loop.
pub fn serve<S, I>(app: &mut SignerApp<S, I>, transport: &TransportConfig) -> Result<()>
where
    S: PresenceSensor,
    I: Indicator,
{
    loop {
        serve_host(app, transport)?;
    }
}

/// Create the FIFOs, serve one host until it disconnects, then remove them.
///
/// Errors on the host's streams (a truncated frame, a closed response FIFO)
/// are logged and end this connection only.
fn serve_host<S, I>(app: &mut SignerApp<S, I>, transport: &TransportConfig) -> Result<()>
where
    S: PresenceSensor,
    I: Indicator,
{
    let cmd_path = transport.command_fifo.as_path();
    let rsp_path = transport.response_fifo.as_path();
    let mode = Mode::S_IRUSR | Mode::S_IWUSR;

    create_fifo(cmd_path, mode)?;
    create_fifo(rsp_path, mode)?;
    log::info!(
        "waiting for host on {} / {}",
        cmd_path.display(),
        rsp_path.display()
    );

    let cmd = fs::OpenOptions::new()
        .read(true)
        .open(cmd_path)
        .with_context(|| format!("failed to open FIFO {} for reading", cmd_path.display()))?;
    let rsp = fs::OpenOptions::new()
        .write(true)
        .open(rsp_path)
        .with_context(|| format!("failed to open FIFO {} for writing", rsp_path.display()))?;
    log::info!("host connected");

    match app.serve(&mut BufReader::new(cmd), &mut BufWriter::new(rsp)) {
        Ok(()) => log::info!("host disconnected"),
        Err(e) => log::warn!("dropping host connection: {e:#}"),
    }

    fs::remove_file(cmd_path).ok();
    fs::remove_file(rsp_path).ok();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use signer_core::DeviceSecret;
    use signer_core::presence::{LedColor, PresenceGate};
    use std::io::{self, Read, Write};
    use std::thread;
    use std::time::Duration;

    struct NeverTouched;

    impl PresenceSensor for NeverTouched {
        fn clear_event(&mut self) {}

        fn wait_event(&mut self, _cadence: Duration) -> bool {
            false
        }
    }

    struct NoLed;

    impl Indicator for NoLed {
        fn set(&mut self, _color: LedColor) {}
    }

    /// Open a FIFO the server has not created yet.
    fn open_when_created(path: &Path, write: bool) -> fs::File {
        loop {
            match fs::OpenOptions::new().read(!write).write(write).open(path) {
                Ok(file) => return file,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    thread::sleep(Duration::from_millis(5))
                }
                Err(e) => panic!("open {}: {e}", path.display()),
            }
        }
    }

    /// Run one connection with `host` on the other end of the FIFOs.
    fn connect<F, T>(app: &mut SignerApp<NeverTouched, NoLed>, transport: &TransportConfig, host: F) -> T
    where
        F: FnOnce(fs::File, fs::File) -> T + Send + 'static,
        T: Send + 'static,
    {
        let cmd_path = transport.command_fifo.clone();
        let rsp_path = transport.response_fifo.clone();
        let client = thread::spawn(move || {
            let cmd = open_when_created(&cmd_path, true);
            let rsp = open_when_created(&rsp_path, false);
            host(cmd, rsp)
        });
        serve_host(app, transport).unwrap();
        client.join().unwrap()
    }

    #[test]
    fn misbehaving_hosts_do_not_stop_the_service() {
        let dir = tempfile::tempdir().unwrap();
        let transport = TransportConfig {
            command_fifo: dir.path().join("cmd"),
            response_fifo: dir.path().join("rsp"),
        };
        let mut app = SignerApp::new(
            DeviceSecret::new([0x42; 32]),
            PresenceGate::new(NeverTouched, NoLed),
        );

        // Header for a 128-byte chunk frame, then hang up after 3 bytes.
        connect(&mut app, &transport, |mut cmd, _rsp| {
            cmd.write_all(&[0x1b, 0x05, 0x00, 0x00]).unwrap();
        });

        // Close the response FIFO before the reply is written.
        connect(&mut app, &transport, |mut cmd, rsp| {
            drop(rsp);
            cmd.write_all(&[0x18, 0x01]).unwrap();
        });

        let reply = connect(&mut app, &transport, |mut cmd, mut rsp| {
            cmd.write_all(&[0x18, 0x01]).unwrap();
            drop(cmd);
            let mut reply = Vec::new();
            rsp.read_to_end(&mut reply).unwrap();
            reply
        });

        assert_eq!(reply.len(), 129);
        assert_eq!(&reply[..2], &[0x1b, 0x02]);
        assert_eq!(&reply[2..34], &app.session().identity().public_key());
        assert!(!transport.command_fifo.exists());
        assert!(!transport.response_fifo.exists());
    }
}
