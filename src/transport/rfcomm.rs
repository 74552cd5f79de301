//! # Bluetooth Classic (RFCOMM) Transport
//!
//! Communication with SPP printers through a bound `/dev/rfcommN` TTY.
//!
//! ## Bluetooth Setup (Linux)
//!
//! The printer must be paired first. Binding is done on demand by
//! [`open_for_address`], or by hand:
//!
//! ```bash
//! # 1. Find and pair the printer
//! $ bluetoothctl
//! [bluetooth]# scan on
//! [bluetooth]# pair 00:11:62:XX:XX:XX
//!
//! # 2. Bind to RFCOMM device
//! $ sudo rfcomm bind 0 00:11:62:XX:XX:XX
//! # This creates /dev/rfcomm0
//! ```
//!
//! ## TTY Configuration
//!
//! The RFCOMM device is opened in raw mode so binary data is transmitted
//! without modification:
//!
//! - **No input processing**: Disable IGNBRK, BRKINT, PARMRK, ISTRIP, etc.
//! - **No output processing**: Disable OPOST (no CR/LF translation)
//! - **8-bit characters**: CS8 (8 data bits, no parity)
//! - **No echo**: Disable ECHO, ECHONL
//! - **Non-canonical mode**: Disable ICANON (no line buffering)
//!
//! ## What This Backend Does Not Do
//!
//! Discovery and GATT. [`RfcommAdapter`] reports the pairing list from
//! `bluetoothctl` and opens Classic links; pair it with the `ble` backend
//! for LE printers.

use std::fs::{File, OpenOptions};
use std::io;
#[cfg(unix)]
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{BluetoothAdapter, Device, GattLink, RfcommStream};
use crate::error::TransportError;

/// Default RFCOMM device path
pub const DEFAULT_DEVICE: &str = "/dev/rfcomm0";

/// Highest `/dev/rfcommN` index tried when binding a new device
const MAX_RFCOMM_DEVICES: u8 = 8;

/// Settle time after `bluetoothctl connect` and `rfcomm bind`
const SETTLE_DELAY: Duration = Duration::from_millis(500);

// ============================================================================
// TTY STREAM
// ============================================================================

/// # RFCOMM TTY Stream
///
/// An open `/dev/rfcommN` configured for raw binary output.
///
/// ```no_run
/// use silver_printer::transport::RfcommStream;
/// use silver_printer::transport::rfcomm::RfcommTty;
///
/// # async fn demo() -> Result<(), silver_printer::error::TransportError> {
/// let mut tty = RfcommTty::open("/dev/rfcomm0").await?;
/// tty.write_all(&[0x1B, 0x40]).await?;
/// tty.flush().await?;
/// # Ok(())
/// # }
/// ```
pub struct RfcommTty {
    file: Option<tokio::fs::File>,
    path: PathBuf,
}

impl RfcommTty {
    /// Open an RFCOMM device and switch it to raw mode.
    ///
    /// Opening a bound `/dev/rfcommN` blocks until the RFCOMM channel is
    /// up, so the open and termios setup run on the blocking pool. Callers
    /// can put a timeout around this without stalling a runtime worker.
    ///
    /// ## Errors
    ///
    /// Returns an error if:
    /// - The device doesn't exist
    /// - Permission denied (may need root or dialout group)
    /// - TTY configuration fails
    pub async fn open(device: impl AsRef<Path>) -> Result<Self, TransportError> {
        let path = device.as_ref().to_path_buf();

        let (file, path) = tokio::task::spawn_blocking(move || {
            open_raw(&path).map(|file| (file, path))
        })
        .await
        .map_err(|e| TransportError::Rfcomm(format!("Open task failed: {}", e)))??;

        debug!(device = %path.display(), "Opened RFCOMM TTY");
        Ok(Self {
            file: Some(tokio::fs::File::from_std(file)),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn file(&mut self) -> Result<&mut tokio::fs::File, TransportError> {
        self.file.as_mut().ok_or(TransportError::Disconnected)
    }
}

#[async_trait]
impl RfcommStream for RfcommTty {
    async fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.file()?
            .write_all(data)
            .await
            .map_err(|e| TransportError::Rfcomm(format!("Write failed: {}", e)))
    }

    async fn flush(&mut self) -> Result<(), TransportError> {
        self.file()?
            .flush()
            .await
            .map_err(|e| TransportError::Rfcomm(format!("Flush failed: {}", e)))
    }

    async fn is_connected(&mut self) -> bool {
        self.file.is_some() && tokio::fs::try_exists(&self.path).await.unwrap_or(false)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if let Some(mut file) = self.file.take() {
            file.flush()
                .await
                .map_err(|e| TransportError::Rfcomm(format!("Flush failed: {}", e)))?;
        }
        Ok(())
    }
}

/// Blocking half of [`RfcommTty::open`].
fn open_raw(path: &Path) -> Result<File, TransportError> {
    let file = OpenOptions::new().write(true).open(path).map_err(|e| {
        TransportError::Rfcomm(format!("Failed to open {}: {}", path.display(), e))
    })?;

    #[cfg(unix)]
    configure_tty_raw(file.as_raw_fd())?;

    Ok(file)
}

/// Configure a file descriptor for raw TTY mode.
///
/// ## What Gets Disabled
///
/// - **Input flags**: IGNBRK, BRKINT, PARMRK, ISTRIP, INLCR, IGNCR, ICRNL, IXON, IXOFF, IXANY
/// - **Output flags**: OPOST
/// - **Local flags**: ECHO, ECHONL, ICANON, ISIG, IEXTEN
/// - **Control flags**: CSIZE, PARENB (then CS8 is set)
///
/// IXON/IXOFF/IXANY must be off: 0x11 (XON) and 0x13 (XOFF) occur in raster
/// data and in the default `ESC t 0x11` code page command.
#[cfg(unix)]
fn configure_tty_raw(fd: i32) -> Result<(), TransportError> {
    use std::mem::MaybeUninit;

    let mut termios = MaybeUninit::uninit();
    let result = unsafe { libc::tcgetattr(fd, termios.as_mut_ptr()) };
    if result != 0 {
        return Err(TransportError::Rfcomm(format!(
            "tcgetattr failed: {}",
            io::Error::last_os_error()
        )));
    }
    let mut termios = unsafe { termios.assume_init() };

    termios.c_iflag &= !(libc::IGNBRK
        | libc::BRKINT
        | libc::PARMRK
        | libc::ISTRIP
        | libc::INLCR
        | libc::IGNCR
        | libc::ICRNL
        | libc::IXON
        | libc::IXOFF
        | libc::IXANY);
    termios.c_oflag &= !libc::OPOST;
    termios.c_lflag &= !(libc::ECHO | libc::ECHONL | libc::ICANON | libc::ISIG | libc::IEXTEN);
    termios.c_cflag &= !(libc::CSIZE | libc::PARENB);
    termios.c_cflag |= libc::CS8;

    let result = unsafe { libc::tcsetattr(fd, libc::TCSANOW, &termios) };
    if result != 0 {
        return Err(TransportError::Rfcomm(format!(
            "tcsetattr failed: {}",
            io::Error::last_os_error()
        )));
    }

    Ok(())
}

// ============================================================================
// RFCOMM SETUP HELPERS
// ============================================================================

/// Validate a Bluetooth MAC address format (XX:XX:XX:XX:XX:XX).
pub fn is_valid_mac(mac: &str) -> bool {
    let parts: Vec<&str> = mac.split(':').collect();
    if parts.len() != 6 {
        return false;
    }
    parts
        .iter()
        .all(|part| part.len() == 2 && part.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Find the `rfcommN` name bound to `mac` in `/proc/net/rfcomm` or
/// `rfcomm -a` output (`rfcomm0: XX:XX:XX:XX:XX:XX channel 1 ...`).
fn rfcomm_name_for_mac<'a>(listing: &'a str, mac: &str) -> Option<&'a str> {
    let mac_upper = mac.to_uppercase();
    listing
        .lines()
        .filter(|line| line.to_uppercase().contains(&mac_upper))
        .filter_map(|line| line.split(':').next())
        .map(str::trim)
        .find(|name| name.starts_with("rfcomm"))
}

/// Find an existing RFCOMM device bound to the given MAC address.
///
/// Checks `/proc/net/rfcomm` and falls back to `rfcomm -a`. Returns the
/// device path (e.g., "/dev/rfcomm0") if found.
pub async fn find_rfcomm_for_mac(mac: &str) -> Result<Option<PathBuf>, TransportError> {
    if let Ok(contents) = tokio::fs::read_to_string("/proc/net/rfcomm").await {
        if let Some(path) = existing_device(rfcomm_name_for_mac(&contents, mac)) {
            return Ok(Some(path));
        }
    }

    let output = Command::new("rfcomm")
        .kill_on_drop(true)
        .arg("-a")
        .output()
        .await
        .map_err(|e| TransportError::Rfcomm(format!("Failed to run 'rfcomm -a': {}", e)))?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(existing_device(rfcomm_name_for_mac(&stdout, mac)))
}

fn existing_device(name: Option<&str>) -> Option<PathBuf> {
    let path = PathBuf::from(format!("/dev/{}", name?));
    path.exists().then_some(path)
}

/// Set up an RFCOMM device for a Bluetooth MAC address.
///
/// Runs:
/// 1. `bluetoothctl connect <MAC>` - connect to device
/// 2. `l2ping -c 1 <MAC>` - verify connectivity
/// 3. `rfcomm bind <index> <MAC> 1` - create /dev/rfcommN
///
/// **Requires root privileges** for `rfcomm bind`.
pub async fn setup_rfcomm(mac: &str, index: u8) -> Result<PathBuf, TransportError> {
    let mac_upper = mac.to_uppercase();
    let device_path = PathBuf::from(format!("/dev/rfcomm{}", index));

    info!(mac = %mac_upper, "Connecting via bluetoothctl");
    let output = Command::new("bluetoothctl")
        .kill_on_drop(true)
        .arg("connect")
        .arg(&mac_upper)
        .output()
        .await
        .map_err(|e| TransportError::Rfcomm(format!("Failed to run bluetoothctl: {}", e)))?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    if !(stdout.contains("Connection successful") || stdout.contains("already connected")) {
        // l2ping below decides whether the device is usable
        debug!(output = %stdout.trim(), "bluetoothctl connect did not confirm");
    }

    tokio::time::sleep(SETTLE_DELAY).await;

    let output = Command::new("l2ping")
        .kill_on_drop(true)
        .arg("-c")
        .arg("1")
        .arg(&mac_upper)
        .output()
        .await
        .map_err(|e| TransportError::Rfcomm(format!("Failed to run l2ping: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(TransportError::Rfcomm(format!(
            "Device {} not reachable: {}",
            mac_upper,
            stderr.trim()
        )));
    }

    info!(index, mac = %mac_upper, "Binding RFCOMM device");
    let output = Command::new("rfcomm")
        .kill_on_drop(true)
        .arg("bind")
        .arg(index.to_string())
        .arg(&mac_upper)
        .arg("1") // SPP channel
        .output()
        .await
        .map_err(|e| TransportError::Rfcomm(format!("Failed to run rfcomm bind: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(TransportError::Rfcomm(format!(
            "rfcomm bind failed: {}",
            stderr.trim()
        )));
    }

    tokio::time::sleep(SETTLE_DELAY).await;

    if !device_path.exists() {
        return Err(TransportError::Rfcomm(format!(
            "Device {} was not created",
            device_path.display()
        )));
    }

    Ok(device_path)
}

/// Open a raw TTY for `mac`, binding a free `/dev/rfcommN` if none exists.
pub async fn open_for_address(mac: &str) -> Result<RfcommTty, TransportError> {
    if !is_valid_mac(mac) {
        return Err(TransportError::NotFound(format!(
            "'{}' is not a Bluetooth MAC address",
            mac
        )));
    }

    let path = match find_rfcomm_for_mac(mac).await? {
        Some(path) => path,
        None => {
            let index = (0..MAX_RFCOMM_DEVICES)
                .find(|n| !Path::new(&format!("/dev/rfcomm{}", n)).exists())
                .ok_or_else(|| TransportError::Rfcomm("No free rfcomm device index".into()))?;
            setup_rfcomm(mac, index).await?
        }
    };

    RfcommTty::open(path).await
}

// ============================================================================
// PAIRING LIST
// ============================================================================

/// Parse `bluetoothctl devices Paired` output (`Device <MAC> <name>` lines).
pub fn parse_paired_devices(output: &str) -> Vec<Device> {
    output
        .lines()
        .filter_map(|line| {
            let rest = line.trim().strip_prefix("Device ")?;
            let (mac, name) = rest.split_once(' ').unwrap_or((rest, ""));
            is_valid_mac(mac).then(|| {
                let name = if name.trim().is_empty() { mac } else { name.trim() };
                Device::paired(mac.to_uppercase(), name)
            })
        })
        .collect()
}

/// Devices bonded with this host, from `bluetoothctl`.
pub async fn paired_devices() -> Result<Vec<Device>, TransportError> {
    let output = Command::new("bluetoothctl")
        .kill_on_drop(true)
        .args(["devices", "Paired"])
        .output()
        .await
        .map_err(|e| TransportError::Adapter(format!("Failed to run bluetoothctl: {}", e)))?;
    Ok(parse_paired_devices(&String::from_utf8_lossy(&output.stdout)))
}

/// Whether `bluetoothctl show` reports a powered controller.
pub async fn is_adapter_powered() -> bool {
    match Command::new("bluetoothctl")
        .arg("show")
        .kill_on_drop(true)
        .output()
        .await
    {
        Ok(output) => String::from_utf8_lossy(&output.stdout).contains("Powered: yes"),
        Err(e) => {
            warn!(error = %e, "bluetoothctl unavailable");
            false
        }
    }
}

// ============================================================================
// ADAPTER
// ============================================================================

/// Classic-only adapter backed by BlueZ command line tools.
#[derive(Debug, Clone, Copy, Default)]
pub struct RfcommAdapter;

#[async_trait]
impl BluetoothAdapter for RfcommAdapter {
    async fn is_powered(&self) -> bool {
        is_adapter_powered().await
    }

    async fn start_scan(&self, _found: mpsc::UnboundedSender<Device>) -> Result<(), TransportError> {
        Err(TransportError::Unsupported(
            "RFCOMM backend cannot scan; pair the printer with bluetoothctl".into(),
        ))
    }

    async fn stop_scan(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn bonded_devices(&self) -> Result<Vec<Device>, TransportError> {
        paired_devices().await
    }

    async fn connect_gatt(&self, _address: &str) -> Result<GattLink, TransportError> {
        Err(TransportError::Unsupported(
            "RFCOMM backend has no GATT support".into(),
        ))
    }

    async fn connect_rfcomm(&self, address: &str) -> Result<Box<dyn RfcommStream>, TransportError> {
        Ok(Box::new(open_for_address(address).await?))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::DeviceKind;

    #[test]
    fn test_default_device_path() {
        assert_eq!(DEFAULT_DEVICE, "/dev/rfcomm0");
    }

    #[test]
    fn test_valid_mac_addresses() {
        assert!(is_valid_mac("00:11:22:33:44:55"));
        assert!(is_valid_mac("AA:BB:CC:DD:EE:FF"));
        assert!(is_valid_mac("aa:bb:cc:dd:ee:ff"));
    }

    #[test]
    fn test_invalid_mac_addresses() {
        assert!(!is_valid_mac("00:11:22:33:44")); // too short
        assert!(!is_valid_mac("00:11:22:33:44:55:66")); // too long
        assert!(!is_valid_mac("00-11-22-33-44-55")); // wrong separator
        assert!(!is_valid_mac("GG:HH:II:JJ:KK:LL")); // invalid hex
        assert!(!is_valid_mac(""));
    }

    #[test]
    fn test_rfcomm_listing_lookup() {
        let listing = "rfcomm0: 11:22:33:44:55:66 channel 1 clean\n\
                       rfcomm1: aa:bb:cc:dd:ee:ff channel 1 connected [tty-attached]\n";
        assert_eq!(rfcomm_name_for_mac(listing, "AA:BB:CC:DD:EE:FF"), Some("rfcomm1"));
        assert_eq!(rfcomm_name_for_mac(listing, "00:00:00:00:00:00"), None);
    }

    #[test]
    fn test_parse_paired_devices() {
        let output = "Device 00:11:22:33:44:55 PT-210\n\
                      Device aa:bb:cc:dd:ee:ff\n\
                      garbage line\n\
                      Device not-a-mac Something\n";
        let devices = parse_paired_devices(output);
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].name, "PT-210");
        assert_eq!(devices[0].kind, DeviceKind::Classic);
        assert!(devices[0].is_paired);
        assert_eq!(devices[1].address, "AA:BB:CC:DD:EE:FF");
        assert_eq!(devices[1].name, "aa:bb:cc:dd:ee:ff");
    }

    #[tokio::test]
    async fn test_open_rejects_non_mac() {
        let err = open_for_address("printer-1").await.err().unwrap();
        assert!(matches!(err, TransportError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_open_missing_device() {
        let err = RfcommTty::open("/dev/rfcomm-does-not-exist").await.err().unwrap();
        assert!(matches!(err, TransportError::Rfcomm(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_open_rejects_non_tty() {
        let path = std::env::temp_dir().join(format!("rfcomm-plain-{}", std::process::id()));
        std::fs::write(&path, b"").unwrap();

        let err = RfcommTty::open(&path).await.err().unwrap();
        std::fs::remove_file(&path).unwrap();
        assert!(err.to_string().contains("tcgetattr"), "{err}");
    }

    /// A FIFO with no reader blocks `open(2)` for writing, like a bound
    /// rfcomm TTY whose channel is not up yet.
    #[cfg(unix)]
    #[tokio::test]
    async fn test_blocked_open_does_not_stall_runtime() {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;
        use std::os::unix::fs::OpenOptionsExt;

        let path = std::env::temp_dir().join(format!("rfcomm-fifo-{}", std::process::id()));
        let c_path = CString::new(path.as_os_str().as_bytes()).unwrap();
        assert_eq!(unsafe { libc::mkfifo(c_path.as_ptr(), 0o600) }, 0);

        let attempt =
            tokio::time::timeout(Duration::from_millis(100), RfcommTty::open(&path)).await;
        assert!(attempt.is_err());

        // Give the blocked open a reader so the blocking thread can finish
        let reader = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(&path)
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(reader);
        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn test_adapter_has_no_gatt() {
        let err = RfcommAdapter.connect_gatt("00:11:22:33:44:55").await.err().unwrap();
        assert!(matches!(err, TransportError::Unsupported(_)));
    }
}
