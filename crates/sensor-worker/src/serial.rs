//! Serial Port Byte Source (Linux)
//!
//! Raw-mode termios reader with an eventfd-based unblock channel. The
//! port is opened non-blocking and `poll` provides the blocking: one
//! descriptor for received data, one for the stop request.

use std::ffi::CString;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::source::ByteSource;

/// Serial construction errors
#[derive(Debug, Error)]
pub enum SerialError {
    /// Baud rate with no termios speed constant
    #[error("unsupported baud rate: {0}")]
    UnsupportedBaud(u32),

    /// Device path not representable as a C string
    #[error("invalid device path: {0}")]
    InvalidDevice(String),

    /// Opening the device node failed
    #[error("failed to open {device}: {source}")]
    Open {
        device: String,
        #[source]
        source: io::Error,
    },

    /// eventfd for the stop channel could not be created
    #[error("failed to create stop eventfd: {0}")]
    StopChannel(#[source] io::Error),

    /// Reading or writing terminal attributes failed
    #[error("terminal configuration failed: {0}")]
    Termios(#[source] io::Error),
}

/// Data bits per character
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataBits {
    Seven,
    Eight,
}

/// Parity discipline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Parity {
    None,
    Even,
    Odd,
}

/// Stop bits per character
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopBits {
    One,
    Two,
}

/// Serial line configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Device node path (e.g., "/dev/ttyUSB0")
    pub device: String,
    /// Line speed in baud
    pub baud_rate: u32,
    /// Data bits per character
    pub data_bits: DataBits,
    /// Parity discipline
    pub parity: Parity,
    /// Stop bits per character
    pub stop_bits: StopBits,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            device: "/dev/ttyUSB0".to_string(),
            baud_rate: 115200,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
        }
    }
}

fn to_speed(baud: u32) -> Result<libc::speed_t, SerialError> {
    Ok(match baud {
        9600 => libc::B9600,
        19200 => libc::B19200,
        38400 => libc::B38400,
        57600 => libc::B57600,
        115200 => libc::B115200,
        230400 => libc::B230400,
        576000 => libc::B576000,
        921600 => libc::B921600,
        other => return Err(SerialError::UnsupportedBaud(other)),
    })
}

/// Blocking serial reader with out-of-band unblock
pub struct SerialByteSource {
    /// Serial device descriptor
    fd: OwnedFd,
    /// eventfd used to interrupt a blocked poll
    stop_fd: OwnedFd,
}

impl SerialByteSource {
    /// Open and configure the serial device described by `config`.
    pub fn open(config: &SerialConfig) -> Result<Self, SerialError> {
        let speed = to_speed(config.baud_rate)?;
        let path = CString::new(config.device.as_str())
            .map_err(|_| SerialError::InvalidDevice(config.device.clone()))?;

        // O_NONBLOCK: poll provides the blocking, read itself must not.
        let raw = unsafe {
            libc::open(
                path.as_ptr(),
                libc::O_RDWR | libc::O_NOCTTY | libc::O_CLOEXEC | libc::O_NONBLOCK,
            )
        };
        if raw < 0 {
            return Err(SerialError::Open {
                device: config.device.clone(),
                source: io::Error::last_os_error(),
            });
        }
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        let raw = unsafe { libc::eventfd(0, libc::EFD_NONBLOCK | libc::EFD_CLOEXEC) };
        if raw < 0 {
            return Err(SerialError::StopChannel(io::Error::last_os_error()));
        }
        let stop_fd = unsafe { OwnedFd::from_raw_fd(raw) };

        configure_termios(&fd, config, speed)?;
        info!(device = %config.device, baud = config.baud_rate, "serial source opened");

        Ok(Self { fd, stop_fd })
    }
}

fn configure_termios(
    fd: &OwnedFd,
    config: &SerialConfig,
    speed: libc::speed_t,
) -> Result<(), SerialError> {
    let mut termio: libc::termios = unsafe { std::mem::zeroed() };
    if unsafe { libc::tcgetattr(fd.as_raw_fd(), &mut termio) } != 0 {
        return Err(SerialError::Termios(io::Error::last_os_error()));
    }

    unsafe {
        libc::cfmakeraw(&mut termio);
        libc::cfsetispeed(&mut termio, speed);
        libc::cfsetospeed(&mut termio, speed);
    }

    termio.c_cflag &= !libc::CSIZE;
    termio.c_cflag |= match config.data_bits {
        DataBits::Seven => libc::CS7,
        DataBits::Eight => libc::CS8,
    };

    match config.parity {
        Parity::None => termio.c_cflag &= !(libc::PARENB | libc::PARODD),
        Parity::Even => {
            termio.c_cflag &= !libc::PARODD;
            termio.c_cflag |= libc::PARENB;
        }
        Parity::Odd => termio.c_cflag |= libc::PARENB | libc::PARODD,
    }

    match config.stop_bits {
        StopBits::One => termio.c_cflag &= !libc::CSTOPB,
        StopBits::Two => termio.c_cflag |= libc::CSTOPB,
    }

    termio.c_cflag |= libc::CLOCAL | libc::CREAD;

    // poll gates every read, so no inter-byte timers are needed.
    termio.c_cc[libc::VMIN] = 0;
    termio.c_cc[libc::VTIME] = 0;

    if unsafe { libc::tcsetattr(fd.as_raw_fd(), libc::TCSANOW, &termio) } != 0 {
        return Err(SerialError::Termios(io::Error::last_os_error()));
    }
    Ok(())
}

impl ByteSource for SerialByteSource {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut fds = [
            libc::pollfd {
                fd: self.fd.as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            },
            libc::pollfd {
                fd: self.stop_fd.as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            },
        ];

        loop {
            let rc = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, -1) };
            if rc < 0 {
                let err = io::Error::last_os_error();
                if err.raw_os_error() == Some(libc::EINTR) {
                    continue;
                }
                return Err(err);
            }

            // A stop request wins over pending data.
            if fds[1].revents & libc::POLLIN != 0 {
                let mut counter = 0u64;
                // Drain the eventfd so the next poll blocks again.
                unsafe {
                    libc::read(
                        self.stop_fd.as_raw_fd(),
                        &mut counter as *mut u64 as *mut libc::c_void,
                        std::mem::size_of::<u64>(),
                    );
                }
                return Ok(0);
            }

            if fds[0].revents & libc::POLLIN != 0 {
                let n = unsafe {
                    libc::read(
                        self.fd.as_raw_fd(),
                        buf.as_mut_ptr() as *mut libc::c_void,
                        buf.len(),
                    )
                };
                if n >= 0 {
                    return Ok(n as usize);
                }

                let err = io::Error::last_os_error();
                match err.raw_os_error() {
                    // poll said readable but read raced, or a signal
                    // interrupted the read.
                    Some(libc::EAGAIN) | Some(libc::EINTR) => continue,
                    _ => return Err(err),
                }
            }

            if fds[0].revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0
                || fds[1].revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0
            {
                return Err(io::Error::new(
                    io::ErrorKind::Other,
                    "poll reported a device error",
                ));
            }
        }
    }

    fn stop_request(&self) -> io::Result<()> {
        let counter: u64 = 1;
        let n = unsafe {
            libc::write(
                self.stop_fd.as_raw_fd(),
                &counter as *const u64 as *const libc::c_void,
                std::mem::size_of::<u64>(),
            )
        };
        if n != std::mem::size_of::<u64>() as isize {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_baud_is_rejected_before_open() {
        let config = SerialConfig {
            device: "/dev/null".to_string(),
            baud_rate: 12345,
            ..SerialConfig::default()
        };
        assert!(matches!(
            SerialByteSource::open(&config),
            Err(SerialError::UnsupportedBaud(12345))
        ));
    }

    #[test]
    fn test_missing_device_fails_open() {
        let config = SerialConfig {
            device: "/dev/does-not-exist-tty".to_string(),
            ..SerialConfig::default()
        };
        assert!(matches!(
            SerialByteSource::open(&config),
            Err(SerialError::Open { .. })
        ));
    }

    #[test]
    fn test_non_tty_fails_termios_configuration() {
        let config = SerialConfig {
            device: "/dev/null".to_string(),
            ..SerialConfig::default()
        };
        assert!(matches!(
            SerialByteSource::open(&config),
            Err(SerialError::Termios(_))
        ));
    }

    #[test]
    fn test_default_config() {
        let config = SerialConfig::default();
        assert_eq!(config.baud_rate, 115200);
        assert_eq!(config.data_bits, DataBits::Eight);
        assert_eq!(config.parity, Parity::None);
        assert_eq!(config.stop_bits, StopBits::One);
    }
}
