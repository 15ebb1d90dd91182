//! Linux TUN device implementation.
//!
//! Opens the clone device (default `/dev/net/tun`) and attaches to, or
//! creates, a TUN interface with `TUNSETIFF`. Requires root or
//! `CAP_NET_ADMIN`, and the `tun` kernel module.
//!
//! The `unsafe` here is confined to the `ifreq` ioctl; the device handle
//! itself is an ordinary `File` closed exactly once on drop.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::fd::AsRawFd;

use tracing::info;

use super::{InterfaceError, TunInterface};
use crate::config::MAX_IFNAME_LEN;

/// A kernel TUN interface.
#[derive(Debug)]
pub struct LinuxTun {
    file: File,
    name: String,
}

impl LinuxTun {
    /// Open `tun_path` and create (or attach to) the interface `if_name`.
    ///
    /// An empty `if_name` lets the kernel pick a name; the assigned name is
    /// captured and reported by [`name`](TunInterface::name).
    pub fn open(if_name: &str, tun_path: &str) -> Result<Self, InterfaceError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(tun_path)
            .map_err(|source| InterfaceError::Open {
                path: tun_path.to_string(),
                source,
            })?;

        let mut ifr: libc::ifreq = unsafe { std::mem::zeroed() };
        // IFF_NO_PI: raw IP packets, no packet-information prefix.
        unsafe {
            ifr.ifr_ifru.ifru_flags = (libc::IFF_TUN | libc::IFF_NO_PI) as libc::c_short;
        }
        for (dst, src) in ifr
            .ifr_name
            .iter_mut()
            .zip(if_name.bytes().take(MAX_IFNAME_LEN - 1))
        {
            *dst = src as libc::c_char;
        }

        let ret = unsafe {
            libc::ioctl(
                file.as_raw_fd(),
                libc::TUNSETIFF as libc::c_ulong,
                &ifr as *const libc::ifreq,
            )
        };
        if ret < 0 {
            return Err(InterfaceError::Create(std::io::Error::last_os_error()));
        }

        // The kernel writes the final name back into the ifreq.
        let name_bytes: Vec<u8> = ifr
            .ifr_name
            .iter()
            .take_while(|&&c| c != 0)
            .map(|&c| c as u8)
            .collect();
        let name = String::from_utf8_lossy(&name_bytes).into_owned();

        info!(name = %name, path = %tun_path, "created tun interface");

        Ok(Self { file, name })
    }
}

impl TunInterface for LinuxTun {
    fn read_packet(&self, buf: &mut [u8]) -> Result<usize, InterfaceError> {
        // One read yields exactly one packet on a TUN device.
        (&self.file).read(buf).map_err(InterfaceError::Read)
    }

    fn write_packet(&self, buf: &[u8]) -> Result<(), InterfaceError> {
        (&self.file).write_all(buf).map_err(InterfaceError::Write)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[ignore] // Requires root and the tun module.
    fn test_open_kernel_assigned_name() {
        let tun = LinuxTun::open("", crate::config::DEFAULT_TUN_PATH).unwrap();
        assert!(!tun.name().is_empty());
    }

    #[test]
    fn test_open_missing_clone_device() {
        let err = LinuxTun::open("tunb0", "/dev/net/does-not-exist").unwrap_err();
        assert!(matches!(err, InterfaceError::Open { .. }));
    }
}
