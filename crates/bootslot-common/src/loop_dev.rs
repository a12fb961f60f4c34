//! Raw loop-device attachment via `/dev/loop-control` ioctls.
//!
//! The application image is a squashfs blob inside a regular file; mounting it
//! requires binding it to a loop device first. We talk to the kernel directly
//! instead of shelling out to `losetup` since this runs before `/usr/bin` is even
//! mounted.

use std::fs::{File, OpenOptions};
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

use reportify::Report;

mod ioctl {
    // _IO(0x4C, 0x82)
    nix::ioctl_none!(loop_ctl_get_free, 0x4C, 0x82);
    // _IO(0x4C, 0x81), arg is the device number to remove.
    nix::ioctl_write_int!(loop_ctl_remove, 0x4C, 0x81);
    // _IO(0x4C, 0x00), arg is the backing file's fd.
    nix::ioctl_write_int!(loop_set_fd, 0x4C, 0x00);
    // _IO(0x4C, 0x01), arg is ignored.
    nix::ioctl_none!(loop_clr_fd, 0x4C, 0x01);
}

#[derive(Debug, thiserror::Error)]
pub enum LoopDeviceError {
    #[error("unable to open /dev/loop-control")]
    OpenControl(#[source] std::io::Error),
    #[error("LOOP_CTL_GET_FREE failed")]
    GetFree(#[source] nix::Error),
    #[error("unable to open loop device {path}")]
    OpenDevice {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unable to open backing file {path}")]
    OpenBackingFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("LOOP_SET_FD failed for {device} backed by {backing_file}")]
    SetFd {
        device: PathBuf,
        backing_file: PathBuf,
        #[source]
        source: nix::Error,
    },
    #[error("LOOP_CLR_FD failed for {device}")]
    ClrFd {
        device: PathBuf,
        #[source]
        source: nix::Error,
    },
}

pub type LoopDeviceResult<T> = Result<T, Report<LoopDeviceError>>;

/// An attached loop device. Detaches itself on drop, best-effort.
#[derive(Debug)]
pub struct LoopDevice {
    path: PathBuf,
    device: File,
    backing_file: File,
    detached: bool,
}

impl LoopDevice {
    /// Attaches `image` to the next free loop device, returning the handle once
    /// `LOOP_SET_FD` has succeeded.
    pub fn attach(image: &Path) -> LoopDeviceResult<Self> {
        let control = OpenOptions::new()
            .read(true)
            .write(true)
            .open("/dev/loop-control")
            .map_err(LoopDeviceError::OpenControl)
            .map_err(Report::new)?;

        let devnr = unsafe { ioctl::loop_ctl_get_free(control.as_raw_fd()) }
            .map_err(LoopDeviceError::GetFree)
            .map_err(Report::new)?;

        let path = PathBuf::from(format!("/dev/loop{devnr}"));

        let device = match OpenOptions::new().read(true).write(true).open(&path) {
            Ok(device) => device,
            Err(source) => {
                remove_control_entry(&control, devnr);
                return Err(Report::new(LoopDeviceError::OpenDevice { path, source }));
            }
        };

        let backing_file = match OpenOptions::new().read(true).write(true).open(image) {
            Ok(file) => file,
            Err(source) => {
                remove_control_entry(&control, devnr);
                return Err(Report::new(LoopDeviceError::OpenBackingFile {
                    path: image.to_path_buf(),
                    source,
                }));
            }
        };

        if let Err(source) =
            unsafe { ioctl::loop_set_fd(device.as_raw_fd(), backing_file.as_raw_fd() as u64) }
        {
            remove_control_entry(&control, devnr);
            return Err(Report::new(LoopDeviceError::SetFd {
                device: path,
                backing_file: image.to_path_buf(),
                source,
            }));
        }

        Ok(LoopDevice {
            path,
            device,
            backing_file,
            detached: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Clears the backing file and releases the loop device. Idempotent.
    pub fn detach(&mut self) -> LoopDeviceResult<()> {
        if self.detached {
            return Ok(());
        }
        unsafe { ioctl::loop_clr_fd(self.device.as_raw_fd()) }
            .map_err(|source| LoopDeviceError::ClrFd {
                device: self.path.clone(),
                source,
            })
            .map_err(Report::new)?;
        self.detached = true;
        let _ = &self.backing_file;
        Ok(())
    }
}

fn remove_control_entry(control: &File, devnr: i32) {
    unsafe { ioctl::loop_ctl_remove(control.as_raw_fd(), devnr as u64) }.ok();
}

impl Drop for LoopDevice {
    fn drop(&mut self) {
        if !self.detached {
            unsafe { ioctl::loop_clr_fd(self.device.as_raw_fd()) }.ok();
        }
    }
}
