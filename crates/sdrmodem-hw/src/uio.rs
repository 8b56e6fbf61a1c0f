//! Linux UIO register bus.
//!
//! Each IP core is exported by the `uio_pdrv_genirq` driver as `/dev/uioN`
//! with its register window as `map0`. DMA controllers additionally describe
//! their reserved buffer as `map1`. Interrupts follow the UIO protocol:
//! writing `1`/`0` to the device unmasks/masks the line, a blocking read
//! returns the running interrupt count.
//!
//! ## Requirements
//!
//! - Device tree nodes bound to `generic-uio`
//! - Read/write access to `/dev/uioN` (and `/dev/mem` for DMA buffers)

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::ptr;
use std::time::Duration;

use tracing::{debug, trace};

use crate::bus::{IrqStatus, RegisterBus, check_register};
use crate::error::{BusError, BusResult};

/// Default sysfs class directory for UIO devices
pub const UIO_SYSFS_ROOT: &str = "/sys/class/uio";

/// Default directory holding the `uioN` device nodes
pub const UIO_DEV_ROOT: &str = "/dev";

/// One memory map advertised by a UIO device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UioMap {
    /// Physical base address
    pub addr: u64,
    /// Size in bytes
    pub size: usize,
}

/// Description of a UIO device found in sysfs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UioInfo {
    /// Numeric id (`N` in `/dev/uioN`)
    pub id: u32,
    /// Device tree name of the IP core
    pub name: String,
    /// Advertised memory maps, indexed by map number
    pub maps: Vec<UioMap>,
}

/// Location of the UIO sysfs tree and device nodes.
///
/// Production code uses [`UioPaths::default`]; tests point this at a temporary directory.
#[derive(Debug, Clone)]
pub struct UioPaths {
    /// sysfs class directory (`/sys/class/uio`)
    pub sysfs_root: PathBuf,
    /// Device node directory (`/dev`)
    pub dev_root: PathBuf,
}

impl Default for UioPaths {
    fn default() -> Self {
        Self {
            sysfs_root: PathBuf::from(UIO_SYSFS_ROOT),
            dev_root: PathBuf::from(UIO_DEV_ROOT),
        }
    }
}

impl UioPaths {
    fn device_dir(&self, id: u32) -> PathBuf {
        self.sysfs_root.join(format!("uio{id}"))
    }

    /// Path of the device node for `id`
    #[must_use]
    pub fn device_node(&self, id: u32) -> PathBuf {
        self.dev_root.join(format!("uio{id}"))
    }

    /// Read the physical address and size of map `index` of device `id`
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the descriptor files are missing or malformed.
    pub fn map_info(&self, id: u32, index: usize) -> io::Result<UioMap> {
        let dir = self.device_dir(id).join("maps").join(format!("map{index}"));
        let addr = read_sysfs_hex(&dir.join("addr"))?;
        let size = read_sysfs_hex(&dir.join("size"))?;
        Ok(UioMap {
            addr,
            size: size as usize,
        })
    }

    /// Enumerate all UIO devices, sorted by id
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the sysfs class directory cannot be read.
    pub fn list_devices(&self) -> io::Result<Vec<UioInfo>> {
        let mut devices = Vec::new();

        for entry in fs::read_dir(&self.sysfs_root)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(id) = file_name
                .to_str()
                .and_then(|n| n.strip_prefix("uio"))
                .and_then(|n| n.parse::<u32>().ok())
            else {
                continue;
            };

            let name = match fs::read_to_string(entry.path().join("name")) {
                Ok(name) => name.trim().to_string(),
                Err(_) => continue,
            };

            let mut maps = Vec::new();
            while let Ok(map) = self.map_info(id, maps.len()) {
                maps.push(map);
            }

            devices.push(UioInfo { id, name, maps });
        }

        devices.sort_by_key(|d| d.id);
        Ok(devices)
    }

    /// Resolve a device id from its device tree name
    ///
    /// # Errors
    ///
    /// Returns `BusError::NotFound` if no device carries `name`.
    pub fn find_by_name(&self, name: &str) -> BusResult<u32> {
        self.list_devices()?
            .into_iter()
            .find(|d| d.name == name)
            .map(|d| d.id)
            .ok_or_else(|| BusError::NotFound(name.to_string()))
    }
}

/// Resolve a UIO device id from its device tree name using the default sysfs tree
///
/// # Errors
///
/// Returns `BusError::NotFound` if no device carries `name`.
pub fn find_by_name(name: &str) -> BusResult<u32> {
    UioPaths::default().find_by_name(name)
}

/// Parse a sysfs attribute holding a hexadecimal value (`0x` prefix optional)
///
/// # Errors
///
/// Returns an I/O error if the file cannot be read or does not hold a hex number.
pub fn read_sysfs_hex(path: &Path) -> io::Result<u64> {
    let content = fs::read_to_string(path)?;
    let trimmed = content.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    u64::from_str_radix(digits, 16).map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{}: '{}' is not a hex value: {}", path.display(), trimmed, e),
        )
    })
}

/// Register window and interrupt line of one UIO device
pub struct UioDevice {
    /// UIO device id
    id: u32,
    /// Open device node, used for interrupt control
    file: File,
    /// Base of the mmap'd register window
    regs: *mut u8,
    /// Size of the register window
    window: usize,
}

impl UioDevice {
    /// Open `/dev/uio{id}` and map its register window
    ///
    /// # Errors
    ///
    /// Returns `BusError::Unavailable` if the device node or its map descriptor
    /// cannot be opened, or the register window cannot be mapped.
    pub fn open(id: u32) -> BusResult<Self> {
        Self::open_with(&UioPaths::default(), id)
    }

    /// Open a device by its device tree name
    ///
    /// # Errors
    ///
    /// Returns `BusError::NotFound` if no device carries `name`, otherwise as [`Self::open`].
    pub fn open_by_name(name: &str) -> BusResult<Self> {
        let paths = UioPaths::default();
        let id = paths.find_by_name(name)?;
        Self::open_with(&paths, id)
    }

    /// Open a device using an explicit sysfs/device tree layout
    ///
    /// # Errors
    ///
    /// As [`Self::open`].
    pub fn open_with(paths: &UioPaths, id: u32) -> BusResult<Self> {
        let node = paths.device_node(id);
        let unavailable = |reason: String| BusError::Unavailable {
            device: node.display().to_string(),
            reason,
        };

        let map = paths
            .map_info(id, 0)
            .map_err(|e| unavailable(format!("register map descriptor: {e}")))?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_SYNC)
            .open(&node)
            .map_err(|e| unavailable(e.to_string()))?;

        // SAFETY: mmap is a standard POSIX syscall. The file descriptor is valid for
        // the duration of the call; UIO exposes map0 at offset 0. The result is
        // checked for MAP_FAILED before use.
        let regs = unsafe {
            libc::mmap(
                ptr::null_mut(),
                map.size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                file.as_raw_fd(),
                0,
            )
        };

        if regs == libc::MAP_FAILED {
            return Err(unavailable(format!(
                "failed to map register window: {}",
                io::Error::last_os_error()
            )));
        }

        debug!(id, window = map.size, "opened UIO device");

        Ok(Self {
            id,
            file,
            regs: regs as *mut u8,
            window: map.size,
        })
    }

    /// UIO device id
    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    fn write_irq_control(&self, value: u32) -> BusResult<()> {
        (&self.file)
            .write_all(&value.to_ne_bytes())
            .map_err(BusError::Irq)
    }
}

impl RegisterBus for UioDevice {
    fn read(&self, offset: usize) -> BusResult<u32> {
        check_register(offset, self.window)?;
        // SAFETY: `check_register` guarantees the aligned 4-byte access lies inside
        // the mapped register window, which stays mapped until drop.
        let value = unsafe { ptr::read_volatile(self.regs.add(offset) as *const u32) };
        trace!(id = self.id, offset, value, "register read");
        Ok(value)
    }

    fn write(&self, offset: usize, value: u32) -> BusResult<()> {
        check_register(offset, self.window)?;
        trace!(id = self.id, offset, value, "register write");
        // SAFETY: as in `read`; the window is mapped PROT_WRITE.
        unsafe { ptr::write_volatile(self.regs.add(offset) as *mut u32, value) };
        Ok(())
    }

    fn mask_irq(&self) -> BusResult<()> {
        self.write_irq_control(0)
    }

    fn unmask_irq(&self) -> BusResult<()> {
        self.write_irq_control(1)
    }

    fn wait_irq(&self, timeout: Duration) -> BusResult<IrqStatus> {
        let mut pfd = libc::pollfd {
            fd: self.file.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        let timeout_ms = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;

        // SAFETY: poll is a standard POSIX syscall; `pfd` is a valid pollfd for one
        // descriptor that outlives the call.
        let ret = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };

        if ret < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(IrqStatus::None);
            }
            return Err(BusError::Irq(err));
        }
        if ret == 0 {
            return Ok(IrqStatus::None);
        }

        let mut count = [0u8; 4];
        (&self.file)
            .read_exact(&mut count)
            .map_err(BusError::Irq)?;
        Ok(IrqStatus::Pending(u32::from_ne_bytes(count)))
    }

    fn window_size(&self) -> usize {
        self.window
    }
}

impl Drop for UioDevice {
    fn drop(&mut self) {
        // SAFETY: Unmapping the register window with its original size; no
        // references into it outlive `self`.
        unsafe {
            libc::munmap(self.regs as *mut libc::c_void, self.window);
        }
        debug!(id = self.id, "closed UIO device");
    }
}

// SAFETY: The register window is only accessed through volatile 32-bit reads and
// writes, which the hardware serializes; the file descriptor is thread-safe.
unsafe impl Send for UioDevice {}
unsafe impl Sync for UioDevice {}
