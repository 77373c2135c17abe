//! Double mapped regions where the second half mirrors the first.
//!
//! A memfd of length `L` is mapped twice back to back inside a `2L`
//! reservation, so a write at offset `L + i` lands on the same page as offset
//! `i`. Any failure unmaps the whole reservation.

/// A circular region of `len` bytes mirrored at `address + len`.
pub(crate) struct CircularRegion {
    address: usize,
    len: usize,
}

impl CircularRegion {
    pub(crate) fn address(&self) -> usize {
        self.address
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }
}

pub(crate) fn page_size() -> usize {
    #[cfg(unix)]
    {
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if size > 0 {
            return size as usize;
        }
    }
    4096
}

#[cfg(target_os = "linux")]
mod imp {
    use std::io;
    use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

    use super::{CircularRegion, page_size};
    use crate::error::BufferError;
    use crate::region::bind_to_node;

    /// Unmaps the reservation unless disarmed.
    struct Reservation {
        address: usize,
        len: usize,
    }

    impl Reservation {
        fn disarm(self) -> usize {
            let address = self.address;
            std::mem::forget(self);
            address
        }
    }

    impl Drop for Reservation {
        fn drop(&mut self) {
            unsafe {
                libc::munmap(self.address as *mut libc::c_void, self.len);
            }
        }
    }

    fn map_err(stage: &'static str) -> BufferError {
        BufferError::CircularMap {
            stage,
            source: io::Error::last_os_error(),
        }
    }

    fn create_memfd(len: usize) -> Result<OwnedFd, BufferError> {
        let fd = unsafe { libc::memfd_create(c"blockflow-circular".as_ptr(), libc::MFD_CLOEXEC) };
        if fd < 0 {
            return Err(map_err("creating memfd"));
        }
        let fd = unsafe { OwnedFd::from_raw_fd(fd) };
        if unsafe { libc::ftruncate(fd.as_raw_fd(), len as libc::off_t) } != 0 {
            return Err(map_err("sizing memfd"));
        }
        Ok(fd)
    }

    fn map_half(
        fd: &OwnedFd,
        address: usize,
        len: usize,
        stage: &'static str,
    ) -> Result<(), BufferError> {
        let mapped = unsafe {
            libc::mmap(
                address as *mut libc::c_void,
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED | libc::MAP_FIXED,
                fd.as_raw_fd(),
                0,
            )
        };
        if mapped == libc::MAP_FAILED || mapped as usize != address {
            return Err(map_err(stage));
        }
        Ok(())
    }

    impl CircularRegion {
        pub(crate) fn allocate(
            size: usize,
            node_affinity: Option<u32>,
        ) -> Result<Self, BufferError> {
            if size == 0 {
                return Err(BufferError::ZeroSize);
            }
            let page = page_size();
            let len = size.div_ceil(page) * page;
            let fd = create_memfd(len)?;

            let base = unsafe {
                libc::mmap(
                    std::ptr::null_mut(),
                    2 * len,
                    libc::PROT_NONE,
                    libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                    -1,
                    0,
                )
            };
            if base == libc::MAP_FAILED {
                return Err(map_err("reserving address space"));
            }
            let reservation = Reservation {
                address: base as usize,
                len: 2 * len,
            };

            map_half(&fd, reservation.address, len, "mapping first half")?;
            map_half(&fd, reservation.address + len, len, "mapping second half")?;
            if let Some(node) = node_affinity {
                bind_to_node(reservation.address, len, node)?;
            }

            Ok(Self {
                address: reservation.disarm(),
                len,
            })
        }
    }

    impl Drop for CircularRegion {
        fn drop(&mut self) {
            unsafe {
                libc::munmap(self.address as *mut libc::c_void, 2 * self.len);
            }
        }
    }
}

#[cfg(not(target_os = "linux"))]
impl CircularRegion {
    pub(crate) fn allocate(
        _size: usize,
        _node_affinity: Option<u32>,
    ) -> Result<Self, crate::error::BufferError> {
        Err(crate::error::BufferError::CircularUnsupported)
    }
}
