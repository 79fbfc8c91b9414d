use std::io::{Error, Result};
use std::ptr;

use super::{Stack, StackPointer, MIN_STACK_SIZE};

fn page_size() -> usize {
    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) } as usize;
    debug_assert!(page_size.is_power_of_two());
    page_size
}

/// Default stack implementation: an anonymous mapping with a guard page at
/// the low end.
pub struct DefaultStack {
    base: StackPointer,
    mmap_len: usize,
}

impl DefaultStack {
    /// Allocates a stack with at least `size` usable bytes.
    pub fn new(size: usize) -> Result<Self> {
        let page_size = page_size();

        // Round the usable size up to a page boundary and put one guard page
        // below it.
        let size = size.max(MIN_STACK_SIZE);
        let mmap_len = size
            .checked_add(2 * page_size - 1)
            .expect("integer overflow while calculating stack size")
            & !(page_size - 1);

        // OpenBSD requires MAP_STACK on anything used as a stack.
        cfg_if::cfg_if! {
            if #[cfg(target_os = "openbsd")] {
                let map_flags = libc::MAP_ANONYMOUS | libc::MAP_PRIVATE | libc::MAP_STACK;
            } else {
                let map_flags = libc::MAP_ANONYMOUS | libc::MAP_PRIVATE;
            }
        }

        unsafe {
            let mmap = libc::mmap(ptr::null_mut(), mmap_len, libc::PROT_NONE, map_flags, -1, 0);
            if mmap == libc::MAP_FAILED {
                return Err(Error::last_os_error());
            }

            // Construct first so the mapping is released if mprotect fails.
            let out = DefaultStack {
                base: StackPointer::new(mmap as usize + mmap_len).unwrap(),
                mmap_len,
            };

            // Everything above the guard page becomes usable stack.
            let rc = libc::mprotect(
                mmap.cast::<u8>().add(page_size).cast(),
                mmap_len - page_size,
                libc::PROT_READ | libc::PROT_WRITE,
            );
            if rc != 0 {
                return Err(Error::last_os_error());
            }

            Ok(out)
        }
    }
}

impl Default for DefaultStack {
    fn default() -> Self {
        Self::new(1024 * 1024).expect("failed to allocate stack")
    }
}

impl Drop for DefaultStack {
    fn drop(&mut self) {
        unsafe {
            let mmap = self.base.get() - self.mmap_len;
            let rc = libc::munmap(mmap as _, self.mmap_len);
            debug_assert_eq!(rc, 0);
        }
    }
}

unsafe impl Stack for DefaultStack {
    #[inline]
    fn base(&self) -> StackPointer {
        self.base
    }

    #[inline]
    fn limit(&self) -> StackPointer {
        StackPointer::new(self.base.get() - self.mmap_len).unwrap()
    }
}
