//! Heap File - low-level page I/O for the backing file.
//!
//! The [`HeapFile`] handles all direct file operations:
//! - Reading and writing fixed-size pages
//! - Allocating new pages
//! - Maintaining the on-disk header

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::common::{Error, PageId, Result};

/// Magic number stored at the start of every heap file.
const MAGIC: u32 = 0xDEAD_BEEF;

/// Fixed-size page I/O over a single backing file.
///
/// # File Layout
/// The file is a sequence of `page_size`-byte pages. Page 0 is the
/// header; data pages follow:
/// ```text
/// ┌──────────┬─────────┬─────────┬─────────┐
/// │ Header   │ Page 1  │ Page 2  │  ...    │
/// │ (page 0) │         │         │         │
/// └──────────┴─────────┴─────────┴─────────┘
/// Offset:  0   1×size    2×size    N×size
/// ```
///
/// The header holds the magic number (4 bytes, little-endian) followed
/// by `file_size_pages` (4 bytes, little-endian); the rest of page 0 is
/// zero. `file_size_pages` counts the header page itself, so a fresh
/// file has `file_size_pages == 1` and the first allocated id is 1.
///
/// # Thread Safety
/// `HeapFile` is single-threaded. The cache engine serializes access
/// behind its file mutex.
///
/// # Durability
/// Writes go to the OS immediately; [`HeapFile::sync`] forces them to
/// stable storage. The engine syncs in `flush_all_pages` and on drop.
pub struct HeapFile {
    file: File,
    page_size: usize,
    /// Number of pages in the file, header page included.
    file_size_pages: u32,
}

impl HeapFile {
    /// Open a heap file.
    ///
    /// With `create` set, the file is created (or truncated) and a fresh
    /// header is written. Otherwise the file must already exist and
    /// carry a valid header; `page_size` must match the size used at
    /// creation.
    ///
    /// # Errors
    /// - `Error::Io` if the file cannot be created or opened
    /// - `Error::CorruptHeader` if the magic number does not match
    pub fn open<P: AsRef<Path>>(path: P, create: bool, page_size: usize) -> Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(create)
            .truncate(create)
            .open(path)?;

        let mut heap = if create {
            // Write a zeroed header page, then the header fields.
            file.seek(SeekFrom::Start(0))?;
            file.write_all(&vec![0u8; page_size])?;
            Self {
                file,
                page_size,
                file_size_pages: 1,
            }
        } else {
            let mut header = [0u8; 8];
            file.seek(SeekFrom::Start(0))?;
            file.read_exact(&mut header)?;

            let magic = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
            if magic != MAGIC {
                log::warn!("heap file magic mismatch: {magic:#010x}");
                return Err(Error::CorruptHeader);
            }

            let file_size_pages =
                u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
            if file_size_pages == 0 {
                return Err(Error::CorruptHeader);
            }

            Self {
                file,
                page_size,
                file_size_pages,
            }
        };

        if create {
            heap.write_header()?;
            heap.file.sync_all()?;
        }

        Ok(heap)
    }

    /// Allocate a new page at the end of the file.
    ///
    /// Extends the file with a zeroed page, bumps `file_size_pages`,
    /// persists the header, and returns the id of the new page. Ids are
    /// strictly increasing and never reused.
    pub fn allocate(&mut self) -> Result<PageId> {
        let id = self.file_size_pages;

        let offset = (id as u64) * (self.page_size as u64);
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(&vec![0u8; self.page_size])?;

        self.file_size_pages += 1;
        self.write_header()?;

        Ok(PageId::new(id))
    }

    /// Read page `id` into `buf`.
    ///
    /// `buf` must be exactly `page_size` bytes.
    ///
    /// # Errors
    /// - `Error::InvalidPageId` if `id` is the header page or beyond the
    ///   allocated range
    /// - `Error::Io` on read failure
    pub fn read(&mut self, id: PageId, buf: &mut [u8]) -> Result<()> {
        self.check_id(id)?;
        debug_assert_eq!(buf.len(), self.page_size);

        let offset = (id.0 as u64) * (self.page_size as u64);
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf)?;

        Ok(())
    }

    /// Write `buf` to page `id`.
    ///
    /// The page must have been allocated with [`HeapFile::allocate`];
    /// `buf` must be exactly `page_size` bytes.
    pub fn write(&mut self, id: PageId, buf: &[u8]) -> Result<()> {
        self.check_id(id)?;
        debug_assert_eq!(buf.len(), self.page_size);

        let offset = (id.0 as u64) * (self.page_size as u64);
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(buf)?;

        Ok(())
    }

    /// Force all written pages and the header to stable storage.
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    /// Number of pages in the file, header page included.
    #[inline]
    pub fn page_count(&self) -> u32 {
        self.file_size_pages
    }

    /// Size of a page in bytes.
    #[inline]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    fn check_id(&self, id: PageId) -> Result<()> {
        if id == PageId::HEADER || id.0 >= self.file_size_pages {
            return Err(Error::InvalidPageId(id.0));
        }
        Ok(())
    }

    fn write_header(&mut self) -> Result<()> {
        let mut header = [0u8; 8];
        header[0..4].copy_from_slice(&MAGIC.to_le_bytes());
        header[4..8].copy_from_slice(&self.file_size_pages.to_le_bytes());

        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&header)?;

        Ok(())
    }
}

impl Drop for HeapFile {
    fn drop(&mut self) {
        // Header is rewritten on every allocate; drop only needs a
        // best-effort sync.
        if let Err(e) = self.file.sync_all() {
            log::warn!("heap file sync on drop failed: {e}");
        }
    }
}
