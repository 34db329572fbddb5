//! Storage capability used by the plotter: a file system that can create and remove files and
//! files with positional reads and writes.
//!
//! [`OsFileSystem`] works with files on disk, [`MemoryFileSystem`] keeps everything in memory and
//! is primarily useful for tests.


use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// File with positional I/O
pub trait PlotFile: Send + Sync {
    /// Get file size
    fn size(&self) -> io::Result<u64>;

    /// Truncates or extends the file to `len` bytes
    fn set_len(&self, len: u64) -> io::Result<()>;

    /// Read the exact number of bytes needed to fill `buf` at `offset`
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()>;

    /// Write bytes of `buf` at `offset`, extending the file if necessary. Returns the number of
    /// bytes written, which may be smaller than `buf.len()`.
    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<usize>;

    /// Write all bytes of `buf` at `offset`, extending the file if necessary
    fn write_all_at(&self, mut buf: &[u8], mut offset: u64) -> io::Result<()> {
        while !buf.is_empty() {
            match self.write_at(buf, offset) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "failed to write whole buffer",
                    ));
                }
                Ok(n) => {
                    buf = &buf[n..];
                    offset += n as u64;
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {
                    // Try again
                }
                Err(e) => {
                    return Err(e);
                }
            }
        }

        Ok(())
    }

    /// Make sure written data reached the storage
    fn sync_data(&self) -> io::Result<()>;
}

impl<T> PlotFile for &T
where
    T: PlotFile + ?Sized,
{
    #[inline]
    fn size(&self) -> io::Result<u64> {
        (*self).size()
    }

    #[inline]
    fn set_len(&self, len: u64) -> io::Result<()> {
        (*self).set_len(len)
    }

    #[inline]
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        (*self).read_exact_at(buf, offset)
    }

    #[inline]
    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<usize> {
        (*self).write_at(buf, offset)
    }

    #[inline]
    fn write_all_at(&self, buf: &[u8], offset: u64) -> io::Result<()> {
        (*self).write_all_at(buf, offset)
    }

    #[inline]
    fn sync_data(&self) -> io::Result<()> {
        (*self).sync_data()
    }
}

/// File system the plot and the spare file live in
pub trait FileSystem {
    /// File type
    type File: PlotFile;

    /// Create a new file for reading and writing, truncating it if it already exists
    fn create(&self, path: &Path) -> io::Result<Self::File>;

    /// Open an existing file for reading and writing
    fn open(&self, path: &Path) -> io::Result<Self::File>;

    /// Remove a file
    fn remove_file(&self, path: &Path) -> io::Result<()>;
}

/// File on disk
#[derive(Debug)]
pub struct OsFile {
    file: File,
}

impl PlotFile for OsFile {
    #[inline]
    fn size(&self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    #[inline]
    fn set_len(&self, len: u64) -> io::Result<()> {
        self.file.set_len(len)
    }

    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::FileExt;

            self.file.read_exact_at(buf, offset)
        }
        #[cfg(windows)]
        {
            use std::os::windows::fs::FileExt;

            let mut buf = buf;
            let mut offset = offset;
            while !buf.is_empty() {
                match self.file.seek_read(buf, offset) {
                    Ok(0) => {
                        break;
                    }
                    Ok(n) => {
                        buf = &mut buf[n..];
                        offset += n as u64;
                    }
                    Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {
                        // Try again
                    }
                    Err(e) => {
                        return Err(e);
                    }
                }
            }

            if !buf.is_empty() {
                Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "failed to fill the whole buffer",
                ))
            } else {
                Ok(())
            }
        }
    }

    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<usize> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::FileExt;

            self.file.write_at(buf, offset)
        }
        #[cfg(windows)]
        {
            use std::os::windows::fs::FileExt;

            self.file.seek_write(buf, offset)
        }
    }

    #[inline]
    fn sync_data(&self) -> io::Result<()> {
        self.file.sync_data()
    }
}

/// File system of the operating system
#[derive(Debug, Default, Copy, Clone)]
pub struct OsFileSystem;

impl FileSystem for OsFileSystem {
    type File = OsFile;

    fn create(&self, path: &Path) -> io::Result<Self::File> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        Ok(OsFile { file })
    }

    fn open(&self, path: &Path) -> io::Result<Self::File> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;

        Ok(OsFile { file })
    }

    #[inline]
    fn remove_file(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }
}

/// File kept in memory, clones share the same contents
#[derive(Debug, Default, Clone)]
pub struct MemoryFile {
    data: Arc<Mutex<Vec<u8>>>,
}

impl PlotFile for MemoryFile {
    #[inline]
    fn size(&self) -> io::Result<u64> {
        Ok(self.data.lock().len() as u64)
    }

    #[inline]
    fn set_len(&self, len: u64) -> io::Result<()> {
        let len = usize::try_from(len).map_err(|_| io::Error::from(io::ErrorKind::OutOfMemory))?;
        self.data.lock().resize(len, 0);
        Ok(())
    }

    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        let data = self.data.lock();
        let contents = usize::try_from(offset)
            .ok()
            .and_then(|offset| data.get(offset..)?.get(..buf.len()))
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "failed to fill the whole buffer",
                )
            })?;
        buf.copy_from_slice(contents);
        Ok(())
    }

    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<usize> {
        let offset =
            usize::try_from(offset).map_err(|_| io::Error::from(io::ErrorKind::OutOfMemory))?;
        let end = offset + buf.len();

        let mut data = self.data.lock();
        if data.len() < end {
            data.resize(end, 0);
        }
        data[offset..end].copy_from_slice(buf);
        Ok(buf.len())
    }

    #[inline]
    fn sync_data(&self) -> io::Result<()> {
        Ok(())
    }
}

impl MemoryFile {
    /// Copy of the current contents
    pub fn contents(&self) -> Vec<u8> {
        self.data.lock().clone()
    }
}

/// In-memory file system
#[derive(Debug, Default, Clone)]
pub struct MemoryFileSystem {
    files: Arc<Mutex<HashMap<PathBuf, MemoryFile>>>,
}

impl FileSystem for MemoryFileSystem {
    type File = MemoryFile;

    fn create(&self, path: &Path) -> io::Result<Self::File> {
        let file = MemoryFile::default();
        self.files.lock().insert(path.to_path_buf(), file.clone());
        Ok(file)
    }

    fn open(&self, path: &Path) -> io::Result<Self::File> {
        self.files
            .lock()
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        self.files
            .lock()
            .remove(path)
            .map(|_file| ())
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
    }
}

impl MemoryFileSystem {
    /// Whether file exists
    pub fn exists(&self, path: &Path) -> bool {
        self.files.lock().contains_key(path)
    }
}
