/*
 * Test Fixtures
 *
 * Stub devices and backends shared by the unit tests:
 *
 * - RecordingDevice: counts every callback and replays scripted reads
 * - BareDevice: an id and a name, nothing else
 * - LoopbackConsole: console whose input is fed by the test
 * - MemFileServer: file server keeping files in memory
 */

use core::sync::atomic::{AtomicUsize, Ordering};

use heapless::Deque;
use spin::Mutex;

use crate::config::MAXNAMELEN;
use crate::devices::{Console, FileServer};
use crate::io::{
    DevId, Device, DeviceRegistry, EnvId, Errno, FdContext, FdTable, OpenMode, S_IFDIR, S_IFREG,
    Stat,
};
use crate::memory::SoftAddressSpace;

/// Device id used by RecordingDevice
pub const REC_ID: DevId = DevId(b'r' as u32);

/// Table over a fresh address space
pub fn table_with<'d>(registry: &'d DeviceRegistry<'d>) -> FdTable<'d, SoftAddressSpace> {
    FdTable::new(EnvId(0x1000), SoftAddressSpace::new(), registry)
}

/// Yield hook for tests that must never block
pub fn no_yield() {
    panic!("device yielded with nothing else to run");
}

/// Device that records every call
///
/// Reads replay the scripted chunks in order and return 0 once the script
/// runs out. Writes accept everything.
pub struct RecordingDevice {
    script: Mutex<Deque<&'static [u8], 8>>,
    reads: AtomicUsize,
    writes: AtomicUsize,
    closes: AtomicUsize,
    close_result: Result<(), Errno>,
    unmap_on_close: bool,
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(Deque::new()),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
            close_result: Ok(()),
            unmap_on_close: false,
        }
    }

    /// Chunks returned by successive reads
    pub fn with_reads(self, chunks: &[&'static [u8]]) -> Self {
        {
            let mut script = self.script.lock();
            for &chunk in chunks {
                script.push_back(chunk).expect("read script too long");
            }
        }
        self
    }

    pub fn failing_close(mut self, err: Errno) -> Self {
        self.close_result = Err(err);
        self
    }

    /// Close unmaps the descriptor page itself
    pub fn unmapping_close(mut self) -> Self {
        self.unmap_on_close = true;
        self
    }

    pub fn read_calls(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn write_calls(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.read_calls() + self.write_calls() + self.close_calls()
    }
}

impl Device for RecordingDevice {
    fn id(&self) -> DevId {
        REC_ID
    }

    fn name(&self) -> &'static str {
        "recording"
    }

    fn read(&self, _fd: &mut FdContext<'_>, buf: &mut [u8]) -> Result<usize, Errno> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let Some(chunk) = self.script.lock().pop_front() else {
            return Ok(0);
        };
        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        Ok(n)
    }

    fn write(&self, _fd: &mut FdContext<'_>, buf: &[u8]) -> Result<usize, Errno> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(buf.len())
    }

    fn close(&self, fd: &mut FdContext<'_>) -> Result<(), Errno> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        if self.unmap_on_close {
            let page = fd.fd_page();
            fd.vm.page_unmap(page)?;
        }
        self.close_result
    }
}

/// Device with no capabilities at all
pub struct BareDevice {
    id: DevId,
    name: &'static str,
}

impl BareDevice {
    pub fn new(id: DevId, name: &'static str) -> Self {
        Self { id, name }
    }
}

impl Device for BareDevice {
    fn id(&self) -> DevId {
        self.id
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

/// Console fed from the test
pub struct LoopbackConsole {
    input: Mutex<Deque<u8, 512>>,
    output: Mutex<Vec<u8>>,
    puts: AtomicUsize,
}

impl LoopbackConsole {
    pub const fn new() -> Self {
        Self {
            input: Mutex::new(Deque::new()),
            output: Mutex::new(Vec::new()),
            puts: AtomicUsize::new(0),
        }
    }

    /// Queue bytes for cgetc
    pub fn feed(&self, bytes: &[u8]) {
        let mut input = self.input.lock();
        for &b in bytes {
            input.push_back(b).expect("console input full");
        }
    }

    /// Everything written so far
    pub fn output(&self) -> Vec<u8> {
        self.output.lock().clone()
    }

    pub fn cputs_calls(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }
}

impl Console for LoopbackConsole {
    fn cputs(&self, s: &[u8]) {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.output.lock().extend_from_slice(s);
    }

    fn cgetc(&self) -> Option<u8> {
        self.input.lock().pop_front()
    }
}

struct MemFile {
    name: String,
    data: Vec<u8>,
    is_dir: bool,
}

/// File server keeping files in memory; file ids index `files`
pub struct MemFileServer {
    files: Mutex<Vec<MemFile>>,
    flushes: AtomicUsize,
}

impl MemFileServer {
    pub fn new() -> Self {
        Self {
            files: Mutex::new(Vec::new()),
            flushes: AtomicUsize::new(0),
        }
    }

    pub fn create_dir(&self, path: &str) {
        self.files.lock().push(MemFile {
            name: path.to_string(),
            data: Vec::new(),
            is_dir: true,
        });
    }

    pub fn flushes(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }

    fn with_file<T>(
        &self,
        file_id: u64,
        f: impl FnOnce(&mut MemFile) -> Result<T, Errno>,
    ) -> Result<T, Errno> {
        let mut files = self.files.lock();
        let file = files.get_mut(file_id as usize).ok_or(Errno::EINVAL)?;
        f(file)
    }
}

impl FileServer for MemFileServer {
    fn open(&self, path: &str, mode: OpenMode) -> Result<u64, Errno> {
        assert!(path.len() < MAXNAMELEN);
        let mut files = self.files.lock();
        if let Some(id) = files.iter().position(|f| f.name == path) {
            if mode.contains(OpenMode::TRUNC) {
                files[id].data.clear();
            }
            return Ok(id as u64);
        }
        if !mode.contains(OpenMode::CREAT) {
            return Err(Errno::ENOENT);
        }
        files.push(MemFile {
            name: path.to_string(),
            data: Vec::new(),
            is_dir: false,
        });
        Ok(files.len() as u64 - 1)
    }

    fn read_at(&self, file_id: u64, offset: u64, buf: &mut [u8]) -> Result<usize, Errno> {
        self.with_file(file_id, |file| {
            let start = (offset as usize).min(file.data.len());
            let n = (file.data.len() - start).min(buf.len());
            buf[..n].copy_from_slice(&file.data[start..start + n]);
            Ok(n)
        })
    }

    fn write_at(&self, file_id: u64, offset: u64, buf: &[u8]) -> Result<usize, Errno> {
        self.with_file(file_id, |file| {
            if file.is_dir {
                return Err(Errno::EISDIR);
            }
            let end = offset as usize + buf.len();
            if file.data.len() < end {
                file.data.resize(end, 0);
            }
            file.data[offset as usize..end].copy_from_slice(buf);
            Ok(buf.len())
        })
    }

    fn stat(&self, file_id: u64, st: &mut Stat) -> Result<(), Errno> {
        self.with_file(file_id, |file| {
            st.set_name(&file.name);
            st.st_size = file.data.len() as u64;
            st.st_mode = if file.is_dir { S_IFDIR | 0o755 } else { S_IFREG | 0o644 };
            Ok(())
        })
    }

    fn set_size(&self, file_id: u64, size: u64) -> Result<(), Errno> {
        self.with_file(file_id, |file| {
            file.data.resize(size as usize, 0);
            Ok(())
        })
    }

    fn flush(&self, file_id: u64) -> Result<(), Errno> {
        self.with_file(file_id, |_| Ok(()))?;
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
