#![allow(dead_code)]

use std::{
    any::Any,
    collections::HashMap,
    sync::{
        Arc, Condvar, Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use axerrno::{LinuxError, LinuxResult};
use kproc::{
    AddressSpace, ForkedChild, Kernel, KernelHal, Process, TrapContext, Vnode, WaitQueue,
};

/// Size of every test address space.
pub const MEM_SIZE: usize = 0x10000;
/// Stack top the test HAL reserves for a fresh image.
pub const STACK_TOP: usize = MEM_SIZE;
/// Program counter the test "user programs" trap from.
pub const USER_PC: usize = 0x1000;

/// Host-side handshake primitive: a plain mutex/condvar monitor.
#[derive(Default)]
struct StdWaitQueue {
    lock: Mutex<()>,
    cond: Condvar,
}

impl WaitQueue for StdWaitQueue {
    fn wait_until(&self, condition: &mut dyn FnMut() -> bool) {
        let mut guard = self.lock.lock().unwrap();
        while !condition() {
            guard = self.cond.wait(guard).unwrap();
        }
    }

    fn notify_all(&self) {
        let _guard = self.lock.lock().unwrap();
        self.cond.notify_all();
    }
}

/// A flat in-memory "user address space". Address 0 is unmapped so null
/// pointers fault like they should.
pub struct TestAddrSpace {
    mem: Mutex<Vec<u8>>,
    fail_dup: Arc<AtomicBool>,
}

impl TestAddrSpace {
    fn new(fail_dup: Arc<AtomicBool>) -> Self {
        Self {
            mem: Mutex::new(vec![0; MEM_SIZE]),
            fail_dup,
        }
    }

    fn check(uaddr: usize, len: usize) -> LinuxResult<()> {
        if uaddr == 0 || uaddr.checked_add(len).is_none_or(|end| end > MEM_SIZE) {
            return Err(LinuxError::EFAULT);
        }
        Ok(())
    }
}

impl AddressSpace for TestAddrSpace {
    fn duplicate(&self) -> LinuxResult<Box<dyn AddressSpace>> {
        if self.fail_dup.load(Ordering::SeqCst) {
            return Err(LinuxError::ENOMEM);
        }
        Ok(Box::new(Self {
            mem: Mutex::new(self.mem.lock().unwrap().clone()),
            fail_dup: self.fail_dup.clone(),
        }))
    }

    fn activate(&self) {}

    fn copy_in(&self, uaddr: usize, buf: &mut [u8]) -> LinuxResult<()> {
        Self::check(uaddr, buf.len())?;
        buf.copy_from_slice(&self.mem.lock().unwrap()[uaddr..uaddr + buf.len()]);
        Ok(())
    }

    fn copy_in_str(&self, uaddr: usize, max_len: usize) -> LinuxResult<Vec<u8>> {
        Self::check(uaddr, 1)?;
        let mem = self.mem.lock().unwrap();
        let window = &mem[uaddr..MEM_SIZE.min(uaddr + max_len)];
        match window.iter().position(|&b| b == 0) {
            Some(pos) => Ok(window[..pos].to_vec()),
            None if uaddr + max_len <= MEM_SIZE => Err(LinuxError::ENAMETOOLONG),
            None => Err(LinuxError::EFAULT),
        }
    }

    fn copy_out(&self, uaddr: usize, bytes: &[u8]) -> LinuxResult<()> {
        Self::check(uaddr, bytes.len())?;
        self.mem.lock().unwrap()[uaddr..uaddr + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }
}

/// An "executable": just a name and the entry point the loader reports.
pub struct TestVnode {
    pub entry: usize,
}

impl Vnode for TestVnode {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Test HAL: registered programs, a queue of spawned children the test
/// drives by hand, and failure-injection switches.
pub struct TestHal {
    programs: Mutex<HashMap<String, usize>>,
    spawned: Mutex<Vec<ForkedChild>>,
    pub fail_dup: Arc<AtomicBool>,
    pub fail_create: AtomicBool,
    pub fail_spawn: AtomicBool,
}

impl TestHal {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            programs: Mutex::new(HashMap::new()),
            spawned: Mutex::new(Vec::new()),
            fail_dup: Arc::new(AtomicBool::new(false)),
            fail_create: AtomicBool::new(false),
            fail_spawn: AtomicBool::new(false),
        })
    }

    pub fn add_program(&self, path: &str, entry: usize) {
        self.programs.lock().unwrap().insert(path.into(), entry);
    }

    /// Takes the most recently spawned child off the scheduler queue.
    pub fn take_spawned(&self) -> Option<ForkedChild> {
        self.spawned.lock().unwrap().pop()
    }
}

impl KernelHal for TestHal {
    fn new_wait_queue(&self) -> Box<dyn WaitQueue> {
        Box::new(StdWaitQueue::default())
    }

    fn create_aspace(&self) -> LinuxResult<Box<dyn AddressSpace>> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(LinuxError::ENOMEM);
        }
        Ok(Box::new(TestAddrSpace::new(self.fail_dup.clone())))
    }

    fn open_executable(&self, path: &str) -> LinuxResult<Arc<dyn Vnode>> {
        let entry = *self
            .programs
            .lock()
            .unwrap()
            .get(path)
            .ok_or(LinuxError::ENOENT)?;
        Ok(Arc::new(TestVnode { entry }))
    }

    fn load_image(&self, exe: &dyn Vnode, _aspace: &mut dyn AddressSpace) -> LinuxResult<usize> {
        let exe = exe.as_any().downcast_ref::<TestVnode>().unwrap();
        Ok(exe.entry)
    }

    fn reserve_stack(&self, _aspace: &mut dyn AddressSpace) -> LinuxResult<usize> {
        Ok(STACK_TOP)
    }

    fn spawn(&self, child: ForkedChild) -> LinuxResult<()> {
        if self.fail_spawn.load(Ordering::SeqCst) {
            return Err(LinuxError::EAGAIN);
        }
        self.spawned.lock().unwrap().push(child);
        Ok(())
    }
}

pub fn new_kernel(max_procs: usize) -> (Arc<Kernel>, Arc<TestHal>) {
    let hal = TestHal::new();
    let kernel = Arc::new(Kernel::new(hal.clone(), max_procs));
    (kernel, hal)
}

pub fn trap_ctx() -> TrapContext {
    TrapContext {
        pc: USER_PC,
        sp: STACK_TOP,
        a0: 0xdead,
        a1: 0xbeef,
    }
}

/// Forks `parent` and hands back the child record the scheduler would
/// have started.
pub fn fork(kernel: &Kernel, hal: &TestHal, parent: &Arc<Process>) -> Arc<Process> {
    let pid = kernel.sys_fork(parent, &trap_ctx()).unwrap();
    let child = hal.take_spawned().expect("fork spawned no child");
    assert_eq!(child.process.pid(), pid);
    child.process
}

pub fn poke(process: &Arc<Process>, uaddr: usize, bytes: &[u8]) {
    process
        .with_aspace(|aspace| aspace.copy_out(uaddr, bytes))
        .unwrap();
}

pub fn poke_str(process: &Arc<Process>, uaddr: usize, s: &str) {
    let mut bytes = s.as_bytes().to_vec();
    bytes.push(0);
    poke(process, uaddr, &bytes);
}

pub fn peek(process: &Arc<Process>, uaddr: usize, len: usize) -> Vec<u8> {
    let mut buf = vec![0; len];
    process
        .with_aspace(|aspace| aspace.copy_in(uaddr, &mut buf))
        .unwrap();
    buf
}

pub fn peek_usize(process: &Arc<Process>, uaddr: usize) -> usize {
    usize::from_ne_bytes(peek(process, uaddr, size_of::<usize>()).try_into().unwrap())
}

pub fn peek_i32(process: &Arc<Process>, uaddr: usize) -> i32 {
    i32::from_ne_bytes(peek(process, uaddr, 4).try_into().unwrap())
}

pub fn peek_str(process: &Arc<Process>, uaddr: usize) -> String {
    let bytes = process
        .with_aspace(|aspace| aspace.copy_in_str(uaddr, MEM_SIZE))
        .unwrap();
    String::from_utf8(bytes).unwrap()
}

/// Writes a NULL-terminated array of argument pointers at `uaddr`.
pub fn poke_argv(process: &Arc<Process>, uaddr: usize, ptrs: &[usize]) {
    let mut bytes = Vec::new();
    for ptr in ptrs {
        bytes.extend_from_slice(&ptr.to_ne_bytes());
    }
    bytes.extend_from_slice(&0usize.to_ne_bytes());
    poke(process, uaddr, &bytes);
}
