use alloc::{sync::Arc, vec::Vec};
use core::mem::size_of;

use axerrno::{LinuxError, LinuxResult};
use log::debug;

use crate::{
    ARG_MAX, Kernel, NARG_MAX, PATH_MAX, Process, TrapContext,
    hal::AddressSpace,
};

impl Kernel {
    /// Replaces the calling process's program image in place.
    ///
    /// On success the returned context is the one the dispatch layer
    /// must switch to (entry point, marshalled stack, `a0` = argc,
    /// `a1` = argv); at the syscall boundary the call never returns.
    ///
    /// The new image is built completely before the old address space is
    /// discarded, so on any error the caller's original image is still
    /// valid and executable.
    pub fn sys_execv(
        &self,
        caller: &Arc<Process>,
        path_uptr: usize,
        argv_uptr: usize,
    ) -> LinuxResult<TrapContext> {
        let path_bytes = caller.with_aspace(|aspace| aspace.copy_in_str(path_uptr, PATH_MAX))?;
        let path = core::str::from_utf8(&path_bytes).map_err(|_| LinuxError::EINVAL)?;
        let args = copy_in_args(caller, argv_uptr)?;

        let exe = self.hal.open_executable(path)?;
        let mut aspace = self.hal.create_aspace()?;
        let entry = self.hal.load_image(exe.as_ref(), aspace.as_mut())?;
        let stack_top = self.hal.reserve_stack(aspace.as_mut())?;
        let (sp, argc, argv) = marshal_args(aspace.as_ref(), stack_top, &args)?;

        debug!("execv: {} -> {} ({} args)", caller.pid(), path, argc);

        // Point of no return: the replacement image is complete. The old
        // space is dropped, the new one becomes the caller's.
        drop(caller.replace_aspace(aspace));
        caller.with_aspace(|aspace| aspace.activate());

        Ok(TrapContext {
            pc: entry,
            sp,
            a0: argc,
            a1: argv,
        })
    }
}

/// Copies in the NULL-terminated array of argument-string pointers, then
/// each string, bounding the count by [`NARG_MAX`] and each string by
/// [`ARG_MAX`]. An over-long argument is `E2BIG`.
fn copy_in_args(caller: &Process, argv_uptr: usize) -> LinuxResult<Vec<Vec<u8>>> {
    caller.with_aspace(|aspace| {
        let mut args = Vec::new();
        for i in 0.. {
            let mut word = [0u8; size_of::<usize>()];
            aspace.copy_in(argv_uptr + i * size_of::<usize>(), &mut word)?;
            let ptr = usize::from_ne_bytes(word);
            if ptr == 0 {
                break;
            }
            if args.len() == NARG_MAX {
                return Err(LinuxError::E2BIG);
            }
            let arg = aspace.copy_in_str(ptr, ARG_MAX).map_err(|err| match err {
                LinuxError::ENAMETOOLONG => LinuxError::E2BIG,
                other => other,
            })?;
            args.push(arg);
        }
        Ok(args)
    })
}

/// Marshals the argument vector onto the new image's stack.
///
/// Each string is copied NUL-terminated so it starts on a 4-byte
/// boundary; the pointer array (argv order, NULL terminator last) goes
/// below the strings at pointer alignment. Returns the final stack
/// pointer, the argument count and the argv address; the stack pointer
/// is the start of the pointer array.
fn marshal_args(
    aspace: &dyn AddressSpace,
    stack_top: usize,
    args: &[Vec<u8>],
) -> LinuxResult<(usize, usize, usize)> {
    let mut sp = stack_top;
    let mut ptrs = Vec::with_capacity(args.len() + 1);
    for arg in args {
        sp = sp.checked_sub(arg.len() + 1).ok_or(LinuxError::E2BIG)? & !3;
        let mut bytes = Vec::with_capacity(arg.len() + 1);
        bytes.extend_from_slice(arg);
        bytes.push(0);
        aspace.copy_out(sp, &bytes)?;
        ptrs.push(sp);
    }
    ptrs.push(0);

    let word = size_of::<usize>();
    sp &= !(word - 1);
    sp = sp
        .checked_sub(ptrs.len() * word)
        .ok_or(LinuxError::E2BIG)?;
    let mut table = Vec::with_capacity(ptrs.len() * word);
    for ptr in &ptrs {
        table.extend_from_slice(&ptr.to_ne_bytes());
    }
    aspace.copy_out(sp, &table)?;

    Ok((sp, args.len(), sp))
}
