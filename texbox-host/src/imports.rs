//! Host functions imported by the engine
//!
//! Everything lives in the `library` module. Pointers and lengths are guest
//! byte offsets; negative file descriptors in the print family mean the
//! console.

use crate::error::VfsError;
use crate::memory::{offset, GuestMemory};
use crate::session::Session;
use crate::suspend;
use crate::vfs::file::OpenMode;
use crate::vfs::{LineRequest, OpenOutcome, NOT_READY};
use chrono::{Datelike, Local, Timelike};
use wasmtime::{Caller, Linker};

/// Import module name
pub const MODULE: &str = "library";

/// Register every host import on `linker`
pub(crate) fn add_to_linker(linker: &mut Linker<Session>) -> anyhow::Result<()> {
    linker.func_wrap(
        MODULE,
        "reset",
        |mut caller: Caller<'_, Session>, len: i32, ptr: i32| {
            open(&mut caller, len, ptr, OpenMode::Read)
        },
    )?;
    linker.func_wrap(
        MODULE,
        "rewrite",
        |mut caller: Caller<'_, Session>, len: i32, ptr: i32| {
            open(&mut caller, len, ptr, OpenMode::Write)
        },
    )?;
    linker.func_wrap(
        MODULE,
        "close",
        |mut caller: Caller<'_, Session>, fd: i32| -> anyhow::Result<()> {
            caller.data_mut().vfs.close(fd)?;
            Ok(())
        },
    )?;

    linker.func_wrap(
        MODULE,
        "eof",
        |caller: Caller<'_, Session>, fd: i32| -> anyhow::Result<i32> {
            Ok(caller.data().vfs.eof(fd)? as i32)
        },
    )?;
    linker.func_wrap(
        MODULE,
        "eoln",
        |caller: Caller<'_, Session>, fd: i32| -> anyhow::Result<i32> {
            Ok(caller.data().vfs.eoln(fd)? as i32)
        },
    )?;
    linker.func_wrap(
        MODULE,
        "erstat",
        |caller: Caller<'_, Session>, fd: i32| -> anyhow::Result<i32> {
            Ok(caller.data().vfs.erstat(fd)?)
        },
    )?;

    linker.func_wrap(
        MODULE,
        "get",
        |mut caller: Caller<'_, Session>, fd: i32, ptr: i32, len: i32| {
            with_memory(&mut caller, |memory, session| {
                session.vfs.get(fd, memory, offset(ptr), offset(len))
            })
        },
    )?;
    linker.func_wrap(
        MODULE,
        "put",
        |mut caller: Caller<'_, Session>, fd: i32, ptr: i32, len: i32| {
            with_memory(&mut caller, |memory, session| {
                session.vfs.put(fd, memory, offset(ptr), offset(len))
            })
        },
    )?;
    linker.func_wrap(
        MODULE,
        "inputln",
        |mut caller: Caller<'_, Session>,
         fd: i32,
         bypass: i32,
         buffer: i32,
         first: i32,
         last: i32,
         _max_buf_stack: i32,
         buf_size: i32|
         -> anyhow::Result<i32> {
            let request = LineRequest {
                bypass_eoln: bypass != 0,
                buffer: offset(buffer),
                first: offset(first),
                last: offset(last),
                buf_size: offset(buf_size),
            };
            let more = with_memory(&mut caller, |memory, session| {
                session.vfs.input_line(fd, memory, request)
            })?;
            Ok(more as i32)
        },
    )?;

    linker.func_wrap(
        MODULE,
        "printString",
        |mut caller: Caller<'_, Session>, fd: i32, ptr: i32| {
            with_memory(&mut caller, |memory, session| {
                let text = memory.read_pascal_bytes(offset(ptr))?;
                session.vfs.write_bytes(fd, text)
            })
        },
    )?;
    linker.func_wrap(
        MODULE,
        "printChar",
        |mut caller: Caller<'_, Session>, fd: i32, ch: i32| -> anyhow::Result<()> {
            caller.data_mut().vfs.write_bytes(fd, &[ch as u8])?;
            Ok(())
        },
    )?;
    linker.func_wrap(
        MODULE,
        "printInteger",
        |mut caller: Caller<'_, Session>, fd: i32, value: i32| -> anyhow::Result<()> {
            caller
                .data_mut()
                .vfs
                .write_bytes(fd, value.to_string().as_bytes())?;
            Ok(())
        },
    )?;
    linker.func_wrap(
        MODULE,
        "printFloat",
        |mut caller: Caller<'_, Session>, fd: i32, value: f64| -> anyhow::Result<()> {
            caller
                .data_mut()
                .vfs
                .write_bytes(fd, format_real(value).as_bytes())?;
            Ok(())
        },
    )?;
    linker.func_wrap(
        MODULE,
        "printBoolean",
        |mut caller: Caller<'_, Session>, fd: i32, value: i32| -> anyhow::Result<()> {
            let text: &[u8] = if value != 0 { b"TRUE" } else { b"FALSE" };
            caller.data_mut().vfs.write_bytes(fd, text)?;
            Ok(())
        },
    )?;
    linker.func_wrap(
        MODULE,
        "printNewline",
        |mut caller: Caller<'_, Session>, fd: i32| -> anyhow::Result<()> {
            caller.data_mut().vfs.write_bytes(fd, b"\n")?;
            Ok(())
        },
    )?;

    linker.func_wrap(MODULE, "getCurrentMinutes", || {
        let now = Local::now();
        (now.hour() * 60 + now.minute()) as i32
    })?;
    linker.func_wrap(MODULE, "getCurrentDay", || Local::now().day() as i32)?;
    linker.func_wrap(MODULE, "getCurrentMonth", || Local::now().month() as i32)?;
    linker.func_wrap(MODULE, "getCurrentYear", || Local::now().year())?;

    linker.func_wrap(MODULE, "tex_final_end", |mut caller: Caller<'_, Session>| {
        caller.data_mut().vfs.finish();
    })?;

    Ok(())
}

/// `reset`/`rewrite`: open a file, suspending the guest on a miss
fn open(
    caller: &mut Caller<'_, Session>,
    len: i32,
    ptr: i32,
    mode: OpenMode,
) -> anyhow::Result<i32> {
    let resuming = suspend::resume_if_sleeping(caller)?;

    let outcome = with_memory(caller, |memory, session| {
        let raw = memory.read(offset(ptr), offset(len))?;
        Ok(session.vfs.open_raw(raw, mode, resuming))
    })?;

    match outcome {
        OpenOutcome::Opened(handle) => Ok(handle),
        OpenOutcome::Fetch(name) => {
            suspend::suspend(caller, name)?;
            Ok(NOT_READY)
        }
    }
}

/// Run `f` with a view of guest memory alongside the session state
fn with_memory<R>(
    caller: &mut Caller<'_, Session>,
    f: impl FnOnce(&mut GuestMemory<'_>, &mut Session) -> Result<R, VfsError>,
) -> anyhow::Result<R> {
    let memory = caller.data().guest()?.memory;
    let (bytes, session) = memory.data_and_store_mut(&mut *caller);
    Ok(f(&mut GuestMemory::new(bytes), session)?)
}

fn format_real(value: f64) -> String {
    if value.is_infinite() {
        if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_real() {
        assert_eq!(format_real(1.5), "1.5");
        assert_eq!(format_real(2.0), "2");
        assert_eq!(format_real(f64::INFINITY), "Infinity");
        assert_eq!(format_real(f64::NAN), "NaN");
    }
}
