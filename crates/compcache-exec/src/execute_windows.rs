//! Windows launcher: job objects and CreateProcessW.
//!
//! The child is placed in a job that kills it when the job handle closes, so
//! a compiler cannot outlive an interrupted build. When this process already
//! sits in a job that forbids break-away, the child simply stays in that job.

use crate::cmdline::{
    add_exe_suffix, command_line_length, win32_command_string, MAX_COMMAND_LINE_LENGTH,
};
use crate::config::ExecConfig;
use crate::context::ExecContext;
use crate::execute::{Redirect, EXEC_FAILURE_STATUS};
use crate::shell::win32_shell;
use compcache_common::{ExecError, ExecResult, ExitOutcome};
use std::ffi::{c_void, OsStr, OsString};
use std::io::Write;
use std::mem;
use std::os::windows::ffi::OsStrExt;
use std::os::windows::io::{AsRawHandle, FromRawHandle, OwnedHandle};
use std::path::Path;
use tempfile::TempPath;
use tracing::{debug, error, warn};
use windows::core::{PCWSTR, PWSTR};
use windows::Win32::Foundation::{
    SetHandleInformation, BOOL, HANDLE, HANDLE_FLAG_INHERIT, WAIT_FAILED,
};
use windows::Win32::System::Console::{
    GetStdHandle, STD_ERROR_HANDLE, STD_HANDLE, STD_INPUT_HANDLE, STD_OUTPUT_HANDLE,
};
use windows::Win32::System::JobObjects::{
    AssignProcessToJobObject, CreateJobObjectW, IsProcessInJob, JobObjectExtendedLimitInformation,
    QueryInformationJobObject, SetInformationJobObject, JOBOBJECT_EXTENDED_LIMIT_INFORMATION,
    JOB_OBJECT_LIMIT, JOB_OBJECT_LIMIT_BREAKAWAY_OK, JOB_OBJECT_LIMIT_KILL_ON_JOB_CLOSE,
    JOB_OBJECT_LIMIT_SILENT_BREAKAWAY_OK,
};
use windows::Win32::System::Threading::{
    CreateProcessW, GetCurrentProcess, GetExitCodeProcess, ResumeThread, TerminateProcess,
    WaitForSingleObject, CREATE_BREAKAWAY_FROM_JOB, CREATE_SUSPENDED, INFINITE,
    PROCESS_CREATION_FLAGS, PROCESS_INFORMATION, STARTF_USESTDHANDLES, STARTUPINFOW,
};

/// How the child relates to job objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct JobPlan {
    /// Create a fresh kill-on-close job and assign the child to it.
    pub create_job: bool,
    pub flags: PROCESS_CREATION_FLAGS,
}

/// Decides job placement from this process's own job membership.
///
/// Outside any job, or inside one that allows break-away without killing on
/// close, the child gets a fresh job and starts suspended until assigned.
/// Otherwise it stays in the inherited job and starts normally.
pub(crate) fn plan_job(in_job: bool, limit_flags: JOB_OBJECT_LIMIT) -> JobPlan {
    if !in_job {
        return JobPlan {
            create_job: true,
            flags: CREATE_SUSPENDED,
        };
    }

    let kill_on_close = limit_flags.0 & JOB_OBJECT_LIMIT_KILL_ON_JOB_CLOSE.0 != 0;
    let breakaway_ok = limit_flags.0 & JOB_OBJECT_LIMIT_BREAKAWAY_OK.0 != 0;
    if !kill_on_close && breakaway_ok {
        JobPlan {
            create_job: true,
            flags: CREATE_BREAKAWAY_FROM_JOB | CREATE_SUSPENDED,
        }
    } else {
        JobPlan {
            create_job: false,
            flags: PROCESS_CREATION_FLAGS(0),
        }
    }
}

fn current_job_plan() -> ExecResult<JobPlan> {
    let mut in_job = BOOL::default();
    // SAFETY: the pseudo handle from GetCurrentProcess needs no closing.
    unsafe { IsProcessInJob(GetCurrentProcess(), HANDLE::default(), &mut in_job) }
        .map_err(|e| logged(ExecError::job_query("IsProcessInJob", e.code().0, e.message().to_string())))?;

    if !in_job.as_bool() {
        return Ok(plan_job(false, JOB_OBJECT_LIMIT(0)));
    }

    let mut info = JOBOBJECT_EXTENDED_LIMIT_INFORMATION::default();
    // SAFETY: `info` is a properly sized, writable JOBOBJECT_EXTENDED_LIMIT_INFORMATION.
    unsafe {
        QueryInformationJobObject(
            HANDLE::default(),
            JobObjectExtendedLimitInformation,
            &mut info as *mut _ as *mut c_void,
            mem::size_of::<JOBOBJECT_EXTENDED_LIMIT_INFORMATION>() as u32,
            None,
        )
    }
    .map_err(|e| logged(ExecError::job_query("QueryInformationJobObject", e.code().0, e.message().to_string())))?;

    Ok(plan_job(true, info.BasicLimitInformation.LimitFlags))
}

/// A job whose members die when its last handle closes.
fn create_kill_on_close_job() -> ExecResult<OwnedHandle> {
    // SAFETY: no security attributes, unnamed job.
    let raw = unsafe { CreateJobObjectW(None, PCWSTR::null()) }
        .map_err(|e| logged(ExecError::job_object("CreateJobObject", e.code().0, e.message().to_string())))?;
    // SAFETY: CreateJobObjectW returned a fresh handle we now own.
    let job = unsafe { OwnedHandle::from_raw_handle(raw.0) };

    let mut info = JOBOBJECT_EXTENDED_LIMIT_INFORMATION::default();
    info.BasicLimitInformation.LimitFlags =
        JOB_OBJECT_LIMIT_KILL_ON_JOB_CLOSE | JOB_OBJECT_LIMIT_SILENT_BREAKAWAY_OK;
    // SAFETY: `info` outlives the call and the size matches its type.
    unsafe {
        SetInformationJobObject(
            handle(&job),
            JobObjectExtendedLimitInformation,
            &info as *const _ as *const c_void,
            mem::size_of::<JOBOBJECT_EXTENDED_LIMIT_INFORMATION>() as u32,
        )
    }
    .map_err(|e| logged(ExecError::job_object("JobObjectExtendedLimitInformation", e.code().0, e.message().to_string())))?;

    Ok(job)
}

fn handle(owned: &OwnedHandle) -> HANDLE {
    HANDLE(owned.as_raw_handle())
}

fn logged(err: ExecError) -> ExecError {
    error!("{}", err);
    err
}

/// Handles the child gets for stdin, stdout and stderr.
///
/// Stdin is always inherited and may be absent.
fn std_handles(redirect: &Redirect) -> ExecResult<(HANDLE, HANDLE, HANDLE)> {
    // SAFETY: GetStdHandle has no preconditions.
    let stdin = unsafe { GetStdHandle(STD_INPUT_HANDLE) }.unwrap_or_default();
    match redirect {
        Redirect::Inherit => Ok((
            stdin,
            std_handle(STD_OUTPUT_HANDLE, "stdout")?,
            std_handle(STD_ERROR_HANDLE, "stderr")?,
        )),
        Redirect::Files { stdout, stderr } => Ok((
            stdin,
            inheritable(HANDLE(stdout.as_raw_handle()), "stdout")?,
            inheritable(HANDLE(stderr.as_raw_handle()), "stderr")?,
        )),
    }
}

fn std_handle(which: STD_HANDLE, stream: &'static str) -> ExecResult<HANDLE> {
    // SAFETY: GetStdHandle has no preconditions.
    match unsafe { GetStdHandle(which) } {
        Ok(h) if !h.is_invalid() => Ok(h),
        Ok(_) => Err(ExecError::invalid_handle(stream, "invalid handle value")),
        Err(e) => {
            warn!("failed to get {} handle: {} ({})", stream, e.message(), e.code().0);
            Err(ExecError::invalid_handle(stream, e.message().to_string()))
        }
    }
}

/// Marks a redirect handle inheritable so the child can use it.
fn inheritable(h: HANDLE, stream: &'static str) -> ExecResult<HANDLE> {
    if h.is_invalid() {
        return Err(ExecError::invalid_handle(stream, "invalid handle value"));
    }
    // SAFETY: `h` is a live handle owned by the redirect file.
    unsafe { SetHandleInformation(h, HANDLE_FLAG_INHERIT.0, HANDLE_FLAG_INHERIT) }.map_err(|e| {
        warn!("failed to make {} inheritable: {} ({})", stream, e.message(), e.code().0);
        ExecError::invalid_handle(stream, e.message().to_string())
    })?;
    Ok(h)
}

fn to_utf8(arg: &OsStr) -> ExecResult<&str> {
    arg.to_str().ok_or_else(|| {
        ExecError::invalid_argument(format!("argument is not valid Unicode: {}", arg.to_string_lossy()))
    })
}

fn wide(s: &str) -> Vec<u16> {
    OsStr::new(s).encode_wide().chain(std::iter::once(0)).collect()
}

/// The command line to create the process with, plus the response file that
/// must stay on disk until the process has exited.
pub(crate) struct CommandLine {
    pub application: String,
    pub command_line: String,
    pub response_file: Option<TempPath>,
}

/// Renders `args`, spilling into a response file under `temp_dir` when the
/// command line would exceed [`MAX_COMMAND_LINE_LENGTH`].
pub(crate) fn build_command_line(
    program: &str,
    args: &[&str],
    shell: Option<&str>,
    temp_dir: &Path,
) -> ExecResult<CommandLine> {
    let application = add_exe_suffix(program);
    let command_line = win32_command_string(args, shell, false);
    if command_line_length(&command_line) <= MAX_COMMAND_LINE_LENGTH {
        return Ok(CommandLine {
            application,
            command_line,
            response_file: None,
        });
    }

    let contents = win32_command_string(&args[1..], shell, true);
    let response_file = write_response_file(temp_dir, &contents)?;
    debug!("Arguments from {}", response_file.display());

    let command_line = format!("\"{}\" \"@{}\"", application, response_file.display());
    Ok(CommandLine {
        application,
        command_line,
        response_file: Some(response_file),
    })
}

/// Writes `contents` to a closed temporary file that is deleted on drop.
fn write_response_file(temp_dir: &Path, contents: &str) -> ExecResult<TempPath> {
    let to_error =
        |e: std::io::Error| logged(ExecError::response_file(temp_dir.display().to_string(), e.to_string()));

    let mut file = tempfile::Builder::new()
        .prefix("cmd_args")
        .tempfile_in(temp_dir)
        .map_err(to_error)?;
    file.write_all(contents.as_bytes()).map_err(to_error)?;
    file.flush().map_err(to_error)?;
    Ok(file.into_temp_path())
}

fn win32_execute(ctx: &ExecContext, argv: &[OsString], redirect: Redirect) -> ExecResult<u32> {
    let config = &ctx.config;
    let plan = current_job_plan()?;
    let job = if plan.create_job {
        Some(create_kill_on_close_job()?)
    } else {
        None
    };

    let args = argv.iter().map(|a| to_utf8(a)).collect::<ExecResult<Vec<_>>>()?;
    let shell = win32_shell(Path::new(args[0]), config).map(|p| p.to_string_lossy().into_owned());
    let program = shell.as_deref().unwrap_or(args[0]);

    let (stdin, stdout, stderr) = std_handles(&redirect)?;
    let startup = STARTUPINFOW {
        cb: mem::size_of::<STARTUPINFOW>() as u32,
        dwFlags: STARTF_USESTDHANDLES,
        hStdInput: stdin,
        hStdOutput: stdout,
        hStdError: stderr,
        ..Default::default()
    };

    // Dropped at the end of this function, after the child has exited.
    let command = build_command_line(program, &args, shell.as_deref(), &config.temporary_dir)?;
    let application = wide(&command.application);
    let mut command_line = wide(&command.command_line);

    let mut info = PROCESS_INFORMATION::default();
    // SAFETY: both strings are NUL-terminated and outlive the call; the
    // command line buffer is writable as CreateProcessW requires.
    let created = unsafe {
        CreateProcessW(
            PCWSTR(application.as_ptr()),
            PWSTR(command_line.as_mut_ptr()),
            None,
            None,
            true,
            plan.flags,
            None,
            PCWSTR::null(),
            &startup,
            &mut info,
        )
    };

    // The child has its own copies now, or there is no child.
    drop(redirect);

    if let Err(e) = created {
        return Err(logged(ExecError::create_process(
            &command.application,
            e.code().0,
            e.message().to_string(),
        )));
    }

    // SAFETY: CreateProcessW succeeded, so both handles are fresh and ours.
    let process = unsafe { OwnedHandle::from_raw_handle(info.hProcess.0) };
    let thread = unsafe { OwnedHandle::from_raw_handle(info.hThread.0) };
    ctx.set_compiler_pid(info.dwProcessId as i32);

    if let Some(job) = &job {
        // SAFETY: both handles are live for the duration of the call.
        if let Err(e) = unsafe { AssignProcessToJobObject(handle(job), handle(&process)) } {
            // SAFETY: the suspended process has not run any code yet.
            let _ = unsafe { TerminateProcess(handle(&process), 1) };
            ctx.clear_compiler_pid();
            return Err(logged(ExecError::assign_to_job(
                &command.application,
                e.code().0,
                e.message().to_string(),
            )));
        }
        // SAFETY: the primary thread was created suspended.
        unsafe { ResumeThread(handle(&thread)) };
    }

    let exit_code = wait_for_exit(handle(&process));
    ctx.clear_compiler_pid();

    exit_code
}

/// Blocks until `process` terminates and returns its exit code.
fn wait_for_exit(process: HANDLE) -> ExecResult<u32> {
    // SAFETY: the caller keeps `process` open for the duration of the call.
    if unsafe { WaitForSingleObject(process, INFINITE) } == WAIT_FAILED {
        let e = windows::core::Error::from_win32();
        return Err(logged(ExecError::process_wait(
            "WaitForSingleObject",
            e.code().0,
            e.message().to_string(),
        )));
    }

    let mut exit_code = 0u32;
    // SAFETY: as above; `exit_code` is a valid out pointer.
    if let Err(e) = unsafe { GetExitCodeProcess(process, &mut exit_code) } {
        return Err(logged(ExecError::process_wait(
            "GetExitCodeProcess",
            e.code().0,
            e.message().to_string(),
        )));
    }
    Ok(exit_code)
}

pub(crate) fn execute(
    ctx: &ExecContext,
    argv: &[OsString],
    redirect: Redirect,
) -> ExecResult<ExitOutcome> {
    win32_execute(ctx, argv, redirect).map(|code| ExitOutcome::Exited(code as i32))
}

pub(crate) fn execute_noreturn(config: &ExecConfig, argv: &[OsString]) -> ! {
    let ctx = ExecContext::new(config.clone());
    let code = match win32_execute(&ctx, argv, Redirect::Inherit) {
        Ok(code) => code as i32,
        Err(_) => EXEC_FAILURE_STATUS,
    };
    std::process::exit(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmdline::tests::{parse_response_file, parse_win32_command_line};

    #[test]
    fn test_plan_outside_job() {
        let plan = plan_job(false, JOB_OBJECT_LIMIT(0));
        assert!(plan.create_job);
        assert_eq!(plan.flags, CREATE_SUSPENDED);
    }

    #[test]
    fn test_plan_breaks_away_from_permissive_job() {
        let plan = plan_job(true, JOB_OBJECT_LIMIT_BREAKAWAY_OK);
        assert!(plan.create_job);
        assert_eq!(plan.flags, CREATE_BREAKAWAY_FROM_JOB | CREATE_SUSPENDED);
    }

    #[test]
    fn test_plan_stays_in_locked_job() {
        let plan = plan_job(true, JOB_OBJECT_LIMIT(0));
        assert!(!plan.create_job);
        assert_eq!(plan.flags, PROCESS_CREATION_FLAGS(0));

        let plan = plan_job(
            true,
            JOB_OBJECT_LIMIT_KILL_ON_JOB_CLOSE | JOB_OBJECT_LIMIT_BREAKAWAY_OK,
        );
        assert!(!plan.create_job);
    }

    #[test]
    fn test_short_command_line_is_inline() {
        let dir = tempfile::tempdir().unwrap();
        let args = ["C:\\bin\\cl", "/c", "foo.c"];
        let command = build_command_line(args[0], &args, None, dir.path()).unwrap();
        assert_eq!(command.application, "C:\\bin\\cl.exe");
        assert!(command.response_file.is_none());
        assert_eq!(parse_win32_command_line(&command.command_line), args);
    }

    #[test]
    fn test_long_command_line_uses_response_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut args: Vec<String> = vec!["C:\\bin\\gcc.exe".to_string()];
        for i in 0..600 {
            args.push(format!("-IC:\\some dir\\include\\{}\\", i));
        }
        let args: Vec<&str> = args.iter().map(String::as_str).collect();

        let command = build_command_line(args[0], &args, None, dir.path()).unwrap();
        let response_file = command.response_file.as_ref().unwrap().to_path_buf();

        let parsed = parse_win32_command_line(&command.command_line);
        assert_eq!(parsed[0], "C:\\bin\\gcc.exe");
        assert_eq!(parsed[1], format!("@{}", response_file.display()));

        let contents = std::fs::read_to_string(&response_file).unwrap();
        assert_eq!(parse_response_file(&contents), &args[1..]);

        drop(command);
        assert!(!response_file.exists());
    }

    #[test]
    fn test_wait_on_invalid_handle_is_an_error() {
        let err = wait_for_exit(HANDLE::default()).unwrap_err();
        assert!(matches!(
            err,
            ExecError::ProcessWait {
                api: "WaitForSingleObject",
                ..
            }
        ));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_execute_cmd_exit_code() {
        let ctx = ExecContext::default();
        let argv: Vec<OsString> = ["C:\\Windows\\System32\\cmd.exe", "/c", "exit 7"]
            .iter()
            .map(OsString::from)
            .collect();
        let outcome = execute(&ctx, &argv, Redirect::Inherit).unwrap();
        assert_eq!(outcome, ExitOutcome::Exited(7));
        assert_eq!(ctx.compiler_pid(), None);
    }
}
