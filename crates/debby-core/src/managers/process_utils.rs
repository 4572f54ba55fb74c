use tokio::runtime::RuntimeFlavor;

use crate::execution::{
    ProcessExecutor, ProcessExitStatus, ProcessOutput, ProcessSpawnRequest, spawn_validated,
};
use crate::managers::manager::ManagerResult;
use crate::models::{CoreError, CoreErrorKind};

/// Run a tool invocation to completion and return its stdout.
///
/// Must be called with a multi-thread tokio runtime in context, either from a
/// thread that entered it or from one of its tasks. The call blocks the thread
/// until the process exits or its timeout fires.
pub(crate) fn run_and_collect_stdout(
    executor: &dyn ProcessExecutor,
    request: ProcessSpawnRequest,
) -> ManagerResult<String> {
    let manager = request.manager;
    let action = request.action;
    let command_line = request.command.display();

    let handle = tokio::runtime::Handle::try_current().map_err(|error| {
        CoreError::for_manager(
            manager,
            action,
            CoreErrorKind::ToolInvocationFailed,
            format!("cannot run `{command_line}` outside an async runtime: {error}"),
        )
    })?;
    if handle.runtime_flavor() == RuntimeFlavor::CurrentThread {
        return Err(CoreError::for_manager(
            manager,
            action,
            CoreErrorKind::ToolInvocationFailed,
            format!("cannot run `{command_line}`: cannot block inside a current-thread runtime"),
        ));
    }

    let process = spawn_validated(executor, request)?;
    let output: ProcessOutput =
        tokio::task::block_in_place(|| handle.block_on(process.wait()))?;

    tracing::trace!(
        manager = manager.as_str(),
        command = %command_line,
        status = ?output.status,
        elapsed_ms = output.elapsed().as_millis() as u64,
        "process finished"
    );

    match output.status {
        ProcessExitStatus::ExitCode(0) => String::from_utf8(output.stdout).map_err(|error| {
            CoreError::for_manager(
                manager,
                action,
                CoreErrorKind::VersionNotFound,
                format!("output of `{command_line}` is not valid UTF-8: {error}"),
            )
        }),
        ProcessExitStatus::ExitCode(code) => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(CoreError::for_manager(
                manager,
                action,
                CoreErrorKind::ToolInvocationFailed,
                format!("`{command_line}` exited with code {code}: {}", stderr.trim()),
            ))
        }
        ProcessExitStatus::Terminated => Err(CoreError::for_manager(
            manager,
            action,
            CoreErrorKind::ToolInvocationFailed,
            format!("`{command_line}` was terminated by signal"),
        )),
    }
}
