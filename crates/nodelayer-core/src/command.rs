use std::path::{Path, PathBuf};
use std::process::Stdio;

use log::{debug, error, trace};
use tokio::process::Command;

use crate::error::LayerError;

/// Resolve an external executable on `PATH`.
pub(crate) fn locate_tool(tool: &'static str) -> Result<PathBuf, LayerError> {
    which::which(tool).map_err(|_| LayerError::ToolNotFound { tool })
}

/// Run `cmd` to completion and return its stdout followed by its stderr.
///
/// The two streams are captured separately, so the text is all of stdout
/// and then all of stderr, never the order in which the tool wrote them.
/// A failing command surfaces the captured text, or the exit status when
/// the tool printed nothing.
pub(crate) async fn run_captured(
    tool: &'static str,
    cmd: &mut Command,
) -> Result<String, LayerError> {
    let program = PathBuf::from(cmd.as_std().get_program());
    debug!("Running {tool}: {}", describe(&program, cmd));

    let output = cmd
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|error| LayerError::io_with_path("failed to run command", &program, &error))?;

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    trace!("{tool} output: {combined}");

    if output.status.success() {
        return Ok(combined);
    }

    error!("{tool} failed with {}", output.status);
    if combined.trim().is_empty() {
        Err(LayerError::CommandExited {
            tool,
            status: output.status.to_string(),
        })
    } else {
        Err(LayerError::CommandFailed {
            tool,
            output: combined,
        })
    }
}

fn describe(program: &Path, cmd: &Command) -> String {
    let args: Vec<String> = cmd
        .as_std()
        .get_args()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect();
    format!("{} {}", program.display(), args.join(" "))
}
