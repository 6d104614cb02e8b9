use std::io::{self, Write};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::thread;

use anyhow::{bail, Context, Result};

use super::{EngineLoader, FormatOptions, FormatPlugin, PluginKind, PluginSet};

/// Loads an external `prettier`-compatible executable.
///
/// Loading probes the executable once with `--version`; each enabled
/// plugin then pipes text through it with the matching `--parser`.
#[derive(Debug, Clone)]
pub struct CommandEngineLoader {
    program: String,
    plugins: Vec<PluginKind>,
}

impl CommandEngineLoader {
    pub fn new(program: impl Into<String>, plugins: Vec<PluginKind>) -> Self {
        Self {
            program: program.into(),
            plugins,
        }
    }
}

impl EngineLoader for CommandEngineLoader {
    fn load(&self) -> Result<PluginSet> {
        let output = Command::new(&self.program)
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("launching formatter {}", self.program))?;
        if !output.status.success() {
            bail!("{} --version exited with {}", self.program, output.status);
        }
        let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
        tracing::info!(program = %self.program, %version, "formatter executable found");

        let program = Arc::new(self.program.clone());
        let mut set = PluginSet::new();
        for kind in &self.plugins {
            set.insert(
                *kind,
                Arc::new(CommandPlugin {
                    program: program.clone(),
                }),
            );
        }
        Ok(set)
    }
}

struct CommandPlugin {
    program: Arc<String>,
}

impl FormatPlugin for CommandPlugin {
    fn format(&self, text: &str, options: &FormatOptions) -> Result<String> {
        let mut command = Command::new(self.program.as_str());
        command
            .arg("--parser")
            .arg(options.parser)
            .arg("--tab-width")
            .arg(options.tab_width.to_string());
        if options.single_quote {
            command.arg("--single-quote");
        }
        if options.prose_wrap_always {
            command.args(["--prose-wrap", "always"]);
        }
        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("spawning formatter {}", self.program))?;

        let mut stdin = child.stdin.take().context("formatter stdin unavailable")?;
        let input = text.to_owned();
        // Feed stdin from a helper thread so a large output cannot stall the pipe.
        let writer = thread::spawn(move || stdin.write_all(input.as_bytes()));
        let output = child
            .wait_with_output()
            .context("waiting for formatter to exit")?;
        match writer.join() {
            Ok(Ok(())) => {}
            Ok(Err(err)) if err.kind() == io::ErrorKind::BrokenPipe => {}
            Ok(Err(err)) => return Err(err).context("writing text to formatter"),
            Err(_) => bail!("formatter input thread panicked"),
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            if stderr.is_empty() {
                bail!("formatter exited with {}", output.status);
            }
            bail!("{stderr}");
        }
        String::from_utf8(output.stdout).context("formatter produced non-UTF-8 output")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_executable_fails_to_load() {
        let loader = CommandEngineLoader::new(
            "flick-test-formatter-that-does-not-exist",
            vec![PluginKind::Babel],
        );
        let err = loader.load().expect_err("load should fail");
        assert!(format!("{err:#}").contains("launching formatter"));
    }
}
