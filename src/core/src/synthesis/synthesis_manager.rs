use log::{debug, error, info, warn};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;

use crate::configuration::{CollaboratorConfig, Config, OutputLayout};
use crate::error_handling::types::SynthesisError;
use crate::synthesis::placeholder;
use crate::synthesis::types::{SynthesisJob, SynthesisRuntime, SynthesisStats};

/// Renders the scale the way the collaborator has always received it
/// (`2.0`, not `2`).
///
/// Matches Python's `str(float)` for decimal notation, which covers every
/// value in `1e-4..1e16`. Outside that range both switch to exponent form
/// and differ in the exponent digits (`1e-7` here, `1e-07` in Python).
pub fn format_scale(scale: f64) -> String {
    format!("{:?}", scale)
}

/// Runs synthesis jobs against the configured runtime.
///
/// Design notes:
/// - [`SynthesisRuntime::External`] spawns the collaborator with
///   `<program> [<script>] --model_path .. --cloth_path .. --scale .. --sample ..`,
///   adding `--output_dir ..` when the layout is [`OutputLayout::PerSession`].
/// - Every external run is raced against its timeout and a cancellation
///   token; the losing child process is killed.
/// - With [`OutputLayout::Shared`] all sessions read from the same directory,
///   so callers hold the slot from [`SynthesisManager::acquire_slot`] from
///   before the run until its artifacts are collected.
pub struct SynthesisManager {
    runtime: SynthesisRuntime,
    collaborator: CollaboratorConfig,
    simulation_delay: Duration,
    shared_slot: Arc<AsyncMutex<()>>,
    stats: Mutex<SynthesisStats>,
}

impl SynthesisManager {
    pub fn new(config: &Config) -> Self {
        let runtime = if config.simulate {
            SynthesisRuntime::Simulation
        } else {
            SynthesisRuntime::External
        };
        info!(
            "SynthesisManager initialized with runtime {:?}, output layout {:?}",
            runtime, config.collaborator.output_layout
        );
        Self {
            runtime,
            collaborator: config.collaborator.clone(),
            simulation_delay: config.simulation_delay(),
            shared_slot: Arc::new(AsyncMutex::new(())),
            stats: Mutex::new(SynthesisStats::default()),
        }
    }

    pub fn runtime(&self) -> SynthesisRuntime {
        self.runtime
    }

    pub fn layout(&self) -> OutputLayout {
        self.collaborator.output_layout
    }

    /// Waits for exclusive use of the shared output directory.
    ///
    /// Returns `None` in `PerSession` layout, where runs never share a
    /// directory.
    pub async fn acquire_slot(&self) -> Option<OwnedMutexGuard<()>> {
        match self.layout() {
            OutputLayout::PerSession => None,
            OutputLayout::Shared => {
                debug!("Waiting for the shared collaborator slot");
                Some(self.shared_slot.clone().lock_owned().await)
            }
        }
    }

    /// Runs one job to completion, writing its images into `job.output_dir`.
    pub async fn run(
        &self,
        job: &SynthesisJob,
        cancel: &CancellationToken,
    ) -> Result<(), SynthesisError> {
        self.update_stats(|s| s.running += 1);
        let mut guard = RunGuard {
            stats: &self.stats,
            succeeded: false,
        };
        let result = match self.runtime {
            SynthesisRuntime::External => self.run_external(job, cancel).await,
            SynthesisRuntime::Simulation => self.run_simulated(job, cancel).await,
        };
        guard.succeeded = result.is_ok();
        drop(guard);
        match &result {
            Ok(()) => info!("Synthesis for session {} finished", job.session_id),
            Err(e) => error!("Synthesis for session {} failed: {}", job.session_id, e),
        }
        result
    }

    /// Returns a snapshot of the run counters.
    pub fn get_stats(&self) -> SynthesisStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn update_stats<F: FnOnce(&mut SynthesisStats)>(&self, f: F) {
        if let Ok(mut stats) = self.stats.lock() {
            f(&mut stats);
        }
    }

    fn build_command(&self, job: &SynthesisJob) -> Command {
        let mut cmd = Command::new(&self.collaborator.program);
        if let Some(script) = self.collaborator.script() {
            cmd.arg(script);
        }
        cmd.arg("--model_path")
            .arg(&job.model_path)
            .arg("--cloth_path")
            .arg(&job.cloth_path)
            .arg("--scale")
            .arg(format_scale(job.params.scale))
            .arg("--sample")
            .arg(job.params.sample.to_string());
        if self.layout() == OutputLayout::PerSession {
            cmd.arg("--output_dir").arg(&job.output_dir);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    async fn run_external(
        &self,
        job: &SynthesisJob,
        cancel: &CancellationToken,
    ) -> Result<(), SynthesisError> {
        let mut cmd = self.build_command(job);
        debug!("Spawning collaborator for session {}: {:?}", job.session_id, cmd);

        let mut child = cmd.spawn().map_err(|e| {
            error!(
                "Failed to spawn collaborator {}: {}",
                self.collaborator.program, e
            );
            SynthesisError::SpawnFailed(format!("{}: {}", self.collaborator.program, e))
        })?;

        if let Some(stdout) = child.stdout.take() {
            let mut reader = BufReader::new(stdout).lines();
            let sid = job.session_id;
            tokio::spawn(async move {
                while let Ok(Some(line)) = reader.next_line().await {
                    debug!("[collaborator:{}][stdout] {}", sid, line);
                }
            });
        }
        if let Some(stderr) = child.stderr.take() {
            let mut reader = BufReader::new(stderr).lines();
            let sid = job.session_id;
            tokio::spawn(async move {
                while let Ok(Some(line)) = reader.next_line().await {
                    debug!("[collaborator:{}][stderr] {}", sid, line);
                }
            });
        }

        let timeout = self.collaborator.timeout();
        let deadline = async move {
            match timeout {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };

        let status = tokio::select! {
            status = child.wait() => status?,
            _ = deadline => {
                warn!("Collaborator for session {} timed out, killing it", job.session_id);
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill collaborator: {}", e);
                }
                return Err(SynthesisError::TimedOut(self.collaborator.timeout_secs));
            }
            _ = cancel.cancelled() => {
                warn!("Collaborator for session {} cancelled, killing it", job.session_id);
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill collaborator: {}", e);
                }
                return Err(SynthesisError::Cancelled);
            }
        };

        if status.success() {
            Ok(())
        } else {
            Err(SynthesisError::NonZeroExit(status.code()))
        }
    }

    async fn run_simulated(
        &self,
        job: &SynthesisJob,
        cancel: &CancellationToken,
    ) -> Result<(), SynthesisError> {
        debug!(
            "Simulating synthesis for session {} ({} sample(s))",
            job.session_id, job.params.sample
        );
        tokio::select! {
            _ = tokio::time::sleep(self.simulation_delay) => {}
            _ = cancel.cancelled() => return Err(SynthesisError::Cancelled),
        }

        let dir = job.output_dir.clone();
        let sample = job.params.sample;
        tokio::task::spawn_blocking(move || placeholder::write_placeholders(&dir, sample))
            .await
            .map_err(|e| SynthesisError::PlaceholderFailed(e.to_string()))??;
        Ok(())
    }
}

/// Settles the counters of one run, including runs whose future is dropped.
struct RunGuard<'a> {
    stats: &'a Mutex<SynthesisStats>,
    succeeded: bool,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut stats) = self.stats.lock() {
            stats.running = stats.running.saturating_sub(1);
            if self.succeeded {
                stats.succeeded += 1;
            } else {
                stats.failed += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthesis::types::GenerationParams;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;
    use uuid::Uuid;

    fn job_in(dir: &Path, sample: u32) -> SynthesisJob {
        SynthesisJob {
            session_id: Uuid::new_v4(),
            model_path: dir.join("model.jpg"),
            cloth_path: dir.join("cloth.jpg"),
            params: GenerationParams { sample, scale: 2.0 },
            output_dir: dir.to_path_buf(),
        }
    }

    fn simulated_config() -> Config {
        Config {
            simulate: true,
            simulation_delay_ms: 0,
            ..Config::default()
        }
    }

    /// Writes a shell collaborator that records its arguments and produces
    /// `out_hd_<i>.png` for each sample, then exits with `exit_code`.
    #[cfg(unix)]
    fn fake_collaborator(dir: &Path, exit_code: i32) -> PathBuf {
        let script = dir.join("collaborator.sh");
        let body = format!(
            r#"#!/bin/sh
echo "$@" > "{dir}/args.txt"
out="{dir}"
sample=1
while [ $# -gt 0 ]; do
  case "$1" in
    --sample) sample="$2"; shift 2 ;;
    --output_dir) out="$2"; shift 2 ;;
    *) shift ;;
  esac
done
i=0
while [ "$i" -lt "$sample" ]; do
  printf 'image-%s' "$i" > "$out/out_hd_$i.png"
  i=$((i + 1))
done
echo "generated $sample image(s)" >&2
exit {code}
"#,
            dir = dir.display(),
            code = exit_code
        );
        std::fs::write(&script, body).unwrap();
        script
    }

    #[cfg(unix)]
    fn external_config(script: &Path, layout: OutputLayout, timeout_secs: u64) -> Config {
        let mut config = Config::default();
        config.collaborator.program = "/bin/sh".to_string();
        config.collaborator.script = script.display().to_string();
        config.collaborator.output_layout = layout;
        config.collaborator.timeout_secs = timeout_secs;
        config
    }

    #[test]
    fn test_format_scale_keeps_decimal_point() {
        assert_eq!(format_scale(2.0), "2.0");
        assert_eq!(format_scale(1.5), "1.5");
    }

    #[test]
    fn test_format_scale_stays_decimal_in_supported_range() {
        assert_eq!(format_scale(0.0001), "0.0001");
        assert_eq!(format_scale(7.5), "7.5");
        assert_eq!(format_scale(1e15), "1000000000000000.0");
    }

    #[tokio::test]
    async fn test_simulated_run_writes_placeholders() {
        let dir = TempDir::new().unwrap();
        let manager = SynthesisManager::new(&simulated_config());
        assert_eq!(manager.runtime(), SynthesisRuntime::Simulation);

        manager
            .run(&job_in(dir.path(), 2), &CancellationToken::new())
            .await
            .unwrap();

        assert!(dir.path().join("out_hd_0.png").is_file());
        assert!(dir.path().join("out_hd_1.png").is_file());
        assert_eq!(manager.get_stats().succeeded, 1);
    }

    #[tokio::test]
    async fn test_simulated_run_honours_cancellation() {
        let dir = TempDir::new().unwrap();
        let config = Config {
            simulation_delay_ms: 60_000,
            ..simulated_config()
        };
        let manager = SynthesisManager::new(&config);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = manager
            .run(&job_in(dir.path(), 1), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, SynthesisError::Cancelled));
        assert!(!dir.path().join("out_hd_0.png").exists());
        assert_eq!(manager.get_stats().failed, 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_external_run_passes_contract_arguments() {
        let dir = TempDir::new().unwrap();
        let script = fake_collaborator(dir.path(), 0);
        let manager =
            SynthesisManager::new(&external_config(&script, OutputLayout::Shared, 30));
        let job = SynthesisJob {
            params: GenerationParams {
                sample: 2,
                scale: 2.0,
            },
            ..job_in(dir.path(), 2)
        };

        manager.run(&job, &CancellationToken::new()).await.unwrap();

        let args = std::fs::read_to_string(dir.path().join("args.txt")).unwrap();
        assert!(args.contains(&format!("--model_path {}", job.model_path.display())));
        assert!(args.contains(&format!("--cloth_path {}", job.cloth_path.display())));
        assert!(args.contains("--scale 2.0 --sample 2"));
        assert!(!args.contains("--output_dir"));
        assert_eq!(
            std::fs::read(dir.path().join("out_hd_1.png")).unwrap(),
            b"image-1"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_per_session_layout_passes_output_dir() {
        let dir = TempDir::new().unwrap();
        let script = fake_collaborator(dir.path(), 0);
        let manager =
            SynthesisManager::new(&external_config(&script, OutputLayout::PerSession, 30));
        let private = dir.path().join("session");
        std::fs::create_dir_all(&private).unwrap();
        let job = SynthesisJob {
            output_dir: private.clone(),
            ..job_in(dir.path(), 1)
        };

        assert!(manager.acquire_slot().await.is_none());
        manager.run(&job, &CancellationToken::new()).await.unwrap();

        assert!(private.join("out_hd_0.png").is_file());
        assert!(!dir.path().join("out_hd_0.png").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_external_non_zero_exit_is_failure() {
        let dir = TempDir::new().unwrap();
        let script = fake_collaborator(dir.path(), 3);
        let manager =
            SynthesisManager::new(&external_config(&script, OutputLayout::Shared, 30));

        let err = manager
            .run(&job_in(dir.path(), 1), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SynthesisError::NonZeroExit(Some(3))));
        assert_eq!(manager.get_stats().failed, 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_external_timeout_kills_collaborator() {
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("hang.sh");
        std::fs::write(&script, "#!/bin/sh\nsleep 30\n").unwrap();
        let manager =
            SynthesisManager::new(&external_config(&script, OutputLayout::Shared, 1));

        let started = std::time::Instant::now();
        let err = manager
            .run(&job_in(dir.path(), 1), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SynthesisError::TimedOut(1)));
        assert!(started.elapsed() < Duration::from_secs(20));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_external_cancellation_kills_collaborator() {
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("hang.sh");
        std::fs::write(&script, "#!/bin/sh\nsleep 30\n").unwrap();
        let manager =
            SynthesisManager::new(&external_config(&script, OutputLayout::Shared, 0));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let err = manager
            .run(&job_in(dir.path(), 1), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, SynthesisError::Cancelled));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_dropped_run_settles_counters() {
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("hang.sh");
        std::fs::write(&script, "#!/bin/sh\nsleep 30\n").unwrap();
        let manager =
            SynthesisManager::new(&external_config(&script, OutputLayout::Shared, 0));

        let job = job_in(dir.path(), 1);
        let cancel = CancellationToken::new();
        let dropped =
            tokio::time::timeout(Duration::from_millis(300), manager.run(&job, &cancel)).await;
        assert!(dropped.is_err());

        let stats = manager.get_stats();
        assert_eq!(stats.running, 0);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.succeeded, 0);
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_failure() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.collaborator.program = "/nonexistent/tryon-collaborator".to_string();
        config.collaborator.script = String::new();
        let manager = SynthesisManager::new(&config);

        let err = manager
            .run(&job_in(dir.path(), 1), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SynthesisError::SpawnFailed(_)));
    }

    #[tokio::test]
    async fn test_shared_slot_is_exclusive() {
        let manager = SynthesisManager::new(&simulated_config());
        let guard = manager.acquire_slot().await;
        assert!(guard.is_some());

        let second = tokio::time::timeout(Duration::from_millis(50), manager.acquire_slot()).await;
        assert!(second.is_err());

        drop(guard);
        let third = tokio::time::timeout(Duration::from_millis(50), manager.acquire_slot()).await;
        assert!(matches!(third, Ok(Some(_))));
    }
}
